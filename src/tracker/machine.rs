// src/tracker/machine.rs

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use crate::config::TrackerSection;
use crate::errors::Result;
use crate::history::HistoryStore;
use crate::jobs::JobIndex;
use crate::tracker::core::{Observation, TrackerCore, TrackerEffect};
use crate::tracker::filter::{ProgramFilter, program_name};
use crate::tracker::job_log::JobLog;
use crate::tracker::monitor::MachineMonitor;
use crate::types::{self, MachineId};

/// Tracker knobs lifted out of `[tracker]`.
#[derive(Debug, Clone, Copy)]
pub struct TrackerSettings {
    pub poll_interval: Duration,
    pub machining_mode: i64,
    pub tool_change_debounce: u32,
}

impl From<&TrackerSection> for TrackerSettings {
    fn from(section: &TrackerSection) -> Self {
        Self {
            poll_interval: section.poll_interval(),
            machining_mode: section.machining_mode,
            tool_change_debounce: section.tool_change_debounce,
        }
    }
}

/// Everything a tracker shares with its siblings.
#[derive(Clone)]
pub struct TrackerContext {
    pub monitor: Arc<dyn MachineMonitor>,
    pub jobs: Arc<dyn JobIndex>,
    pub store: Arc<HistoryStore>,
    pub filter: Arc<ProgramFilter>,
    pub settings: TrackerSettings,
}

impl fmt::Debug for TrackerContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackerContext")
            .field("filter", &self.filter)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

/// Polling shell around [`TrackerCore`] for one machine.
///
/// Each poll reduces the monitor's answers to an [`Observation`], feeds it to
/// the core, then performs the returned effects against the job index and the
/// history store.
///
/// A finished job log that could not be saved is held and retried at the start
/// of every later poll until the store accepts it.
pub struct MachineTracker {
    core: TrackerCore,
    ctx: TrackerContext,
    unsaved: Vec<JobLog>,
}

impl fmt::Debug for MachineTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MachineTracker")
            .field("core", &self.core)
            .field("unsaved", &self.unsaved.len())
            .finish_non_exhaustive()
    }
}

impl MachineTracker {
    pub fn new(machine: MachineId, ctx: TrackerContext) -> Self {
        let core = TrackerCore::new(machine, ctx.settings.tool_change_debounce);
        Self {
            core,
            ctx,
            unsaved: Vec::new(),
        }
    }

    pub fn machine(&self) -> MachineId {
        self.core.machine()
    }

    pub fn core(&self) -> &TrackerCore {
        &self.core
    }

    /// Finished job logs still waiting to be saved.
    pub fn unsaved_logs(&self) -> &[JobLog] {
        &self.unsaved
    }

    /// Poll forever. A failed cycle is logged and the next one runs after the
    /// usual delay.
    pub async fn run(mut self) {
        let machine = self.machine();
        debug!(machine, interval = ?self.ctx.settings.poll_interval, "tracker started");

        loop {
            if let Err(err) = self.poll_once_at(types::now()).await {
                error!(machine, error = %err, "tracker poll failed");
            }
            tokio::time::sleep(self.ctx.settings.poll_interval).await;
        }
    }

    /// One poll cycle stamped with `now`. Returns the effects of this step.
    ///
    /// Every effect is attempted even when an earlier one fails; the first
    /// failure is returned after all of them ran. A job log the store rejects
    /// is kept for the next poll.
    pub async fn poll_once_at(&mut self, now: DateTime<Utc>) -> Result<Vec<TrackerEffect>> {
        let mut first_err = self.retry_unsaved().await.err();

        let observation = self.observe().await?;
        let effects = self.core.step(observation, now);

        for effect in effects.iter() {
            if let Err(err) = self.apply(effect).await {
                warn!(machine = self.machine(), ?effect, error = %err, "tracker effect failed");
                if let TrackerEffect::PersistJobLog(log) = effect {
                    self.unsaved.push(log.clone());
                }
                first_err.get_or_insert(err);
            }
        }

        match first_err {
            Some(err) => Err(err),
            None => Ok(effects),
        }
    }

    async fn retry_unsaved(&mut self) -> Result<()> {
        if self.unsaved.is_empty() {
            return Ok(());
        }

        let machine = self.machine();
        let mut first_err = None;
        for log in std::mem::take(&mut self.unsaved) {
            match self.ctx.store.save_job_log(log.clone()).await {
                Ok(()) => info!(machine, job = %log.project_id, "saved held job log"),
                Err(err) => {
                    self.unsaved.push(log);
                    first_err.get_or_insert(err);
                }
            }
        }

        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn observe(&self) -> Result<Observation> {
        let machine = self.machine();
        let monitor = &self.ctx.monitor;

        let mode = monitor.program_mode(machine).await?;
        if mode != self.ctx.settings.machining_mode {
            return Ok(Observation::Idle);
        }

        let path = monitor.program_path(machine).await?;
        if self.ctx.filter.is_skipped(&path) {
            return Ok(Observation::SystemProgram { path });
        }

        let program = program_name(&path).to_string();
        if program.is_empty() {
            return Ok(Observation::Unresolved { program });
        }

        let Some(job_id) = self.ctx.jobs.resolve_job_id(&program, machine).await? else {
            return Ok(Observation::Unresolved { program });
        };

        let tool = monitor.active_tool(machine).await?;
        Ok(Observation::Machining {
            job_id,
            program,
            tool,
        })
    }

    async fn apply(&self, effect: &TrackerEffect) -> Result<()> {
        let machine = self.machine();
        match effect {
            TrackerEffect::MarkProcessing { job_id, program } => {
                self.ctx.jobs.mark_processing(job_id, program, machine).await
            }
            TrackerEffect::MarkFinished { job_id, program } => {
                self.ctx.jobs.mark_finished(job_id, program, machine).await
            }
            TrackerEffect::PersistJobLog(log) => self.ctx.store.save_job_log(log.clone()).await,
        }
    }
}
