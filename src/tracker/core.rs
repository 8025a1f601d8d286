// src/tracker/core.rs

//! Pure per-machine work-cycle state machine.
//!
//! [`TrackerCore::step`] consumes one [`Observation`] plus the poll time and
//! returns the [`TrackerEffect`]s the polling shell must carry out. It never
//! touches the network, the job index or storage, so every transition can be
//! tested with plain values.

use chrono::{DateTime, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use crate::tracker::job_log::JobLog;
use crate::types::MachineId;

/// What one poll saw, already reduced by the shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation {
    /// Program mode is not the machining mode.
    Idle,
    /// Active program lives in a skipped location; the cycle is ignored.
    SystemProgram { path: String },
    /// Machining, but the program name maps to no job (yet).
    Unresolved { program: String },
    /// Machining a known job with `tool` in the spindle.
    Machining {
        job_id: String,
        program: String,
        tool: i64,
    },
}

/// Work the shell performs after a step, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum TrackerEffect {
    MarkProcessing { job_id: String, program: String },
    MarkFinished { job_id: String, program: String },
    PersistJobLog(JobLog),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Machining,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PendingTool {
    tool: i64,
    seen: u32,
}

/// Mutable per-machine state, owned by exactly one tracker.
#[derive(Debug, Clone)]
pub struct MachineState {
    pub tracked_tool: Option<i64>,
    pub operation_index: u32,
    pub product_id: Uuid,
    pub is_processing: bool,
    pub current_job_id: Option<String>,
    pub current_program: Option<String>,
    pending: Option<PendingTool>,
    job_log: Option<JobLog>,
}

impl MachineState {
    fn new() -> Self {
        Self {
            tracked_tool: None,
            operation_index: 0,
            product_id: Uuid::new_v4(),
            is_processing: false,
            current_job_id: None,
            current_program: None,
            pending: None,
            job_log: None,
        }
    }

    pub fn phase(&self) -> Phase {
        if self.is_processing {
            Phase::Machining
        } else {
            Phase::Idle
        }
    }

    /// The log of the job currently being cut.
    pub fn job_log(&self) -> Option<&JobLog> {
        self.job_log.as_ref()
    }

    /// Forget the finished job; the next job gets a fresh product id.
    fn reset(&mut self) {
        *self = Self::new();
    }
}

#[derive(Debug, Clone)]
pub struct TrackerCore {
    machine: MachineId,
    debounce: u32,
    state: MachineState,
}

impl TrackerCore {
    /// `debounce` is the number of consecutive polls a new tool must be seen
    /// before the change is committed; values below 1 act as 1.
    pub fn new(machine: MachineId, debounce: u32) -> Self {
        Self {
            machine,
            debounce: debounce.max(1),
            state: MachineState::new(),
        }
    }

    pub fn machine(&self) -> MachineId {
        self.machine
    }

    pub fn state(&self) -> &MachineState {
        &self.state
    }

    pub fn step(&mut self, observation: Observation, now: DateTime<Utc>) -> Vec<TrackerEffect> {
        match observation {
            Observation::Idle => self.on_idle(now),
            Observation::SystemProgram { path } => {
                debug!(machine = self.machine, %path, "system program active; skipping cycle");
                Vec::new()
            }
            Observation::Unresolved { program } => {
                debug!(machine = self.machine, %program, "program not linked to a job; skipping cycle");
                Vec::new()
            }
            Observation::Machining {
                job_id,
                program,
                tool,
            } => self.on_machining(job_id, program, tool, now),
        }
    }

    fn on_idle(&mut self, now: DateTime<Utc>) -> Vec<TrackerEffect> {
        if !self.state.is_processing {
            return Vec::new();
        }
        self.finish_job(now)
    }

    fn on_machining(
        &mut self,
        job_id: String,
        program: String,
        tool: i64,
        now: DateTime<Utc>,
    ) -> Vec<TrackerEffect> {
        let mut effects = Vec::new();

        // A different job showing up mid-cycle closes the previous one first.
        if self.state.is_processing
            && self.state.current_job_id.as_deref() != Some(job_id.as_str())
        {
            effects.extend(self.finish_job(now));
        }

        effects.push(TrackerEffect::MarkProcessing {
            job_id: job_id.clone(),
            program: program.clone(),
        });

        if !self.state.is_processing {
            self.start_job(job_id, program, tool, now);
            return effects;
        }

        self.observe_tool(tool, now);
        effects
    }

    fn start_job(&mut self, job_id: String, program: String, tool: i64, now: DateTime<Utc>) {
        let mut log = JobLog::start(job_id.clone(), self.machine, self.state.product_id, now);
        log.begin_operation(1, tool, now);

        info!(
            machine = self.machine,
            job = %job_id,
            %program,
            tool,
            product = %self.state.product_id,
            "job started"
        );

        self.state.is_processing = true;
        self.state.current_job_id = Some(job_id);
        self.state.current_program = Some(program);
        self.state.tracked_tool = Some(tool);
        self.state.operation_index = 1;
        self.state.pending = None;
        self.state.job_log = Some(log);
    }

    fn observe_tool(&mut self, tool: i64, now: DateTime<Utc>) {
        if self.state.tracked_tool == Some(tool) {
            self.state.pending = None;
            return;
        }

        let seen = match self.state.pending {
            Some(p) if p.tool == tool => p.seen + 1,
            _ => 1,
        };

        if seen < self.debounce {
            debug!(machine = self.machine, tool, seen, "tool change pending");
            self.state.pending = Some(PendingTool { tool, seen });
            return;
        }

        self.state.pending = None;
        self.state.operation_index += 1;
        let index = self.state.operation_index;

        if let Some(log) = self.state.job_log.as_mut() {
            log.begin_operation(index, tool, now);
        }

        info!(
            machine = self.machine,
            from = ?self.state.tracked_tool,
            to = tool,
            operation = index,
            "tool change"
        );
        self.state.tracked_tool = Some(tool);
    }

    fn finish_job(&mut self, now: DateTime<Utc>) -> Vec<TrackerEffect> {
        let mut effects = Vec::new();

        if let (Some(job_id), Some(program)) = (
            self.state.current_job_id.clone(),
            self.state.current_program.clone(),
        ) {
            effects.push(TrackerEffect::MarkFinished { job_id, program });
        }

        if let Some(mut log) = self.state.job_log.take() {
            log.finish(now);
            info!(
                machine = self.machine,
                job = %log.project_id,
                operations = log.operations.len(),
                "job finished"
            );
            effects.push(TrackerEffect::PersistJobLog(log));
        }

        self.state.reset();
        effects
    }
}
