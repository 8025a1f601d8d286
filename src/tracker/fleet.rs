// src/tracker/fleet.rs

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::errors::Result;
use crate::tracker::machine::{MachineTracker, TrackerContext};
use crate::tracker::monitor::MachineMonitor;
use crate::types::MachineId;

/// Machines that already have a tracker. Admission is idempotent.
#[derive(Debug, Clone, Default)]
pub struct FleetRoster {
    tracked: BTreeSet<MachineId>,
}

impl FleetRoster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `ids` as tracked; returns the ones seen for the first time, in
    /// roster order.
    pub fn admit(&mut self, ids: &[MachineId]) -> Vec<MachineId> {
        ids.iter()
            .copied()
            .filter(|id| self.tracked.insert(*id))
            .collect()
    }

    pub fn is_tracked(&self, id: MachineId) -> bool {
        self.tracked.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.tracked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracked.is_empty()
    }
}

/// Starts the tracker for a newly seen machine.
pub trait TrackerSpawner: Send + Sync {
    fn spawn_tracker(&self, machine: MachineId);
}

/// Production spawner: one Tokio task per machine, never joined.
#[derive(Debug, Clone)]
pub struct TaskSpawner {
    ctx: TrackerContext,
}

impl TaskSpawner {
    pub fn new(ctx: TrackerContext) -> Self {
        Self { ctx }
    }
}

impl TrackerSpawner for TaskSpawner {
    fn spawn_tracker(&self, machine: MachineId) {
        let tracker = MachineTracker::new(machine, self.ctx.clone());
        tokio::spawn(tracker.run());
    }
}

/// Polls the roster and hands every new machine to the spawner.
pub struct FleetLoop<S: TrackerSpawner> {
    monitor: Arc<dyn MachineMonitor>,
    spawner: S,
    roster: FleetRoster,
    interval: Duration,
}

impl<S: TrackerSpawner> std::fmt::Debug for FleetLoop<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FleetLoop")
            .field("roster", &self.roster)
            .field("interval", &self.interval)
            .finish_non_exhaustive()
    }
}

impl<S: TrackerSpawner> FleetLoop<S> {
    pub fn new(monitor: Arc<dyn MachineMonitor>, spawner: S, interval: Duration) -> Self {
        Self {
            monitor,
            spawner,
            roster: FleetRoster::new(),
            interval,
        }
    }

    pub fn roster(&self) -> &FleetRoster {
        &self.roster
    }

    /// Read the roster once and spawn trackers for new machines.
    pub async fn poll_roster_once(&mut self) -> Result<Vec<MachineId>> {
        let ids = self.monitor.machine_ids().await?;
        let fresh = self.roster.admit(&ids);

        for machine in fresh.iter().copied() {
            info!(machine, "tracking new machine");
            self.spawner.spawn_tracker(machine);
        }
        debug!(seen = ids.len(), tracked = self.roster.len(), "roster polled");
        Ok(fresh)
    }

    pub async fn run(mut self) {
        info!(interval = ?self.interval, "fleet loop started");
        loop {
            if let Err(err) = self.poll_roster_once().await {
                warn!(error = %err, "roster poll failed");
            }
            tokio::time::sleep(self.interval).await;
        }
    }
}
