// src/jobs/mod.rs

//! Job index: which job a program belongs to on a machine, and where that job
//! stands.
//!
//! The tracker only talks to the [`JobIndex`] trait. [`InMemoryJobIndex`] is
//! the bundled implementation, seeded from `[[job]]` config entries.

use std::collections::HashMap;
use std::fmt;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use futures::future::{self, BoxFuture};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::JobSeed;
use crate::errors::{FleetError, Result};
use crate::types::MachineId;

pub trait JobIndex: Send + Sync {
    /// Job id for `program` on `machine`, if any.
    fn resolve_job_id<'a>(
        &'a self,
        program: &'a str,
        machine: MachineId,
    ) -> BoxFuture<'a, Result<Option<String>>>;

    fn mark_processing<'a>(
        &'a self,
        job_id: &'a str,
        program: &'a str,
        machine: MachineId,
    ) -> BoxFuture<'a, Result<()>>;

    fn mark_finished<'a>(
        &'a self,
        job_id: &'a str,
        program: &'a str,
        machine: MachineId,
    ) -> BoxFuture<'a, Result<()>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Waiting,
    Processing,
    Finished,
}

#[derive(Debug, Clone)]
struct JobEntry {
    job_id: String,
    status: JobStatus,
}

type EntryKey = (String, MachineId);

#[derive(Default)]
pub struct InMemoryJobIndex {
    entries: RwLock<HashMap<EntryKey, JobEntry>>,
}

impl fmt::Debug for InMemoryJobIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let len = self.entries.read().map(|e| e.len()).unwrap_or_default();
        f.debug_struct("InMemoryJobIndex")
            .field("entries", &len)
            .finish()
    }
}

impl InMemoryJobIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_seeds(seeds: &[JobSeed]) -> Self {
        let mut map = HashMap::with_capacity(seeds.len());
        for seed in seeds {
            map.insert(
                (seed.program.clone(), seed.machine),
                JobEntry {
                    job_id: seed.job_id.clone(),
                    status: JobStatus::Waiting,
                },
            );
        }
        Self {
            entries: RwLock::new(map),
        }
    }

    /// Link `program` on `machine` to `job_id` (status `waiting`).
    ///
    /// Re-registering replaces the previous entry.
    pub fn register(&self, program: &str, machine: MachineId, job_id: &str) -> Result<()> {
        let mut entries = self.write()?;
        entries.insert(
            (program.to_string(), machine),
            JobEntry {
                job_id: job_id.to_string(),
                status: JobStatus::Waiting,
            },
        );
        debug!(%program, machine, job = %job_id, "registered job");
        Ok(())
    }

    pub fn status(&self, program: &str, machine: MachineId) -> Option<JobStatus> {
        self.read()
            .ok()?
            .get(&(program.to_string(), machine))
            .map(|entry| entry.status)
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<EntryKey, JobEntry>>> {
        self.entries
            .read()
            .map_err(|_| FleetError::Other(anyhow::anyhow!("job index lock poisoned")))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<EntryKey, JobEntry>>> {
        self.entries
            .write()
            .map_err(|_| FleetError::Other(anyhow::anyhow!("job index lock poisoned")))
    }

    fn set_status(
        &self,
        job_id: &str,
        program: &str,
        machine: MachineId,
        status: JobStatus,
    ) -> Result<()> {
        let mut entries = self.write()?;
        match entries.get_mut(&(program.to_string(), machine)) {
            Some(entry) if entry.job_id == job_id => {
                if entry.status != status {
                    debug!(job = %job_id, %program, machine, ?status, "job status changed");
                }
                entry.status = status;
            }
            _ => warn!(job = %job_id, %program, machine, ?status, "status update for unknown job"),
        }
        Ok(())
    }
}

impl JobIndex for InMemoryJobIndex {
    fn resolve_job_id<'a>(
        &'a self,
        program: &'a str,
        machine: MachineId,
    ) -> BoxFuture<'a, Result<Option<String>>> {
        let resolved = self.read().map(|entries| {
            entries
                .get(&(program.to_string(), machine))
                .map(|entry| entry.job_id.clone())
        });
        Box::pin(future::ready(resolved))
    }

    fn mark_processing<'a>(
        &'a self,
        job_id: &'a str,
        program: &'a str,
        machine: MachineId,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(future::ready(self.set_status(
            job_id,
            program,
            machine,
            JobStatus::Processing,
        )))
    }

    fn mark_finished<'a>(
        &'a self,
        job_id: &'a str,
        program: &'a str,
        machine: MachineId,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(future::ready(self.set_status(
            job_id,
            program,
            machine,
            JobStatus::Finished,
        )))
    }
}
