// src/history/memory.rs

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde_json::Value;
use tracing::debug;

use crate::errors::{FleetError, Result};
use crate::gateway::RequestKey;
use crate::history::backend::{GroupQuery, Grouping, HistoryBackend, group_key};
use crate::history::record::{HistoryRecord, Partition};
use crate::tracker::JobLog;
use crate::types::TimeRange;

#[derive(Debug, Default)]
struct Partitions {
    success: Vec<HistoryRecord>,
    errors: Vec<HistoryRecord>,
    job_logs: Vec<JobLog>,
}

impl Partitions {
    fn records(&self, partition: Partition) -> &[HistoryRecord] {
        match partition {
            Partition::Success => &self.success,
            Partition::Error => &self.errors,
        }
    }

    fn records_mut(&mut self, partition: Partition) -> &mut Vec<HistoryRecord> {
        match partition {
            Partition::Success => &mut self.success,
            Partition::Error => &mut self.errors,
        }
    }
}

/// History kept in process memory (lost on restart).
#[derive(Debug, Default)]
pub struct MemoryBackend {
    inner: RwLock<Partitions>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Partitions>> {
        self.inner
            .read()
            .map_err(|_| FleetError::Other(anyhow::anyhow!("memory history lock poisoned")))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Partitions>> {
        self.inner
            .write()
            .map_err(|_| FleetError::Other(anyhow::anyhow!("memory history lock poisoned")))
    }
}

impl HistoryBackend for MemoryBackend {
    fn insert(&self, partition: Partition, records: &[HistoryRecord]) -> Result<()> {
        if let Some(stray) = records.iter().find(|r| r.partition() != partition) {
            return Err(FleetError::Validation(format!(
                "record for '{}' does not belong to the {:?} partition",
                stray.endpoint(),
                partition
            )));
        }

        let mut guard = self.write()?;
        guard.records_mut(partition).extend_from_slice(records);
        debug!(?partition, count = records.len(), "appended records (memory)");
        Ok(())
    }

    fn recent(
        &self,
        partition: Partition,
        key: &RequestKey,
        limit: usize,
        range: &TimeRange,
    ) -> Result<Vec<HistoryRecord>> {
        let guard = self.read()?;

        // Insertion position breaks timestamp ties: later append wins.
        let mut matching: Vec<(usize, &HistoryRecord)> = guard
            .records(partition)
            .iter()
            .enumerate()
            .filter(|(_, r)| r.matches_key(key) && range.contains(r.timestamp()))
            .collect();

        matching.sort_by(|(ia, a), (ib, b)| {
            b.timestamp().cmp(&a.timestamp()).then_with(|| ib.cmp(ia))
        });

        Ok(matching
            .into_iter()
            .take(limit)
            .map(|(_, r)| r.clone())
            .collect())
    }

    fn count(&self, partition: Partition, endpoint: &str, range: &TimeRange) -> Result<u64> {
        let guard = self.read()?;
        let n = guard
            .records(partition)
            .iter()
            .filter(|r| r.endpoint() == endpoint && range.contains(r.timestamp()))
            .count();
        Ok(n as u64)
    }

    fn group_counts(
        &self,
        partition: Partition,
        grouping: Grouping,
        query: &GroupQuery,
    ) -> Result<Vec<(Value, u64)>> {
        let guard = self.read()?;

        // Canonical JSON text identifies a group.
        let mut groups: HashMap<String, (Value, u64)> = HashMap::new();
        for record in guard.records(partition) {
            if let Some(ref endpoint) = query.endpoint {
                if record.endpoint() != endpoint {
                    continue;
                }
            }
            if !query.range.contains(record.timestamp()) {
                continue;
            }
            let Some(key) = group_key(record, grouping) else {
                continue;
            };
            groups
                .entry(key.to_string())
                .or_insert_with(|| (key, 0))
                .1 += 1;
        }

        let mut ordered: Vec<(String, (Value, u64))> = groups.into_iter().collect();
        ordered.sort_by(|(ka, (_, ca)), (kb, (_, cb))| cb.cmp(ca).then_with(|| ka.cmp(kb)));

        let limit = query.limit.unwrap_or(usize::MAX);
        Ok(ordered
            .into_iter()
            .take(limit)
            .map(|(_, group)| group)
            .collect())
    }

    fn save_job_log(&self, log: &JobLog) -> Result<()> {
        let mut guard = self.write()?;
        guard.job_logs.retain(|existing| existing.product_id != log.product_id);
        guard.job_logs.push(log.clone());
        Ok(())
    }

    fn job_logs(&self, project_id: &str) -> Result<Vec<JobLog>> {
        let guard = self.read()?;
        let mut logs: Vec<JobLog> = guard
            .job_logs
            .iter()
            .filter(|log| log.project_id == project_id)
            .cloned()
            .collect();
        logs.sort_by_key(|log| log.start_time);
        Ok(logs)
    }
}
