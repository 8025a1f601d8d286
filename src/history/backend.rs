// src/history/backend.rs

//! Pluggable storage for the history store.
//!
//! Backends are synchronous; `HistoryStore` runs them on the blocking pool.
//! - [`super::memory::MemoryBackend`] keeps everything in process memory.
//! - [`super::sqlite::SqliteBackend`] persists to a SQLite file.

use serde_json::Value;

use crate::errors::Result;
use crate::gateway::RequestKey;
use crate::history::record::{HistoryRecord, Partition};
use crate::tracker::JobLog;
use crate::types::TimeRange;

/// What an aggregation groups by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Grouping {
    /// Remote status code; error partition only. Key: number.
    ErrorStatus,
    /// Full lookup identity. Key: `{"endpoint": .., "params": {..}}`.
    RequestKey,
    /// Params mapping only. Key: object.
    Params,
}

/// Filter + limit shared by every aggregation.
#[derive(Debug, Clone, Default)]
pub struct GroupQuery {
    pub endpoint: Option<String>,
    pub range: TimeRange,
    pub limit: Option<usize>,
}

pub trait HistoryBackend: Send + Sync {
    /// Append records to one partition. Every record must belong to it.
    fn insert(&self, partition: Partition, records: &[HistoryRecord]) -> Result<()>;

    /// Records for `key`, newest first, at most `limit`.
    fn recent(
        &self,
        partition: Partition,
        key: &RequestKey,
        limit: usize,
        range: &TimeRange,
    ) -> Result<Vec<HistoryRecord>>;

    /// Number of records for `endpoint` (any params).
    fn count(&self, partition: Partition, endpoint: &str, range: &TimeRange) -> Result<u64>;

    /// Group counts, most frequent first.
    fn group_counts(
        &self,
        partition: Partition,
        grouping: Grouping,
        query: &GroupQuery,
    ) -> Result<Vec<(Value, u64)>>;

    fn save_job_log(&self, log: &JobLog) -> Result<()>;

    /// Finalized job logs of one project, oldest first.
    fn job_logs(&self, project_id: &str) -> Result<Vec<JobLog>>;
}

/// Group key of a record, or `None` if the record has no such key.
pub fn group_key(record: &HistoryRecord, grouping: Grouping) -> Option<Value> {
    match grouping {
        Grouping::ErrorStatus => record.error().map(|e| Value::from(e.status)),
        Grouping::RequestKey => {
            let mut map = serde_json::Map::new();
            map.insert("endpoint".to_string(), Value::from(record.endpoint()));
            map.insert("params".to_string(), Value::Object(record.params().clone()));
            Some(Value::Object(map))
        }
        Grouping::Params => Some(Value::Object(record.params().clone())),
    }
}
