// src/history/store.rs

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::OnceCell;
use tracing::{debug, error, info};

use crate::config::HistorySection;
use crate::errors::{FleetError, Result};
use crate::gateway::RequestKey;
use crate::history::backend::{GroupQuery, Grouping, HistoryBackend};
use crate::history::cache::{CacheDecision, decide};
use crate::history::memory::MemoryBackend;
use crate::history::record::{
    EndpointStats, ErrorCodeCounts, GroupCount, HistoryRecord, Partition, RequestResult,
    StorageFault,
};
use crate::history::sqlite::SqliteBackend;
use crate::tracker::JobLog;
use crate::types::{HistoryBackendKind, Params, TimeRange};

enum BackendSource {
    Sqlite(PathBuf),
    Memory,
    Provided,
}

/// Append-only request history with cache decisions and aggregations.
///
/// Construct once, call [`HistoryStore::initialize`] (or let the first
/// operation do it), and share it as `Arc<HistoryStore>`.
///
/// Every query converts storage faults into values at this boundary:
/// `StorageFault` for point queries, empty lists for rankings, sentinel
/// counts for statistics.
pub struct HistoryStore {
    source: BackendSource,
    backend: OnceCell<Arc<dyn HistoryBackend>>,
}

impl fmt::Debug for HistoryStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let source = match self.source {
            BackendSource::Sqlite(ref path) => format!("sqlite({})", path.display()),
            BackendSource::Memory => "memory".to_string(),
            BackendSource::Provided => "provided".to_string(),
        };
        f.debug_struct("HistoryStore")
            .field("source", &source)
            .field("initialized", &self.backend.initialized())
            .finish()
    }
}

impl HistoryStore {
    pub fn from_config(cfg: &HistorySection) -> Self {
        match cfg.backend {
            HistoryBackendKind::Sqlite => Self::sqlite(cfg.path.clone()),
            HistoryBackendKind::Memory => Self::in_memory(),
        }
    }

    pub fn sqlite(path: impl Into<PathBuf>) -> Self {
        Self {
            source: BackendSource::Sqlite(path.into()),
            backend: OnceCell::new(),
        }
    }

    pub fn in_memory() -> Self {
        Self {
            source: BackendSource::Memory,
            backend: OnceCell::new(),
        }
    }

    /// Use an already-open backend (tests, embedding).
    pub fn with_backend(backend: Arc<dyn HistoryBackend>) -> Self {
        Self {
            source: BackendSource::Provided,
            backend: OnceCell::new_with(Some(backend)),
        }
    }

    /// Open the backend. Idempotent; concurrent callers share one attempt.
    pub async fn initialize(&self) -> Result<()> {
        self.backend().await.map(|_| ())
    }

    async fn backend(&self) -> Result<Arc<dyn HistoryBackend>> {
        let backend = self
            .backend
            .get_or_try_init(|| async { open_backend(&self.source).await })
            .await?;
        Ok(Arc::clone(backend))
    }

    /// Run a backend call on the blocking pool.
    async fn blocking<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn HistoryBackend) -> Result<T> + Send + 'static,
    {
        let backend = self.backend().await?;
        tokio::task::spawn_blocking(move || f(backend.as_ref()))
            .await
            .map_err(|e| FleetError::Other(anyhow::anyhow!("history task failed: {e}")))?
    }

    /// Classify by outcome and bulk-insert each partition.
    pub async fn append(&self, batch: Vec<RequestResult>) -> Result<()> {
        let (success, errors): (Vec<HistoryRecord>, Vec<HistoryRecord>) = batch
            .into_iter()
            .map(RequestResult::into_record)
            .partition(|r| r.partition() == Partition::Success);

        debug!(
            success = success.len(),
            errors = errors.len(),
            "appending request batch"
        );

        self.blocking(move |backend| {
            if !success.is_empty() {
                backend.insert(Partition::Success, &success)?;
            }
            if !errors.is_empty() {
                backend.insert(Partition::Error, &errors)?;
            }
            Ok(())
        })
        .await
    }

    /// Most recent records for one key, newest first.
    pub async fn query_recent(
        &self,
        key: &RequestKey,
        limit: usize,
        partition: Partition,
        range: TimeRange,
    ) -> std::result::Result<Vec<HistoryRecord>, StorageFault> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let key = key.clone();
        self.blocking(move |backend| backend.recent(partition, &key, limit, &range))
            .await
            .map_err(|err| fault("query_recent", err))
    }

    /// Decide whether the `n` most recent successes for `key` agree.
    pub async fn cache_decision(
        &self,
        key: &RequestKey,
        n: usize,
    ) -> std::result::Result<CacheDecision, StorageFault> {
        let records = self
            .query_recent(key, n, Partition::Success, TimeRange::all())
            .await?;

        let values: Vec<Value> = records
            .into_iter()
            .filter_map(|r| r.result().cloned())
            .collect();

        let decision = decide(&values, n);
        debug!(endpoint = %key.endpoint, ?decision, "cache decision");
        Ok(decision)
    }

    /// Most frequent remote status codes.
    pub async fn top_error_codes(&self, limit: usize, range: TimeRange) -> Vec<GroupCount<i64>> {
        let query = GroupQuery {
            endpoint: None,
            range,
            limit: Some(limit),
        };
        self.ranked("top_error_codes", Partition::Error, Grouping::ErrorStatus, query)
            .await
            .into_iter()
            .filter_map(|(key, count)| key.as_i64().map(|key| GroupCount { key, count }))
            .collect()
    }

    /// `(endpoint, params)` pairs that failed most often.
    pub async fn top_error_keys(
        &self,
        limit: usize,
        range: TimeRange,
    ) -> Vec<GroupCount<RequestKey>> {
        let query = GroupQuery {
            endpoint: None,
            range,
            limit: Some(limit),
        };
        self.ranked("top_error_keys", Partition::Error, Grouping::RequestKey, query)
            .await
            .into_iter()
            .filter_map(|(key, count)| {
                serde_json::from_value(key)
                    .ok()
                    .map(|key| GroupCount { key, count })
            })
            .collect()
    }

    /// Params most often used successfully with `endpoint`.
    pub async fn top_params(
        &self,
        endpoint: &str,
        limit: usize,
        range: TimeRange,
    ) -> Vec<GroupCount<Params>> {
        let query = GroupQuery {
            endpoint: Some(endpoint.to_string()),
            range,
            limit: Some(limit),
        };
        self.ranked("top_params", Partition::Success, Grouping::Params, query)
            .await
            .into_iter()
            .filter_map(|(key, count)| match key {
                Value::Object(params) => Some(GroupCount { key: params, count }),
                _ => None,
            })
            .collect()
    }

    async fn ranked(
        &self,
        operation: &'static str,
        partition: Partition,
        grouping: Grouping,
        query: GroupQuery,
    ) -> Vec<(Value, u64)> {
        match self
            .blocking(move |backend| backend.group_counts(partition, grouping, &query))
            .await
        {
            Ok(groups) => groups,
            Err(err) => {
                fault(operation, err);
                Vec::new()
            }
        }
    }

    /// Success and error totals for `endpoint`, counted concurrently.
    pub async fn endpoint_stats(&self, endpoint: &str, range: TimeRange) -> EndpointStats {
        let success = {
            let endpoint = endpoint.to_string();
            self.blocking(move |backend| backend.count(Partition::Success, &endpoint, &range))
        };
        let errors = {
            let endpoint = endpoint.to_string();
            self.blocking(move |backend| backend.count(Partition::Error, &endpoint, &range))
        };

        match tokio::try_join!(success, errors) {
            Ok((s, e)) => EndpointStats::new(endpoint, s, e),
            Err(err) => {
                let fault = fault("endpoint_stats", err);
                EndpointStats::failed(endpoint, fault.message)
            }
        }
    }

    /// Error counts per status code for `endpoint`, most frequent first.
    pub async fn error_code_counts(&self, endpoint: &str, range: TimeRange) -> ErrorCodeCounts {
        let query = GroupQuery {
            endpoint: Some(endpoint.to_string()),
            range,
            limit: None,
        };
        let result = self
            .blocking(move |backend| {
                backend.group_counts(Partition::Error, Grouping::ErrorStatus, &query)
            })
            .await;

        match result {
            Ok(groups) => ErrorCodeCounts {
                endpoint: endpoint.to_string(),
                details: groups
                    .into_iter()
                    .filter_map(|(key, count)| key.as_i64().map(|key| GroupCount { key, count }))
                    .collect(),
                error_message: None,
            },
            Err(err) => {
                let fault = fault("error_code_counts", err);
                ErrorCodeCounts {
                    endpoint: endpoint.to_string(),
                    details: Vec::new(),
                    error_message: Some(fault.message),
                }
            }
        }
    }

    /// Persist a finalized job log.
    pub async fn save_job_log(&self, log: JobLog) -> Result<()> {
        self.blocking(move |backend| backend.save_job_log(&log)).await
    }

    /// Finalized job logs for one project, oldest first.
    pub async fn job_logs(
        &self,
        project_id: &str,
    ) -> std::result::Result<Vec<JobLog>, StorageFault> {
        let project_id = project_id.to_string();
        self.blocking(move |backend| backend.job_logs(&project_id))
            .await
            .map_err(|err| fault("job_logs", err))
    }
}

async fn open_backend(source: &BackendSource) -> Result<Arc<dyn HistoryBackend>> {
    match source {
        BackendSource::Sqlite(path) => {
            let path = path.clone();
            let backend = tokio::task::spawn_blocking(move || SqliteBackend::open(&path))
                .await
                .map_err(|e| FleetError::Other(anyhow::anyhow!("opening history failed: {e}")))??;
            info!("history store initialised (sqlite)");
            Ok(Arc::new(backend))
        }
        BackendSource::Memory => {
            info!("history store initialised (memory)");
            Ok(Arc::new(MemoryBackend::new()))
        }
        // `with_backend` fills the cell up front, so this is never reached.
        BackendSource::Provided => Err(FleetError::Other(anyhow::anyhow!(
            "provided history backend missing"
        ))),
    }
}

fn fault(operation: &'static str, err: FleetError) -> StorageFault {
    error!(operation, error = %err, "history storage fault");
    StorageFault {
        operation: operation.to_string(),
        message: err.to_string(),
    }
}
