// src/service.rs

//! `MachineService`: the operations exposed to callers (an agent layer, an
//! API, tests). Inputs are plain values; outputs are serializable results or
//! structured fault payloads.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;

use crate::errors::Result;
use crate::fetch::{FetchOrchestrator, ToolLifeEntry, ToolLifeError, pair_requests};
use crate::gateway::{FetchOutcome, RequestKey};
use crate::history::{CacheDecision, GroupCount, HistoryRecord, HistoryStore, Partition, StorageFault};
use crate::report::{self, ErrorReportOutcome};
use crate::tracker::JobLog;
use crate::types::{MachineId, Params, TimeRange};

/// Cache decision for one requested key.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheLookup {
    pub endpoint: String,
    pub params: Params,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decision: Option<CacheDecision>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// Recent history of one requested key.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeyLogs {
    pub endpoint: String,
    pub params: Params,
    pub logs: Vec<HistoryRecord>,
    /// Timestamp of the newest returned record.
    pub last_updated: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeyFault {
    pub endpoint: String,
    pub params: Params,
    pub error: String,
}

/// Per-key results and per-key faults, kept apart.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LogQuery {
    pub results: Vec<KeyLogs>,
    pub errors: Vec<KeyFault>,
}

#[derive(Debug)]
pub struct MachineService {
    orchestrator: FetchOrchestrator,
    store: Arc<HistoryStore>,
    cache_check_count: usize,
}

impl MachineService {
    pub fn new(orchestrator: FetchOrchestrator, cache_check_count: usize) -> Self {
        let store = Arc::clone(orchestrator.store());
        Self {
            orchestrator,
            store,
            cache_check_count,
        }
    }

    pub fn store(&self) -> &Arc<HistoryStore> {
        &self.store
    }

    pub async fn fetch_many(
        &self,
        endpoints: &[String],
        params_list: &[Params],
    ) -> Result<Vec<FetchOutcome>> {
        self.orchestrator.fetch_many(endpoints, params_list).await
    }

    pub async fn fetch_tool_life(
        &self,
        machine: MachineId,
    ) -> std::result::Result<Vec<ToolLifeEntry>, ToolLifeError> {
        self.orchestrator.fetch_tool_life(machine).await
    }

    /// One cache decision per key, computed concurrently.
    pub async fn cached_values(
        &self,
        endpoints: &[String],
        params_list: &[Params],
    ) -> Result<Vec<CacheLookup>> {
        let keys = pair_requests(endpoints, params_list)?;
        let n = self.cache_check_count;

        let decisions = join_all(keys.iter().map(|key| self.store.cache_decision(key, n))).await;

        Ok(keys
            .into_iter()
            .zip(decisions)
            .map(|(key, decision)| {
                let (decision, error_message) = split(decision);
                CacheLookup {
                    endpoint: key.endpoint,
                    params: key.params,
                    decision,
                    error_message,
                }
            })
            .collect())
    }

    /// Recent records per key, newest first.
    pub async fn query_logs(
        &self,
        endpoints: &[String],
        params_list: &[Params],
        limit: usize,
        error_flag: bool,
        range: TimeRange,
    ) -> Result<LogQuery> {
        let keys = pair_requests(endpoints, params_list)?;
        let partition = Partition::from_error_flag(error_flag);

        let answers = join_all(
            keys.iter()
                .map(|key| self.store.query_recent(key, limit, partition, range)),
        )
        .await;

        let mut out = LogQuery::default();
        for (RequestKey { endpoint, params }, answer) in keys.into_iter().zip(answers) {
            match answer {
                Ok(logs) => out.results.push(KeyLogs {
                    last_updated: logs.first().map(HistoryRecord::timestamp),
                    endpoint,
                    params,
                    logs,
                }),
                Err(fault) => out.errors.push(KeyFault {
                    endpoint,
                    params,
                    error: fault.to_string(),
                }),
            }
        }
        Ok(out)
    }

    pub async fn top_error_codes(&self, limit: usize, range: TimeRange) -> Vec<GroupCount<i64>> {
        self.store.top_error_codes(limit, range).await
    }

    pub async fn top_error_keys(
        &self,
        limit: usize,
        range: TimeRange,
    ) -> Vec<GroupCount<RequestKey>> {
        self.store.top_error_keys(limit, range).await
    }

    pub async fn top_params(
        &self,
        endpoint: &str,
        limit: usize,
        range: TimeRange,
    ) -> Vec<GroupCount<Params>> {
        self.store.top_params(endpoint, limit, range).await
    }

    pub async fn error_report(&self, endpoint: &str, range: TimeRange) -> ErrorReportOutcome {
        report::error_report(&self.store, endpoint, range).await
    }

    pub async fn job_logs(
        &self,
        project_id: &str,
    ) -> std::result::Result<Vec<JobLog>, StorageFault> {
        self.store.job_logs(project_id).await
    }
}

fn split(
    decision: std::result::Result<CacheDecision, StorageFault>,
) -> (Option<CacheDecision>, Option<String>) {
    match decision {
        Ok(d) => (Some(d), None),
        Err(fault) => (None, Some(fault.to_string())),
    }
}
