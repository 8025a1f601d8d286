// src/history/record.rs

//! Persisted record types and the structured values the store hands out.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::gateway::{ErrorDescriptor, FetchOutcome, RequestKey};
use crate::types::Params;

/// Outcome partition. Each has its own table / vector and its own indexes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Partition {
    Success,
    Error,
}

impl Partition {
    pub fn from_error_flag(is_error: bool) -> Self {
        if is_error {
            Partition::Error
        } else {
            Partition::Success
        }
    }

    pub fn table(self) -> &'static str {
        match self {
            Partition::Success => "api_history",
            Partition::Error => "api_errors",
        }
    }
}

/// One answered request, as produced by the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestResult {
    pub endpoint: String,
    pub params: Params,
    pub outcome: FetchOutcome,
    pub timestamp: DateTime<Utc>,
}

impl RequestResult {
    pub fn new(key: RequestKey, outcome: FetchOutcome, timestamp: DateTime<Utc>) -> Self {
        Self {
            endpoint: key.endpoint,
            params: key.params,
            outcome,
            timestamp,
        }
    }

    pub fn into_record(self) -> HistoryRecord {
        match self.outcome {
            FetchOutcome::Value(result) => HistoryRecord::Success {
                endpoint: self.endpoint,
                params: self.params,
                result,
                timestamp: self.timestamp,
            },
            FetchOutcome::Error(error) => HistoryRecord::Failure {
                endpoint: self.endpoint,
                params: self.params,
                error,
                timestamp: self.timestamp,
            },
        }
    }
}

/// Immutable history entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HistoryRecord {
    Success {
        endpoint: String,
        params: Params,
        result: Value,
        timestamp: DateTime<Utc>,
    },
    Failure {
        endpoint: String,
        params: Params,
        error: ErrorDescriptor,
        timestamp: DateTime<Utc>,
    },
}

impl HistoryRecord {
    pub fn partition(&self) -> Partition {
        match self {
            HistoryRecord::Success { .. } => Partition::Success,
            HistoryRecord::Failure { .. } => Partition::Error,
        }
    }

    pub fn endpoint(&self) -> &str {
        match self {
            HistoryRecord::Success { endpoint, .. } | HistoryRecord::Failure { endpoint, .. } => {
                endpoint
            }
        }
    }

    pub fn params(&self) -> &Params {
        match self {
            HistoryRecord::Success { params, .. } | HistoryRecord::Failure { params, .. } => params,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            HistoryRecord::Success { timestamp, .. }
            | HistoryRecord::Failure { timestamp, .. } => *timestamp,
        }
    }

    pub fn matches_key(&self, key: &RequestKey) -> bool {
        self.endpoint() == key.endpoint && *self.params() == key.params
    }

    pub fn key(&self) -> RequestKey {
        RequestKey::new(self.endpoint(), self.params().clone())
    }

    /// Success payload, if this is a success record.
    pub fn result(&self) -> Option<&Value> {
        match self {
            HistoryRecord::Success { result, .. } => Some(result),
            HistoryRecord::Failure { .. } => None,
        }
    }

    pub fn error(&self) -> Option<ErrorDescriptor> {
        match self {
            HistoryRecord::Failure { error, .. } => Some(*error),
            HistoryRecord::Success { .. } => None,
        }
    }
}

/// Storage failure converted into a value at the store boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("{operation} failed: {message}")]
pub struct StorageFault {
    pub operation: String,
    pub message: String,
}

/// One group of an aggregation, most frequent first.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupCount<K> {
    pub key: K,
    pub count: u64,
}

/// Success/error totals for one endpoint.
///
/// On a storage fault every count is `-1` and `error_message` is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EndpointStats {
    pub endpoint: String,
    pub success_count: i64,
    pub error_count: i64,
    pub total: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl EndpointStats {
    pub fn new(endpoint: impl Into<String>, success: u64, errors: u64) -> Self {
        let success_count = i64::try_from(success).unwrap_or(i64::MAX);
        let error_count = i64::try_from(errors).unwrap_or(i64::MAX);
        Self {
            endpoint: endpoint.into(),
            success_count,
            error_count,
            total: success_count.saturating_add(error_count),
            error_message: None,
        }
    }

    pub fn failed(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            success_count: -1,
            error_count: -1,
            total: -1,
            error_message: Some(message.into()),
        }
    }
}

/// Per-status error counts for one endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorCodeCounts {
    pub endpoint: String,
    pub details: Vec<GroupCount<i64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}
