// src/types.rs

use std::str::FromStr;

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

/// Numeric machine identifier as reported by the roster.
pub type MachineId = u32;

/// Parameters addressing one instance of an endpoint.
///
/// `serde_json::Map` keeps keys sorted, so two maps with the same entries
/// always serialize to the same text regardless of insertion order.
pub type Params = serde_json::Map<String, serde_json::Value>;

/// Where the history store keeps its partitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryBackendKind {
    /// SQLite database file (durable).
    Sqlite,
    /// Process memory only (lost on restart).
    Memory,
}

impl Default for HistoryBackendKind {
    fn default() -> Self {
        HistoryBackendKind::Sqlite
    }
}

impl FromStr for HistoryBackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sqlite" => Ok(HistoryBackendKind::Sqlite),
            "memory" => Ok(HistoryBackendKind::Memory),
            other => Err(format!(
                "invalid history backend: {other} (expected \"sqlite\" or \"memory\")"
            )),
        }
    }
}

/// Optional, inclusive time bounds for history queries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct TimeRange {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl TimeRange {
    /// No bounds at all.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn between(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            start: Some(start),
            end: Some(end),
        }
    }

    pub fn since(start: DateTime<Utc>) -> Self {
        Self {
            start: Some(start),
            end: None,
        }
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        self.start.is_none_or(|s| ts >= s) && self.end.is_none_or(|e| ts <= e)
    }
}

/// Current time truncated to microseconds, the resolution history persists.
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}
