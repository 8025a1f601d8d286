#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::Value;

use fleetwatch::gateway::{ErrorDescriptor, FetchOutcome, RequestKey};
use fleetwatch::history::{HistoryStore, RequestResult};
use fleetwatch_test_utils::params;

/// Fixed base instant plus `secs` seconds.
pub fn ts(secs: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 8, 0, 0).unwrap() + Duration::seconds(secs)
}

pub fn key(endpoint: &str, params_json: Value) -> RequestKey {
    RequestKey::new(endpoint, params(params_json))
}

pub fn success(key: &RequestKey, value: Value, at: DateTime<Utc>) -> RequestResult {
    RequestResult::new(key.clone(), FetchOutcome::Value(value), at)
}

pub fn failure(key: &RequestKey, status: i64, at: DateTime<Utc>) -> RequestResult {
    RequestResult::new(
        key.clone(),
        FetchOutcome::Error(ErrorDescriptor::new(status)),
        at,
    )
}

pub fn memory_store() -> Arc<HistoryStore> {
    Arc::new(HistoryStore::in_memory())
}
