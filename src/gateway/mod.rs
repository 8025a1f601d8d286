// src/gateway/mod.rs

//! Remote gateway abstraction.
//!
//! The orchestrator and the machine monitor talk to a `GatewayClient` instead
//! of a concrete HTTP client. This keeps the remote protocol out of the core
//! and lets tests provide scripted gateways.
//!
//! - [`http`] holds `HttpGateway`, the thin `reqwest` adapter used in
//!   production.
//! - Remote failures are *data*: every call yields a [`FetchOutcome`], never an
//!   error.

pub mod http;

use std::fmt;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

use crate::types::Params;

pub use http::HttpGateway;

/// Key marking a JSON object as a remote error descriptor.
pub const ERROR_MARKER: &str = "__error__";

/// Status used when the gateway could not be reached at all.
pub const TRANSPORT_FAILURE: i64 = -1;

/// Status used when an error object carries no usable `status`.
pub const UNKNOWN_STATUS: i64 = 0;

/// Structured remote error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ErrorDescriptor {
    pub status: i64,
}

impl ErrorDescriptor {
    pub fn new(status: i64) -> Self {
        Self { status }
    }
}

impl fmt::Display for ErrorDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "remote error (status {})", self.status)
    }
}

/// Result of one remote call: a value or a remote error.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    Value(Value),
    Error(ErrorDescriptor),
}

impl FetchOutcome {
    /// Classify a raw JSON answer by the presence of the error marker.
    pub fn from_json(value: Value) -> Self {
        if let Value::Object(ref map) = value {
            if matches!(map.get(ERROR_MARKER), Some(Value::Bool(true))) {
                let status = map
                    .get("status")
                    .and_then(Value::as_i64)
                    .unwrap_or(UNKNOWN_STATUS);
                return FetchOutcome::Error(ErrorDescriptor::new(status));
            }
        }
        FetchOutcome::Value(value)
    }

    /// Wire form: the raw value, or `{"__error__": true, "status": n}`.
    pub fn to_json(&self) -> Value {
        match self {
            FetchOutcome::Value(v) => v.clone(),
            FetchOutcome::Error(e) => {
                let mut map = serde_json::Map::new();
                map.insert(ERROR_MARKER.to_string(), Value::Bool(true));
                map.insert("status".to_string(), Value::from(e.status));
                Value::Object(map)
            }
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, FetchOutcome::Error(_))
    }

    pub fn value(&self) -> Option<&Value> {
        match self {
            FetchOutcome::Value(v) => Some(v),
            FetchOutcome::Error(_) => None,
        }
    }
}

impl Serialize for FetchOutcome {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

/// Lookup identity of a request: endpoint plus its full params mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestKey {
    pub endpoint: String,
    pub params: Params,
}

impl RequestKey {
    pub fn new(endpoint: impl Into<String>, params: Params) -> Self {
        Self {
            endpoint: endpoint.into(),
            params,
        }
    }

    /// Params as canonical (key-sorted) JSON text.
    pub fn canonical_params(&self) -> String {
        canonical_params(&self.params)
    }

    /// Stable digest of `(endpoint, params)` used as an index column.
    pub fn fingerprint(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.endpoint.as_bytes());
        hasher.update(&[0]);
        hasher.update(self.canonical_params().as_bytes());
        hasher.finalize().to_hex().to_string()
    }
}

pub fn canonical_params(params: &Params) -> String {
    Value::Object(params.clone()).to_string()
}

/// Read an integer from a gateway answer.
///
/// Controllers sometimes wrap scalars in a list; a non-empty list whose first
/// element is an integer yields that element.
pub fn scalar_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Array(items) => items.first().and_then(Value::as_i64),
        other => other.as_i64(),
    }
}

/// One remote call per `(endpoint, params)` pair. No retry.
pub trait GatewayClient: Send + Sync {
    fn fetch<'a>(&'a self, endpoint: &'a str, params: &'a Params) -> BoxFuture<'a, FetchOutcome>;
}
