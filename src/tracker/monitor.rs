// src/tracker/monitor.rs

//! What the tracker needs to know about a machine, and the default way of
//! asking the gateway for it.

use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value;
use tracing::debug;

use crate::config::MonitorSection;
use crate::errors::{FleetError, Result};
use crate::gateway::{FetchOutcome, GatewayClient, scalar_i64};
use crate::types::{MachineId, Params};

pub trait MachineMonitor: Send + Sync {
    /// Every machine currently known to the fleet.
    fn machine_ids(&self) -> BoxFuture<'_, Result<Vec<MachineId>>>;

    fn program_mode(&self, machine: MachineId) -> BoxFuture<'_, Result<i64>>;

    fn program_path(&self, machine: MachineId) -> BoxFuture<'_, Result<String>>;

    /// Tool number currently in the spindle.
    fn active_tool(&self, machine: MachineId) -> BoxFuture<'_, Result<i64>>;
}

/// [`MachineMonitor`] reading the endpoints configured in `[monitor]`.
pub struct GatewayMonitor {
    gateway: Arc<dyn GatewayClient>,
    section: MonitorSection,
}

impl std::fmt::Debug for GatewayMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayMonitor")
            .field("section", &self.section)
            .finish_non_exhaustive()
    }
}

impl GatewayMonitor {
    pub fn new(gateway: Arc<dyn GatewayClient>, section: MonitorSection) -> Self {
        Self { gateway, section }
    }

    fn machine_params(&self, machine: MachineId) -> Params {
        let mut params = self.section.extra_params.clone();
        params.insert("machine".to_string(), Value::from(machine));
        params
    }

    async fn read(&self, machine: MachineId, endpoint: &str) -> Result<Value> {
        let params = self.machine_params(machine);
        match self.gateway.fetch(endpoint, &params).await {
            FetchOutcome::Value(v) => Ok(v),
            FetchOutcome::Error(e) => Err(FleetError::MonitorError {
                machine,
                message: format!("{endpoint}: {e}"),
            }),
        }
    }

    async fn read_i64(&self, machine: MachineId, endpoint: &str) -> Result<i64> {
        let value = self.read(machine, endpoint).await?;
        scalar_i64(&value).ok_or_else(|| FleetError::MonitorError {
            machine,
            message: format!("{endpoint}: expected an integer, got {value}"),
        })
    }
}

impl MachineMonitor for GatewayMonitor {
    fn machine_ids(&self) -> BoxFuture<'_, Result<Vec<MachineId>>> {
        Box::pin(async move {
            let endpoint = self.section.roster_endpoint.as_str();
            match self.gateway.fetch(endpoint, &Params::new()).await {
                FetchOutcome::Value(v) => parse_roster(&v),
                FetchOutcome::Error(e) => Err(FleetError::GatewayError(format!(
                    "roster {endpoint}: {e}"
                ))),
            }
        })
    }

    fn program_mode(&self, machine: MachineId) -> BoxFuture<'_, Result<i64>> {
        Box::pin(async move {
            self.read_i64(machine, &self.section.program_mode_endpoint)
                .await
        })
    }

    fn program_path(&self, machine: MachineId) -> BoxFuture<'_, Result<String>> {
        Box::pin(async move {
            let endpoint = self.section.program_path_endpoint.as_str();
            let value = self.read(machine, endpoint).await?;
            let text = match value {
                Value::String(s) => Some(s),
                Value::Array(items) => items
                    .into_iter()
                    .next()
                    .and_then(|v| v.as_str().map(str::to_string)),
                _ => None,
            };
            text.ok_or_else(|| FleetError::MonitorError {
                machine,
                message: format!("{endpoint}: expected a program path string"),
            })
        })
    }

    fn active_tool(&self, machine: MachineId) -> BoxFuture<'_, Result<i64>> {
        Box::pin(async move {
            self.read_i64(machine, &self.section.active_tool_endpoint)
                .await
        })
    }
}

/// Accepts `[1, 2]` or `[{"id": 1, ..}, ..]`.
pub fn parse_roster(value: &Value) -> Result<Vec<MachineId>> {
    let Value::Array(items) = value else {
        return Err(FleetError::GatewayError(format!(
            "roster: expected a list, got {value}"
        )));
    };

    let mut ids = Vec::with_capacity(items.len());
    for item in items {
        let raw = match item {
            Value::Object(map) => map.get("id").and_then(Value::as_u64),
            other => other.as_u64(),
        };
        match raw.and_then(|id| MachineId::try_from(id).ok()) {
            Some(id) => ids.push(id),
            None => debug!(%item, "ignoring unrecognised roster entry"),
        }
    }
    Ok(ids)
}
