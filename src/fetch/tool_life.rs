// src/fetch/tool_life.rs

//! Staged tool-life query: tool count → edge counts → four readings per
//! (tool, edge), each stage one concurrent batch.

use serde::{Serialize, Serializer};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::fetch::FetchOrchestrator;
use crate::gateway::{ErrorDescriptor, FetchOutcome, RequestKey, scalar_i64};
use crate::types::{MachineId, Params};

pub const TOOL_COUNT_ENDPOINT: &str = "/machine/toolArea/numberOfRegisteredTools";
pub const EDGE_COUNT_ENDPOINT: &str = "/machine/toolArea/registerTools/numberOfEdges";
pub const REST_LIFE_ENDPOINT: &str =
    "/machine/toolArea/registerTools/toolEdge/toolLife/restToolLife";
pub const MAX_LIFE_ENDPOINT: &str = "/machine/toolArea/registerTools/toolEdge/toolLife/maxToolLife";
pub const LIFE_COUNT_ENDPOINT: &str =
    "/machine/toolArea/registerTools/toolEdge/toolLife/toolLifeCount";
pub const LIFE_UNIT_ENDPOINT: &str = "/machine/toolArea/registerTools/toolLifeUnit";

const READINGS_PER_EDGE: usize = 4;

#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[serde(tag = "fault", content = "detail", rename_all = "snake_case")]
pub enum ToolLifeError {
    /// The tool-count request itself failed remotely.
    #[error("tool count request failed: {0}")]
    Remote(ErrorDescriptor),
    #[error("cannot determine tool count")]
    CannotDetermineToolCount,
    #[error("no tools registered")]
    NoToolsRegistered,
    #[error("no edge info for the registered tools")]
    NoEdgeInfo,
}

/// One reading, or `"error"` when its sub-request failed.
#[derive(Debug, Clone, PartialEq)]
pub enum LifeReading {
    Value(Value),
    Failed,
}

impl From<FetchOutcome> for LifeReading {
    fn from(outcome: FetchOutcome) -> Self {
        match outcome {
            FetchOutcome::Value(v) => LifeReading::Value(v),
            FetchOutcome::Error(_) => LifeReading::Failed,
        }
    }
}

impl Serialize for LifeReading {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            LifeReading::Value(v) => v.serialize(serializer),
            LifeReading::Failed => serializer.serialize_str("error"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolLifeEntry {
    #[serde(rename = "registerTools")]
    pub tool: i64,
    #[serde(rename = "toolEdges")]
    pub edge: i64,
    pub rest_tool_life: LifeReading,
    pub max_tool_life: LifeReading,
    pub tool_life_count: LifeReading,
    pub tool_life_unit: LifeReading,
}

fn with(base: &Params, key: &str, value: i64) -> Params {
    let mut params = base.clone();
    params.insert(key.to_string(), Value::from(value));
    params
}

/// The four reading requests of one (tool, edge), in reassembly order.
fn edge_requests(tool_params: &Params, edge: i64) -> [RequestKey; READINGS_PER_EDGE] {
    let edge_params = with(tool_params, "toolEdge", edge);
    [
        RequestKey::new(REST_LIFE_ENDPOINT, with(&edge_params, "restToolLife", 1)),
        RequestKey::new(MAX_LIFE_ENDPOINT, with(&edge_params, "maxToolLife", 1)),
        RequestKey::new(LIFE_COUNT_ENDPOINT, with(&edge_params, "toolLifeCount", 1)),
        // The unit is per tool, so it is addressed without `toolEdge`.
        RequestKey::new(LIFE_UNIT_ENDPOINT, with(tool_params, "toolLifeUnit", 1)),
    ]
}

impl FetchOrchestrator {
    /// Tool-life readings for every registered tool and edge of `machine`.
    ///
    /// Sub-requests are not written to history.
    pub async fn fetch_tool_life(
        &self,
        machine: MachineId,
    ) -> Result<Vec<ToolLifeEntry>, ToolLifeError> {
        let mut machine_params = Params::new();
        machine_params.insert("machine".to_string(), Value::from(machine));
        machine_params.insert("toolArea".to_string(), Value::from(1));

        let count_key = RequestKey::new(TOOL_COUNT_ENDPOINT, machine_params.clone());
        let count = match self.fetch_batch(std::slice::from_ref(&count_key)).await.pop() {
            Some(FetchOutcome::Value(v)) => {
                scalar_i64(&v).ok_or(ToolLifeError::CannotDetermineToolCount)?
            }
            Some(FetchOutcome::Error(e)) => return Err(ToolLifeError::Remote(e)),
            None => return Err(ToolLifeError::CannotDetermineToolCount),
        };
        if count <= 0 {
            return Err(ToolLifeError::NoToolsRegistered);
        }
        debug!(machine, tools = count, "registered tools");

        let tool_params: Vec<(i64, Params)> = (1..=count)
            .map(|tool| (tool, with(&machine_params, "registerTools", tool)))
            .collect();

        let edge_keys: Vec<RequestKey> = tool_params
            .iter()
            .map(|(_, params)| RequestKey::new(EDGE_COUNT_ENDPOINT, params.clone()))
            .collect();
        let edge_counts: Vec<i64> = self
            .fetch_batch(&edge_keys)
            .await
            .into_iter()
            .map(|outcome| outcome.value().and_then(Value::as_i64).unwrap_or(1))
            .collect();

        let mut slots: Vec<(i64, i64)> = Vec::new();
        let mut reading_keys: Vec<RequestKey> = Vec::new();
        for ((tool, params), edges) in tool_params.iter().zip(edge_counts) {
            for edge in 1..=edges {
                slots.push((*tool, edge));
                reading_keys.extend(edge_requests(params, edge));
            }
        }
        if reading_keys.is_empty() {
            return Err(ToolLifeError::NoEdgeInfo);
        }

        let mut readings = self
            .fetch_batch(&reading_keys)
            .await
            .into_iter()
            .map(LifeReading::from);

        let mut entries = Vec::with_capacity(slots.len());
        for (tool, edge) in slots {
            let mut next = || readings.next().unwrap_or(LifeReading::Failed);
            entries.push(ToolLifeEntry {
                tool,
                edge,
                rest_tool_life: next(),
                max_tool_life: next(),
                tool_life_count: next(),
                tool_life_unit: next(),
            });
        }

        debug!(machine, entries = entries.len(), "tool life assembled");
        Ok(entries)
    }
}
