// src/tracker/job_log.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::MachineId;

/// One contiguous stretch of cutting with a single tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolOperation {
    pub id: Uuid,
    /// 1-based position within the job.
    pub index: u32,
    pub tool_number: i64,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
}

impl ToolOperation {
    pub fn open(index: u32, tool_number: i64, start_time: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            index,
            tool_number,
            start_time,
            end_time: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.end_time.is_none()
    }
}

/// Record of one machining cycle of a job on one machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobLog {
    pub project_id: String,
    pub machine_id: MachineId,
    pub product_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub finish_time: Option<DateTime<Utc>>,
    pub finished: bool,
    pub operations: Vec<ToolOperation>,
}

impl JobLog {
    pub fn start(
        project_id: impl Into<String>,
        machine_id: MachineId,
        product_id: Uuid,
        start_time: DateTime<Utc>,
    ) -> Self {
        Self {
            project_id: project_id.into(),
            machine_id,
            product_id,
            start_time,
            finish_time: None,
            finished: false,
            operations: Vec::new(),
        }
    }

    pub fn open_operation(&self) -> Option<&ToolOperation> {
        self.operations.iter().find(|op| op.is_open())
    }

    /// Close the open operation (if any) at `at`.
    pub fn close_open_operation(&mut self, at: DateTime<Utc>) {
        if let Some(op) = self.operations.iter_mut().find(|op| op.is_open()) {
            op.end_time = Some(at);
        }
    }

    /// Close whatever is open, then open a new operation.
    ///
    /// At most one operation is ever open.
    pub fn begin_operation(&mut self, index: u32, tool_number: i64, at: DateTime<Utc>) {
        self.close_open_operation(at);
        self.operations
            .push(ToolOperation::open(index, tool_number, at));
    }

    pub fn finish(&mut self, at: DateTime<Utc>) {
        self.close_open_operation(at);
        self.finish_time = Some(at);
        self.finished = true;
    }
}
