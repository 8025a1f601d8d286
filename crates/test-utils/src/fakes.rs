#![allow(dead_code)]

//! In-process stand-ins for the gateway, the machine monitor, the job index,
//! the tracker spawner and the history backend.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::BoxFuture;
use serde_json::{Value, json};

use fleetwatch::errors::{FleetError, Result};
use fleetwatch::gateway::{ErrorDescriptor, FetchOutcome, GatewayClient, RequestKey};
use fleetwatch::history::{
    GroupQuery, Grouping, HistoryBackend, HistoryRecord, MemoryBackend, Partition,
};
use fleetwatch::jobs::JobIndex;
use fleetwatch::tracker::{JobLog, MachineMonitor, TrackerSpawner};
use fleetwatch::types::{MachineId, Params, TimeRange};

pub type Responder = Arc<dyn Fn(&str, &Params) -> FetchOutcome + Send + Sync>;
pub type DelayFn = Arc<dyn Fn(&str, &Params) -> Duration + Send + Sync>;

/// Gateway answering from a closure and recording every call.
#[derive(Clone)]
pub struct ScriptedGateway {
    responder: Responder,
    delay: Option<DelayFn>,
    calls: Arc<Mutex<Vec<RequestKey>>>,
}

impl ScriptedGateway {
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&str, &Params) -> FetchOutcome + Send + Sync + 'static,
    {
        Self {
            responder: Arc::new(responder),
            delay: None,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Answers `{"endpoint": .., "params": {..}}`, so every answer names its
    /// request.
    pub fn echo() -> Self {
        Self::new(|endpoint, params| {
            FetchOutcome::Value(json!({ "endpoint": endpoint, "params": params }))
        })
    }

    /// Answers from a fixed table keyed by endpoint; unknown endpoints get a
    /// 404 error descriptor.
    pub fn by_endpoint(table: HashMap<String, FetchOutcome>) -> Self {
        Self::new(move |endpoint, _| {
            table
                .get(endpoint)
                .cloned()
                .unwrap_or(FetchOutcome::Error(ErrorDescriptor::new(404)))
        })
    }

    pub fn with_delay<F>(mut self, delay: F) -> Self
    where
        F: Fn(&str, &Params) -> Duration + Send + Sync + 'static,
    {
        self.delay = Some(Arc::new(delay));
        self
    }

    pub fn calls(&self) -> Vec<RequestKey> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls_to(&self, endpoint: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|k| k.endpoint == endpoint)
            .count()
    }
}

impl GatewayClient for ScriptedGateway {
    fn fetch<'a>(&'a self, endpoint: &'a str, params: &'a Params) -> BoxFuture<'a, FetchOutcome> {
        Box::pin(async move {
            self.calls
                .lock()
                .unwrap()
                .push(RequestKey::new(endpoint, params.clone()));

            if let Some(delay) = &self.delay {
                tokio::time::sleep(delay(endpoint, params)).await;
            }
            (self.responder)(endpoint, params)
        })
    }
}

/// What one machine reports. `None` fields make the matching monitor call
/// fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MachineReading {
    pub mode: Option<i64>,
    pub path: Option<String>,
    pub tool: Option<i64>,
}

impl MachineReading {
    pub fn idle() -> Self {
        Self {
            mode: Some(0),
            path: Some(String::new()),
            tool: Some(0),
        }
    }

    pub fn machining(path: &str, tool: i64) -> Self {
        Self {
            mode: Some(3),
            path: Some(path.to_string()),
            tool: Some(tool),
        }
    }

    pub fn unreachable() -> Self {
        Self {
            mode: None,
            path: None,
            tool: None,
        }
    }
}

#[derive(Default)]
struct MonitorScript {
    roster: Vec<MachineId>,
    readings: HashMap<MachineId, MachineReading>,
}

/// Monitor whose answers the test sets directly.
#[derive(Clone, Default)]
pub struct ScriptedMonitor {
    inner: Arc<Mutex<MonitorScript>>,
}

impl ScriptedMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_roster(&self, ids: &[MachineId]) {
        self.inner.lock().unwrap().roster = ids.to_vec();
    }

    pub fn set_reading(&self, machine: MachineId, reading: MachineReading) {
        self.inner.lock().unwrap().readings.insert(machine, reading);
    }

    fn field<T>(&self, machine: MachineId, what: &str, pick: impl Fn(&MachineReading) -> Option<T>) -> Result<T> {
        let script = self.inner.lock().unwrap();
        script
            .readings
            .get(&machine)
            .and_then(pick)
            .ok_or_else(|| FleetError::MonitorError {
                machine,
                message: format!("scripted {what} unavailable"),
            })
    }
}

impl MachineMonitor for ScriptedMonitor {
    fn machine_ids(&self) -> BoxFuture<'_, Result<Vec<MachineId>>> {
        let ids = self.inner.lock().unwrap().roster.clone();
        Box::pin(async move { Ok(ids) })
    }

    fn program_mode(&self, machine: MachineId) -> BoxFuture<'_, Result<i64>> {
        let mode = self.field(machine, "program mode", |r| r.mode);
        Box::pin(async move { mode })
    }

    fn program_path(&self, machine: MachineId) -> BoxFuture<'_, Result<String>> {
        let path = self.field(machine, "program path", |r| r.path.clone());
        Box::pin(async move { path })
    }

    fn active_tool(&self, machine: MachineId) -> BoxFuture<'_, Result<i64>> {
        let tool = self.field(machine, "active tool", |r| r.tool);
        Box::pin(async move { tool })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobCall {
    Resolve { program: String, machine: MachineId },
    Processing { job_id: String, machine: MachineId },
    Finished { job_id: String, machine: MachineId },
}

/// Job index backed by a plain map that records every call.
#[derive(Clone, Default)]
pub struct RecordingJobIndex {
    jobs: Arc<Mutex<HashMap<(String, MachineId), String>>>,
    calls: Arc<Mutex<Vec<JobCall>>>,
    finish_failures: Arc<AtomicUsize>,
}

impl RecordingJobIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn link(&self, program: &str, machine: MachineId, job_id: &str) {
        self.jobs
            .lock()
            .unwrap()
            .insert((program.to_string(), machine), job_id.to_string());
    }

    /// The next `times` calls to `mark_finished` fail (after being recorded).
    pub fn fail_next_finishes(&self, times: usize) {
        self.finish_failures.store(times, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<JobCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn processing_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, JobCall::Processing { .. }))
            .count()
    }

    pub fn finished(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                JobCall::Finished { job_id, .. } => Some(job_id),
                _ => None,
            })
            .collect()
    }
}

impl JobIndex for RecordingJobIndex {
    fn resolve_job_id<'a>(
        &'a self,
        program: &'a str,
        machine: MachineId,
    ) -> BoxFuture<'a, Result<Option<String>>> {
        self.calls.lock().unwrap().push(JobCall::Resolve {
            program: program.to_string(),
            machine,
        });
        let job = self
            .jobs
            .lock()
            .unwrap()
            .get(&(program.to_string(), machine))
            .cloned();
        Box::pin(async move { Ok(job) })
    }

    fn mark_processing<'a>(
        &'a self,
        job_id: &'a str,
        _program: &'a str,
        machine: MachineId,
    ) -> BoxFuture<'a, Result<()>> {
        self.calls.lock().unwrap().push(JobCall::Processing {
            job_id: job_id.to_string(),
            machine,
        });
        Box::pin(async { Ok(()) })
    }

    fn mark_finished<'a>(
        &'a self,
        job_id: &'a str,
        _program: &'a str,
        machine: MachineId,
    ) -> BoxFuture<'a, Result<()>> {
        self.calls.lock().unwrap().push(JobCall::Finished {
            job_id: job_id.to_string(),
            machine,
        });
        let fail = take_one(&self.finish_failures);
        Box::pin(async move {
            if fail {
                return Err(FleetError::Other(anyhow::anyhow!(
                    "job index unavailable during mark_finished"
                )));
            }
            Ok(())
        })
    }
}

/// Decrement `counter` if it is positive; true when it was.
fn take_one(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

/// Spawner that only records which machines it was asked to track.
#[derive(Clone, Default)]
pub struct RecordingSpawner {
    spawned: Arc<Mutex<Vec<MachineId>>>,
}

impl RecordingSpawner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spawned(&self) -> Vec<MachineId> {
        self.spawned.lock().unwrap().clone()
    }
}

impl TrackerSpawner for RecordingSpawner {
    fn spawn_tracker(&self, machine: MachineId) {
        self.spawned.lock().unwrap().push(machine);
    }
}

/// History backend where every operation fails.
#[derive(Debug, Default)]
pub struct FailingBackend;

impl FailingBackend {
    fn fail<T>(operation: &str) -> Result<T> {
        Err(FleetError::Other(anyhow::anyhow!(
            "backend unavailable during {operation}"
        )))
    }
}

impl HistoryBackend for FailingBackend {
    fn insert(&self, _partition: Partition, _records: &[HistoryRecord]) -> Result<()> {
        Self::fail("insert")
    }

    fn recent(
        &self,
        _partition: Partition,
        _key: &RequestKey,
        _limit: usize,
        _range: &TimeRange,
    ) -> Result<Vec<HistoryRecord>> {
        Self::fail("recent")
    }

    fn count(&self, _partition: Partition, _endpoint: &str, _range: &TimeRange) -> Result<u64> {
        Self::fail("count")
    }

    fn group_counts(
        &self,
        _partition: Partition,
        _grouping: Grouping,
        _query: &GroupQuery,
    ) -> Result<Vec<(Value, u64)>> {
        Self::fail("group_counts")
    }

    fn save_job_log(&self, _log: &JobLog) -> Result<()> {
        Self::fail("save_job_log")
    }

    fn job_logs(&self, _project_id: &str) -> Result<Vec<JobLog>> {
        Self::fail("job_logs")
    }
}

/// In-memory backend whose next `save_job_log` calls fail on request.
#[derive(Debug, Default)]
pub struct FlakyBackend {
    inner: MemoryBackend,
    save_failures: AtomicUsize,
    save_attempts: AtomicUsize,
}

impl FlakyBackend {
    pub fn failing_saves(times: usize) -> Self {
        Self {
            save_failures: AtomicUsize::new(times),
            ..Self::default()
        }
    }

    pub fn save_attempts(&self) -> usize {
        self.save_attempts.load(Ordering::SeqCst)
    }
}

impl HistoryBackend for FlakyBackend {
    fn insert(&self, partition: Partition, records: &[HistoryRecord]) -> Result<()> {
        self.inner.insert(partition, records)
    }

    fn recent(
        &self,
        partition: Partition,
        key: &RequestKey,
        limit: usize,
        range: &TimeRange,
    ) -> Result<Vec<HistoryRecord>> {
        self.inner.recent(partition, key, limit, range)
    }

    fn count(&self, partition: Partition, endpoint: &str, range: &TimeRange) -> Result<u64> {
        self.inner.count(partition, endpoint, range)
    }

    fn group_counts(
        &self,
        partition: Partition,
        grouping: Grouping,
        query: &GroupQuery,
    ) -> Result<Vec<(Value, u64)>> {
        self.inner.group_counts(partition, grouping, query)
    }

    fn save_job_log(&self, log: &JobLog) -> Result<()> {
        self.save_attempts.fetch_add(1, Ordering::SeqCst);
        if take_one(&self.save_failures) {
            return Err(FleetError::Other(anyhow::anyhow!(
                "transient storage fault during save_job_log"
            )));
        }
        self.inner.save_job_log(log)
    }

    fn job_logs(&self, project_id: &str) -> Result<Vec<JobLog>> {
        self.inner.job_logs(project_id)
    }
}
