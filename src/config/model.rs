// src/config/model.rs

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::types::{HistoryBackendKind, MachineId, Params};

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [gateway]
/// base_url = "http://localhost:8000"
///
/// [history]
/// backend = "sqlite"
/// path = "fleetwatch.db"
///
/// [tracker]
/// poll_interval_ms = 3000
/// skip_program_globs = ["//CNC_MEM/USER/LIBRARY/*"]
///
/// [[job]]
/// program = "O1234"
/// machine = 1
/// job_id = "project-42"
/// ```
///
/// Everything except `[gateway].base_url` has a default.
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfigFile {
    pub gateway: GatewaySection,

    #[serde(default)]
    pub history: HistorySection,

    #[serde(default)]
    pub tracker: TrackerSection,

    #[serde(default)]
    pub monitor: MonitorSection,

    /// Seed entries for the in-memory job index.
    #[serde(default)]
    pub job: Vec<JobSeed>,
}

/// Validated configuration. Only constructed through `TryFrom<RawConfigFile>`
/// (or [`ConfigFile::new_unchecked`] by code that validated on its own).
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub gateway: GatewaySection,
    pub history: HistorySection,
    pub tracker: TrackerSection,
    pub monitor: MonitorSection,
    pub job: Vec<JobSeed>,
}

impl ConfigFile {
    pub fn new_unchecked(raw: RawConfigFile) -> Self {
        Self {
            gateway: raw.gateway,
            history: raw.history,
            tracker: raw.tracker,
            monitor: raw.monitor,
            job: raw.job,
        }
    }
}

/// `[gateway]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewaySection {
    /// Base URL every endpoint path is appended to.
    pub base_url: String,

    #[serde(default = "default_gateway_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_gateway_timeout_ms() -> u64 {
    5000
}

impl GatewaySection {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout_ms: default_gateway_timeout_ms(),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// `[history]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct HistorySection {
    #[serde(default)]
    pub backend: HistoryBackendKind,

    /// SQLite database file; ignored for the memory backend.
    #[serde(default = "default_history_path")]
    pub path: PathBuf,

    /// How many recent successes must agree for a cache hit.
    #[serde(default = "default_cache_check_count")]
    pub cache_check_count: usize,
}

fn default_history_path() -> PathBuf {
    PathBuf::from("fleetwatch.db")
}

fn default_cache_check_count() -> usize {
    5
}

impl Default for HistorySection {
    fn default() -> Self {
        Self {
            backend: HistoryBackendKind::default(),
            path: default_history_path(),
            cache_check_count: default_cache_check_count(),
        }
    }
}

/// `[tracker]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct TrackerSection {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(default = "default_roster_interval_ms")]
    pub roster_interval_ms: u64,

    /// Program-mode value that means "cutting".
    #[serde(default = "default_machining_mode")]
    pub machining_mode: i64,

    /// Consecutive polls a new tool must be observed before the change is
    /// committed. `1` reacts on the first differing poll.
    #[serde(default = "default_tool_change_debounce")]
    pub tool_change_debounce: u32,

    /// Program paths matching any of these globs are never tracked.
    #[serde(default = "default_skip_program_globs")]
    pub skip_program_globs: Vec<String>,
}

fn default_poll_interval_ms() -> u64 {
    3000
}

fn default_roster_interval_ms() -> u64 {
    10_000
}

fn default_machining_mode() -> i64 {
    3
}

fn default_tool_change_debounce() -> u32 {
    1
}

fn default_skip_program_globs() -> Vec<String> {
    vec!["//CNC_MEM/USER/LIBRARY/*".to_string()]
}

impl Default for TrackerSection {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            roster_interval_ms: default_roster_interval_ms(),
            machining_mode: default_machining_mode(),
            tool_change_debounce: default_tool_change_debounce(),
            skip_program_globs: default_skip_program_globs(),
        }
    }
}

impl TrackerSection {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn roster_interval(&self) -> Duration {
        Duration::from_millis(self.roster_interval_ms)
    }
}

/// `[monitor]` section: which gateway endpoints answer the tracker's
/// questions.
#[derive(Debug, Clone, Deserialize)]
pub struct MonitorSection {
    #[serde(default = "default_roster_endpoint")]
    pub roster_endpoint: String,

    #[serde(default = "default_program_mode_endpoint")]
    pub program_mode_endpoint: String,

    #[serde(default = "default_program_path_endpoint")]
    pub program_path_endpoint: String,

    #[serde(default = "default_active_tool_endpoint")]
    pub active_tool_endpoint: String,

    /// Merged into the `{machine}` params of every per-machine request.
    #[serde(default)]
    pub extra_params: Params,
}

fn default_roster_endpoint() -> String {
    "/machine/list".to_string()
}

fn default_program_mode_endpoint() -> String {
    "/machine/channel/programMode".to_string()
}

fn default_program_path_endpoint() -> String {
    "/machine/channel/activeProgram/programPath".to_string()
}

fn default_active_tool_endpoint() -> String {
    "/machine/channel/activeTool/toolNumber".to_string()
}

impl Default for MonitorSection {
    fn default() -> Self {
        Self {
            roster_endpoint: default_roster_endpoint(),
            program_mode_endpoint: default_program_mode_endpoint(),
            program_path_endpoint: default_program_path_endpoint(),
            active_tool_endpoint: default_active_tool_endpoint(),
            extra_params: Params::new(),
        }
    }
}

/// `[[job]]` entry.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct JobSeed {
    pub program: String,
    pub machine: MachineId,
    pub job_id: String,
}

/// Convenience view used by `--dry-run`.
pub fn describe(cfg: &ConfigFile) -> BTreeMap<&'static str, String> {
    let mut out = BTreeMap::new();
    out.insert("gateway.base_url", cfg.gateway.base_url.clone());
    out.insert("gateway.timeout_ms", cfg.gateway.timeout_ms.to_string());
    out.insert("history.backend", format!("{:?}", cfg.history.backend));
    out.insert("history.path", cfg.history.path.display().to_string());
    out.insert(
        "history.cache_check_count",
        cfg.history.cache_check_count.to_string(),
    );
    out.insert(
        "tracker.poll_interval_ms",
        cfg.tracker.poll_interval_ms.to_string(),
    );
    out.insert(
        "tracker.roster_interval_ms",
        cfg.tracker.roster_interval_ms.to_string(),
    );
    out.insert(
        "tracker.machining_mode",
        cfg.tracker.machining_mode.to_string(),
    );
    out.insert(
        "tracker.tool_change_debounce",
        cfg.tracker.tool_change_debounce.to_string(),
    );
    out.insert(
        "tracker.skip_program_globs",
        format!("{:?}", cfg.tracker.skip_program_globs),
    );
    out.insert("job.count", cfg.job.len().to_string());
    out
}
