#![allow(dead_code)]

use std::path::PathBuf;

use fleetwatch::config::{
    ConfigFile, GatewaySection, HistorySection, JobSeed, MonitorSection, RawConfigFile,
    TrackerSection,
};
use fleetwatch::errors::FleetError;
use fleetwatch::tracker::TrackerSettings;
use fleetwatch::types::{HistoryBackendKind, MachineId};

/// Builder for `ConfigFile` to simplify test setup.
///
/// Starts from the defaults with a memory-backed history.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile {
                gateway: GatewaySection::new("http://localhost:8000"),
                history: HistorySection {
                    backend: HistoryBackendKind::Memory,
                    ..HistorySection::default()
                },
                tracker: TrackerSection::default(),
                monitor: MonitorSection::default(),
                job: Vec::new(),
            },
        }
    }

    pub fn with_base_url(mut self, url: &str) -> Self {
        self.config.gateway.base_url = url.to_string();
        self
    }

    pub fn with_sqlite(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.history.backend = HistoryBackendKind::Sqlite;
        self.config.history.path = path.into();
        self
    }

    pub fn with_cache_check_count(mut self, n: usize) -> Self {
        self.config.history.cache_check_count = n;
        self
    }

    pub fn with_poll_interval_ms(mut self, ms: u64) -> Self {
        self.config.tracker.poll_interval_ms = ms;
        self
    }

    pub fn with_debounce(mut self, polls: u32) -> Self {
        self.config.tracker.tool_change_debounce = polls;
        self
    }

    pub fn with_skip_glob(mut self, pattern: &str) -> Self {
        self.config.tracker.skip_program_globs.push(pattern.to_string());
        self
    }

    pub fn with_job(mut self, program: &str, machine: MachineId, job_id: &str) -> Self {
        self.config.job.push(JobSeed {
            program: program.to_string(),
            machine,
            job_id: job_id.to_string(),
        });
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn try_build(self) -> Result<ConfigFile, FleetError> {
        ConfigFile::try_from(self.config)
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Tracker settings with the given debounce and a short poll interval.
pub fn tracker_settings(debounce: u32) -> TrackerSettings {
    let cfg = ConfigFileBuilder::new()
        .with_debounce(debounce)
        .with_poll_interval_ms(10)
        .build();
    TrackerSettings::from(&cfg.tracker)
}
