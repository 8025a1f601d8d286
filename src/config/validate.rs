// src/config/validate.rs

use std::collections::HashSet;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{FleetError, Result};
use crate::tracker::ProgramFilter;
use crate::types::HistoryBackendKind;

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = crate::errors::FleetError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw))
    }
}

pub fn validate_config(cfg: &RawConfigFile) -> Result<()> {
    validate_gateway(cfg)?;
    validate_history(cfg)?;
    validate_tracker(cfg)?;
    validate_monitor(cfg)?;
    validate_jobs(cfg)?;
    Ok(())
}

fn config_error(msg: impl Into<String>) -> FleetError {
    FleetError::ConfigError(msg.into())
}

fn validate_gateway(cfg: &RawConfigFile) -> Result<()> {
    if cfg.gateway.base_url.trim().is_empty() {
        return Err(config_error("[gateway].base_url must not be empty"));
    }
    if cfg.gateway.timeout_ms == 0 {
        return Err(config_error("[gateway].timeout_ms must be >= 1 (got 0)"));
    }
    Ok(())
}

fn validate_history(cfg: &RawConfigFile) -> Result<()> {
    if cfg.history.cache_check_count == 0 {
        return Err(config_error(
            "[history].cache_check_count must be >= 1 (got 0)",
        ));
    }
    if cfg.history.backend == HistoryBackendKind::Sqlite
        && cfg.history.path.as_os_str().is_empty()
    {
        return Err(config_error(
            "[history].path must be set when backend = \"sqlite\"",
        ));
    }
    Ok(())
}

fn validate_tracker(cfg: &RawConfigFile) -> Result<()> {
    let t = &cfg.tracker;
    if t.poll_interval_ms == 0 {
        return Err(config_error(
            "[tracker].poll_interval_ms must be >= 1 (got 0)",
        ));
    }
    if t.roster_interval_ms == 0 {
        return Err(config_error(
            "[tracker].roster_interval_ms must be >= 1 (got 0)",
        ));
    }
    if t.tool_change_debounce == 0 {
        return Err(config_error(
            "[tracker].tool_change_debounce must be >= 1 (got 0)",
        ));
    }

    // Compiling is the validation.
    ProgramFilter::new(&t.skip_program_globs)?;
    Ok(())
}

fn validate_monitor(cfg: &RawConfigFile) -> Result<()> {
    let m = &cfg.monitor;
    for (name, value) in [
        ("roster_endpoint", &m.roster_endpoint),
        ("program_mode_endpoint", &m.program_mode_endpoint),
        ("program_path_endpoint", &m.program_path_endpoint),
        ("active_tool_endpoint", &m.active_tool_endpoint),
    ] {
        if value.trim().is_empty() {
            return Err(config_error(format!("[monitor].{name} must not be empty")));
        }
    }
    if m.extra_params.contains_key("machine") {
        return Err(config_error(
            "[monitor].extra_params must not override `machine`",
        ));
    }
    Ok(())
}

fn validate_jobs(cfg: &RawConfigFile) -> Result<()> {
    let mut seen = HashSet::new();
    for job in cfg.job.iter() {
        if job.program.trim().is_empty() || job.job_id.trim().is_empty() {
            return Err(config_error(
                "[[job]] entries need a non-empty `program` and `job_id`",
            ));
        }
        if !seen.insert((job.program.as_str(), job.machine)) {
            return Err(config_error(format!(
                "[[job]] program '{}' is registered twice for machine {}",
                job.program, job.machine
            )));
        }
    }
    Ok(())
}
