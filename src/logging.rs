// src/logging.rs

//! Tracing subscriber setup.
//!
//! `--log-level` wins. Without it, `FLEETWATCH_LOG` is read as an `EnvFilter`
//! directive string, so both `debug` and `fleetwatch::tracker=trace,info`
//! work. Otherwise everything logs at `info`.
//!
//! The HTTP stack is capped at `warn` unless a directive names it.
//! Output goes to stderr, leaving stdout to `--dry-run`.

use anyhow::{Result, anyhow};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use crate::cli::LogLevel;

/// Environment variable consulted when no `--log-level` is given.
pub const LOG_ENV_VAR: &str = "FLEETWATCH_LOG";

const QUIET_DEPENDENCIES: [&str; 3] = ["hyper_util=warn", "reqwest=warn", "rustls=warn"];

/// Install the global subscriber. Call once, before anything logs.
pub fn init_logging(cli_level: Option<LogLevel>) -> Result<()> {
    let directives = match cli_level {
        Some(level) => LevelFilter::from(level).to_string(),
        None => std::env::var(LOG_ENV_VAR).unwrap_or_else(|_| "info".to_string()),
    };

    tracing_subscriber::fmt()
        .with_env_filter(build_filter(&directives)?)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow!("installing log subscriber: {e}"))
}

/// Parse `directives` and add the dependency caps it does not override.
pub fn build_filter(directives: &str) -> Result<EnvFilter> {
    let mut filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .parse(directives.trim())
        .map_err(|e| anyhow!("invalid {LOG_ENV_VAR} value {directives:?}: {e}"))?;

    for cap in QUIET_DEPENDENCIES {
        let target = cap.split('=').next().unwrap_or(cap);
        if !directives.contains(target) {
            filter = filter.add_directive(cap.parse()?);
        }
    }
    Ok(filter)
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }
}
