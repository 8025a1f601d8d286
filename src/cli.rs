// src/cli.rs

use clap::{Parser, ValueEnum};

use crate::config::default_config_path;

/// `fleetwatch` command line.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "fleetwatch",
    version,
    about = "Track machine work-cycles and keep a queryable history of controller telemetry."
)]
pub struct CliArgs {
    /// Fleet configuration (TOML). Defaults to `Fleetwatch.toml` in the
    /// working directory.
    #[arg(long, value_name = "PATH")]
    pub config: Option<String>,

    /// Overrides `FLEETWATCH_LOG`.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Validate the config, print the effective settings and seeded jobs,
    /// then exit without polling any machine.
    #[arg(long)]
    pub dry_run: bool,
}

impl CliArgs {
    pub fn config_path(&self) -> std::path::PathBuf {
        self.config
            .as_ref()
            .map(std::path::PathBuf::from)
            .unwrap_or_else(default_config_path)
    }
}

#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

pub fn parse() -> CliArgs {
    CliArgs::parse()
}
