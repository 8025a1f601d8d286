// src/lib.rs

pub mod cli;
pub mod config;
pub mod errors;
pub mod exec;
pub mod fetch;
pub mod gateway;
pub mod history;
pub mod jobs;
pub mod logging;
pub mod report;
pub mod service;
pub mod tracker;
pub mod types;

use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, info};

use crate::cli::CliArgs;
use crate::config::load_and_validate;
use crate::config::model::{ConfigFile, describe};
use crate::gateway::{GatewayClient, HttpGateway};
use crate::history::HistoryStore;
use crate::jobs::{InMemoryJobIndex, JobIndex};
use crate::tracker::{
    FleetLoop, GatewayMonitor, MachineMonitor, ProgramFilter, TaskSpawner, TrackerContext,
    TrackerSettings,
};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading
/// - history store (opened eagerly so a bad database path fails fast)
/// - gateway, machine monitor and job index
/// - the fleet loop that spawns one tracker per machine
/// - Ctrl-C handling
pub async fn run(args: CliArgs) -> Result<()> {
    let config_path = args.config_path();
    let cfg = load_and_validate(&config_path)?;

    if args.dry_run {
        print_dry_run(&cfg);
        return Ok(());
    }

    let store = Arc::new(HistoryStore::from_config(&cfg.history));
    store.initialize().await?;

    let gateway: Arc<dyn GatewayClient> = Arc::new(HttpGateway::new(&cfg.gateway)?);
    let monitor: Arc<dyn MachineMonitor> =
        Arc::new(GatewayMonitor::new(gateway, cfg.monitor.clone()));
    let jobs: Arc<dyn JobIndex> = Arc::new(InMemoryJobIndex::from_seeds(&cfg.job));
    let filter = Arc::new(ProgramFilter::new(&cfg.tracker.skip_program_globs)?);

    let ctx = TrackerContext {
        monitor: Arc::clone(&monitor),
        jobs,
        store,
        filter,
        settings: TrackerSettings::from(&cfg.tracker),
    };

    let fleet = FleetLoop::new(
        monitor,
        TaskSpawner::new(ctx),
        cfg.tracker.roster_interval(),
    );

    info!(gateway = %cfg.gateway.base_url, "fleetwatch started");
    let fleet_task = tokio::spawn(fleet.run());

    tokio::signal::ctrl_c().await?;
    info!("shutdown requested");
    fleet_task.abort();
    Ok(())
}

/// Simple dry-run output: print the effective configuration.
fn print_dry_run(cfg: &ConfigFile) {
    println!("fleetwatch dry-run");
    for (key, value) in describe(cfg) {
        println!("  {key} = {value}");
    }

    if !cfg.job.is_empty() {
        println!();
        println!("jobs ({}):", cfg.job.len());
        for job in cfg.job.iter() {
            println!(
                "  - {} on machine {} -> {}",
                job.program, job.machine, job.job_id
            );
        }
    }

    debug!("dry-run complete (nothing polled)");
}
