// tests/config_loading.rs

use std::error::Error;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use serde_json::json;

use fleetwatch::config::{load_and_validate, load_from_str};
use fleetwatch::config::model::{ConfigFile, describe};
use fleetwatch::errors::FleetError;
use fleetwatch::types::HistoryBackendKind;
use fleetwatch_test_utils::builders::ConfigFileBuilder;
use fleetwatch_test_utils::init_tracing;

type TestResult = Result<(), Box<dyn Error>>;

fn expect_config_error(result: Result<ConfigFile, FleetError>, needle: &str) {
    match result {
        Err(FleetError::ConfigError(msg)) => {
            assert!(msg.contains(needle), "message {msg:?} lacks {needle:?}")
        }
        Err(other) => panic!("expected config error, got {other}"),
        Ok(cfg) => panic!("expected config error, got {cfg:?}"),
    }
}

#[test]
fn demo_config_loads() -> TestResult {
    init_tracing();
    let manifest = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    let cfg = load_and_validate(manifest.join("demos/fleetwatch.toml"))?;

    assert_eq!(cfg.gateway.base_url, "http://127.0.0.1:8000");
    assert_eq!(cfg.gateway.timeout(), Duration::from_millis(3000));
    assert_eq!(cfg.history.backend, HistoryBackendKind::Sqlite);
    assert_eq!(cfg.tracker.tool_change_debounce, 2);
    assert_eq!(cfg.tracker.roster_interval(), Duration::from_secs(15));
    assert_eq!(cfg.tracker.skip_program_globs.len(), 2);
    assert_eq!(cfg.monitor.extra_params.get("channel"), Some(&json!(1)));
    assert_eq!(cfg.job.len(), 2);
    assert_eq!(cfg.job[1].job_id, "project-43");
    Ok(())
}

#[test]
fn minimal_file_gets_defaults() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("Fleetwatch.toml");
    fs::write(&path, "[gateway]\nbase_url = \"http://gw:9000\"\n")?;

    let cfg = load_and_validate(&path)?;

    assert_eq!(cfg.gateway.timeout_ms, 5000);
    assert_eq!(cfg.history.backend, HistoryBackendKind::Sqlite);
    assert_eq!(cfg.history.cache_check_count, 5);
    assert_eq!(cfg.tracker.poll_interval(), Duration::from_secs(3));
    assert_eq!(cfg.tracker.machining_mode, 3);
    assert_eq!(cfg.tracker.tool_change_debounce, 1);
    assert_eq!(
        cfg.tracker.skip_program_globs,
        vec!["//CNC_MEM/USER/LIBRARY/*".to_string()]
    );
    assert_eq!(cfg.monitor.roster_endpoint, "/machine/list");
    assert!(cfg.job.is_empty());

    let described = describe(&cfg);
    assert_eq!(described["gateway.base_url"], "http://gw:9000");
    assert_eq!(described["job.count"], "0");
    Ok(())
}

#[test]
fn missing_gateway_section_is_a_toml_error() {
    init_tracing();
    let result = load_from_str("[tracker]\npoll_interval_ms = 100\n");
    assert!(matches!(result, Err(FleetError::TomlError(_))));
}

#[test]
fn missing_file_is_an_io_error() {
    init_tracing();
    let result = load_and_validate("/definitely/not/here/Fleetwatch.toml");
    assert!(matches!(result, Err(FleetError::IoError(_))));
}

#[test]
fn zero_intervals_and_counts_are_rejected() {
    init_tracing();
    expect_config_error(
        ConfigFileBuilder::new().with_poll_interval_ms(0).try_build(),
        "poll_interval_ms",
    );
    expect_config_error(
        ConfigFileBuilder::new().with_debounce(0).try_build(),
        "tool_change_debounce",
    );
    expect_config_error(
        ConfigFileBuilder::new().with_cache_check_count(0).try_build(),
        "cache_check_count",
    );
}

#[test]
fn empty_base_url_is_rejected() {
    init_tracing();
    expect_config_error(
        ConfigFileBuilder::new().with_base_url("  ").try_build(),
        "base_url",
    );
}

#[test]
fn bad_skip_glob_is_rejected() {
    init_tracing();
    let result = ConfigFileBuilder::new()
        .with_skip_glob("//CNC_MEM/[unclosed")
        .try_build();
    assert!(matches!(result, Err(FleetError::ConfigError(_))));
}

#[test]
fn duplicate_job_seed_is_rejected() {
    init_tracing();
    expect_config_error(
        ConfigFileBuilder::new()
            .with_job("O1", 1, "a")
            .with_job("O1", 1, "b")
            .try_build(),
        "registered twice",
    );

    // Same program on another machine is fine.
    let cfg = ConfigFileBuilder::new()
        .with_job("O1", 1, "a")
        .with_job("O1", 2, "b")
        .build();
    assert_eq!(cfg.job.len(), 2);
}

#[test]
fn extra_params_cannot_override_machine() {
    init_tracing();
    let mut raw = ConfigFileBuilder::new().raw();
    raw.monitor.extra_params.insert("machine".into(), json!(9));
    expect_config_error(ConfigFile::try_from(raw), "machine");
}

#[test]
fn log_directives_are_validated() {
    assert!(fleetwatch::logging::build_filter("debug").is_ok());
    assert!(fleetwatch::logging::build_filter("fleetwatch::tracker=trace,info").is_ok());
    assert!(fleetwatch::logging::build_filter("fleetwatch=loud").is_err());
}

#[test]
fn cli_defaults_to_the_working_directory_config() {
    use clap::Parser;
    use fleetwatch::cli::CliArgs;

    let args = CliArgs::parse_from(["fleetwatch"]);
    assert_eq!(args.config_path(), PathBuf::from("Fleetwatch.toml"));
    assert!(!args.dry_run);

    let args = CliArgs::parse_from(["fleetwatch", "--config", "/etc/fw.toml", "--dry-run"]);
    assert_eq!(args.config_path(), PathBuf::from("/etc/fw.toml"));
    assert!(args.dry_run);
}
