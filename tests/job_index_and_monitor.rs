// tests/job_index_and_monitor.rs

use std::error::Error;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;

use fleetwatch::config::{JobSeed, MonitorSection};
use fleetwatch::errors::FleetError;
use fleetwatch::exec::DetachedRunner;
use fleetwatch::gateway::{ErrorDescriptor, FetchOutcome};
use fleetwatch::jobs::{InMemoryJobIndex, JobIndex, JobStatus};
use fleetwatch::tracker::{GatewayMonitor, MachineMonitor, parse_roster};
use fleetwatch_test_utils::fakes::ScriptedGateway;
use fleetwatch_test_utils::{init_tracing, with_timeout};

type TestResult = Result<(), Box<dyn Error>>;

#[tokio::test]
async fn seeded_jobs_resolve_and_walk_through_statuses() -> TestResult {
    init_tracing();
    let index = InMemoryJobIndex::from_seeds(&[JobSeed {
        program: "O1234".into(),
        machine: 1,
        job_id: "project-42".into(),
    }]);

    assert_eq!(
        index.resolve_job_id("O1234", 1).await?,
        Some("project-42".to_string())
    );
    assert_eq!(index.resolve_job_id("O1234", 2).await?, None);
    assert_eq!(index.status("O1234", 1), Some(JobStatus::Waiting));

    index.mark_processing("project-42", "O1234", 1).await?;
    assert_eq!(index.status("O1234", 1), Some(JobStatus::Processing));

    index.mark_finished("project-42", "O1234", 1).await?;
    assert_eq!(index.status("O1234", 1), Some(JobStatus::Finished));
    Ok(())
}

#[tokio::test]
async fn register_replaces_and_unknown_updates_are_harmless() -> TestResult {
    init_tracing();
    let index = InMemoryJobIndex::new();

    index.register("O7", 3, "first")?;
    index.register("O7", 3, "second")?;
    assert_eq!(index.resolve_job_id("O7", 3).await?, Some("second".into()));

    // Nothing registered under this program: only a warning.
    index.mark_processing("ghost", "O8", 3).await?;
    assert_eq!(index.status("O8", 3), None);
    Ok(())
}

#[test]
fn job_status_serializes_lowercase() -> TestResult {
    assert_eq!(serde_json::to_value(JobStatus::Processing)?, json!("processing"));
    Ok(())
}

#[test]
fn roster_accepts_ids_and_objects() -> TestResult {
    init_tracing();
    assert_eq!(parse_roster(&json!([1, 2, 3]))?, vec![1, 2, 3]);
    assert_eq!(
        parse_roster(&json!([{ "id": 4, "name": "DMU" }, { "id": 5 }]))?,
        vec![4, 5]
    );
    // Unrecognised entries are dropped, not fatal.
    assert_eq!(parse_roster(&json!([6, "x", -1, { "name": "?" }]))?, vec![6]);
    assert!(parse_roster(&json!({ "machines": [1] })).is_err());
    Ok(())
}

fn monitor_with(gateway: ScriptedGateway, extra: serde_json::Value) -> GatewayMonitor {
    let mut section = MonitorSection::default();
    if let serde_json::Value::Object(map) = extra {
        section.extra_params = map;
    }
    GatewayMonitor::new(Arc::new(gateway), section)
}

#[tokio::test]
async fn gateway_monitor_reads_machine_state() -> TestResult {
    init_tracing();
    let section = MonitorSection::default();
    let mode_ep = section.program_mode_endpoint.clone();
    let path_ep = section.program_path_endpoint.clone();
    let tool_ep = section.active_tool_endpoint.clone();

    let gateway = ScriptedGateway::new(move |endpoint, _| {
        if endpoint == mode_ep {
            FetchOutcome::Value(json!([3]))
        } else if endpoint == path_ep {
            FetchOutcome::Value(json!(["//CNC_MEM/USER/O1234"]))
        } else if endpoint == tool_ep {
            FetchOutcome::Value(json!(12))
        } else {
            FetchOutcome::Value(json!([1, 2]))
        }
    });
    let monitor = monitor_with(gateway.clone(), json!({ "channel": 1 }));

    assert_eq!(monitor.machine_ids().await?, vec![1, 2]);
    assert_eq!(monitor.program_mode(7).await?, 3);
    assert_eq!(monitor.program_path(7).await?, "//CNC_MEM/USER/O1234");
    assert_eq!(monitor.active_tool(7).await?, 12);

    let calls = gateway.calls();
    // Roster request carries no params; per-machine ones carry both.
    assert!(calls[0].params.is_empty());
    for call in calls.iter().skip(1) {
        assert_eq!(call.params.get("machine"), Some(&json!(7)));
        assert_eq!(call.params.get("channel"), Some(&json!(1)));
    }
    Ok(())
}

#[tokio::test]
async fn remote_errors_become_monitor_errors() -> TestResult {
    init_tracing();
    let gateway = ScriptedGateway::new(|_, _| FetchOutcome::Error(ErrorDescriptor::new(503)));
    let monitor = monitor_with(gateway, json!({}));

    let err = monitor.program_mode(4).await.unwrap_err();
    assert!(matches!(err, FleetError::MonitorError { machine: 4, .. }));

    let err = monitor.machine_ids().await.unwrap_err();
    assert!(matches!(err, FleetError::GatewayError(_)));
    Ok(())
}

#[tokio::test]
async fn malformed_answers_are_monitor_errors() -> TestResult {
    init_tracing();
    let gateway = ScriptedGateway::new(|_, _| FetchOutcome::Value(json!({ "odd": true })));
    let monitor = monitor_with(gateway, json!({}));

    assert!(matches!(
        monitor.active_tool(1).await,
        Err(FleetError::MonitorError { machine: 1, .. })
    ));
    assert!(matches!(
        monitor.program_path(1).await,
        Err(FleetError::MonitorError { machine: 1, .. })
    ));
    Ok(())
}

#[tokio::test]
async fn detached_failures_reach_the_hook_with_their_label() -> TestResult {
    init_tracing();
    let seen: Arc<Mutex<Vec<(String, String)>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let runner = DetachedRunner::with_failure_hook(Arc::new(move |label, err| {
        sink.lock().unwrap().push((label.to_string(), err.to_string()));
    }));

    let ok = runner.submit("fine", async { Ok(()) });
    let bad = runner.submit("broken", async {
        tokio::time::sleep(Duration::from_millis(5)).await;
        Err(FleetError::Validation("nope".into()))
    });
    with_timeout(async {
        ok.await.unwrap();
        bad.await.unwrap();
    })
    .await;

    let seen = seen.lock().unwrap().clone();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].0, "broken");
    assert!(seen[0].1.contains("nope"));
    Ok(())
}
