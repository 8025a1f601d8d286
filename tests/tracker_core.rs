// tests/tracker_core.rs

mod common;
use crate::common::ts;

use fleetwatch::tracker::{JobLog, Observation, Phase, TrackerCore, TrackerEffect};

fn machining(job: &str, tool: i64) -> Observation {
    Observation::Machining {
        job_id: job.to_string(),
        program: format!("{job}.MPF"),
        tool,
    }
}

/// Feed observations at ts(1), ts(2), ... and collect every persisted log.
fn run(
    core: &mut TrackerCore,
    observations: Vec<Observation>,
) -> (Vec<TrackerEffect>, Vec<JobLog>) {
    let mut effects = Vec::new();
    for (i, obs) in observations.into_iter().enumerate() {
        let step = core.step(obs, ts(i as i64 + 1));
        if let Some(log) = core.state().job_log() {
            let open = log.operations.iter().filter(|op| op.is_open()).count();
            assert!(open <= 1, "{open} open operations after poll {}", i + 1);
        }
        effects.extend(step);
    }
    let logs = effects
        .iter()
        .filter_map(|e| match e {
            TrackerEffect::PersistJobLog(log) => Some(log.clone()),
            _ => None,
        })
        .collect();
    (effects, logs)
}

#[test]
fn tool_change_cycle_produces_one_finished_log() {
    let mut core = TrackerCore::new(1, 1);

    let (_, logs) = run(
        &mut core,
        vec![
            Observation::Idle,
            machining("P-1", 1),
            machining("P-1", 1),
            machining("P-1", 2),
            Observation::Idle,
        ],
    );

    assert_eq!(logs.len(), 1);
    let log = &logs[0];
    assert!(log.finished);
    assert_eq!(log.project_id, "P-1");
    assert_eq!(log.machine_id, 1);
    assert_eq!(log.start_time, ts(2));
    assert_eq!(log.finish_time, Some(ts(5)));

    assert_eq!(log.operations.len(), 2);
    let (first, second) = (&log.operations[0], &log.operations[1]);
    assert_eq!((first.index, first.tool_number), (1, 1));
    assert_eq!((first.start_time, first.end_time), (ts(2), Some(ts(4))));
    assert_eq!((second.index, second.tool_number), (2, 2));
    assert_eq!((second.start_time, second.end_time), (ts(4), Some(ts(5))));

    assert_eq!(core.state().phase(), Phase::Idle);
    assert!(core.state().job_log().is_none());
}

#[test]
fn every_machining_poll_marks_processing_and_finish_marks_finished() {
    let mut core = TrackerCore::new(3, 1);

    let (effects, _) = run(
        &mut core,
        vec![machining("J", 5), machining("J", 5), Observation::Idle],
    );

    let processing = effects
        .iter()
        .filter(|e| matches!(e, TrackerEffect::MarkProcessing { .. }))
        .count();
    assert_eq!(processing, 2);

    // Finish order: mark finished, then persist.
    let tail: Vec<_> = effects.iter().rev().take(2).collect();
    assert!(matches!(tail[0], TrackerEffect::PersistJobLog(_)));
    assert!(matches!(tail[1], TrackerEffect::MarkFinished { job_id, .. } if job_id == "J"));
}

#[test]
fn idle_while_idle_and_skipped_cycles_do_nothing() {
    let mut core = TrackerCore::new(1, 1);

    assert!(core.step(Observation::Idle, ts(1)).is_empty());
    assert!(
        core.step(
            Observation::SystemProgram {
                path: "//CNC_MEM/USER/LIBRARY/CYCLE.SPF".into()
            },
            ts(2)
        )
        .is_empty()
    );
    assert!(
        core.step(
            Observation::Unresolved {
                program: "O9999".into()
            },
            ts(3)
        )
        .is_empty()
    );
    assert_eq!(core.state().phase(), Phase::Idle);
}

#[test]
fn unresolved_poll_while_machining_keeps_the_job_open() {
    let mut core = TrackerCore::new(1, 1);

    core.step(machining("J", 1), ts(1));
    let effects = core.step(
        Observation::Unresolved {
            program: "O1".into(),
        },
        ts(2),
    );

    assert!(effects.is_empty());
    assert_eq!(core.state().phase(), Phase::Machining);
    let log = core.state().job_log().expect("job still open");
    assert_eq!(log.operations.len(), 1);
    assert!(log.operations[0].is_open());
}

#[test]
fn debounce_waits_for_consecutive_polls() {
    let mut core = TrackerCore::new(1, 2);

    let (_, logs) = run(
        &mut core,
        vec![
            machining("J", 1),
            // A single-poll blip is ignored.
            machining("J", 2),
            machining("J", 1),
            // Two consecutive polls commit the change at the second one.
            machining("J", 3),
            machining("J", 3),
            Observation::Idle,
        ],
    );

    let log = &logs[0];
    let tools: Vec<i64> = log.operations.iter().map(|op| op.tool_number).collect();
    assert_eq!(tools, vec![1, 3]);
    assert_eq!(log.operations[0].end_time, Some(ts(5)));
    assert_eq!(log.operations[1].start_time, ts(5));
    assert_eq!(log.operations[1].index, 2);
}

#[test]
fn next_job_gets_a_fresh_product_id() {
    let mut core = TrackerCore::new(1, 1);

    let (_, logs) = run(
        &mut core,
        vec![
            machining("A", 1),
            Observation::Idle,
            machining("B", 1),
            Observation::Idle,
        ],
    );

    assert_eq!(logs.len(), 2);
    assert_ne!(logs[0].product_id, logs[1].product_id);
    assert_eq!(logs[1].project_id, "B");
    assert_eq!(logs[1].operations[0].index, 1);
}

#[test]
fn switching_jobs_mid_cycle_closes_the_previous_job() {
    let mut core = TrackerCore::new(1, 1);

    let (_, logs) = run(
        &mut core,
        vec![machining("A", 1), machining("B", 4), Observation::Idle],
    );

    assert_eq!(logs.len(), 2);
    assert_eq!(logs[0].project_id, "A");
    assert_eq!(logs[0].finish_time, Some(ts(2)));
    assert_eq!(logs[1].project_id, "B");
    assert_eq!(logs[1].start_time, ts(2));
    assert_eq!(logs[1].operations[0].tool_number, 4);
}
