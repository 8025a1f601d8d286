// tests/history_store.rs

mod common;
use crate::common::{failure, key, memory_store, success, ts};

use std::error::Error;
use std::sync::Arc;

use proptest::prelude::*;
use serde_json::{Value, json};
use tempfile::TempDir;

use fleetwatch::history::{
    CacheDecision, EndpointStats, HistoryRecord, HistoryStore, Partition, decide,
};
use fleetwatch::types::TimeRange;
use fleetwatch_test_utils::fakes::FailingBackend;
use fleetwatch_test_utils::{init_tracing, params};

type TestResult = Result<(), Box<dyn Error>>;

fn sqlite_store(dir: &TempDir) -> Arc<HistoryStore> {
    Arc::new(HistoryStore::sqlite(dir.path().join("history.db")))
}

/// Both backends must behave the same; run each scenario against both.
async fn stores() -> (Vec<Arc<HistoryStore>>, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let sqlite = sqlite_store(&dir);
    sqlite.initialize().await.unwrap();
    (vec![memory_store(), sqlite], dir)
}

#[tokio::test]
async fn appended_success_is_returned_by_query_recent() -> TestResult {
    init_tracing();
    let (stores, _dir) = stores().await;

    for store in stores {
        let k = key("/machine/spindle/speed", json!({ "machine": 1, "axis": 2 }));
        store.append(vec![success(&k, json!(1200), ts(0))]).await?;

        let records = store
            .query_recent(&k, 1, Partition::Success, TimeRange::all())
            .await?;

        assert_eq!(records.len(), 1, "{store:?}");
        assert_eq!(records[0].result(), Some(&json!(1200)));
        assert_eq!(records[0].timestamp(), ts(0));
        assert_eq!(records[0].endpoint(), "/machine/spindle/speed");
    }
    Ok(())
}

#[tokio::test]
async fn params_key_order_does_not_matter() -> TestResult {
    init_tracing();
    let (stores, _dir) = stores().await;

    for store in stores {
        let mut a = serde_json::Map::new();
        a.insert("machine".into(), json!(1));
        a.insert("axis".into(), json!(3));
        let mut b = serde_json::Map::new();
        b.insert("axis".into(), json!(3));
        b.insert("machine".into(), json!(1));

        let written = fleetwatch::gateway::RequestKey::new("/pos", a);
        let looked_up = fleetwatch::gateway::RequestKey::new("/pos", b);
        assert_eq!(written.fingerprint(), looked_up.fingerprint());

        store.append(vec![success(&written, json!(10.5), ts(1))]).await?;
        let records = store
            .query_recent(&looked_up, 5, Partition::Success, TimeRange::all())
            .await?;
        assert_eq!(records.len(), 1, "{store:?}");

        // A different params set is a different key.
        let other = key("/pos", json!({ "machine": 1 }));
        let none = store
            .query_recent(&other, 5, Partition::Success, TimeRange::all())
            .await?;
        assert!(none.is_empty());
    }
    Ok(())
}

#[tokio::test]
async fn recent_is_newest_first_limited_and_partitioned() -> TestResult {
    init_tracing();
    let (stores, _dir) = stores().await;

    for store in stores {
        let k = key("/alarm", json!({ "machine": 2 }));
        store
            .append(vec![
                success(&k, json!(1), ts(10)),
                failure(&k, 500, ts(15)),
                success(&k, json!(3), ts(30)),
                success(&k, json!(2), ts(20)),
            ])
            .await?;

        let ok = store
            .query_recent(&k, 2, Partition::Success, TimeRange::all())
            .await?;
        let values: Vec<_> = ok.iter().filter_map(HistoryRecord::result).cloned().collect();
        assert_eq!(values, vec![json!(3), json!(2)], "{store:?}");

        let errors = store
            .query_recent(&k, 10, Partition::Error, TimeRange::all())
            .await?;
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].error().map(|e| e.status), Some(500));

        // Inclusive bounds.
        let bounded = store
            .query_recent(&k, 10, Partition::Success, TimeRange::between(ts(10), ts(20)))
            .await?;
        assert_eq!(bounded.len(), 2);

        let zero = store
            .query_recent(&k, 0, Partition::Success, TimeRange::all())
            .await?;
        assert!(zero.is_empty());
    }
    Ok(())
}

async fn decision_for(store: &HistoryStore, values: &[i64]) -> CacheDecision {
    let k = key("/count", json!({ "machine": 9, "case": values.len() }));
    let batch = values
        .iter()
        .rev()
        .enumerate()
        .map(|(i, v)| success(&k, json!(v), ts(i as i64)))
        .collect();
    store.append(batch).await.unwrap();
    store.cache_decision(&k, 5).await.unwrap()
}

#[tokio::test]
async fn cache_decision_cases() -> TestResult {
    init_tracing();
    let (stores, _dir) = stores().await;

    for store in stores {
        assert_eq!(
            decision_for(&store, &[7, 7, 7, 7, 7]).await,
            CacheDecision::Hit(json!(7))
        );
        assert_eq!(
            decision_for(&store, &[7, 7, 7]).await,
            CacheDecision::InsufficientHistory(3)
        );

        let unstable_key = key("/count", json!({ "machine": 9, "case": "unstable" }));
        let batch = [7, 7, 8, 7, 7]
            .iter()
            .enumerate()
            .map(|(i, v)| success(&unstable_key, json!(v), ts(i as i64)))
            .collect();
        store.append(batch).await?;
        assert_eq!(
            store.cache_decision(&unstable_key, 5).await?,
            CacheDecision::ValuesUnstable
        );

        let empty = key("/count", json!({ "machine": 9, "case": "empty" }));
        assert_eq!(store.cache_decision(&empty, 5).await?, CacheDecision::NoHistory);
    }
    Ok(())
}

#[tokio::test]
async fn cache_only_looks_at_the_latest_n_successes() -> TestResult {
    init_tracing();
    let store = memory_store();
    let k = key("/mode", json!({ "machine": 4 }));

    // An old outlier followed by five agreeing answers, plus an error that
    // must not count.
    let mut batch = vec![success(&k, json!("AUTO"), ts(0))];
    for i in 1..=5 {
        batch.push(success(&k, json!("MDA"), ts(i)));
    }
    batch.push(failure(&k, 500, ts(6)));
    store.append(batch).await?;

    let decision = store.cache_decision(&k, 5).await?;
    assert!(decision.is_hit());
    assert_eq!(decision.hit_value(), Some(&json!("MDA")));
    Ok(())
}

#[tokio::test]
async fn aggregations_rank_by_frequency() -> TestResult {
    init_tracing();
    let (stores, _dir) = stores().await;

    for store in stores {
        let a = key("/feed", json!({ "machine": 1 }));
        let b = key("/feed", json!({ "machine": 2 }));
        let c = key("/temp", json!({ "machine": 1 }));

        store
            .append(vec![
                failure(&a, 500, ts(1)),
                failure(&a, 500, ts(2)),
                failure(&b, 404, ts(3)),
                failure(&a, 404, ts(4)),
                failure(&c, 500, ts(5)),
                success(&a, json!(1), ts(6)),
                success(&a, json!(1), ts(7)),
                success(&b, json!(1), ts(8)),
                success(&c, json!(1), ts(9)),
            ])
            .await?;

        let codes = store.top_error_codes(10, TimeRange::all()).await;
        let codes: Vec<(i64, u64)> = codes.into_iter().map(|g| (g.key, g.count)).collect();
        assert_eq!(codes, vec![(500, 3), (404, 2)], "{store:?}");

        let keys = store.top_error_keys(1, TimeRange::all()).await;
        assert_eq!(keys.len(), 1);
        assert_eq!(keys[0].key, a);
        assert_eq!(keys[0].count, 3);

        let top = store.top_params("/feed", 10, TimeRange::all()).await;
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].key, params(json!({ "machine": 1 })));
        assert_eq!(top[0].count, 2);

        // Time-bounded: only the failures at 3..=4.
        let bounded = store
            .top_error_codes(10, TimeRange::between(ts(3), ts(4)))
            .await;
        assert_eq!(bounded.len(), 1);
        assert_eq!((bounded[0].key, bounded[0].count), (404, 2));

        let stats = store.endpoint_stats("/feed", TimeRange::all()).await;
        assert_eq!(stats, EndpointStats::new("/feed", 3, 4));
        assert_eq!(stats.total, 7);

        let per_code = store.error_code_counts("/feed", TimeRange::all()).await;
        assert!(per_code.error_message.is_none());
        // Equal counts: order between them is unspecified.
        let mut pairs: Vec<(i64, u64)> =
            per_code.details.iter().map(|g| (g.key, g.count)).collect();
        pairs.sort();
        assert_eq!(pairs, vec![(404, 2), (500, 2)]);
    }
    Ok(())
}

#[tokio::test]
async fn storage_faults_become_values() -> TestResult {
    init_tracing();
    let store = HistoryStore::with_backend(Arc::new(FailingBackend));
    let k = key("/x", json!({ "machine": 1 }));

    let fault = store
        .query_recent(&k, 5, Partition::Success, TimeRange::all())
        .await
        .unwrap_err();
    assert_eq!(fault.operation, "query_recent");

    assert!(store.cache_decision(&k, 5).await.is_err());
    assert!(store.top_error_codes(5, TimeRange::all()).await.is_empty());
    assert!(store.top_error_keys(5, TimeRange::all()).await.is_empty());
    assert!(store.top_params("/x", 5, TimeRange::all()).await.is_empty());

    let stats = store.endpoint_stats("/x", TimeRange::all()).await;
    assert_eq!(
        (stats.success_count, stats.error_count, stats.total),
        (-1, -1, -1)
    );
    assert!(stats.error_message.is_some());

    let codes = store.error_code_counts("/x", TimeRange::all()).await;
    assert!(codes.details.is_empty());
    assert!(codes.error_message.is_some());

    assert!(store.append(vec![success(&k, json!(1), ts(0))]).await.is_err());
    Ok(())
}

#[tokio::test]
async fn sqlite_history_survives_reopen() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let k = key("/program", json!({ "machine": 3 }));

    {
        let store = sqlite_store(&dir);
        store.append(vec![success(&k, json!("O1234"), ts(5))]).await?;
    }

    let reopened = sqlite_store(&dir);
    let records = reopened
        .query_recent(&k, 1, Partition::Success, TimeRange::all())
        .await?;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].result(), Some(&json!("O1234")));
    assert_eq!(records[0].timestamp(), ts(5));
    Ok(())
}

#[tokio::test]
async fn initialize_is_idempotent_and_fails_fast_on_bad_path() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let store = sqlite_store(&dir);
    store.initialize().await?;
    store.initialize().await?;

    let bad = HistoryStore::sqlite(dir.path().join("missing").join("nested").join("h.db"));
    assert!(bad.initialize().await.is_err());
    Ok(())
}

proptest! {
    #[test]
    fn decision_only_hits_when_the_latest_n_agree(
        values in proptest::collection::vec(0i64..3, 0..10),
        n in 1usize..6,
    ) {
        let json_values: Vec<Value> = values.iter().map(|v| json!(v)).collect();
        let window = &values[..values.len().min(n)];

        match decide(&json_values, n) {
            CacheDecision::Hit(v) => {
                prop_assert_eq!(window.len(), n);
                prop_assert!(window.iter().all(|w| json!(w) == v));
            }
            CacheDecision::InsufficientHistory(count) => {
                prop_assert_eq!(count, window.len());
                prop_assert!(count < n);
                prop_assert!(window.iter().all(|w| *w == window[0]));
            }
            CacheDecision::ValuesUnstable => {
                prop_assert!(window.iter().any(|w| *w != window[0]));
            }
            CacheDecision::NoHistory => prop_assert!(values.is_empty()),
        }
    }
}
