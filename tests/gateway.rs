// tests/gateway.rs

use std::error::Error;

use serde_json::json;

use fleetwatch::config::GatewaySection;
use fleetwatch::gateway::{
    ErrorDescriptor, FetchOutcome, GatewayClient, HttpGateway, RequestKey, TRANSPORT_FAILURE,
    UNKNOWN_STATUS, scalar_i64,
};
use fleetwatch_test_utils::{init_tracing, params, with_timeout};

type TestResult = Result<(), Box<dyn Error>>;

#[test]
fn error_marker_classifies_answers() {
    assert_eq!(
        FetchOutcome::from_json(json!({ "__error__": true, "status": 404 })),
        FetchOutcome::Error(ErrorDescriptor::new(404))
    );
    assert_eq!(
        FetchOutcome::from_json(json!({ "__error__": true })),
        FetchOutcome::Error(ErrorDescriptor::new(UNKNOWN_STATUS))
    );
    // Only a literal `true` marks an error.
    let lookalike = json!({ "__error__": "yes", "status": 500 });
    assert_eq!(
        FetchOutcome::from_json(lookalike.clone()),
        FetchOutcome::Value(lookalike)
    );
    assert_eq!(FetchOutcome::from_json(json!([1])), FetchOutcome::Value(json!([1])));
}

#[test]
fn wire_form_keeps_the_marker() -> TestResult {
    let err = FetchOutcome::Error(ErrorDescriptor::new(503));
    assert_eq!(
        serde_json::to_value(&err)?,
        json!({ "__error__": true, "status": 503 })
    );
    assert_eq!(serde_json::to_value(FetchOutcome::Value(json!("ok")))?, json!("ok"));
    Ok(())
}

#[test]
fn fingerprint_depends_on_endpoint_and_params_only() {
    let a = RequestKey::new("/x", params(json!({ "b": 2, "a": 1 })));
    let b = RequestKey::new("/x", params(json!({ "a": 1, "b": 2 })));
    let c = RequestKey::new("/y", params(json!({ "a": 1, "b": 2 })));
    let d = RequestKey::new("/x", params(json!({ "a": 1, "b": "2" })));

    assert_eq!(a.fingerprint(), b.fingerprint());
    assert_ne!(a.fingerprint(), c.fingerprint());
    assert_ne!(a.fingerprint(), d.fingerprint());
    assert_eq!(a.canonical_params(), r#"{"a":1,"b":2}"#);
}

#[test]
fn scalars_may_arrive_wrapped_in_a_list() {
    assert_eq!(scalar_i64(&json!(12)), Some(12));
    assert_eq!(scalar_i64(&json!([12, 13])), Some(12));
    assert_eq!(scalar_i64(&json!([])), None);
    assert_eq!(scalar_i64(&json!("12")), None);
    assert_eq!(scalar_i64(&json!(1.5)), None);
}

#[tokio::test]
async fn unreachable_gateway_is_a_transport_failure() -> TestResult {
    init_tracing();
    let mut section = GatewaySection::new("http://127.0.0.1:1/");
    section.timeout_ms = 500;
    let gateway = HttpGateway::new(&section)?;

    let outcome = with_timeout(gateway.fetch("/machine/list", &params(json!({})))).await;
    assert_eq!(outcome, FetchOutcome::Error(ErrorDescriptor::new(TRANSPORT_FAILURE)));
    Ok(())
}
