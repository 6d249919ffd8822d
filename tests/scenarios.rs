//! End-to-end scenarios against the in-memory render host.
//!
//! Each test drives a full `Session`: model requests go through the
//! reconciler and call layer, and host activity is simulated by invoking the
//! bindings the session installed.
//!
//! Run with: cargo test --test scenarios

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::{Duration, Instant};

use serde_json::json;
use spark_relay::{
    CallId, EventType, MemoryHost, Promise, Recurring, Rejection, RelayConfig, Session,
    Value,
};

// =============================================================================
// HELPERS
// =============================================================================

fn setup() -> (Rc<MemoryHost>, Session) {
    let host = MemoryHost::new();
    let session = Session::new(host.clone(), RelayConfig::default()).unwrap();
    session.run().unwrap();
    (host, session)
}

/// Simulate the host reporting a correlated result.
fn report(host: &MemoryHost, kind: &str, id: u64, value: Value) {
    assert!(host.invoke("sparkRelayResult", &[json!(kind), json!(id), value]));
}

fn heartbeat(host: &MemoryHost) {
    assert!(host.invoke("sparkRelayHeartbeat", &[]));
}

// =============================================================================
// SCENARIOS
// =============================================================================

#[test]
fn test_replace_round_trip() {
    let (host, session) = setup();
    let reconciler = session.reconciler();

    let p = reconciler.request_replace("<p>A</p>");
    assert_eq!(session.calls().pending_ids(), vec![CallId(0)]);
    assert!(host.evals()[0].contains("<p>A</p>"));

    report(&host, "success", 0, json!(true));
    assert!(p.is_fulfilled());
    assert!(reconciler.is_fully_updated());
}

#[test]
fn test_changes_in_flight_join_into_next_batch() {
    let (host, session) = setup();
    let reconciler = session.reconciler();
    reconciler.request_replace("<p>A</p>");

    let first = reconciler.request_change("f1()");
    let second = reconciler.request_change("f2()");
    assert!(first.ptr_eq(&second));
    assert_eq!(host.eval_count(), 1);

    report(&host, "success", 0, json!(true));
    let batch = session.calls().entry(CallId(1)).unwrap();
    assert_eq!(batch.code, "f1();f2()");
    assert_eq!(host.eval_count(), 2);

    report(&host, "success", 1, json!(true));
    assert!(first.is_fulfilled());
}

#[test]
fn test_unresolved_dependency_is_never_scheduled() {
    let (host, session) = setup();
    let dependency = Promise::pending();
    let p = session
        .calls()
        .submit("afterDependency()", None, vec![dependency]);

    session.heartbeat(Instant::now() + Duration::from_millis(100));
    assert!(!p.is_complete());

    session.heartbeat(Instant::now() + Duration::from_millis(600));
    assert_eq!(
        p.reason(),
        Some(Rejection::NeverScheduled {
            id: CallId(0),
            code: "afterDependency()".to_string(),
        })
    );
    assert_eq!(p.reason().unwrap().classification(), "never_scheduled");
    assert_eq!(host.eval_count(), 0);
}

#[test]
fn test_host_runtime_error_carries_message() {
    let (host, session) = setup();
    let calls = session.calls();
    let promises: Vec<Promise> = (0..8)
        .map(|i| calls.submit(format!("step{i}()"), None, Vec::new()))
        .collect();

    report(&host, "error", 7, json!("ReferenceError: x is not defined"));
    assert_eq!(
        promises[7].reason(),
        Some(Rejection::HostRuntime {
            code: "step7()".to_string(),
            message: "ReferenceError: x is not defined".to_string(),
        })
    );
    assert!(promises[..7].iter().all(|p| p.is_pending()));
}

#[test]
fn test_next_heartbeat_snapshot() {
    let (host, session) = setup();
    let hub = session.hub().clone();
    let log = Rc::new(RefCell::new(Vec::new()));

    let l = log.clone();
    hub.next(Recurring::Heartbeat, move |_| l.borrow_mut().push("one"));

    let l = log.clone();
    let hub_inner = hub.clone();
    let added = Rc::new(Cell::new(false));
    hub.next(Recurring::Heartbeat, move |_| {
        l.borrow_mut().push("two");
        if !added.replace(true) {
            let l = l.clone();
            hub_inner.next(Recurring::Heartbeat, move |_| l.borrow_mut().push("three"));
        }
    });

    heartbeat(&host);
    assert_eq!(*log.borrow(), vec!["one", "two"]);

    heartbeat(&host);
    assert_eq!(*log.borrow(), vec!["one", "two", "three"]);

    heartbeat(&host);
    assert_eq!(log.borrow().len(), 3);
}

// =============================================================================
// PROPERTIES
// =============================================================================

#[test]
fn test_fully_updated_via_heartbeat() {
    let (host, session) = setup();
    let reconciler = session.reconciler();

    reconciler.request_replace("<p>A</p>");
    let a = reconciler.promise_fully_updated();
    let b = reconciler.promise_fully_updated();
    assert!(a.ptr_eq(&b));

    heartbeat(&host);
    assert!(a.is_pending());

    report(&host, "success", 0, json!(true));
    heartbeat(&host);
    assert!(a.is_fulfilled());
    assert!(reconciler.promise_fully_updated().is_fulfilled());
    assert!(reconciler.settled_signal().get());
}

#[test]
fn test_late_result_after_timeout_is_discarded() {
    let (host, session) = setup();
    let p = session.reconciler().request_replace("<p>A</p>");

    session.heartbeat(Instant::now() + Duration::from_secs(1));
    assert!(matches!(p.reason(), Some(Rejection::TimedOut { .. })));

    // The host finishes anyway; the report is dropped quietly
    assert_eq!(
        session
            .calls()
            .receive_result("success", CallId(0), json!(true)),
        Ok(())
    );
    assert!(p.is_rejected());
}

#[test]
fn test_model_events_reach_targeted_handlers() {
    let (_host, session) = setup();
    let clicks = Rc::new(Cell::new(0));
    let c = clicks.clone();
    let element = session.element("counter");
    session.reconciler().request_replace("<span id='counter'>0</span>");

    session
        .hub()
        .subscribe(EventType::Model, "click", "counter", move |_| {
            c.set(c.get() + 1);
            element.set_inner_text(&c.get().to_string());
        });
    session
        .hub()
        .subscribe(EventType::Model, "click", "other", |_| panic!("wrong target"));

    session.dispatch_event(EventType::Model, "click", Some("counter"), &[]);
    session.dispatch_event(EventType::Model, "click", Some("counter"), &[]);
    assert_eq!(clicks.get(), 2);

    let waiting = session.reconciler().waiting_changes();
    assert_eq!(waiting.len(), 2);
    assert!(waiting[1].ends_with(r#".innerText="2""#));
    assert!(session.hub().handler_count() >= 2);
}
