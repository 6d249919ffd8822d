//! Heartbeat Example - A session against the in-memory host
//!
//! This example walks one session through the relay without a browser:
//! - Drawing the root and queueing element changes while a batch is in flight
//! - Answering correlated calls the way an injected script would
//! - Watching `fully updated` settle on the heartbeat
//!
//! Set SPARK_RELAY_LOG=trace to see every call and dispatch.
//!
//! Run with: cargo run --example heartbeat

use std::time::{Duration, Instant};

use serde_json::json;
use spark_relay::{EventType, MemoryHost, Recurring, RelayConfig, Session};
use tracing::Level;

fn main() -> spark_relay::Result<()> {
    let level = std::env::var("SPARK_RELAY_LOG")
        .ok()
        .and_then(|s| s.parse::<Level>().ok())
        .unwrap_or(Level::INFO);
    let _ = tracing_subscriber::fmt().with_max_level(level).try_init();

    println!("=== spark-relay Heartbeat Example ===\n");

    let host = MemoryHost::new();
    let session = Session::new(host.clone(), RelayConfig::from_env())?;

    session.hub().every(Recurring::Redraw, |_| println!("  [redraw]"));
    let counter = session.element("counter");
    session
        .hub()
        .subscribe(EventType::Model, "click", "increment", move |args| {
            let n = args.first().and_then(|v| v.as_u64()).unwrap_or(0);
            counter.set_inner_text(&n.to_string());
        });

    session.run()?;

    // Full draw, then two clicks while it is still in flight
    let drawn = session
        .reconciler()
        .request_replace("<button id='increment'>+</button><span id='counter'>0</span>");
    drawn.on_fulfilled(|_| println!("  first draw done"));
    for n in 1..=2 {
        session.dispatch_event(EventType::Model, "click", Some("increment"), &[json!(n)]);
    }
    println!(
        "Queued fragments while drawing: {:?}",
        session.reconciler().waiting_changes()
    );

    session
        .reconciler()
        .promise_fully_updated()
        .on_fulfilled(|_| println!("  fully updated"));

    // Play the host: answer every call in submission order
    let mut answered = 0;
    while session.calls().pending_count() > 0 {
        for script in host.take_evals() {
            println!("\nhost eval ({} bytes)", script.len());
        }
        for id in session.calls().pending_ids() {
            session.calls().receive_result("success", id, json!(true))?;
            answered += 1;
        }
        host.invoke(&session.config().heartbeat_binding, &[]);
    }
    println!("\nAnswered {answered} calls");

    // A call nobody answers times out on a later heartbeat
    let slow = session.calls().submit("neverReturns()", None, Vec::new());
    session.heartbeat(Instant::now() + session.config().call_timeout() + Duration::from_millis(1));
    if let Some(reason) = slow.reason() {
        println!("Slow call rejected: {reason} ({})", reason.classification());
    }

    session.destroy();
    println!("\nSession phase: {:?}", session.phase());
    Ok(())
}
