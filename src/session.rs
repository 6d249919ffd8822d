//! Session - Owns and wires the relay for one application run
//!
//! A session ties together the event hub, the call layer and the reconciler
//! for a single render host, and drives them from the host's heartbeat.
//!
//! # Lifecycle
//!
//! ```text
//! new()  -> binds the result channel and the heartbeat interval
//! run()  -> dispatches `init`, starts the call layer, dispatches `run`
//! (host heartbeat) -> sweep timeouts, reconciler check, `heartbeat` event
//! destroy() -> dispatches `destroy`, stops the call layer
//! ```
//!
//! # Example
//!
//! ```ignore
//! let host = MemoryHost::new();
//! let session = Session::new(host.clone(), RelayConfig::from_env())?;
//!
//! session.hub().every(Recurring::Heartbeat, |_| { /* poll model */ });
//! session.run()?;
//!
//! session.reconciler().request_replace("<h1>Hello</h1>");
//! ```

use std::cell::Cell;
use std::rc::{Rc, Weak};
use std::time::Instant;

use tracing::{debug, info};

use crate::bridge::{CallLayer, RenderHost};
use crate::config::RelayConfig;
use crate::error::{RelayError, Result};
use crate::hub::EventHub;
use crate::reconcile::{ElementHandle, Reconciler};
use crate::types::{lifecycle, EventType, Recurring, Value};

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Built; bindings and init code may still be added.
    Created,
    /// `run()` has completed; the host is live.
    Running,
    /// `destroy()` has run; heartbeats are ignored.
    Destroyed,
}

struct Inner {
    hub: EventHub,
    calls: CallLayer,
    reconciler: Reconciler,
    phase: Cell<Phase>,
}

/// One application run against one render host.
#[derive(Clone)]
pub struct Session {
    inner: Rc<Inner>,
}

impl Session {
    pub fn new(host: Rc<dyn RenderHost>, config: RelayConfig) -> Result<Self> {
        let hub = EventHub::new();
        let calls = CallLayer::new(host, config)?;
        let reconciler = Reconciler::new(calls.clone(), hub.clone());

        let inner = Rc::new(Inner {
            hub,
            calls: calls.clone(),
            reconciler,
            phase: Cell::new(Phase::Created),
        });

        let weak: Weak<Inner> = Rc::downgrade(&inner);
        let config = calls.config().clone();
        calls.periodic(
            &config.heartbeat_binding,
            config.heartbeat_interval(),
            move |_| {
                if let Some(inner) = weak.upgrade() {
                    Session { inner }.heartbeat(Instant::now());
                }
            },
        )?;

        debug!(
            heartbeat_ms = config.heartbeat_interval_ms,
            binding = %config.result_binding,
            "session attached"
        );
        Ok(Self { inner })
    }

    /// Event hub shared with the reconciler.
    pub fn hub(&self) -> &EventHub {
        &self.inner.hub
    }

    /// Correlated call layer bound to the host.
    pub fn calls(&self) -> &CallLayer {
        &self.inner.calls
    }

    /// Change reconciler for this session's root element.
    pub fn reconciler(&self) -> &Reconciler {
        &self.inner.reconciler
    }

    pub fn config(&self) -> &RelayConfig {
        self.inner.calls.config()
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> Phase {
        self.inner.phase.get()
    }

    pub fn is_running(&self) -> bool {
        self.phase() == Phase::Running
    }

    /// Handle for changing one element through the reconciler.
    pub fn element(&self, html_id: impl Into<String>) -> ElementHandle {
        ElementHandle::new(&self.inner.reconciler, html_id)
    }

    /// Entry point for model-layer events.
    pub fn dispatch_event(
        &self,
        event_type: EventType,
        name: &str,
        target: Option<&str>,
        args: &[Value],
    ) -> usize {
        self.inner.hub.dispatch(event_type, name, target, args)
    }

    /// Dispatch `init`, start the call layer, dispatch `run`.
    ///
    /// `init` handlers may still bind callbacks and add init code.
    pub fn run(&self) -> Result<()> {
        match self.phase() {
            Phase::Destroyed => return Err(RelayError::Destroyed),
            Phase::Running => return Ok(()),
            Phase::Created => {}
        }
        self.inner
            .hub
            .dispatch(EventType::Display, lifecycle::INIT, None, &[]);
        self.inner.calls.start()?;
        self.inner.phase.set(Phase::Running);
        info!("session running");
        self.inner
            .hub
            .dispatch(EventType::Display, lifecycle::RUN, None, &[]);
        Ok(())
    }

    /// One periodic tick: expire overdue calls, let the reconciler notice it
    /// has settled, then notify heartbeat subscribers.
    pub fn heartbeat(&self, now: Instant) {
        if self.phase() == Phase::Destroyed {
            return;
        }
        let expired = self.inner.calls.sweep_timeouts(now);
        if expired > 0 {
            debug!(expired, "heartbeat expired calls");
        }
        self.inner.reconciler.on_heartbeat();
        self.inner
            .hub
            .dispatch_recurring(Recurring::Heartbeat, &[]);
    }

    /// Dispatch `destroy`, stop the call layer and drop every subscription.
    pub fn destroy(&self) {
        if self.phase() == Phase::Destroyed {
            return;
        }
        self.inner
            .hub
            .dispatch(EventType::Display, lifecycle::DESTROY, None, &[]);
        self.inner.calls.stop();
        self.inner.phase.set(Phase::Destroyed);
        self.inner.hub.clear();
        info!("session destroyed");
    }
}
