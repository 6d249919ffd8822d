//! Change Reconciler - Batched, at-most-one-in-flight redraws
//!
//! Widgets request small DOM changes far more often than the render host can
//! safely absorb them. The reconciler queues change fragments and sends them
//! as one batch per round trip:
//!
//! - at most one batch in flight (`pending_batch`)
//! - at most one batch promised for changes that arrived meanwhile
//!   (`waiting_batch`), shared by every caller
//! - a full replace drops every queued partial change; a batch already sent
//!   cannot be recalled and is left alone
//!
//! # Example
//!
//! ```ignore
//! let reconciler = Reconciler::new(calls.clone(), hub.clone());
//!
//! reconciler.request_replace("<p>Hello</p>");
//! let done = reconciler.request_change("document.title='Hi'");
//! done.on_fulfilled(|_| println!("visible"));
//!
//! reconciler.promise_fully_updated().on_fulfilled(|_| println!("settled"));
//! ```

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use spark_signals::{signal, Signal};
use tracing::{debug, error, trace};

use crate::bridge::{script, CallLayer};
use crate::error::Rejection;
use crate::hub::EventHub;
use crate::promise::Promise;
use crate::types::{CallId, Recurring, Value};

// =============================================================================
// STATE
// =============================================================================

#[derive(Default)]
struct BatchState {
    waiting_changes: Vec<String>,
    pending_batch: Option<Promise>,
    waiting_batch: Option<Promise>,
    fully_updated: Option<Promise>,
    first_draw: bool,
    /// Last batch failure; cleared by the next explicit request.
    stalled: Option<Rejection>,
}

impl BatchState {
    fn is_settled(&self) -> bool {
        self.waiting_changes.is_empty()
            && self.pending_batch.is_none()
            && self.waiting_batch.is_none()
            && self.stalled.is_none()
    }

    fn is_idle(&self) -> bool {
        self.waiting_changes.is_empty() && self.pending_batch.is_none() && self.waiting_batch.is_none()
    }
}

struct Inner {
    state: RefCell<BatchState>,
    calls: CallLayer,
    hub: EventHub,
    settled: Signal<bool>,
}

/// Change reconciler. Cloning shares the same batch state.
#[derive(Clone)]
pub struct Reconciler {
    inner: Rc<Inner>,
}

impl Reconciler {
    pub fn new(calls: CallLayer, hub: EventHub) -> Self {
        Self {
            inner: Rc::new(Inner {
                state: RefCell::new(BatchState::default()),
                calls,
                hub,
                settled: signal(true),
            }),
        }
    }

    // =========================================================================
    // REQUESTS
    // =========================================================================

    /// Queue a change fragment. Returns a promise fulfilled once the batch
    /// carrying it has been applied.
    ///
    /// Ignored until the first full replace: there is nothing to change yet.
    pub fn request_change(&self, fragment: impl Into<String>) -> Promise {
        let fragment = fragment.into();
        {
            let mut state = self.inner.state.borrow_mut();
            if !state.first_draw {
                trace!(fragment = %fragment, "change before first draw ignored");
                return Promise::fulfilled(Value::Null);
            }
            state.waiting_changes.push(fragment);
            state.stalled = None;
        }
        self.inner.settled.set(false);
        self.promise_redraw()
    }

    /// Replace the whole root element, dropping queued partial changes.
    pub fn request_replace(&self, html: &str) -> Promise {
        let fragment = script::replace_root(&self.inner.calls.config().root_element_id, html);
        {
            let mut state = self.inner.state.borrow_mut();
            if !state.waiting_changes.is_empty() {
                debug!(
                    superseded = state.waiting_changes.len(),
                    "full replace supersedes queued changes"
                );
            }
            state.waiting_changes = vec![fragment];
            state.first_draw = true;
            state.stalled = None;
        }
        self.inner.settled.set(false);
        self.promise_redraw()
    }

    /// Promise for the batch that will carry the currently queued changes.
    pub fn promise_redraw(&self) -> Promise {
        let body = {
            let mut state = self.inner.state.borrow_mut();

            if state.is_idle() {
                return Promise::fulfilled(Value::Null);
            }
            if let Some(waiting) = &state.waiting_batch {
                return waiting.clone();
            }
            if state.waiting_changes.is_empty() {
                if let Some(pending) = &state.pending_batch {
                    return pending.clone();
                }
                return Promise::fulfilled(Value::Null);
            }
            if state.pending_batch.is_some() {
                let waiting = Promise::pending();
                state.waiting_batch = Some(waiting.clone());
                return waiting;
            }

            let body = script::join_fragments(&state.waiting_changes);
            state.waiting_changes.clear();
            state.stalled = None;
            body
        };
        self.submit_batch(body)
    }

    /// Promise fulfilled once nothing is queued, waiting or in flight.
    /// Callers asking while unsettled share one promise.
    pub fn promise_fully_updated(&self) -> Promise {
        let mut state = self.inner.state.borrow_mut();
        if state.is_settled() {
            return Promise::fulfilled(Value::Null);
        }
        state
            .fully_updated
            .get_or_insert_with(Promise::pending)
            .clone()
    }

    /// Heartbeat check: fulfill a requested fully-updated promise if the
    /// reconciler has settled without a batch completion noticing.
    pub fn on_heartbeat(&self) {
        self.check_settled();
    }

    // =========================================================================
    // QUERIES
    // =========================================================================

    pub fn is_fully_updated(&self) -> bool {
        self.inner.state.borrow().is_settled()
    }

    /// Reactive mirror of `is_fully_updated`.
    pub fn settled_signal(&self) -> Signal<bool> {
        self.inner.settled.clone()
    }

    pub fn has_drawn(&self) -> bool {
        self.inner.state.borrow().first_draw
    }

    pub fn waiting_changes(&self) -> Vec<String> {
        self.inner.state.borrow().waiting_changes.clone()
    }

    pub fn pending_batch(&self) -> Option<Promise> {
        self.inner.state.borrow().pending_batch.clone()
    }

    pub fn waiting_batch(&self) -> Option<Promise> {
        self.inner.state.borrow().waiting_batch.clone()
    }

    /// Failure of the last batch, until the next request.
    pub fn last_failure(&self) -> Option<Rejection> {
        self.inner.state.borrow().stalled.clone()
    }

    // =========================================================================
    // BATCH LIFECYCLE
    // =========================================================================

    fn submit_batch(&self, body: String) -> Promise {
        let id = self.inner.calls.next_id();
        debug!(id = %id, code = %body, "redraw batch submitted");
        let batch = self.inner.calls.submit(body.clone(), None, Vec::new());

        self.inner.state.borrow_mut().pending_batch = Some(batch.clone());
        self.inner.settled.set(false);

        let weak = Rc::downgrade(&self.inner);
        let done = batch.clone();
        batch.on_fulfilled(move |_| {
            if let Some(reconciler) = upgrade(&weak) {
                reconciler.batch_fulfilled(&done);
            }
        });

        let weak = Rc::downgrade(&self.inner);
        let failed = batch.clone();
        batch.on_rejected(move |reason| {
            if let Some(reconciler) = upgrade(&weak) {
                reconciler.batch_rejected(&failed, id, &body, reason);
            }
        });

        batch
    }

    fn batch_fulfilled(&self, batch: &Promise) {
        self.inner.hub.dispatch_recurring(Recurring::Redraw, &[]);

        let waiting = {
            let mut state = self.inner.state.borrow_mut();
            if state.pending_batch.as_ref().is_some_and(|p| p.ptr_eq(batch)) {
                state.pending_batch = None;
            }
            state.waiting_batch.take()
        };

        match waiting {
            Some(waiting) => {
                let next = self.promise_redraw();
                waiting.adopt(&next);
            }
            None => self.check_settled(),
        }
    }

    fn batch_rejected(&self, batch: &Promise, id: CallId, body: &str, reason: &Rejection) {
        error!(
            id = %id,
            code = %body,
            classification = reason.classification(),
            error = %reason,
            "redraw batch rejected"
        );

        let (waiting, fully_updated) = {
            let mut state = self.inner.state.borrow_mut();
            if state.pending_batch.as_ref().is_some_and(|p| p.ptr_eq(batch)) {
                state.pending_batch = None;
            }
            state.stalled = Some(reason.clone());
            (state.waiting_batch.take(), state.fully_updated.take())
        };

        if let Some(waiting) = waiting {
            waiting.reject(reason.clone());
        }
        if let Some(fully_updated) = fully_updated {
            error!(
                id = %id,
                classification = reason.classification(),
                "fully-updated promise rejected"
            );
            fully_updated.reject(reason.clone());
        }
    }

    fn check_settled(&self) {
        let fully_updated = {
            let mut state = self.inner.state.borrow_mut();
            if !state.is_settled() {
                return;
            }
            state.fully_updated.take()
        };
        self.inner.settled.set(true);
        if let Some(promise) = fully_updated {
            debug!("fully updated");
            promise.fulfill(Value::Null);
        }
    }
}

fn upgrade(weak: &Weak<Inner>) -> Option<Reconciler> {
    weak.upgrade().map(|inner| Reconciler { inner })
}

// =============================================================================
// TESTS
// =============================================================================
