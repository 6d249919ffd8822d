//! Correlated Call Layer - Promise-returning calls over a one-way host
//!
//! The render host only offers `eval(code)` with no return channel. The call
//! layer gives every submitted fragment a serial id, wraps it so the host
//! reports `(kind, id, value)` back through a single bound callback, and
//! resolves the matching promise when that report arrives.
//!
//! Two deadlines guard every call:
//! - **not scheduled** - the call's dependencies never resolved, so it was
//!   never sent to the host
//! - **not finished** - it was sent, but the host never answered
//!
//! `sweep_timeouts` rejects whatever has passed its deadline. It runs on
//! every heartbeat.
//!
//! # Example
//!
//! ```ignore
//! let host = MemoryHost::new();
//! let calls = CallLayer::new(host.clone(), RelayConfig::default())?;
//!
//! let promise = calls.submit("document.title", None, Vec::new());
//! // ... host reports ("success", 0, "My App") ...
//! assert_eq!(promise.value(), Some(json!("My App")));
//! ```

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::rc::{Rc, Weak};
use std::time::{Duration, Instant};

use tracing::{debug, error, trace, warn};

use super::host::{HostCallback, RenderHost};
use super::script;
use crate::config::RelayConfig;
use crate::error::{HostError, Rejection, RelayError, Result};
use crate::promise::Promise;
use crate::types::{CallId, ResultKind, Value};

// =============================================================================
// PENDING CALL ENTRIES
// =============================================================================

/// The one active deadline of a pending call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deadline {
    /// Not yet dispatched; must be dispatched before this instant.
    NotScheduled(Instant),
    /// Dispatched; the host must answer before this instant.
    NotFinished(Instant),
}

impl Deadline {
    pub fn instant(self) -> Instant {
        match self {
            Self::NotScheduled(at) | Self::NotFinished(at) => at,
        }
    }
}

/// A call the layer is still waiting on.
#[derive(Debug, Clone)]
pub struct CallEntry {
    /// Correlation id echoed back by the host.
    pub id: CallId,
    /// Code as submitted, before wrapping.
    pub code: String,
    /// When the call was submitted.
    pub start_time: Instant,
    /// Set when the call is dispatched to the host.
    pub scheduled_time: Option<Instant>,
    /// The single deadline currently guarding the call.
    pub deadline: Deadline,
    /// Settled by the host report or a timeout.
    pub promise: Promise,
}

impl CallEntry {
    pub fn timeout_if_not_scheduled(&self) -> Option<Instant> {
        match self.deadline {
            Deadline::NotScheduled(at) => Some(at),
            Deadline::NotFinished(_) => None,
        }
    }

    pub fn timeout_if_not_finished(&self) -> Option<Instant> {
        match self.deadline {
            Deadline::NotFinished(at) => Some(at),
            Deadline::NotScheduled(_) => None,
        }
    }

    pub fn is_dispatched(&self) -> bool {
        matches!(self.deadline, Deadline::NotFinished(_))
    }
}

// =============================================================================
// CALL LAYER
// =============================================================================

struct CallState {
    next_id: u64,
    pending: BTreeMap<CallId, CallEntry>,
    /// Dispatched ids given up on, with when. A report for one of them is a
    /// late arrival until the grace window prunes it.
    abandoned: HashMap<CallId, Instant>,
    running: bool,
    stopped: bool,
}

struct Shared {
    state: RefCell<CallState>,
    host: Rc<dyn RenderHost>,
    config: RelayConfig,
}

/// Correlated call layer. Cloning shares the same pending table.
#[derive(Clone)]
pub struct CallLayer {
    shared: Rc<Shared>,
}

impl CallLayer {
    /// Attach to `host`, binding the correlated result channel.
    pub fn new(host: Rc<dyn RenderHost>, config: RelayConfig) -> Result<Self> {
        let shared = Rc::new(Shared {
            state: RefCell::new(CallState {
                next_id: 0,
                pending: BTreeMap::new(),
                abandoned: HashMap::new(),
                running: false,
                stopped: false,
            }),
            host,
            config,
        });

        let weak = Rc::downgrade(&shared);
        let callback: HostCallback = Rc::new(move |args: &[Value]| {
            let Some(layer) = upgrade(&weak) else {
                return;
            };
            if let Err(err) = layer.handle_result_args(args) {
                error!(error = %err, "correlated result rejected");
            }
        });
        shared.host.bind(&shared.config.result_binding, callback)?;

        Ok(Self { shared })
    }

    /// Configuration the layer was built with.
    pub fn config(&self) -> &RelayConfig {
        &self.shared.config
    }

    /// The render host calls are sent to.
    pub fn host(&self) -> &Rc<dyn RenderHost> {
        &self.shared.host
    }

    // -------------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------------

    /// Expose `handler` to host code. Only legal before `start`.
    pub fn bind<F>(&self, name: &str, handler: F) -> Result<()>
    where
        F: Fn(&[Value]) + 'static,
    {
        if self.is_running() {
            return Err(RelayError::BindAfterRun(name.to_string()));
        }
        self.shared.host.bind(name, Rc::new(handler))?;
        Ok(())
    }

    /// Run `code` when the host starts. Only legal before `start`.
    pub fn init_code(&self, code: &str) -> Result<()> {
        if self.is_running() {
            return Err(RelayError::InitAfterRun);
        }
        self.shared.host.init(code)?;
        Ok(())
    }

    /// Bind `handler` and have the host call it every `interval`.
    pub fn periodic<F>(&self, name: &str, interval: Duration, handler: F) -> Result<()>
    where
        F: Fn(&[Value]) + 'static,
    {
        self.bind(name, handler)?;
        self.init_code(&script::periodic(name, interval))
    }

    /// Allow dispatching plain evals and close the binding window.
    /// Fails once the layer has been stopped.
    pub fn start(&self) -> Result<()> {
        let mut state = self.shared.state.borrow_mut();
        if state.stopped {
            return Err(RelayError::Destroyed);
        }
        state.running = true;
        Ok(())
    }

    /// Stop the layer. Calls still pending are rejected; the host will not
    /// be asked for anything else. Reports for calls already sent are
    /// treated as late arrivals.
    pub fn stop(&self) {
        let entries: Vec<CallEntry> = {
            let mut state = self.shared.state.borrow_mut();
            state.running = false;
            state.stopped = true;
            let entries: Vec<CallEntry> =
                std::mem::take(&mut state.pending).into_values().collect();
            let now = Instant::now();
            for entry in entries.iter().filter(|e| e.is_dispatched()) {
                state.abandoned.insert(entry.id, now);
            }
            entries
        };
        for entry in entries {
            if !entry.promise.is_complete() {
                debug!(id = %entry.id, "call dropped at shutdown");
                entry.promise.reject(Rejection::Host(HostError::Closed));
            }
        }
    }

    /// Started and not yet stopped.
    pub fn is_running(&self) -> bool {
        self.shared.state.borrow().running
    }

    /// Stopped for good.
    pub fn is_stopped(&self) -> bool {
        self.shared.state.borrow().stopped
    }

    // -------------------------------------------------------------------------
    // Calls
    // -------------------------------------------------------------------------

    /// Plain fire-and-forget eval, no correlation.
    pub fn eval_eventually(&self, code: &str) -> Result<()> {
        {
            let state = self.shared.state.borrow();
            if state.stopped {
                return Err(RelayError::Destroyed);
            }
            if !state.running {
                return Err(RelayError::NotRunning);
            }
        }
        self.shared.host.eval(code)?;
        Ok(())
    }

    /// Submit `code` once every promise in `wait_for` is fulfilled.
    ///
    /// The returned promise is fulfilled with the value the host reports, or
    /// rejected on a host error, protocol violation or either timeout.
    /// `timeout` defaults to the configured call timeout.
    pub fn submit(
        &self,
        code: impl Into<String>,
        timeout: Option<Duration>,
        wait_for: Vec<Promise>,
    ) -> Promise {
        let code = code.into();
        let timeout = timeout.unwrap_or_else(|| self.shared.config.call_timeout());

        let id = {
            let mut state = self.shared.state.borrow_mut();
            if state.stopped {
                debug!(code = %code, "submit after stop");
                return Promise::rejected(Rejection::Host(HostError::Closed));
            }
            let id = CallId(state.next_id);
            state.next_id += 1;
            id
        };

        let promise = Promise::new(wait_for);
        if promise.is_complete() {
            debug!(id = %id, "call dependency already rejected");
            return promise;
        }

        let now = Instant::now();
        trace!(id = %id, code = %code, "call submitted");
        self.shared.state.borrow_mut().pending.insert(
            id,
            CallEntry {
                id,
                code,
                start_time: now,
                scheduled_time: None,
                deadline: Deadline::NotScheduled(deadline_after(
                    now,
                    self.shared.config.schedule_window(),
                )),
                promise: promise.clone(),
            },
        );

        // Settled from outside the table (dependency rejection, early fulfill)
        let weak = Rc::downgrade(&self.shared);
        promise.on_fulfilled(move |_| forget(&weak, id));
        let weak = Rc::downgrade(&self.shared);
        promise.on_rejected(move |_| forget(&weak, id));

        let weak = Rc::downgrade(&self.shared);
        promise.on_scheduled(move || {
            if let Some(layer) = upgrade(&weak) {
                layer.dispatch(id, timeout);
            }
        });

        promise
    }

    /// Send a scheduled call to the host and switch its deadline.
    fn dispatch(&self, id: CallId, timeout: Duration) {
        let code = {
            let mut state = self.shared.state.borrow_mut();
            let Some(entry) = state.pending.get_mut(&id) else {
                return;
            };
            if entry.is_dispatched() {
                return;
            }
            if entry.promise.is_complete() {
                state.pending.remove(&id);
                return;
            }
            let now = Instant::now();
            entry.scheduled_time = Some(now);
            entry.deadline = Deadline::NotFinished(deadline_after(now, timeout));
            entry.code.clone()
        };

        let wrapped = script::wrap_correlated(&code, id, &self.shared.config.result_binding);
        debug!(id = %id, code = %code, "call dispatched");
        if let Err(err) = self.shared.host.eval(&wrapped) {
            let entry = self.shared.state.borrow_mut().pending.remove(&id);
            if let Some(entry) = entry {
                warn!(id = %id, error = %err, "host refused dispatch");
                entry.promise.reject(Rejection::Host(err));
            }
        }
    }

    /// Parse the raw `(kind, id, value)` arguments of the result binding.
    pub fn handle_result_args(&self, args: &[Value]) -> Result<()> {
        let kind = args
            .first()
            .and_then(Value::as_str)
            .ok_or_else(|| RelayError::MalformedResult(format!("no result kind in {args:?}")))?;
        let id = args
            .get(1)
            .and_then(Value::as_u64)
            .ok_or_else(|| RelayError::MalformedResult(format!("no call id in {args:?}")))?;
        let value = args.get(2).cloned().unwrap_or(Value::Null);
        self.receive_result(kind, CallId(id), value)
    }

    /// Resolve the call `id` with a host report.
    ///
    /// Reports for calls that already timed out are discarded. A report for
    /// an id that was never tracked is `RelayError::UnknownCall`.
    pub fn receive_result(&self, kind: &str, id: CallId, value: Value) -> Result<()> {
        let entry = {
            let mut state = self.shared.state.borrow_mut();
            match state.pending.remove(&id) {
                Some(entry) => entry,
                None => {
                    if state.abandoned.remove(&id).is_some() {
                        debug!(id = %id, kind, "late result discarded");
                        return Ok(());
                    }
                    return Err(RelayError::UnknownCall(id));
                }
            }
        };

        if entry.promise.is_complete() {
            return Ok(());
        }

        match ResultKind::parse(kind) {
            ResultKind::Success => {
                trace!(id = %id, "call fulfilled");
                entry.promise.fulfill(value);
            }
            ResultKind::Error => {
                let message = match value {
                    Value::String(message) => message,
                    other => other.to_string(),
                };
                warn!(id = %id, code = %entry.code, message = %message, "host runtime error");
                entry.promise.reject(Rejection::HostRuntime {
                    code: entry.code,
                    message,
                });
            }
            ResultKind::Other(kind) => {
                error!(id = %id, code = %entry.code, kind = %kind, "unknown result kind");
                entry.promise.reject(Rejection::Protocol {
                    code: entry.code,
                    kind,
                    value,
                });
            }
        }
        Ok(())
    }

    /// Reject every call whose deadline is at or before `now`.
    /// Returns how many calls were rejected.
    pub fn sweep_timeouts(&self, now: Instant) -> usize {
        let expired: Vec<CallEntry> = {
            let mut state = self.shared.state.borrow_mut();
            let ids: Vec<CallId> = state
                .pending
                .values()
                .filter(|entry| entry.deadline.instant() <= now)
                .map(|entry| entry.id)
                .collect();
            let mut expired = Vec::with_capacity(ids.len());
            for id in ids {
                if let Some(entry) = state.pending.remove(&id) {
                    if entry.is_dispatched() {
                        state.abandoned.insert(id, now);
                    }
                    expired.push(entry);
                }
            }

            let grace = self.shared.config.late_result_grace();
            let before = state.abandoned.len();
            state
                .abandoned
                .retain(|_, at| now.saturating_duration_since(*at) < grace);
            let pruned = before - state.abandoned.len();
            if pruned > 0 {
                trace!(pruned, "late result window closed");
            }
            expired
        };

        let count = expired.len();
        for entry in expired {
            if entry.promise.is_complete() {
                continue;
            }
            let reason = match entry.deadline {
                Deadline::NotScheduled(_) => Rejection::NeverScheduled {
                    id: entry.id,
                    code: entry.code,
                },
                Deadline::NotFinished(_) => Rejection::TimedOut {
                    id: entry.id,
                    code: entry.code,
                },
            };
            warn!(id = %entry.id, classification = reason.classification(), "call expired");
            entry.promise.reject(reason);
        }
        count
    }

    // -------------------------------------------------------------------------
    // Diagnostics
    // -------------------------------------------------------------------------

    /// Given-up ids still recognized as late arrivals.
    pub fn abandoned_count(&self) -> usize {
        self.shared.state.borrow().abandoned.len()
    }

    /// Calls still waiting for dispatch or a report.
    pub fn pending_count(&self) -> usize {
        self.shared.state.borrow().pending.len()
    }

    /// Pending ids in submission order.
    pub fn pending_ids(&self) -> Vec<CallId> {
        self.shared.state.borrow().pending.keys().copied().collect()
    }

    /// Snapshot of one pending call.
    pub fn entry(&self, id: CallId) -> Option<CallEntry> {
        self.shared.state.borrow().pending.get(&id).cloned()
    }

    /// Id the next submitted call will get.
    pub fn next_id(&self) -> CallId {
        CallId(self.shared.state.borrow().next_id)
    }
}

fn upgrade(weak: &Weak<Shared>) -> Option<CallLayer> {
    weak.upgrade().map(|shared| CallLayer { shared })
}

/// Drop the entry for a call settled outside the layer.
fn forget(weak: &Weak<Shared>, id: CallId) {
    let Some(shared) = weak.upgrade() else {
        return;
    };
    let mut state = shared.state.borrow_mut();
    if let Some(entry) = state.pending.remove(&id) {
        if entry.is_dispatched() {
            state.abandoned.insert(id, Instant::now());
        }
    }
}

/// `now + after`, clamped instead of overflowing for huge durations.
fn deadline_after(now: Instant, after: Duration) -> Instant {
    now.checked_add(after)
        .or_else(|| now.checked_add(FAR_FUTURE))
        .unwrap_or(now)
}

/// Stand-in for "never" when a deadline would overflow `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::MemoryHost;
    use crate::promise::PromiseState;
    use serde_json::json;

    fn setup() -> (Rc<MemoryHost>, CallLayer) {
        let host = MemoryHost::new();
        let calls = CallLayer::new(host.clone(), RelayConfig::default()).unwrap();
        (host, calls)
    }

    fn report(host: &MemoryHost, kind: &str, id: u64, value: Value) {
        assert!(host.invoke("sparkRelayResult", &[json!(kind), json!(id), value]));
    }

    #[test]
    fn test_binds_result_channel() {
        let (host, _calls) = setup();
        assert!(host.is_bound("sparkRelayResult"));
    }

    #[test]
    fn test_submit_dispatches_immediately_without_deps() {
        let (host, calls) = setup();
        let p = calls.submit("1+1", None, Vec::new());

        assert_eq!(p.state(), PromiseState::Pending);
        assert_eq!(host.eval_count(), 1);
        let entry = calls.entry(CallId(0)).unwrap();
        assert!(entry.is_dispatched());
        assert!(entry.scheduled_time.is_some());
        assert!(entry.timeout_if_not_scheduled().is_none());
        assert!(entry.timeout_if_not_finished().is_some());
    }

    #[test]
    fn test_success_fulfills() {
        let (host, calls) = setup();
        let p = calls.submit("1+1", None, Vec::new());
        report(&host, "success", 0, json!(2));

        assert_eq!(p.value(), Some(json!(2)));
        assert_eq!(calls.pending_count(), 0);
    }

    #[test]
    fn test_waits_for_dependencies() {
        let (host, calls) = setup();
        let dep = Promise::pending();
        let p = calls.submit("later()", None, vec![dep.clone()]);

        assert!(p.is_unscheduled());
        assert_eq!(host.eval_count(), 0);
        let entry = calls.entry(CallId(0)).unwrap();
        assert!(entry.timeout_if_not_scheduled().is_some());
        assert!(entry.timeout_if_not_finished().is_none());

        dep.fulfill(json!(null));
        assert!(p.is_pending());
        assert_eq!(host.eval_count(), 1);
        assert!(calls.entry(CallId(0)).unwrap().is_dispatched());
    }

    #[test]
    fn test_error_result_rejects_with_message() {
        let (host, calls) = setup();
        let p = calls.submit("x", None, Vec::new());
        report(&host, "error", 0, json!("ReferenceError: x is not defined"));

        assert_eq!(
            p.reason(),
            Some(Rejection::HostRuntime {
                code: "x".to_string(),
                message: "ReferenceError: x is not defined".to_string(),
            })
        );
    }

    #[test]
    fn test_unknown_kind_is_protocol_violation() {
        let (_host, calls) = setup();
        let p = calls.submit("f()", None, Vec::new());
        calls.receive_result("maybe", CallId(0), json!(1)).unwrap();

        let reason = p.reason().unwrap();
        assert_eq!(reason.classification(), "internal_error");
    }

    #[test]
    fn test_unknown_id_is_error() {
        let (_host, calls) = setup();
        assert_eq!(
            calls.receive_result("success", CallId(99), json!(null)),
            Err(RelayError::UnknownCall(CallId(99)))
        );
    }

    #[test]
    fn test_malformed_args() {
        let (_host, calls) = setup();
        assert!(matches!(
            calls.handle_result_args(&[json!(1)]),
            Err(RelayError::MalformedResult(_))
        ));
        assert!(matches!(
            calls.handle_result_args(&[json!("success"), json!("zero")]),
            Err(RelayError::MalformedResult(_))
        ));
    }

    #[test]
    fn test_never_scheduled_timeout() {
        let (host, calls) = setup();
        let dep = Promise::pending();
        let p = calls.submit("stuck()", None, vec![dep.clone()]);

        assert_eq!(calls.sweep_timeouts(Instant::now()), 0);
        let later = Instant::now() + Duration::from_millis(600);
        assert_eq!(calls.sweep_timeouts(later), 1);

        assert_eq!(
            p.reason(),
            Some(Rejection::NeverScheduled {
                id: CallId(0),
                code: "stuck()".to_string(),
            })
        );

        // Dependency resolving afterwards changes nothing
        dep.fulfill(json!(null));
        assert!(p.is_rejected());
        assert_eq!(host.eval_count(), 0);
    }

    #[test]
    fn test_not_finished_timeout_and_late_arrival() {
        let (host, calls) = setup();
        let p = calls.submit("slow()", Some(Duration::from_millis(50)), Vec::new());

        let later = Instant::now() + Duration::from_millis(100);
        assert_eq!(calls.sweep_timeouts(later), 1);
        assert_eq!(
            p.reason(),
            Some(Rejection::TimedOut {
                id: CallId(0),
                code: "slow()".to_string(),
            })
        );

        // Late arrival is discarded, not an error
        assert_eq!(calls.receive_result("success", CallId(0), json!(1)), Ok(()));
        report(&host, "success", 0, json!(1));
        assert!(p.is_rejected());
    }

    #[test]
    fn test_dependency_rejection_drops_entry() {
        let (_host, calls) = setup();
        let dep = Promise::pending();
        let p = calls.submit("never()", None, vec![dep.clone()]);
        assert_eq!(calls.pending_count(), 1);

        dep.reject(Rejection::failed("dep failed"));
        assert_eq!(p.reason(), Some(Rejection::ParentRejected));
        assert_eq!(calls.pending_count(), 0);

        let later = Instant::now() + Duration::from_secs(5);
        assert_eq!(calls.sweep_timeouts(later), 0);
    }

    #[test]
    fn test_ids_are_serial() {
        let (_host, calls) = setup();
        calls.submit("a", None, Vec::new());
        calls.submit("b", None, Vec::new());
        calls.submit("c", None, Vec::new());
        assert_eq!(calls.pending_ids(), vec![CallId(0), CallId(1), CallId(2)]);
        assert_eq!(calls.next_id(), CallId(3));
    }

    #[test]
    fn test_exactly_one_deadline() {
        let (_host, calls) = setup();
        let dep = Promise::pending();
        calls.submit("a", None, vec![dep.clone()]);
        calls.submit("b", None, Vec::new());

        for id in calls.pending_ids() {
            let entry = calls.entry(id).unwrap();
            assert!(
                entry.timeout_if_not_scheduled().is_some() ^ entry.timeout_if_not_finished().is_some()
            );
        }
    }

    #[test]
    fn test_host_refusal_rejects() {
        let (host, calls) = setup();
        host.close();
        let p = calls.submit("a", None, Vec::new());
        assert_eq!(p.reason(), Some(Rejection::Host(HostError::Closed)));
        assert_eq!(calls.pending_count(), 0);
    }

    #[test]
    fn test_bind_and_init_after_start() {
        let (host, calls) = setup();
        calls
            .periodic("tick", Duration::from_millis(100), |_| {})
            .unwrap();
        assert!(host.is_bound("tick"));
        assert_eq!(host.init_scripts().len(), 1);

        calls.start().unwrap();
        assert_eq!(
            calls.bind("late", |_| {}),
            Err(RelayError::BindAfterRun("late".to_string()))
        );
        assert_eq!(calls.init_code("x()"), Err(RelayError::InitAfterRun));
    }

    #[test]
    fn test_eval_eventually_requires_running() {
        let (host, calls) = setup();
        assert_eq!(calls.eval_eventually("a()"), Err(RelayError::NotRunning));
        calls.start().unwrap();
        calls.eval_eventually("a()").unwrap();
        assert_eq!(host.evals(), vec!["a()".to_string()]);
    }

    #[test]
    fn test_huge_timeout_does_not_overflow() {
        let (host, calls) = setup();
        let p = calls.submit("forever()", Some(Duration::MAX), Vec::new());

        assert!(p.is_pending());
        assert_eq!(host.eval_count(), 1);
        assert!(calls.entry(CallId(0)).unwrap().is_dispatched());

        let later = Instant::now() + Duration::from_secs(3600);
        assert_eq!(calls.sweep_timeouts(later), 0);
        report(&host, "success", 0, json!("done"));
        assert_eq!(p.value(), Some(json!("done")));
    }

    #[test]
    fn test_huge_schedule_window_does_not_overflow() {
        let host = MemoryHost::new();
        let config = RelayConfig {
            schedule_window_ms: u64::MAX,
            ..RelayConfig::default()
        };
        let calls = CallLayer::new(host, config).unwrap();
        let dep = Promise::pending();
        let p = calls.submit("later()", None, vec![dep.clone()]);

        assert!(p.is_unscheduled());
        assert!(calls.entry(CallId(0)).unwrap().timeout_if_not_scheduled().is_some());
        dep.fulfill(json!(null));
        assert!(p.is_pending());
    }

    #[test]
    fn test_abandoned_ids_pruned_after_grace() {
        let (_host, calls) = setup();
        for i in 0..100 {
            calls.submit(format!("c{i}()"), None, Vec::new());
        }

        let expired_at = Instant::now() + Duration::from_secs(10);
        assert_eq!(calls.sweep_timeouts(expired_at), 100);
        assert_eq!(calls.pending_count(), 0);
        assert_eq!(calls.abandoned_count(), 100);

        // Still inside the window: late reports are quietly dropped
        assert_eq!(calls.receive_result("success", CallId(3), json!(1)), Ok(()));
        assert_eq!(calls.abandoned_count(), 99);

        let grace = calls.config().late_result_grace();
        calls.sweep_timeouts(expired_at + grace);
        assert_eq!(calls.abandoned_count(), 0);
        assert_eq!(
            calls.receive_result("success", CallId(4), json!(1)),
            Err(RelayError::UnknownCall(CallId(4)))
        );
    }

    #[test]
    fn test_report_after_stop_is_late_arrival() {
        let (host, calls) = setup();
        let sent = calls.submit("sent()", None, Vec::new());
        let dep = Promise::pending();
        let _held = calls.submit("held()", None, vec![dep]);
        calls.stop();

        assert_eq!(sent.reason(), Some(Rejection::Host(HostError::Closed)));
        assert_eq!(calls.abandoned_count(), 1);
        assert_eq!(calls.receive_result("success", CallId(0), json!(1)), Ok(()));
        assert_eq!(
            calls.receive_result("success", CallId(1), json!(1)),
            Err(RelayError::UnknownCall(CallId(1)))
        );
        assert_eq!(host.eval_count(), 1);
    }

    #[test]
    fn test_stop_rejects_pending() {
        let (_host, calls) = setup();
        let p = calls.submit("a", None, Vec::new());
        calls.stop();

        assert_eq!(p.reason(), Some(Rejection::Host(HostError::Closed)));
        let q = calls.submit("b", None, Vec::new());
        assert!(q.is_rejected());
        assert_eq!(calls.start(), Err(RelayError::Destroyed));
    }
}
