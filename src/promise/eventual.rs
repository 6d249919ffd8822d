//! Promise - dependency-gated eventual value
//!
//! A `Promise` is a single-assignment, multi-observer value that becomes
//! available "eventually". It may depend on parent promises and only
//! schedules itself once every parent is fulfilled.
//!
//! # States
//!
//! ```text
//! Unscheduled --(all parents fulfilled)--> Pending --> Fulfilled
//!      |                                      |
//!      +--(a parent rejected)--> Rejected <---+
//! ```
//!
//! Fulfilled and Rejected are terminal. Changing a terminal state panics;
//! repeating the same terminal outcome is a no-op.
//!
//! # Example
//!
//! ```ignore
//! use spark_relay::Promise;
//! use serde_json::json;
//!
//! let parent = Promise::pending();
//! let child = parent.map(|v| Ok(json!(v.as_i64().unwrap_or(0) * 2)));
//!
//! parent.fulfill(json!(21));
//! assert_eq!(child.value(), Some(json!(42)));
//! ```

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::mem;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

use crate::error::Rejection;
use crate::types::Value;

// =============================================================================
// TYPES
// =============================================================================

/// Lifecycle state of a promise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromiseState {
    /// Waiting for parents.
    Unscheduled,
    /// Scheduled; waiting for someone to fulfill or reject it.
    Pending,
    /// Settled with a value. Terminal.
    Fulfilled,
    /// Settled with a rejection reason. Terminal.
    Rejected,
}

impl PromiseState {
    /// Fulfilled or rejected.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Fulfilled | Self::Rejected)
    }
}

impl fmt::Display for PromiseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Unscheduled => "unscheduled",
            Self::Pending => "pending",
            Self::Fulfilled => "fulfilled",
            Self::Rejected => "rejected",
        })
    }
}

/// Runs once at Unscheduled -> Pending with the parents' values.
pub type Scheduler = Box<dyn FnOnce(&[Value]) -> Result<(), Rejection>>;

/// Runs once at Pending; its result settles the promise.
pub type Executor = Box<dyn FnOnce(&[Value]) -> Result<Value, Rejection>>;

type FulfilledHandler = Box<dyn FnOnce(&Value)>;
type RejectedHandler = Box<dyn FnOnce(&Rejection)>;
type ScheduledHandler = Box<dyn FnOnce()>;

struct Inner {
    state: PromiseState,
    parents: Vec<Promise>,
    value: Option<Value>,
    reason: Option<Rejection>,
    /// Set once the promise has passed through Pending (or was fulfilled
    /// while unscheduled).
    scheduled: bool,
    on_fulfilled: Vec<FulfilledHandler>,
    on_rejected: Vec<RejectedHandler>,
    on_scheduled: Vec<ScheduledHandler>,
    scheduler: Option<Scheduler>,
    executor: Option<Executor>,
}

impl Inner {
    fn new(parents: Vec<Promise>, scheduler: Option<Scheduler>) -> Self {
        Self {
            state: PromiseState::Unscheduled,
            parents,
            value: None,
            reason: None,
            scheduled: false,
            on_fulfilled: Vec::new(),
            on_rejected: Vec::new(),
            on_scheduled: Vec::new(),
            scheduler,
            executor: None,
        }
    }
}

/// Shared handle to an eventual value. Cloning shares the same promise.
#[derive(Clone)]
pub struct Promise {
    inner: Rc<RefCell<Inner>>,
}

// =============================================================================
// CONSTRUCTION
// =============================================================================

impl Promise {
    /// Promise gated on `parents`, with no scheduler.
    ///
    /// With no parents the promise is Pending immediately.
    pub fn new(parents: Vec<Promise>) -> Self {
        Self::build(parents, None)
    }

    /// Pending promise with no parents, settled later by its owner.
    pub fn pending() -> Self {
        Self::build(Vec::new(), None)
    }

    /// Promise gated on `parents` whose scheduler runs once they are all
    /// fulfilled. A scheduler error or panic rejects the promise.
    pub fn with_scheduler<F>(parents: Vec<Promise>, scheduler: F) -> Self
    where
        F: FnOnce(&[Value]) -> Result<(), Rejection> + 'static,
    {
        Self::build(parents, Some(Box::new(scheduler)))
    }

    /// Already-fulfilled promise.
    pub fn fulfilled(value: Value) -> Self {
        let mut inner = Inner::new(Vec::new(), None);
        inner.state = PromiseState::Fulfilled;
        inner.scheduled = true;
        inner.value = Some(value);
        Self::from_inner(inner)
    }

    /// Already-rejected promise.
    pub fn rejected(reason: Rejection) -> Self {
        let mut inner = Inner::new(Vec::new(), None);
        inner.state = PromiseState::Rejected;
        inner.reason = Some(reason);
        Self::from_inner(inner)
    }

    fn from_inner(inner: Inner) -> Self {
        Self {
            inner: Rc::new(RefCell::new(inner)),
        }
    }

    fn build(parents: Vec<Promise>, scheduler: Option<Scheduler>) -> Self {
        let promise = Self::from_inner(Inner::new(parents.clone(), scheduler));

        if parents.iter().any(Promise::is_rejected) {
            promise.reject(Rejection::ParentRejected);
            return promise;
        }

        let incomplete: Vec<&Promise> = parents.iter().filter(|p| !p.is_fulfilled()).collect();
        if incomplete.is_empty() {
            promise.schedule();
            return promise;
        }

        for parent in incomplete {
            let child = promise.clone();
            parent.on_fulfilled(move |_| child.parent_fulfilled());
            let child = promise.clone();
            parent.on_rejected(move |_| child.parent_rejected());
        }
        promise
    }
}

// =============================================================================
// STATE QUERIES
// =============================================================================

impl Promise {
    /// Current lifecycle state.
    pub fn state(&self) -> PromiseState {
        self.inner.borrow().state
    }

    pub fn is_fulfilled(&self) -> bool {
        self.state() == PromiseState::Fulfilled
    }

    pub fn is_rejected(&self) -> bool {
        self.state() == PromiseState::Rejected
    }

    pub fn is_pending(&self) -> bool {
        self.state() == PromiseState::Pending
    }

    pub fn is_unscheduled(&self) -> bool {
        self.state() == PromiseState::Unscheduled
    }

    /// Fulfilled or rejected.
    pub fn is_complete(&self) -> bool {
        self.state().is_terminal()
    }

    /// The fulfilled value, if any.
    pub fn value(&self) -> Option<Value> {
        self.inner.borrow().value.clone()
    }

    /// The rejection reason, if any.
    pub fn reason(&self) -> Option<Rejection> {
        self.inner.borrow().reason.clone()
    }

    /// Whether both handles point at the same promise.
    pub fn ptr_eq(&self, other: &Promise) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

// =============================================================================
// TRANSITIONS
// =============================================================================

impl Promise {
    /// Fulfill with `value`.
    ///
    /// Fulfilling while still Unscheduled is allowed: scheduling is treated
    /// as having happened, the scheduler and executor are discarded.
    ///
    /// # Panics
    ///
    /// If the promise is rejected, or fulfilled with a different value.
    pub fn fulfill(&self, value: Value) {
        let (scheduled_handlers, handlers) = {
            let mut inner = self.inner.borrow_mut();
            match inner.state {
                PromiseState::Fulfilled => {
                    if inner.value.as_ref() == Some(&value) {
                        return;
                    }
                    panic!(
                        "promise already fulfilled with {:?}, cannot fulfill with {:?}",
                        inner.value, value
                    );
                }
                PromiseState::Rejected => {
                    panic!(
                        "promise already rejected ({:?}), cannot fulfill with {:?}",
                        inner.reason, value
                    );
                }
                PromiseState::Unscheduled | PromiseState::Pending => {}
            }

            let scheduled_handlers = if inner.scheduled {
                Vec::new()
            } else {
                inner.scheduled = true;
                mem::take(&mut inner.on_scheduled)
            };
            inner.state = PromiseState::Fulfilled;
            inner.value = Some(value.clone());
            inner.on_rejected.clear();
            inner.on_scheduled.clear();
            inner.scheduler = None;
            inner.executor = None;
            inner.parents.clear();
            (scheduled_handlers, mem::take(&mut inner.on_fulfilled))
        };

        for handler in scheduled_handlers {
            handler();
        }
        for handler in handlers {
            handler(&value);
        }
    }

    /// Reject with `reason`.
    ///
    /// # Panics
    ///
    /// If the promise is fulfilled, or rejected with a different reason.
    pub fn reject(&self, reason: Rejection) {
        let handlers = {
            let mut inner = self.inner.borrow_mut();
            match inner.state {
                PromiseState::Rejected => {
                    if inner.reason.as_ref() == Some(&reason) {
                        return;
                    }
                    panic!(
                        "promise already rejected with {:?}, cannot reject with {:?}",
                        inner.reason, reason
                    );
                }
                PromiseState::Fulfilled => {
                    panic!(
                        "promise already fulfilled ({:?}), cannot reject with {:?}",
                        inner.value, reason
                    );
                }
                PromiseState::Unscheduled | PromiseState::Pending => {}
            }

            inner.state = PromiseState::Rejected;
            inner.reason = Some(reason.clone());
            inner.on_fulfilled.clear();
            inner.on_scheduled.clear();
            inner.scheduler = None;
            inner.executor = None;
            inner.parents.clear();
            mem::take(&mut inner.on_rejected)
        };

        for handler in handlers {
            handler(&reason);
        }
    }

    /// Settle this promise with whatever `other` settles with.
    ///
    /// If this promise is already complete by then, the outcome is dropped.
    pub fn adopt(&self, other: &Promise) {
        let target = self.clone();
        other.on_fulfilled(move |value| {
            if !target.is_complete() {
                target.fulfill(value.clone());
            }
        });
        let target = self.clone();
        other.on_rejected(move |reason| {
            if !target.is_complete() {
                target.reject(reason.clone());
            }
        });
    }

    fn parent_fulfilled(&self) {
        let ready = {
            let inner = self.inner.borrow();
            inner.state == PromiseState::Unscheduled && inner.parents.iter().all(Promise::is_fulfilled)
        };
        if ready {
            self.schedule();
        }
    }

    fn parent_rejected(&self) {
        if self.is_unscheduled() {
            self.reject(Rejection::ParentRejected);
        }
    }

    fn parent_values(&self) -> Vec<Value> {
        let parents = self.inner.borrow().parents.clone();
        parents
            .iter()
            .map(|p| p.value().unwrap_or(Value::Null))
            .collect()
    }

    /// Unscheduled -> Pending: fire on_scheduled handlers, then the
    /// scheduler, then the executor.
    fn schedule(&self) {
        let handlers = {
            let mut inner = self.inner.borrow_mut();
            if inner.state != PromiseState::Unscheduled {
                return;
            }
            inner.state = PromiseState::Pending;
            inner.scheduled = true;
            mem::take(&mut inner.on_scheduled)
        };

        for handler in handlers {
            handler();
        }

        let scheduler = {
            let mut inner = self.inner.borrow_mut();
            if inner.state != PromiseState::Pending {
                return;
            }
            inner.scheduler.take()
        };
        if let Some(scheduler) = scheduler {
            let values = self.parent_values();
            if let Err(reason) = guarded(move || scheduler(values.as_slice())) {
                if !self.is_complete() {
                    self.reject(reason);
                }
                return;
            }
        }

        self.run_executor();
    }

    fn run_executor(&self) {
        let executor = {
            let mut inner = self.inner.borrow_mut();
            if inner.state != PromiseState::Pending {
                return;
            }
            inner.executor.take()
        };
        let Some(executor) = executor else {
            return;
        };

        let values = self.parent_values();
        let outcome = guarded(move || executor(values.as_slice()));
        if self.is_complete() {
            return;
        }
        match outcome {
            Ok(value) => self.fulfill(value),
            Err(reason) => self.reject(reason),
        }
    }
}

// =============================================================================
// OBSERVERS
// =============================================================================

impl Promise {
    /// Run `handler` with the value once fulfilled. Fires immediately if
    /// already fulfilled; dropped if rejected.
    pub fn on_fulfilled<F>(&self, handler: F) -> &Self
    where
        F: FnOnce(&Value) + 'static,
    {
        let value = {
            let mut inner = self.inner.borrow_mut();
            match inner.state {
                PromiseState::Fulfilled => inner.value.clone().unwrap_or(Value::Null),
                PromiseState::Rejected => return self,
                PromiseState::Unscheduled | PromiseState::Pending => {
                    inner.on_fulfilled.push(Box::new(handler));
                    return self;
                }
            }
        };
        handler(&value);
        self
    }

    /// Run `handler` with the reason once rejected. Fires immediately if
    /// already rejected; dropped if fulfilled.
    pub fn on_rejected<F>(&self, handler: F) -> &Self
    where
        F: FnOnce(&Rejection) + 'static,
    {
        let reason = {
            let mut inner = self.inner.borrow_mut();
            match inner.state {
                PromiseState::Rejected => match inner.reason.clone() {
                    Some(reason) => reason,
                    None => return self,
                },
                PromiseState::Fulfilled => return self,
                PromiseState::Unscheduled | PromiseState::Pending => {
                    inner.on_rejected.push(Box::new(handler));
                    return self;
                }
            }
        };
        handler(&reason);
        self
    }

    /// Run `handler` once the promise is scheduled. Fires immediately if it
    /// already was; dropped if it was rejected without ever scheduling.
    pub fn on_scheduled<F>(&self, handler: F) -> &Self
    where
        F: FnOnce() + 'static,
    {
        {
            let mut inner = self.inner.borrow_mut();
            if !inner.scheduled {
                if inner.state != PromiseState::Rejected {
                    inner.on_scheduled.push(Box::new(handler));
                }
                return self;
            }
        }
        handler();
        self
    }

    /// Register a synchronous executor run once the promise is Pending.
    /// Its result fulfills or rejects the promise.
    ///
    /// A no-op on a rejected promise.
    ///
    /// # Panics
    ///
    /// If the promise is already fulfilled (the executor could never run) or
    /// already has an executor.
    pub fn to_execute<F>(&self, executor: F) -> &Self
    where
        F: FnOnce(&[Value]) -> Result<Value, Rejection> + 'static,
    {
        let run_now = {
            let mut inner = self.inner.borrow_mut();
            match inner.state {
                PromiseState::Fulfilled => {
                    panic!("cannot add an executor to a fulfilled promise, it would never run")
                }
                PromiseState::Rejected => return self,
                PromiseState::Unscheduled | PromiseState::Pending => {
                    if inner.executor.is_some() {
                        panic!("promise already has an executor");
                    }
                    inner.executor = Some(Box::new(executor));
                    inner.state == PromiseState::Pending
                }
            }
        };
        if run_now {
            self.run_executor();
        }
        self
    }

    /// New promise whose sole parent is `self` and whose scheduler is
    /// `scheduler`.
    pub fn then<F>(&self, scheduler: F) -> Promise
    where
        F: FnOnce(&[Value]) -> Result<(), Rejection> + 'static,
    {
        Promise::with_scheduler(vec![self.clone()], scheduler)
    }

    /// New promise fulfilled with `f` applied to this promise's value.
    pub fn map<F>(&self, f: F) -> Promise
    where
        F: FnOnce(&Value) -> Result<Value, Rejection> + 'static,
    {
        let child = Promise::new(vec![self.clone()]);
        child.to_execute(move |values| f(values.first().unwrap_or(&Value::Null)));
        child
    }
}

impl fmt::Debug for Promise {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("Promise")
            .field("state", &inner.state)
            .field("parents", &inner.parents.len())
            .field("value", &inner.value)
            .field("reason", &inner.reason)
            .finish()
    }
}

// =============================================================================
// PANIC GUARD
// =============================================================================

/// Run a user closure, turning a panic into a rejection.
fn guarded<T>(f: impl FnOnce() -> Result<T, Rejection>) -> Result<T, Rejection> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => Err(Rejection::Panicked(panic_message(payload.as_ref()))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

// =============================================================================
// TESTS
// =============================================================================
