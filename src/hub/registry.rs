//! Event Hub - Publish/subscribe registry between the model and render layers
//!
//! Handlers are keyed by `(event type, event name, target)`. Name and target
//! may be `Match::Any` when subscribing; dispatch always names a concrete
//! event. A dispatch fires, in order:
//!
//! 1. exact name, exact target
//! 2. exact name, any target
//! 3. any name, exact target
//! 4. any name, any target
//!
//! Recurring display events (heartbeat, redraw) additionally carry a
//! "next-once" set: handlers that fire on the next occurrence only.
//!
//! # Example
//!
//! ```ignore
//! use spark_relay::{EventHub, EventType, Match, Recurring};
//!
//! let hub = EventHub::new();
//!
//! let sub = hub.subscribe(EventType::Model, "click", "button-1", |args| {
//!     println!("clicked: {args:?}");
//! });
//! hub.next(Recurring::Heartbeat, |_| println!("next tick only"));
//!
//! hub.dispatch(EventType::Model, "click", Some("button-1"), &[]);
//! hub.dispatch_recurring(Recurring::Heartbeat, &[]);
//!
//! sub.cancel();
//! ```

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use tracing::trace;

use crate::types::{EventType, IntoMatch, Match, Recurring, Value};

// =============================================================================
// TYPES
// =============================================================================

/// Event handler. Receives the dispatch arguments.
pub type Handler = Rc<dyn Fn(&[Value])>;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct Key {
    event_type: EventType,
    name: Match<String>,
    target: Match<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Slot {
    Keyed(Key),
    Once(Recurring),
}

struct Registry {
    handlers: HashMap<Key, Vec<(usize, Handler)>>,
    once: HashMap<Recurring, Vec<(usize, Handler)>>,
    next_id: usize,
}

impl Registry {
    fn new() -> Self {
        Self {
            handlers: HashMap::new(),
            once: HashMap::new(),
            next_id: 0,
        }
    }

    fn next_id(&mut self) -> usize {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn remove(&mut self, slot: &Slot, id: usize) {
        match slot {
            Slot::Keyed(key) => {
                if let Some(handlers) = self.handlers.get_mut(key) {
                    handlers.retain(|(handler_id, _)| *handler_id != id);
                    if handlers.is_empty() {
                        self.handlers.remove(key);
                    }
                }
            }
            Slot::Once(recurring) => {
                if let Some(handlers) = self.once.get_mut(recurring) {
                    handlers.retain(|(handler_id, _)| *handler_id != id);
                    if handlers.is_empty() {
                        self.once.remove(recurring);
                    }
                }
            }
        }
    }
}

/// Handle for removing a subscription.
pub struct Subscription {
    id: usize,
    slot: Slot,
    registry: Weak<RefCell<Registry>>,
}

impl Subscription {
    /// Remove the handler. A no-op if it already fired (next-once) or the
    /// hub is gone.
    pub fn cancel(self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.borrow_mut().remove(&self.slot, self.id);
        }
    }
}

// =============================================================================
// HUB
// =============================================================================

/// Event hub. Cloning shares the same registry.
#[derive(Clone)]
pub struct EventHub {
    registry: Rc<RefCell<Registry>>,
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new()
    }
}

impl EventHub {
    pub fn new() -> Self {
        Self {
            registry: Rc::new(RefCell::new(Registry::new())),
        }
    }

    /// Subscribe `handler` to `(event_type, name, target)`.
    pub fn subscribe<F>(
        &self,
        event_type: EventType,
        name: impl IntoMatch,
        target: impl IntoMatch,
        handler: F,
    ) -> Subscription
    where
        F: Fn(&[Value]) + 'static,
    {
        let key = Key {
            event_type,
            name: name.into_match(),
            target: target.into_match(),
        };
        let id = {
            let mut reg = self.registry.borrow_mut();
            let id = reg.next_id();
            reg.handlers
                .entry(key.clone())
                .or_default()
                .push((id, Rc::new(handler)));
            id
        };
        Subscription {
            id,
            slot: Slot::Keyed(key),
            registry: Rc::downgrade(&self.registry),
        }
    }

    /// Subscribe to every occurrence of a recurring display event.
    pub fn every<F>(&self, recurring: Recurring, handler: F) -> Subscription
    where
        F: Fn(&[Value]) + 'static,
    {
        self.subscribe(
            EventType::Display,
            recurring.event_name(),
            Match::Any,
            handler,
        )
    }

    /// Subscribe to the next occurrence of a recurring display event only.
    pub fn next<F>(&self, recurring: Recurring, handler: F) -> Subscription
    where
        F: Fn(&[Value]) + 'static,
    {
        let id = {
            let mut reg = self.registry.borrow_mut();
            let id = reg.next_id();
            reg.once
                .entry(recurring)
                .or_default()
                .push((id, Rc::new(handler)));
            id
        };
        Subscription {
            id,
            slot: Slot::Once(recurring),
            registry: Rc::downgrade(&self.registry),
        }
    }

    /// Dispatch a concrete event. Handlers run synchronously, in tier order.
    /// Returns how many handlers ran.
    pub fn dispatch(
        &self,
        event_type: EventType,
        name: &str,
        target: Option<&str>,
        args: &[Value],
    ) -> usize {
        let handlers = self.resolve(event_type, name, target);
        trace!(?event_type, event = name, dispatch_target = ?target, handlers = handlers.len(), "dispatch");
        for handler in &handlers {
            handler(args);
        }
        handlers.len()
    }

    /// Dispatch a recurring display event: every-handlers first, then the
    /// next-once handlers registered before this call, which are removed.
    /// Next-once handlers added while dispatching wait for the following
    /// occurrence.
    pub fn dispatch_recurring(&self, recurring: Recurring, args: &[Value]) -> usize {
        let fired = self.dispatch(EventType::Display, recurring.event_name(), None, args);

        let snapshot: Vec<(usize, Handler)> = self
            .registry
            .borrow()
            .once
            .get(&recurring)
            .cloned()
            .unwrap_or_default();

        for (_, handler) in &snapshot {
            handler(args);
        }

        let mut reg = self.registry.borrow_mut();
        for (id, _) in &snapshot {
            reg.remove(&Slot::Once(recurring), *id);
        }
        fired + snapshot.len()
    }

    /// Copy the matching handlers out so handlers may subscribe or cancel
    /// while the dispatch runs.
    fn resolve(&self, event_type: EventType, name: &str, target: Option<&str>) -> Vec<Handler> {
        let exact_name = Match::Exact(name.to_string());
        let exact_target = target.map(|t| Match::Exact(t.to_string()));

        let mut tiers: Vec<(Match<String>, Match<String>)> = Vec::with_capacity(4);
        if let Some(t) = &exact_target {
            tiers.push((exact_name.clone(), t.clone()));
        }
        tiers.push((exact_name, Match::Any));
        if let Some(t) = exact_target {
            tiers.push((Match::Any, t));
        }
        tiers.push((Match::Any, Match::Any));

        let reg = self.registry.borrow();
        let mut handlers = Vec::new();
        for (name, target) in tiers {
            let key = Key {
                event_type,
                name,
                target,
            };
            if let Some(list) = reg.handlers.get(&key) {
                handlers.extend(list.iter().map(|(_, handler)| handler.clone()));
            }
        }
        handlers
    }

    /// Total handlers registered, next-once included.
    pub fn handler_count(&self) -> usize {
        let reg = self.registry.borrow();
        reg.handlers.values().map(Vec::len).sum::<usize>()
            + reg.once.values().map(Vec::len).sum::<usize>()
    }

    /// Remove every handler.
    pub fn clear(&self) {
        let mut reg = self.registry.borrow_mut();
        reg.handlers.clear();
        reg.once.clear();
    }
}

// =============================================================================
// TESTS
// =============================================================================
