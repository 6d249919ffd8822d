//! # spark-relay
//!
//! Promise-driven coordination core for GUI toolkits rendered by an embedded,
//! single-threaded web engine.
//!
//! The engine can only be driven with fire-and-forget script injection, and
//! results come back later through an out-of-band callback. spark-relay puts
//! an ordered, timeout-guarded, at-most-one-batch-in-flight layer on top.
//!
//! ## Architecture
//!
//! ```text
//! model mutation → EventHub → Reconciler (batch) → CallLayer (id + deadlines)
//!        ↑                                                ↓ eval
//!   heartbeat ← RenderHost ← correlated result callback ←─┘
//! ```
//!
//! Everything is single-threaded: handles are `Rc`-shared and waiting on a
//! [`Promise`] means registering a handler (or `.await`ing it from a local
//! executor).
//!
//! ## Modules
//!
//! - [`promise`] - Dependency-gated eventual values
//! - [`bridge`] - Render host contract and the correlated call layer
//! - [`reconcile`] - Change batching and element handles
//! - [`hub`] - Publish/subscribe event routing
//! - [`session`] - Wiring and lifecycle for one application run

pub mod bridge;
pub mod config;
pub mod error;
pub mod hub;
pub mod promise;
pub mod reconcile;
pub mod session;
pub mod types;

// Re-export commonly used items
pub use types::*;

pub use bridge::{CallEntry, CallLayer, Deadline, HostCallback, MemoryHost, RenderHost};
pub use config::RelayConfig;
pub use error::{HostError, Rejection, RelayError, Result};
pub use hub::{EventHub, Handler, Subscription};
pub use promise::{Promise, PromiseState, Settled};
pub use reconcile::{ElementHandle, Reconciler};
pub use session::{Phase, Session};
