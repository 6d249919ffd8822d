//! Hub Module - Event routing between the model layer and the render layer
//!
//! - **Registry** - `EventHub`: four-tier wildcard dispatch, every/next-once
//!   recurring events, removable subscriptions

mod registry;

pub use registry::{EventHub, Handler, Subscription};
