//! Reconcile Module - Turning change requests into host round trips
//!
//! - **Batcher** - `Reconciler`: change queue, one batch in flight, one waiting,
//!   full-replace supersession, fully-updated promises
//! - **Element** - `ElementHandle`: typed change fragments for one element

mod batcher;
mod element;

pub use batcher::Reconciler;
pub use element::ElementHandle;
