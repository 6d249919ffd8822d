//! Promise Module - Dependency-gated eventual values
//!
//! - **Eventual** - The `Promise` state machine, handlers, executors, adoption
//! - **Wait** - `IntoFuture` adapter for awaiting a promise from a task

mod eventual;
mod wait;

pub use eventual::{Executor, Promise, PromiseState, Scheduler};
pub use wait::Settled;
