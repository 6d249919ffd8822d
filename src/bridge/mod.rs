//! Bridge Module - Everything that talks to the render host
//!
//! - **Host** - The `RenderHost` contract and the in-memory `MemoryHost`
//! - **Calls** - Correlated, promise-returning calls with two timeout classes
//! - **Script** - Host-side script builders (result wrapping, intervals, replace)

mod calls;
mod host;
pub mod script;

pub use calls::{CallEntry, CallLayer, Deadline};
pub use host::{HostCallback, MemoryHost, RenderHost};
