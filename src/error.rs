//! Error types.
//!
//! Runtime failures of asynchronous work travel as a [`Rejection`] inside a
//! rejected [`Promise`](crate::Promise). Synchronous API misuse and host
//! failures are reported through [`RelayError`] and [`HostError`].
//! Broken internal invariants panic.

use thiserror::Error;

use crate::types::{CallId, Value};

/// Failure reported synchronously by a render host operation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum HostError {
    /// The host window or engine is gone.
    #[error("render host is closed")]
    Closed,

    /// The name is already bound, or the host refused it.
    #[error("render host rejected binding `{0}`")]
    Binding(String),
}

/// Structured reason carried by a rejected promise.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Rejection {
    /// A parent promise rejected before this one could be scheduled.
    #[error("a dependency was rejected")]
    ParentRejected,

    /// The call's dependencies never resolved inside the schedule window.
    #[error("call {id} was never scheduled: {code}")]
    NeverScheduled { id: CallId, code: String },

    /// The call was dispatched but the host never answered in time.
    #[error("call {id} timed out: {code}")]
    TimedOut { id: CallId, code: String },

    /// The host ran the code and reported an error.
    #[error("host runtime error in `{code}`: {message}")]
    HostRuntime { code: String, message: String },

    /// The host answered with a result kind the protocol does not define.
    #[error("protocol violation: result kind `{kind}` for `{code}` ({value})")]
    Protocol {
        code: String,
        kind: String,
        value: Value,
    },

    /// The host refused the dispatch itself.
    #[error(transparent)]
    Host(#[from] HostError),

    /// A scheduler or executor returned an error.
    #[error("{0}")]
    Failed(String),

    /// A scheduler, executor or handler panicked.
    #[error("panicked: {0}")]
    Panicked(String),
}

impl Rejection {
    /// Short classification string used in logs.
    pub fn classification(&self) -> &'static str {
        match self {
            Self::ParentRejected => "dependency_rejected",
            Self::NeverScheduled { .. } => "never_scheduled",
            Self::TimedOut { .. } => "timed_out",
            Self::HostRuntime { .. } => "host_runtime_error",
            Self::Protocol { .. } => "internal_error",
            Self::Host(_) => "host_error",
            Self::Failed(_) => "failed",
            Self::Panicked(_) => "panicked",
        }
    }

    /// True for the two timeout classes.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::NeverScheduled { .. } | Self::TimedOut { .. })
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

/// Synchronous errors from the call layer and session API.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RelayError {
    #[error("cannot bind `{0}` after the render host is running")]
    BindAfterRun(String),

    #[error("cannot add init code after the render host is running")]
    InitAfterRun,

    #[error("render host is not running")]
    NotRunning,

    #[error("session has been destroyed")]
    Destroyed,

    /// The host reported a result for an id that was never tracked.
    #[error("result for unknown call {0}")]
    UnknownCall(CallId),

    #[error("malformed result arguments: {0}")]
    MalformedResult(String),

    #[error(transparent)]
    Host(#[from] HostError),
}

pub type Result<T, E = RelayError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        let r = Rejection::NeverScheduled {
            id: CallId(3),
            code: "f()".to_string(),
        };
        assert_eq!(r.classification(), "never_scheduled");
        assert!(r.is_timeout());
        assert_eq!(r.to_string(), "call 3 was never scheduled: f()");

        let r = Rejection::HostRuntime {
            code: "x".to_string(),
            message: "ReferenceError: x is not defined".to_string(),
        };
        assert_eq!(r.classification(), "host_runtime_error");
        assert!(!r.is_timeout());
    }

    #[test]
    fn test_host_error_converts() {
        let r: Rejection = HostError::Closed.into();
        assert_eq!(r, Rejection::Host(HostError::Closed));
        assert_eq!(r.to_string(), "render host is closed");
    }
}
