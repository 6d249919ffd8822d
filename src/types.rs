//! Core types for spark-relay.
//!
//! Small value types shared by the promise, bridge, reconcile and hub modules.

use std::fmt;

/// Values crossing the render-host boundary.
///
/// Hosts serialize script results as JSON, so every eventual value is a
/// `serde_json::Value`.
pub use serde_json::Value;

// =============================================================================
// Call identifiers
// =============================================================================

/// Serial id of one correlated call. Monotonically increasing per call layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CallId(pub u64);

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// Result kinds
// =============================================================================

/// Kind tag the host attaches to a correlated result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResultKind {
    Success,
    Error,
    /// Anything the correlation protocol does not define.
    Other(String),
}

impl ResultKind {
    pub fn parse(kind: &str) -> Self {
        match kind {
            "success" => Self::Success,
            "error" => Self::Error,
            other => Self::Other(other.to_string()),
        }
    }
}

// =============================================================================
// Event keys
// =============================================================================

/// Top-level event category.
///
/// `Display` carries lifecycle and render events (init, run, destroy, redraw,
/// heartbeat). `Model` carries widget/model events coming from the
/// application layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    Display,
    Model,
}

/// Subscription key that either names one value or matches every value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Match<T> {
    Exact(T),
    Any,
}

impl<T> Match<T> {
    pub fn is_any(&self) -> bool {
        matches!(self, Self::Any)
    }
}

impl From<&str> for Match<String> {
    fn from(value: &str) -> Self {
        Self::Exact(value.to_string())
    }
}

impl From<String> for Match<String> {
    fn from(value: String) -> Self {
        Self::Exact(value)
    }
}

/// Anything usable as a name or target pattern when subscribing.
pub trait IntoMatch {
    fn into_match(self) -> Match<String>;
}

impl IntoMatch for Match<String> {
    fn into_match(self) -> Match<String> {
        self
    }
}

impl IntoMatch for &str {
    fn into_match(self) -> Match<String> {
        self.into()
    }
}

impl IntoMatch for String {
    fn into_match(self) -> Match<String> {
        self.into()
    }
}

/// Recurring display events that carry "every" and "next-once" handler sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Recurring {
    Heartbeat,
    Redraw,
}

impl Recurring {
    /// Event name the recurring event is dispatched under.
    pub fn event_name(self) -> &'static str {
        match self {
            Self::Heartbeat => "heartbeat",
            Self::Redraw => "redraw",
        }
    }
}

/// Lifecycle event names dispatched by the session.
pub mod lifecycle {
    pub const INIT: &str = "init";
    pub const RUN: &str = "run";
    pub const DESTROY: &str = "destroy";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_kind_parse() {
        assert_eq!(ResultKind::parse("success"), ResultKind::Success);
        assert_eq!(ResultKind::parse("error"), ResultKind::Error);
        assert_eq!(
            ResultKind::parse("weird"),
            ResultKind::Other("weird".to_string())
        );
    }

    #[test]
    fn test_match_from_str() {
        let m: Match<String> = "click".into();
        assert_eq!(m, Match::Exact("click".to_string()));
        assert!(!m.is_any());
        assert!(Match::<String>::Any.is_any());
        assert_eq!("btn".into_match(), Match::Exact("btn".to_string()));
    }
}
