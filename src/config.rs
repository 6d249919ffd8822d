//! Relay configuration.
//!
//! Timeouts, heartbeat period and the names the relay binds inside the
//! render host. Defaults match a desktop webview driven at ~10 ticks/second.

use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Deadline for a submitted call to be dispatched at all.
    pub schedule_window_ms: u64,
    /// Default deadline for a dispatched call to report back.
    pub call_timeout_ms: u64,
    /// Host-side heartbeat period.
    pub heartbeat_interval_ms: u64,
    /// How long a report for a given-up call is still recognized as late.
    pub late_result_grace_ms: u64,
    /// Host function receiving correlated results.
    pub result_binding: String,
    /// Host function the heartbeat interval calls.
    pub heartbeat_binding: String,
    /// Element whose contents a full draw replaces.
    pub root_element_id: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            schedule_window_ms: 500,
            call_timeout_ms: 500,
            heartbeat_interval_ms: 100,
            late_result_grace_ms: 10_000,
            result_binding: "sparkRelayResult".to_string(),
            heartbeat_binding: "sparkRelayHeartbeat".to_string(),
            root_element_id: "spark-root".to_string(),
        }
    }
}

impl RelayConfig {
    /// Loads configuration from environment variables, falling back to
    /// defaults for anything unset or unparsable.
    ///
    /// Read variables: SPARK_RELAY_SCHEDULE_WINDOW_MS, SPARK_RELAY_CALL_TIMEOUT_MS,
    /// SPARK_RELAY_HEARTBEAT_MS, SPARK_RELAY_LATE_GRACE_MS, SPARK_RELAY_ROOT_ID
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(ms) = env_ms("SPARK_RELAY_SCHEDULE_WINDOW_MS") {
            config.schedule_window_ms = ms;
        }
        if let Some(ms) = env_ms("SPARK_RELAY_CALL_TIMEOUT_MS") {
            config.call_timeout_ms = ms;
        }
        if let Some(ms) = env_ms("SPARK_RELAY_HEARTBEAT_MS") {
            config.heartbeat_interval_ms = ms;
        }
        if let Some(ms) = env_ms("SPARK_RELAY_LATE_GRACE_MS") {
            config.late_result_grace_ms = ms;
        }
        if let Ok(root) = std::env::var("SPARK_RELAY_ROOT_ID") {
            config.root_element_id = root;
        }
        config
    }

    /// Parses a JSON document. Missing fields take their defaults.
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    pub fn schedule_window(&self) -> Duration {
        Duration::from_millis(self.schedule_window_ms)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn late_result_grace(&self) -> Duration {
        Duration::from_millis(self.late_result_grace_ms)
    }
}

fn env_ms(name: &str) -> Option<u64> {
    std::env::var(name).ok()?.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RelayConfig::default();
        assert_eq!(config.schedule_window(), Duration::from_millis(500));
        assert_eq!(config.call_timeout(), Duration::from_millis(500));
        assert_eq!(config.heartbeat_interval(), Duration::from_millis(100));
        assert_eq!(config.late_result_grace(), Duration::from_secs(10));
        assert_eq!(config.result_binding, "sparkRelayResult");
    }

    #[test]
    fn test_from_json_partial() {
        let config = RelayConfig::from_json(r#"{"call_timeout_ms": 2000}"#).unwrap();
        assert_eq!(config.call_timeout_ms, 2000);
        assert_eq!(config.schedule_window_ms, 500);
        assert_eq!(config.root_element_id, "spark-root");
    }

    #[test]
    fn test_from_json_rejects_bad_types() {
        assert!(RelayConfig::from_json(r#"{"call_timeout_ms": "soon"}"#).is_err());
    }
}
