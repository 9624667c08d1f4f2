//! Runtime Configuration
//!
//! Settings for one [`Runtime`](crate::Runtime). Every field has a default,
//! so a config can be built in code, deserialized from a partial JSON object,
//! or simply left as `RuntimeConfig::default()`.

use serde::{Deserialize, Serialize};

/// Default cap on effect notifications within a single flush.
pub const DEFAULT_MAX_FLUSH_NOTIFICATIONS: usize = 100_000;

/// Configuration for a reactive runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Name attached to every tracing event emitted by the runtime.
    pub label: Option<String>,

    /// Upper bound on `notify()` calls in one flush.
    /// Exceeding it aborts the flush with
    /// [`Error::FlushLimitExceeded`](crate::Error::FlushLimitExceeded).
    pub max_flush_notifications: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            label: None,
            max_flush_notifications: DEFAULT_MAX_FLUSH_NOTIFICATIONS,
        }
    }
}

impl RuntimeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the tracing label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Set the flush notification cap.
    pub fn with_max_flush_notifications(mut self, limit: usize) -> Self {
        self.max_flush_notifications = limit;
        self
    }

    /// Deserialize from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Serialize to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub(crate) fn display_label(&self) -> &str {
        self.label.as_deref().unwrap_or("default")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = RuntimeConfig::default();
        assert_eq!(config.label, None);
        assert_eq!(config.max_flush_notifications, DEFAULT_MAX_FLUSH_NOTIFICATIONS);
        assert_eq!(config.display_label(), "default");
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config = RuntimeConfig::from_json(r#"{"label": "ui"}"#).unwrap();
        assert_eq!(config.label.as_deref(), Some("ui"));
        assert_eq!(config.max_flush_notifications, DEFAULT_MAX_FLUSH_NOTIFICATIONS);
    }

    #[test]
    fn json_round_trip() {
        let config = RuntimeConfig::new()
            .with_label("worker")
            .with_max_flush_notifications(50);
        let parsed = RuntimeConfig::from_json(&config.to_json().unwrap()).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn rejects_wrong_types() {
        assert!(RuntimeConfig::from_json(r#"{"max_flush_notifications": "many"}"#).is_err());
    }
}
