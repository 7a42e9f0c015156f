//! Registry Configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Tunables for a [`Registry`](crate::registry::Registry).
///
/// All fields have defaults, so a partial JSON document is enough:
///
/// ```rust,ignore
/// let config = RegistryConfig::from_json(r#"{"await_timeout_ms": 1000}"#)?;
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Default timeout for `await_mounted`, in milliseconds.
    pub await_timeout_ms: u64,

    /// Readiness events are named `<prefix><component>`.
    pub ready_event_prefix: String,

    /// Failure notices are named `<prefix><component>`.
    pub failed_event_prefix: String,

    /// Attribute set on tracked containers. `None` leaves the DOM untouched.
    pub marker_attribute: Option<String>,

    /// Selector for the script tags that declare components.
    pub script_selector: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            await_timeout_ms: 300,
            ready_event_prefix: "mounted-".to_string(),
            failed_event_prefix: "mount-failed-".to_string(),
            marker_attribute: Some("data-tct".to_string()),
            script_selector: "script[data-component]".to_string(),
        }
    }
}

impl RegistryConfig {
    /// Parse a configuration from a JSON string.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// The default rendezvous timeout.
    pub fn await_timeout(&self) -> Duration {
        Duration::from_millis(self.await_timeout_ms)
    }

    /// Name of the readiness event for a component.
    pub fn ready_event(&self, component: &str) -> String {
        format!("{}{}", self.ready_event_prefix, component)
    }

    /// Name of the failure notice for a component.
    pub fn failed_event(&self, component: &str) -> String {
        format!("{}{}", self.failed_event_prefix, component)
    }
}
