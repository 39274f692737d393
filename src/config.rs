//! View configuration.

use serde::{Deserialize, Serialize};

use crate::error::{ViewError, ViewResult};

/// Tunables shared by every view built from a controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewConfig {
    /// Per-subscription event queue capacity. Events produced while the
    /// queue is full are dropped.
    pub event_capacity: usize,
    /// Prefix for worker thread names.
    pub thread_prefix: String,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            event_capacity: 100,
            thread_prefix: "kview".to_string(),
        }
    }
}

impl ViewConfig {
    /// Parse a configuration from JSON. Missing fields take their defaults.
    ///
    /// # Errors
    /// Returns `InvalidConfig` if the document does not parse or fails
    /// [`ViewConfig::validate`].
    pub fn from_json(s: &str) -> ViewResult<Self> {
        let cfg: Self = serde_json::from_str(s).map_err(|e| ViewError::InvalidConfig {
            reason: format!("invalid view config: {e}"),
        })?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject configurations no view can run with.
    ///
    /// # Errors
    /// Returns `InvalidConfig` for a zero capacity or an empty thread prefix.
    pub fn validate(&self) -> ViewResult<()> {
        if self.event_capacity == 0 {
            return Err(ViewError::InvalidConfig {
                reason: "event_capacity must be at least 1".to_string(),
            });
        }
        if self.thread_prefix.trim().is_empty() {
            return Err(ViewError::InvalidConfig {
                reason: "thread_prefix cannot be empty".to_string(),
            });
        }
        Ok(())
    }

    pub(crate) fn capacity(&self) -> usize {
        self.event_capacity.max(1)
    }

    pub(crate) fn thread_name(&self, role: &str) -> String {
        format!("{}-{role}", self.thread_prefix)
    }
}
