//! Error types for kview.
//!
//! All errors are strongly typed using thiserror so callers can match on
//! the specific failure (a closed view versus a failed cache read).

use thiserror::Error;

/// Top-level error type for kview.
#[derive(Debug, Error)]
pub enum ViewError {
    /// Reading a local cache failed (e.g. a poisoned lock).
    #[error("Cache read failed: {message}")]
    CacheRead {
        /// What went wrong.
        message: String,
    },

    /// The view or subscription has already been closed.
    #[error("Subscription closed: {path}")]
    Closed {
        /// Component that was closed.
        path: String,
    },

    /// A worker channel was disconnected.
    #[error("Channel disconnected: {path}")]
    Disconnected {
        /// Channel that was disconnected.
        path: String,
    },

    /// Spawning a worker thread failed.
    #[error("Failed to spawn {name} worker: {source}")]
    Spawn {
        /// Thread name.
        name: String,
        /// Underlying OS error.
        #[source]
        source: std::io::Error,
    },

    /// Configuration was rejected.
    #[error("Invalid configuration: {reason}")]
    InvalidConfig {
        /// Why it was rejected.
        reason: String,
    },

    /// Internal invariant violation.
    #[error("Internal error: {message}")]
    Internal {
        /// What went wrong.
        message: String,
    },
}

impl ViewError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    pub(crate) fn closed(path: impl Into<String>) -> Self {
        Self::Closed { path: path.into() }
    }

    pub(crate) fn disconnected(path: impl Into<String>) -> Self {
        Self::Disconnected { path: path.into() }
    }

    /// Returns true if the error means the view is gone for good.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        matches!(self, Self::Closed { .. } | Self::Disconnected { .. })
    }

    /// Returns true if this error is retryable.
    ///
    /// Only spawn failures are; everything else reflects a view that is
    /// closed or inconsistent and must be rebuilt.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Spawn { .. })
    }
}

/// Result type alias for kview operations.
pub type ViewResult<T> = Result<T, ViewError>;
