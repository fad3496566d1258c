//! Error types shared across the cache, the binding adapter and remote clients.

use std::sync::Arc;

/// An error delivered by a remote client, either through a subscription's
/// error callback or a failed one-shot fetch.
///
/// Cloneable so a cache entry can hold on to it and replay it to listeners
/// that attach after the failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{code}: {message}")]
pub struct RemoteError {
    /// Machine-readable error code (e.g. `permission-denied`).
    pub code: String,
    /// Human-readable description.
    pub message: String,
}

impl RemoteError {
    /// Create a new remote error.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

/// Errors raised while constructing cache machinery.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CacheError {
    /// Timers need a Tokio runtime and none was entered.
    #[error("no tokio runtime available to drive timers")]
    NoRuntime,
    /// The Tokio runtime was built without `enable_time`.
    #[error("tokio runtime has timers disabled; build it with `enable_time`")]
    TimersDisabled,
}

/// Errors the binding adapter hands back to its host.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BindingError {
    /// The remote client reported an error for a bound reference.
    #[error("remote error for {path}: {source}")]
    Remote {
        /// Display path of the reference that failed.
        path: String,
        /// The error as delivered by the remote client.
        #[source]
        source: Arc<RemoteError>,
    },
}

impl BindingError {
    /// The underlying remote error.
    pub fn remote(&self) -> &RemoteError {
        match self {
            Self::Remote { source, .. } => source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_error_display() {
        let err = RemoteError::new("permission-denied", "missing read access");
        assert_eq!(err.to_string(), "permission-denied: missing read access");
    }

    #[test]
    fn binding_error_exposes_source() {
        let err = BindingError::Remote {
            path: "users/alice".to_string(),
            source: Arc::new(RemoteError::new("unavailable", "offline")),
        };
        assert_eq!(err.remote().code, "unavailable");
        assert!(err.to_string().starts_with("remote error for users/alice"));
    }
}
