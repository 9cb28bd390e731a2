//! Error types for the queue source.

use std::time::Duration;
use thiserror::Error;

/// Top-level error surfaced to the caller of the source.
///
/// Everything that reaches this type is fatal for the current source
/// instance. Recoverable conditions are logged inside the poll loop and never
/// escape it.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("Authentication error: {0}")]
    Authentication(#[from] AuthError),

    #[error("Backend failed fatally: {0}")]
    Backend(#[from] BackendError),

    #[error("Poll loop has already been started")]
    AlreadyStarted,
}

/// Configuration errors, raised before the poll loop starts
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {key}")]
    Missing { key: String },

    #[error("Invalid value for {field}: {message}")]
    Invalid { field: String, message: String },

    #[error("Configuration parsing failed: {message}")]
    Parsing { message: String },

    #[error("Backend '{backend}' is not available: {message}")]
    UnsupportedBackend { backend: String, message: String },
}

impl ConfigError {
    pub(crate) fn invalid(field: &str, message: impl Into<String>) -> Self {
        Self::Invalid {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

/// Authentication and client construction errors
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Failed to read OCI config file {path}: {message}")]
    ConfigFile { path: String, message: String },

    #[error("Profile '{profile}' not found in {path}")]
    ProfileNotFound { profile: String, path: String },

    #[error("Profile '{profile}' is missing required keys: {}", .keys.join(", "))]
    IncompleteProfile { profile: String, keys: Vec<String> },

    #[error("Failed to load private key {path}: {message}")]
    PrivateKey { path: String, message: String },

    #[error("Authentication mode '{mode}' requires a caller-supplied request signer")]
    UnsupportedMode { mode: String },

    #[error("Failed to sign request: {message}")]
    Signing { message: String },

    #[error("Failed to build HTTP client: {message}")]
    Client { message: String },
}

/// Errors raised by a [`QueueBackend`](crate::backend::QueueBackend) call
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Queue not found: {queue_id}")]
    QueueNotFound { queue_id: String },

    #[error("Message not found or receipt expired: {receipt}")]
    MessageNotFound { receipt: String },

    #[error("Operation timed out after {duration:?}")]
    Timeout { duration: Duration },

    #[error("Connection failed: {message}")]
    ConnectionFailed { message: String },

    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    #[error("Permission denied for operation: {operation}")]
    PermissionDenied { operation: String },

    #[error("Provider error ({status}): {code} - {message}")]
    Provider {
        status: u16,
        code: String,
        message: String,
    },

    #[error("Malformed response: {message}")]
    Serialization { message: String },

    #[error("Backend client is unusable: {message}")]
    ClientUnusable { message: String },
}

impl BackendError {
    /// Check if the error is expected to clear up on a later attempt
    pub fn is_transient(&self) -> bool {
        match self {
            Self::QueueNotFound { .. } => false,
            Self::MessageNotFound { .. } => false,
            Self::Timeout { .. } => true,
            Self::ConnectionFailed { .. } => true,
            Self::AuthenticationFailed { .. } => false,
            Self::PermissionDenied { .. } => false,
            Self::Provider { status, .. } => *status == 408 || *status == 429 || *status >= 500,
            Self::Serialization { .. } => false,
            Self::ClientUnusable { .. } => false,
        }
    }

    /// Check if the backend client can no longer be used at all.
    ///
    /// Fatal errors end `listen()`; everything else is logged and the loop
    /// keeps polling.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::ClientUnusable { .. })
    }

    /// Get suggested retry delay
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Timeout { .. } => Some(Duration::from_secs(1)),
            Self::ConnectionFailed { .. } => Some(Duration::from_secs(5)),
            Self::Provider { status: 429, .. } => Some(Duration::from_secs(5)),
            _ => None,
        }
    }
}

/// Errors raised by an [`EventSink`](crate::sink::EventSink)
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Event sink is closed")]
    Closed,

    #[error("Event rejected by sink: {message}")]
    Rejected { message: String },

    #[error("Failed to write event: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to encode event: {0}")]
    Encoding(#[from] serde_json::Error),
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
