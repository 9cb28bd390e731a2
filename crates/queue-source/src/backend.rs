//! Queue backend interface and backend construction.

use crate::config::PollConfig;
use crate::error::{BackendError, ConfigError, SourceError};
use crate::message::{RawMessage, ReceiptHandle};
use async_trait::async_trait;
use std::sync::Arc;

#[cfg(test)]
#[path = "backend_tests.rs"]
mod tests;

/// Parameters of a single receive call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceiveRequest {
    /// Maximum number of messages to return (1-20)
    pub limit: u32,
    /// Long-poll wait in seconds (0-20)
    pub wait_seconds: u32,
    /// How long returned messages stay hidden from other consumers
    pub visibility_seconds: u32,
}

impl ReceiveRequest {
    pub fn from_config(config: &PollConfig) -> Self {
        Self {
            limit: config.batch_limit(),
            wait_seconds: config.poll_timeout_seconds(),
            visibility_seconds: config.visibility_timeout_seconds(),
        }
    }
}

/// Enumeration of available backends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    OciQueue,
    InMemory,
    /// Backend implemented outside this crate
    Custom,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OciQueue => "oci_queue",
            Self::InMemory => "in_memory",
            Self::Custom => "custom",
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Interface implemented by queue backends (OCI Queue, in-memory, test doubles)
#[async_trait]
pub trait QueueBackend: Send + Sync {
    /// Receive up to `request.limit` messages, waiting server-side for up to
    /// `request.wait_seconds` when none are available
    async fn receive(&self, request: &ReceiveRequest) -> Result<Vec<RawMessage>, BackendError>;

    /// Delete the delivery identified by `receipt`
    async fn acknowledge(&self, receipt: &ReceiptHandle) -> Result<(), BackendError>;

    /// Release client resources, called once when the poll loop exits
    async fn close(&self) -> Result<(), BackendError> {
        Ok(())
    }

    /// Get backend kind
    fn kind(&self) -> BackendKind {
        BackendKind::Custom
    }
}

#[async_trait]
impl<T: QueueBackend + ?Sized> QueueBackend for Arc<T> {
    async fn receive(&self, request: &ReceiveRequest) -> Result<Vec<RawMessage>, BackendError> {
        (**self).receive(request).await
    }

    async fn acknowledge(&self, receipt: &ReceiptHandle) -> Result<(), BackendError> {
        (**self).acknowledge(receipt).await
    }

    async fn close(&self) -> Result<(), BackendError> {
        (**self).close().await
    }

    fn kind(&self) -> BackendKind {
        (**self).kind()
    }
}

/// Build the OCI Queue backend described by `config`.
///
/// Fails fast when the crate was built without the `oci` feature, or when
/// credentials cannot be loaded, so a poll loop is never started against a
/// backend that cannot work.
#[cfg(feature = "oci")]
pub fn create_backend(config: &PollConfig) -> Result<Arc<dyn QueueBackend>, SourceError> {
    let backend = crate::providers::OciQueueBackend::from_config(config)?;
    Ok(Arc::new(backend))
}

/// Build the OCI Queue backend described by `config`.
///
/// This build does not include the OCI driver.
#[cfg(not(feature = "oci"))]
pub fn create_backend(_config: &PollConfig) -> Result<Arc<dyn QueueBackend>, SourceError> {
    Err(ConfigError::UnsupportedBackend {
        backend: BackendKind::OciQueue.to_string(),
        message: "queue-source was built without the `oci` feature".to_string(),
    }
    .into())
}

/// Check once at startup that a backend kind is usable in this build
pub fn ensure_available(kind: BackendKind) -> Result<(), ConfigError> {
    match kind {
        BackendKind::OciQueue if !cfg!(feature = "oci") => Err(ConfigError::UnsupportedBackend {
            backend: kind.to_string(),
            message: "queue-source was built without the `oci` feature".to_string(),
        }),
        _ => Ok(()),
    }
}
