//! # Queue Source
//!
//! Long-running event source that polls an OCI Queue, turns every received
//! message into a normalized event, hands it to a sink, and acknowledges the
//! message once the sink accepted it.
//!
//! This library provides:
//! - A cancellable poll loop with idle and error backoff
//! - At-least-once delivery with auto or manual acknowledgment
//! - An OCI Queue backend with API-key request signing (feature `oci`)
//! - An in-memory backend with visibility timeouts for tests and local runs
//!
//! ## Module Organization
//!
//! - [`config`] - Source options and their validated form
//! - [`poll_loop`] - The receive/deliver/acknowledge state machine
//! - [`event`] - Normalized events and message translation
//! - [`backend`] - Queue backend interface
//! - [`sink`] - Event sink interface
//! - [`providers`] - Concrete backends
//! - [`backoff`] - Idle and error wait policy
//! - [`error`] - Error types
//!
//! ## Example
//!
//! ```rust,no_run
//! use queue_source::{ChannelSink, InMemoryBackend, PollLoop, SourceConfig};
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), queue_source::SourceError> {
//! let config = SourceConfig::new("ocid1.queue.oc1..example", "ocid1.compartment.oc1..example", "us-phoenix-1");
//! let backend = Arc::new(InMemoryBackend::new());
//! let (sink, mut events) = ChannelSink::channel(16);
//!
//! let poll = PollLoop::from_source_config(&config, backend, Arc::new(sink))?;
//! let stop = poll.stop_handle();
//!
//! tokio::spawn(async move {
//!     while let Some(event) = events.recv().await {
//!         println!("{}", event.body.content);
//!     }
//!     stop.stop();
//! });
//!
//! let summary = poll.listen().await?;
//! println!("delivered {} events", summary.events_delivered);
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod backoff;
pub mod config;
pub mod error;
pub mod event;
pub mod message;
pub mod poll_loop;
pub mod providers;
pub mod sink;

// Re-export commonly used types at crate root for convenience
pub use backend::{create_backend, ensure_available, BackendKind, QueueBackend, ReceiveRequest};
pub use backoff::{BackoffPolicy, ErrorBackoff, FailureStreak};
pub use config::{AuthMode, ErrorBackoffConfig, PollConfig, SourceConfig};
pub use error::{AuthError, BackendError, ConfigError, SinkError, SourceError};
pub use event::{Event, EventBody, EventMeta, MessageTranslator, SourceInfo};
pub use message::{MessageId, MessageMetadata, RawMessage, ReceiptHandle, Timestamp};
pub use poll_loop::{Acknowledger, ListenSummary, LoopState, PollLoop, RunState, StopHandle};
pub use providers::InMemoryBackend;
#[cfg(feature = "oci")]
pub use providers::{ApiKeySigner, OciProfile, OciQueueBackend, RequestSigner};
pub use sink::{ChannelSink, EventSink};
