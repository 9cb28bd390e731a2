//! Common test utilities for queue-source integration tests
//!
//! This module provides:
//! - Source configuration presets
//! - Sinks with scripted failures
//! - Helpers for running a poll loop in the background

use async_trait::async_trait;
use queue_source::{
    ChannelSink, Event, EventSink, ListenSummary, PollLoop, QueueBackend, SinkError,
    SourceConfig, SourceError,
};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

#[allow(dead_code)]
pub const QUEUE_ID: &str = "ocid1.queue.oc1.phx.integration";
#[allow(dead_code)]
pub const COMPARTMENT_ID: &str = "ocid1.compartment.oc1..integration";
#[allow(dead_code)]
pub const REGION: &str = "us-phoenix-1";

/// Configuration with short waits suitable for a paused clock
#[allow(dead_code)]
pub fn source_config(limit: i64, visibility_timeout_seconds: i64) -> SourceConfig {
    SourceConfig {
        name: "integration".to_string(),
        limit,
        timeout_seconds: 0,
        visibility_timeout_seconds,
        polling_interval: 1.0,
        ..SourceConfig::new(QUEUE_ID, COMPARTMENT_ID, REGION)
    }
}

/// Build a loop over `backend` that forwards events into a channel
#[allow(dead_code)]
pub fn channel_loop(
    config: &SourceConfig,
    backend: Arc<dyn QueueBackend>,
    sink: Arc<dyn EventSink>,
) -> Arc<PollLoop> {
    match PollLoop::from_source_config(config, backend, sink) {
        Ok(poll) => Arc::new(poll),
        Err(e) => panic!("invalid test configuration: {}", e),
    }
}

/// Run `listen()` on a background task
#[allow(dead_code)]
pub fn spawn_listen(poll: &Arc<PollLoop>) -> JoinHandle<Result<ListenSummary, SourceError>> {
    let poll = Arc::clone(poll);
    tokio::spawn(async move { poll.listen().await })
}

// ============================================================================
// Scripted Sinks
// ============================================================================

/// Sink that rejects the first delivery of every message and forwards the rest
#[allow(dead_code)]
pub struct RejectFirstDeliverySink {
    inner: ChannelSink,
    seen: Mutex<HashSet<String>>,
}

#[allow(dead_code)]
impl RejectFirstDeliverySink {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Event>) {
        let (inner, receiver) = ChannelSink::channel(capacity);
        let sink = Self {
            inner,
            seen: Mutex::new(HashSet::new()),
        };
        (sink, receiver)
    }
}

#[async_trait]
impl EventSink for RejectFirstDeliverySink {
    async fn put(&self, event: Event) -> Result<(), SinkError> {
        let first_delivery = self
            .seen
            .lock()
            .unwrap()
            .insert(event.message_id().as_str().to_string());

        if first_delivery {
            return Err(SinkError::Rejected {
                message: "downstream unavailable".to_string(),
            });
        }
        self.inner.put(event).await
    }
}
