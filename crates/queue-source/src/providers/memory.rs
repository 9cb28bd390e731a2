//! In-memory queue backend for testing and local runs.
//!
//! Behaves like a single OCI queue:
//! - Received messages stay hidden until their visibility timeout expires
//! - Unacknowledged messages are redelivered with an increased delivery count
//! - Receive calls long-poll for up to `wait_seconds`
//!
//! Visibility uses the tokio clock, so tests running with a paused runtime
//! can advance through timeouts instantly.

use crate::backend::{BackendKind, QueueBackend, ReceiveRequest};
use crate::error::BackendError;
use crate::message::{MessageId, MessageMetadata, RawMessage, ReceiptHandle, Timestamp};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::debug;

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;

// ============================================================================
// Internal Storage Structures
// ============================================================================

/// A message stored in the queue
#[derive(Clone)]
struct StoredMessage {
    sequence: i64,
    id: MessageId,
    content: String,
    metadata: Option<MessageMetadata>,
    created_at: Timestamp,
    delivery_count: u32,
}

/// A message currently hidden behind a visibility timeout
struct InFlightMessage {
    message: StoredMessage,
    visible_at: Instant,
}

#[derive(Default)]
struct QueueState {
    next_id: i64,
    /// Visible messages (FIFO order)
    ready: VecDeque<StoredMessage>,
    /// Delivered messages keyed by receipt
    in_flight: HashMap<String, InFlightMessage>,
}

impl QueueState {
    /// Return in-flight messages whose visibility expired to the ready queue
    fn reclaim_expired(&mut self, now: Instant) {
        let expired: Vec<String> = self
            .in_flight
            .iter()
            .filter(|(_, entry)| entry.visible_at <= now)
            .map(|(receipt, _)| receipt.clone())
            .collect();

        let mut reclaimed: Vec<StoredMessage> = expired
            .iter()
            .filter_map(|receipt| self.in_flight.remove(receipt))
            .map(|entry| entry.message)
            .collect();

        // Redelivered messages keep their original order.
        reclaimed.sort_by_key(|message| message.sequence);
        for message in reclaimed.into_iter().rev() {
            self.ready.push_front(message);
        }
    }

    fn next_visibility_change(&self) -> Option<Instant> {
        self.in_flight.values().map(|entry| entry.visible_at).min()
    }

    fn take_batch(&mut self, request: &ReceiveRequest, now: Instant) -> Vec<RawMessage> {
        let visibility = Duration::from_secs(u64::from(request.visibility_seconds));
        let visible_after = Timestamp::from_datetime(
            Timestamp::now().as_datetime()
                + chrono::Duration::seconds(i64::from(request.visibility_seconds)),
        );

        let mut batch = Vec::new();
        while batch.len() < request.limit as usize {
            let Some(mut message) = self.ready.pop_front() else {
                break;
            };
            message.delivery_count += 1;

            let receipt = uuid::Uuid::new_v4().to_string();
            let mut raw = RawMessage::new(
                message.id.clone(),
                ReceiptHandle::new(receipt.clone()),
                message.content.clone(),
            )
            .with_delivery_count(message.delivery_count)
            .with_created_at(message.created_at)
            .with_visible_after(visible_after);
            if let Some(metadata) = &message.metadata {
                raw = raw.with_metadata(metadata.clone());
            }

            self.in_flight.insert(
                receipt,
                InFlightMessage {
                    message,
                    visible_at: now + visibility,
                },
            );
            batch.push(raw);
        }

        batch
    }
}

// ============================================================================
// InMemoryBackend
// ============================================================================

/// In-memory queue backend
#[derive(Default)]
pub struct InMemoryBackend {
    state: Mutex<QueueState>,
    notify: Notify,
    closed: AtomicBool,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue a message and wake a waiting receiver
    pub fn send(&self, content: impl Into<String>) -> Result<MessageId, BackendError> {
        self.enqueue(content.into(), None)
    }

    /// Enqueue a message carrying metadata
    pub fn send_with_metadata(
        &self,
        content: impl Into<String>,
        metadata: MessageMetadata,
    ) -> Result<MessageId, BackendError> {
        self.enqueue(content.into(), Some(metadata))
    }

    /// Messages not yet acknowledged, visible or in flight
    pub fn pending_count(&self) -> Result<usize, BackendError> {
        let state = self.lock_state()?;
        Ok(state.ready.len() + state.in_flight.len())
    }

    /// Messages delivered but neither acknowledged nor visible again
    pub fn in_flight_count(&self) -> Result<usize, BackendError> {
        let mut state = self.lock_state()?;
        state.reclaim_expired(Instant::now());
        Ok(state.in_flight.len())
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn enqueue(
        &self,
        content: String,
        metadata: Option<MessageMetadata>,
    ) -> Result<MessageId, BackendError> {
        self.ensure_open()?;

        let id = {
            let mut state = self.lock_state()?;
            state.next_id += 1;
            let sequence = state.next_id;
            let id = MessageId::from(sequence);
            state.ready.push_back(StoredMessage {
                sequence,
                id: id.clone(),
                content,
                metadata,
                created_at: Timestamp::now(),
                delivery_count: 0,
            });
            id
        };

        self.notify.notify_one();
        Ok(id)
    }

    fn ensure_open(&self) -> Result<(), BackendError> {
        if self.is_closed() {
            return Err(BackendError::ClientUnusable {
                message: "in-memory queue has been closed".to_string(),
            });
        }
        Ok(())
    }

    fn lock_state(&self) -> Result<MutexGuard<'_, QueueState>, BackendError> {
        self.state.lock().map_err(|_| BackendError::ClientUnusable {
            message: "in-memory queue state is poisoned".to_string(),
        })
    }
}

#[async_trait]
impl QueueBackend for InMemoryBackend {
    async fn receive(&self, request: &ReceiveRequest) -> Result<Vec<RawMessage>, BackendError> {
        let deadline = Instant::now() + Duration::from_secs(u64::from(request.wait_seconds));

        loop {
            self.ensure_open()?;

            let wake_at = {
                let now = Instant::now();
                let mut state = self.lock_state()?;
                state.reclaim_expired(now);

                let batch = state.take_batch(request, now);
                if !batch.is_empty() {
                    debug!(count = batch.len(), "Delivered messages from in-memory queue");
                    return Ok(batch);
                }
                if now >= deadline {
                    return Ok(Vec::new());
                }

                state
                    .next_visibility_change()
                    .map_or(deadline, |visible_at| visible_at.min(deadline))
            };

            tokio::select! {
                _ = self.notify.notified() => {}
                _ = tokio::time::sleep_until(wake_at) => {}
            }
        }
    }

    async fn acknowledge(&self, receipt: &ReceiptHandle) -> Result<(), BackendError> {
        self.ensure_open()?;

        let mut state = self.lock_state()?;
        state.reclaim_expired(Instant::now());

        match state.in_flight.remove(receipt.as_str()) {
            Some(entry) => {
                debug!(message_id = %entry.message.id, "Deleted message from in-memory queue");
                Ok(())
            }
            None => Err(BackendError::MessageNotFound {
                receipt: receipt.redacted(),
            }),
        }
    }

    async fn close(&self) -> Result<(), BackendError> {
        self.closed.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
        Ok(())
    }

    fn kind(&self) -> BackendKind {
        BackendKind::InMemory
    }
}
