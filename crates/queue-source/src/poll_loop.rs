//! # Poll Loop Module
//!
//! Drives one queue source: receive a batch, translate each message into an
//! event, hand the event to the sink, and acknowledge the message once the
//! sink accepted it.
//!
//! Delivery guarantees are at-least-once. A message is only acknowledged
//! after its event was delivered, so a failed delivery or a failed
//! acknowledgment leaves the message to reappear once its visibility timeout
//! expires. Nothing is retried in place.
//!
//! The loop suspends at two points only, the receive call and the backoff
//! sleep, and both observe the stop signal. A message whose processing has
//! begun is always finished before the loop exits.

use crate::backend::{QueueBackend, ReceiveRequest};
use crate::backoff::FailureStreak;
use crate::config::{PollConfig, SourceConfig};
use crate::error::{BackendError, SourceError};
use crate::event::{Event, MessageTranslator};
use crate::message::{RawMessage, ReceiptHandle};
use crate::sink::EventSink;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

// ============================================================================
// Lifecycle State
// ============================================================================

/// Observable lifecycle of a poll loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    /// Created, `listen()` not yet called
    Idle,
    /// Polling for messages
    Running,
    /// Stop requested, finishing the current message
    Stopping,
    /// Terminal; backend resources released
    Stopped,
}

impl LoopState {
    fn as_u8(self) -> u8 {
        match self {
            Self::Idle => 0,
            Self::Running => 1,
            Self::Stopping => 2,
            Self::Stopped => 3,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Idle,
            1 => Self::Running,
            2 => Self::Stopping,
            _ => Self::Stopped,
        }
    }
}

#[derive(Debug, Clone)]
struct SharedState(Arc<AtomicU8>);

impl SharedState {
    fn new() -> Self {
        Self(Arc::new(AtomicU8::new(LoopState::Idle.as_u8())))
    }

    fn get(&self) -> LoopState {
        LoopState::from_u8(self.0.load(Ordering::SeqCst))
    }

    fn set(&self, state: LoopState) {
        self.0.store(state.as_u8(), Ordering::SeqCst);
    }

    fn transition(&self, from: LoopState, to: LoopState) -> bool {
        self.0
            .compare_exchange(from.as_u8(), to.as_u8(), Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }
}

/// Stop flag of one poll loop. Once set it is never cleared.
///
/// Clones share the flag. A parent token, when attached, also counts as a
/// stop request without replacing the flag.
#[derive(Debug, Clone)]
pub struct RunState {
    token: CancellationToken,
    parent: Option<CancellationToken>,
}

impl RunState {
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            parent: None,
        }
    }

    /// Stop flag that is also set when `parent` is cancelled
    pub fn child_of(parent: &CancellationToken) -> Self {
        Self::new().with_parent(parent)
    }

    /// Keep this flag and additionally stop when `parent` is cancelled
    pub fn with_parent(mut self, parent: &CancellationToken) -> Self {
        self.parent = Some(parent.clone());
        self
    }

    pub fn is_stopping(&self) -> bool {
        self.token.is_cancelled()
            || self
                .parent
                .as_ref()
                .is_some_and(CancellationToken::is_cancelled)
    }

    pub fn stop(&self) {
        self.token.cancel();
    }

    /// Resolves once the stop flag is set or the parent is cancelled
    pub async fn stopped(&self) {
        match &self.parent {
            Some(parent) => {
                tokio::select! {
                    _ = self.token.cancelled() => {}
                    _ = parent.cancelled() => {}
                }
            }
            None => self.token.cancelled().await,
        }
    }
}

impl Default for RunState {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle for stopping a poll loop from any task or thread
#[derive(Debug, Clone)]
pub struct StopHandle {
    run_state: RunState,
    state: SharedState,
}

impl StopHandle {
    /// Request the loop to stop. Idempotent.
    pub fn stop(&self) {
        if !self.run_state.is_stopping() {
            info!("Stopping queue event source");
        }
        self.run_state.stop();
        self.state.transition(LoopState::Running, LoopState::Stopping);
    }

    pub fn is_stopping(&self) -> bool {
        self.run_state.is_stopping()
            || matches!(self.state.get(), LoopState::Stopping | LoopState::Stopped)
    }
}

/// Counters describing one `listen()` run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListenSummary {
    pub receive_calls: u64,
    pub receive_errors: u64,
    pub messages_received: u64,
    pub events_delivered: u64,
    pub delivery_failures: u64,
    pub acknowledged: u64,
    pub acknowledge_failures: u64,
    /// Messages received but left unprocessed because a stop was requested
    pub messages_skipped: u64,
}

/// Acknowledges messages on behalf of a consumer when auto-acknowledge is off
#[derive(Clone)]
pub struct Acknowledger {
    backend: Arc<dyn QueueBackend>,
}

impl Acknowledger {
    pub async fn acknowledge(&self, receipt: &ReceiptHandle) -> Result<(), BackendError> {
        self.backend.acknowledge(receipt).await?;
        debug!(receipt = %receipt, "Acknowledged message");
        Ok(())
    }

    /// Acknowledge the message an event was produced from
    pub async fn acknowledge_event(&self, event: &Event) -> Result<(), BackendError> {
        self.acknowledge(event.receipt()).await
    }
}

// ============================================================================
// Poll Loop
// ============================================================================

/// Long-running loop moving messages from a queue backend to an event sink
pub struct PollLoop {
    config: PollConfig,
    backend: Arc<dyn QueueBackend>,
    sink: Arc<dyn EventSink>,
    translator: MessageTranslator,
    run_state: RunState,
    state: SharedState,
}

impl PollLoop {
    /// Create a loop from an already validated configuration
    pub fn new(
        config: PollConfig,
        backend: Arc<dyn QueueBackend>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        let translator = MessageTranslator::new(&config);
        Self {
            config,
            backend,
            sink,
            translator,
            run_state: RunState::new(),
            state: SharedState::new(),
        }
    }

    /// Validate `config` and create a loop.
    ///
    /// Invalid configuration is reported before the backend is touched.
    pub fn from_source_config(
        config: &SourceConfig,
        backend: Arc<dyn QueueBackend>,
        sink: Arc<dyn EventSink>,
    ) -> Result<Self, SourceError> {
        let config = config.validate()?;
        Ok(Self::new(config, backend, sink))
    }

    /// Stop the loop when `parent` is cancelled, in addition to [`PollLoop::stop`]
    pub fn with_cancellation(mut self, parent: &CancellationToken) -> Self {
        self.run_state = self.run_state.with_parent(parent);
        self
    }

    pub fn config(&self) -> &PollConfig {
        &self.config
    }

    pub fn state(&self) -> LoopState {
        self.state.get()
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            run_state: self.run_state.clone(),
            state: self.state.clone(),
        }
    }

    /// Request the loop to stop. Idempotent.
    pub fn stop(&self) {
        self.stop_handle().stop();
    }

    pub fn acknowledger(&self) -> Acknowledger {
        Acknowledger {
            backend: Arc::clone(&self.backend),
        }
    }

    /// Run the loop until stopped, cancelled, or the backend fails fatally.
    ///
    /// Can be called once per loop. The backend is closed on every exit path.
    pub async fn listen(&self) -> Result<ListenSummary, SourceError> {
        if !self.state.transition(LoopState::Idle, LoopState::Running) {
            return Err(SourceError::AlreadyStarted);
        }

        info!(
            source = %self.config.name(),
            queue_id = %self.config.queue_id(),
            region = %self.config.region(),
            backend = %self.backend.kind(),
            "Starting queue event source"
        );

        let mut summary = ListenSummary::default();
        let result = self.run_cycles(&mut summary).await;

        self.state.set(LoopState::Stopping);
        if let Err(e) = self.backend.close().await {
            warn!(error = %e, "Failed to close queue backend");
        }
        self.state.set(LoopState::Stopped);

        match &result {
            Ok(()) => info!(
                source = %self.config.name(),
                receive_calls = summary.receive_calls,
                events_delivered = summary.events_delivered,
                acknowledged = summary.acknowledged,
                "Queue event source stopped"
            ),
            Err(e) => error!(
                source = %self.config.name(),
                error = %e,
                "Queue event source stopped after fatal error"
            ),
        }

        result.map(|()| summary)
    }

    async fn run_cycles(&self, summary: &mut ListenSummary) -> Result<(), SourceError> {
        let request = ReceiveRequest::from_config(&self.config);
        let deadline = self.config.receive_deadline();
        let mut streak = FailureStreak::new();

        while !self.run_state.is_stopping() {
            summary.receive_calls += 1;

            let received = tokio::select! {
                biased;
                _ = self.run_state.stopped() => {
                    info!("Queue event source cancelled while waiting for messages");
                    break;
                }
                result = tokio::time::timeout(deadline, self.backend.receive(&request)) => {
                    result.unwrap_or(Err(BackendError::Timeout { duration: deadline }))
                }
            };

            let messages = match received {
                Ok(messages) => {
                    streak.reset();
                    messages
                }
                Err(e) if e.is_fatal() => return Err(e.into()),
                Err(e) => {
                    summary.receive_errors += 1;
                    streak.record_failure();
                    // A hint from the error (throttling, connection loss) is a floor.
                    let delay = self
                        .config
                        .backoff()
                        .error_delay(&streak)
                        .max(e.retry_after().unwrap_or_default());

                    warn!(
                        queue_id = %self.config.queue_id(),
                        error = %e,
                        transient = e.is_transient(),
                        consecutive_failures = streak.consecutive(),
                        delay_ms = delay.as_millis() as u64,
                        "Failed to receive messages; backing off"
                    );

                    self.pause(delay).await;
                    continue;
                }
            };

            if messages.is_empty() {
                self.pause(self.config.backoff().idle_delay()).await;
                continue;
            }

            debug!(count = messages.len(), "Retrieved messages from queue");
            summary.messages_received += messages.len() as u64;
            self.process_batch(messages, summary).await?;
        }

        Ok(())
    }

    /// Process a batch in receive order, one message at a time
    async fn process_batch(
        &self,
        messages: Vec<RawMessage>,
        summary: &mut ListenSummary,
    ) -> Result<(), SourceError> {
        let total = messages.len();

        for (index, message) in messages.into_iter().enumerate() {
            if self.run_state.is_stopping() {
                let remaining = total - index;
                summary.messages_skipped += remaining as u64;
                info!(
                    remaining = remaining,
                    "Stop requested; leaving remaining messages for redelivery"
                );
                break;
            }

            self.process_message(&message, summary).await?;
        }

        Ok(())
    }

    async fn process_message(
        &self,
        message: &RawMessage,
        summary: &mut ListenSummary,
    ) -> Result<(), SourceError> {
        let event = self.translator.translate_now(message);

        if let Err(e) = self.sink.put(event).await {
            summary.delivery_failures += 1;
            warn!(
                message_id = %message.id,
                error = %e,
                "Failed to deliver event; message left for redelivery"
            );
            return Ok(());
        }
        summary.events_delivered += 1;

        if !self.config.auto_acknowledge() {
            return Ok(());
        }

        match self.backend.acknowledge(&message.receipt).await {
            Ok(()) => {
                summary.acknowledged += 1;
                debug!(
                    message_id = %message.id,
                    receipt = %message.receipt,
                    "Acknowledged message"
                );
                Ok(())
            }
            Err(e) if e.is_fatal() => Err(e.into()),
            Err(e) => {
                summary.acknowledge_failures += 1;
                warn!(
                    message_id = %message.id,
                    receipt = %message.receipt,
                    error = %e,
                    "Failed to acknowledge message; it will be redelivered"
                );
                Ok(())
            }
        }
    }

    /// Wait before the next receive, waking early on stop
    async fn pause(&self, delay: Duration) {
        if delay.is_zero() {
            // Poll again right away, but let other tasks (and stop requests) run.
            tokio::task::yield_now().await;
            return;
        }

        tokio::select! {
            _ = self.run_state.stopped() => {}
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

#[cfg(test)]
#[path = "poll_loop_tests.rs"]
mod tests;
