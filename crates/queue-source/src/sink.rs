//! Event sink interface and a channel-backed implementation.

use crate::error::SinkError;
use crate::event::Event;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Consumer of the events produced by the poll loop.
///
/// `put` may block to apply backpressure; the poll loop waits for it before
/// acknowledging the message behind the event.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn put(&self, event: Event) -> Result<(), SinkError>;
}

#[async_trait]
impl<T: EventSink + ?Sized> EventSink for Arc<T> {
    async fn put(&self, event: Event) -> Result<(), SinkError> {
        (**self).put(event).await
    }
}

/// Sink that forwards events into a bounded channel.
///
/// A full channel blocks `put` until the receiver catches up. Dropping the
/// receiver makes every further `put` fail with [`SinkError::Closed`], which
/// leaves the messages un-acknowledged.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    sender: mpsc::Sender<Event>,
}

impl ChannelSink {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Create a sink together with the receiving end of its channel.
    ///
    /// A `capacity` of zero is raised to one.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Event>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self::new(sender), receiver)
    }
}

#[async_trait]
impl EventSink for ChannelSink {
    async fn put(&self, event: Event) -> Result<(), SinkError> {
        self.sender.send(event).await.map_err(|_| SinkError::Closed)
    }
}

#[cfg(test)]
#[path = "sink_tests.rs"]
mod tests;
