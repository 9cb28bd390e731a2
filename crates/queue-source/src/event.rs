//! Normalized events and the translation from received messages.
//!
//! Each [`RawMessage`] becomes exactly one [`Event`]. The serialized event is
//! keyed by the source kind:
//!
//! ```json
//! {
//!   "oci_queue": { "message_id": "…", "receipt": "…", "content": "…", … },
//!   "meta": { "source": { "name": "…", "type": "oci_queue", … }, "received_at": 1700000000.5 }
//! }
//! ```

use crate::config::{PollConfig, SOURCE_KIND};
use crate::message::{MessageId, MessageMetadata, RawMessage, ReceiptHandle, Timestamp};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

/// Payload part of an event, carried under the source kind key
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventBody {
    pub message_id: MessageId,
    pub receipt: ReceiptHandle,
    pub content: String,
    pub delivery_count: u32,
    pub visible_after: Option<Timestamp>,
    pub expire_after: Option<Timestamp>,
    pub created_at: Option<Timestamp>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<MessageMetadata>,
}

/// Identity of the source that produced an event
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub queue_id: String,
    pub region: String,
}

/// Envelope describing where and when an event was received
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventMeta {
    pub source: SourceInfo,
    #[serde(serialize_with = "serialize_epoch_seconds")]
    pub received_at: Timestamp,
}

fn serialize_epoch_seconds<S>(timestamp: &Timestamp, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_f64(timestamp.as_epoch_seconds())
}

/// One normalized event, produced from one received message
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub body: EventBody,
    pub meta: EventMeta,
}

impl Event {
    /// Receipt needed to acknowledge the message behind this event
    pub fn receipt(&self) -> &ReceiptHandle {
        &self.body.receipt
    }

    pub fn message_id(&self) -> &MessageId {
        &self.body.message_id
    }

    /// Key the body is serialized under
    pub fn kind(&self) -> &str {
        &self.meta.source.kind
    }
}

impl Serialize for Event {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(2))?;
        map.serialize_entry(self.kind(), &self.body)?;
        map.serialize_entry("meta", &self.meta)?;
        map.end()
    }
}

/// Maps received messages to events for one configured source
#[derive(Debug, Clone)]
pub struct MessageTranslator {
    source: SourceInfo,
}

impl MessageTranslator {
    pub fn new(config: &PollConfig) -> Self {
        Self::from_source(SourceInfo {
            name: config.name().to_string(),
            kind: SOURCE_KIND.to_string(),
            queue_id: config.queue_id().to_string(),
            region: config.region().to_string(),
        })
    }

    pub fn from_source(source: SourceInfo) -> Self {
        Self { source }
    }

    pub fn source(&self) -> &SourceInfo {
        &self.source
    }

    /// Translate one message received at `received_at`.
    ///
    /// Total and deterministic: absent optional fields stay absent, empty
    /// metadata is dropped, and content and receipt are copied verbatim.
    pub fn translate(&self, message: &RawMessage, received_at: Timestamp) -> Event {
        let metadata = message
            .metadata
            .as_ref()
            .filter(|metadata| !metadata.is_empty())
            .cloned();

        Event {
            body: EventBody {
                message_id: message.id.clone(),
                receipt: message.receipt.clone(),
                content: message.content.clone(),
                delivery_count: message.delivery_count,
                visible_after: message.visible_after,
                expire_after: message.expire_after,
                created_at: message.created_at,
                metadata,
            },
            meta: EventMeta {
                source: self.source.clone(),
                received_at,
            },
        }
    }

    /// Translate one message, stamping it with the current time
    pub fn translate_now(&self, message: &RawMessage) -> Event {
        self.translate(message, Timestamp::now())
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
