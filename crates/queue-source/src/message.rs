//! Message types received from a queue backend, including core domain identifiers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

/// Number of receipt characters shown when a receipt is logged.
const RECEIPT_PREVIEW_LEN: usize = 8;

// ============================================================================
// Core Domain Identifiers
// ============================================================================

/// Identifier assigned to a message by the backend
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    /// Create message ID from the backend's identifier
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get message ID as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for MessageId {
    fn from(id: i64) -> Self {
        Self(id.to_string())
    }
}

/// Opaque token required to acknowledge one specific delivery of a message.
///
/// The token grants the holder the right to delete the message, so `Debug`
/// and `Display` only show a short prefix. Use [`ReceiptHandle::as_str`] when
/// the full value has to go on the wire.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReceiptHandle(String);

impl ReceiptHandle {
    pub fn new(handle: impl Into<String>) -> Self {
        Self(handle.into())
    }

    /// Get the full handle string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Get a prefix of the handle that is safe to log
    pub fn redacted(&self) -> String {
        let preview: String = self.0.chars().take(RECEIPT_PREVIEW_LEN).collect();
        if preview.len() < self.0.len() {
            format!("{}...", preview)
        } else {
            preview
        }
    }
}

impl std::fmt::Debug for ReceiptHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ReceiptHandle").field(&self.redacted()).finish()
    }
}

impl std::fmt::Display for ReceiptHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.redacted())
    }
}

/// Timestamp wrapper for consistent time handling
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Create timestamp for current time
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Create timestamp from DateTime
    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }

    /// Get underlying DateTime
    pub fn as_datetime(&self) -> DateTime<Utc> {
        self.0
    }

    /// Seconds since the Unix epoch, with sub-second precision
    pub fn as_epoch_seconds(&self) -> f64 {
        self.0.timestamp() as f64 + f64::from(self.0.timestamp_subsec_micros()) / 1_000_000.0
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}

impl FromStr for Timestamp {
    type Err = chrono::ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let dt = DateTime::parse_from_rfc3339(s)?;
        Ok(Self::from_datetime(dt.with_timezone(&Utc)))
    }
}

// ============================================================================
// Message Types
// ============================================================================

/// Backend-defined metadata attached to a message
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub custom_properties: BTreeMap<String, String>,
}

impl MessageMetadata {
    /// Check if the metadata carries no information
    pub fn is_empty(&self) -> bool {
        self.channel_id.is_none() && self.custom_properties.is_empty()
    }
}

/// A message received from the queue, as the backend delivered it
#[derive(Debug, Clone, PartialEq)]
pub struct RawMessage {
    pub id: MessageId,
    pub receipt: ReceiptHandle,
    pub content: String,
    pub delivery_count: u32,
    pub visible_after: Option<Timestamp>,
    pub expire_after: Option<Timestamp>,
    pub created_at: Option<Timestamp>,
    pub metadata: Option<MessageMetadata>,
}

impl RawMessage {
    /// Create a message with only the mandatory fields set
    pub fn new(id: MessageId, receipt: ReceiptHandle, content: impl Into<String>) -> Self {
        Self {
            id,
            receipt,
            content: content.into(),
            delivery_count: 1,
            visible_after: None,
            expire_after: None,
            created_at: None,
            metadata: None,
        }
    }

    pub fn with_delivery_count(mut self, delivery_count: u32) -> Self {
        self.delivery_count = delivery_count;
        self
    }

    pub fn with_visible_after(mut self, visible_after: Timestamp) -> Self {
        self.visible_after = Some(visible_after);
        self
    }

    pub fn with_expire_after(mut self, expire_after: Timestamp) -> Self {
        self.expire_after = Some(expire_after);
        self
    }

    pub fn with_created_at(mut self, created_at: Timestamp) -> Self {
        self.created_at = Some(created_at);
        self
    }

    pub fn with_metadata(mut self, metadata: MessageMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

#[cfg(test)]
#[path = "message_tests.rs"]
mod tests;
