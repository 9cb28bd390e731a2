//! Tests for message types.

use super::*;
use chrono::TimeZone;

#[test]
fn test_receipt_handle_is_redacted_in_debug_and_display() {
    let receipt = ReceiptHandle::new("wxyz1234-secret-receipt-token-value");

    let debug = format!("{:?}", receipt);
    let display = receipt.to_string();

    assert_eq!(display, "wxyz1234...");
    assert_eq!(debug, "ReceiptHandle(\"wxyz1234...\")");
    assert!(!debug.contains("secret"));
    assert_eq!(receipt.as_str(), "wxyz1234-secret-receipt-token-value");
}

#[test]
fn test_short_receipt_is_not_padded() {
    let receipt = ReceiptHandle::new("abc");
    assert_eq!(receipt.redacted(), "abc");
}

#[test]
fn test_receipt_serializes_verbatim() {
    let receipt = ReceiptHandle::new("full-receipt-value");
    let json = serde_json::to_value(&receipt).unwrap();
    assert_eq!(json, serde_json::json!("full-receipt-value"));
}

#[test]
fn test_message_id_from_integer() {
    let id = MessageId::from(18_014_398_509_481_984_i64);
    assert_eq!(id.as_str(), "18014398509481984");
}

#[test]
fn test_timestamp_parses_rfc3339() {
    let ts: Timestamp = "2024-03-01T12:30:00.250Z".parse().unwrap();
    let expected = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap()
        + chrono::Duration::milliseconds(250);

    assert_eq!(ts.as_datetime(), expected);
    assert!("yesterday".parse::<Timestamp>().is_err());
}

#[test]
fn test_timestamp_epoch_seconds_keeps_fraction() {
    let dt = Utc.timestamp_opt(1_700_000_000, 500_000_000).unwrap();
    let ts = Timestamp::from_datetime(dt);
    assert!((ts.as_epoch_seconds() - 1_700_000_000.5).abs() < 1e-6);
}

#[test]
fn test_metadata_emptiness() {
    assert!(MessageMetadata::default().is_empty());

    let with_channel = MessageMetadata {
        channel_id: Some("orders".to_string()),
        ..Default::default()
    };
    assert!(!with_channel.is_empty());

    let mut properties = BTreeMap::new();
    properties.insert("priority".to_string(), "high".to_string());
    let with_properties = MessageMetadata {
        channel_id: None,
        custom_properties: properties,
    };
    assert!(!with_properties.is_empty());
}

#[test]
fn test_raw_message_builder() {
    let created = Timestamp::now();
    let message = RawMessage::new(MessageId::new("1"), ReceiptHandle::new("r-1"), "hello")
        .with_delivery_count(3)
        .with_created_at(created);

    assert_eq!(message.content, "hello");
    assert_eq!(message.delivery_count, 3);
    assert_eq!(message.created_at, Some(created));
    assert!(message.visible_after.is_none());
    assert!(message.expire_after.is_none());
    assert!(message.metadata.is_none());
}
