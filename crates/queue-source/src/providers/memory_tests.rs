//! Tests for the in-memory queue backend.

use super::*;
use std::sync::Arc;

fn request(limit: u32, wait_seconds: u32, visibility_seconds: u32) -> ReceiveRequest {
    ReceiveRequest {
        limit,
        wait_seconds,
        visibility_seconds,
    }
}

// ============================================================================
// Send and Receive
// ============================================================================

mod send_and_receive {
    use super::*;

    /// Verify that messages come back in send order with their content.
    #[tokio::test]
    async fn test_receive_returns_messages_in_order() {
        let backend = InMemoryBackend::new();
        backend.send("first").unwrap();
        backend.send("second").unwrap();
        backend.send("third").unwrap();

        let messages = backend.receive(&request(10, 0, 30)).await.unwrap();

        let contents: Vec<&str> = messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["first", "second", "third"]);
        assert!(messages.iter().all(|m| m.delivery_count == 1));
    }

    /// Verify that the batch limit is honored.
    #[tokio::test]
    async fn test_receive_respects_limit() {
        let backend = InMemoryBackend::new();
        for i in 0..5 {
            backend.send(format!("message-{}", i)).unwrap();
        }

        let first = backend.receive(&request(2, 0, 30)).await.unwrap();
        let second = backend.receive(&request(2, 0, 30)).await.unwrap();

        assert_eq!(first.len(), 2);
        assert_eq!(second.len(), 2);
        assert_eq!(second[0].content, "message-2");
        assert_eq!(backend.pending_count().unwrap(), 5);
    }

    /// Verify that message IDs are unique and receipts differ per delivery.
    #[tokio::test]
    async fn test_ids_and_receipts_are_unique() {
        let backend = InMemoryBackend::new();
        let a = backend.send("a").unwrap();
        let b = backend.send("b").unwrap();
        assert_ne!(a, b);

        let messages = backend.receive(&request(2, 0, 30)).await.unwrap();
        assert_ne!(messages[0].receipt, messages[1].receipt);
        assert_eq!(messages[0].id, a);
    }

    /// Verify that metadata is carried to the received message.
    #[tokio::test]
    async fn test_metadata_is_preserved() {
        let backend = InMemoryBackend::new();
        let mut metadata = MessageMetadata {
            channel_id: Some("orders".to_string()),
            ..Default::default()
        };
        metadata
            .custom_properties
            .insert("tenant".to_string(), "acme".to_string());
        backend.send_with_metadata("payload", metadata.clone()).unwrap();

        let messages = backend.receive(&request(1, 0, 30)).await.unwrap();

        assert_eq!(messages[0].metadata, Some(metadata));
        assert!(messages[0].created_at.is_some());
        assert!(messages[0].visible_after.is_some());
    }

    /// Verify that an empty queue returns immediately without a wait.
    #[tokio::test(start_paused = true)]
    async fn test_empty_receive_without_wait_returns_immediately() {
        let backend = InMemoryBackend::new();
        let started = Instant::now();

        let messages = backend.receive(&request(1, 0, 30)).await.unwrap();

        assert!(messages.is_empty());
        assert_eq!(started.elapsed(), Duration::ZERO);
    }
}

// ============================================================================
// Long Polling
// ============================================================================

mod long_polling {
    use super::*;

    /// Verify that an empty long poll waits for the full wait time.
    #[tokio::test(start_paused = true)]
    async fn test_long_poll_waits_for_wait_seconds() {
        let backend = InMemoryBackend::new();
        let started = Instant::now();

        let messages = backend.receive(&request(1, 20, 30)).await.unwrap();

        assert!(messages.is_empty());
        assert!(started.elapsed() >= Duration::from_secs(20));
    }

    /// Verify that a long poll wakes up as soon as a message is sent.
    #[tokio::test(start_paused = true)]
    async fn test_long_poll_wakes_on_send() {
        let backend = Arc::new(InMemoryBackend::new());
        let sender = Arc::clone(&backend);

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(3)).await;
            sender.send("late").unwrap();
        });

        let started = Instant::now();
        let messages = backend.receive(&request(1, 20, 30)).await.unwrap();

        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].content, "late");
        assert!(started.elapsed() < Duration::from_secs(20));
    }

    /// Verify that close interrupts a pending long poll.
    #[tokio::test(start_paused = true)]
    async fn test_close_interrupts_long_poll() {
        let backend = Arc::new(InMemoryBackend::new());
        let closer = Arc::clone(&backend);

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            closer.close().await.unwrap();
        });

        let result = backend.receive(&request(1, 20, 30)).await;

        assert!(matches!(result, Err(BackendError::ClientUnusable { .. })));
    }
}

// ============================================================================
// Visibility and Acknowledgment
// ============================================================================

mod visibility {
    use super::*;

    /// Verify that a received message is hidden until its visibility expires.
    #[tokio::test(start_paused = true)]
    async fn test_received_message_is_hidden() {
        let backend = InMemoryBackend::new();
        backend.send("hidden").unwrap();

        let first = backend.receive(&request(1, 0, 30)).await.unwrap();
        let second = backend.receive(&request(1, 0, 30)).await.unwrap();

        assert_eq!(first.len(), 1);
        assert!(second.is_empty());
        assert_eq!(backend.in_flight_count().unwrap(), 1);
    }

    /// Verify that an unacknowledged message is redelivered after the timeout.
    #[tokio::test(start_paused = true)]
    async fn test_unacknowledged_message_is_redelivered() {
        let backend = InMemoryBackend::new();
        let id = backend.send("retry me").unwrap();

        let first = backend.receive(&request(1, 0, 30)).await.unwrap();
        tokio::time::advance(Duration::from_secs(31)).await;
        let second = backend.receive(&request(1, 0, 30)).await.unwrap();

        assert_eq!(second.len(), 1);
        assert_eq!(second[0].id, id);
        assert_eq!(second[0].delivery_count, 2);
        assert_ne!(second[0].receipt, first[0].receipt);
    }

    /// Verify that a long poll picks up a message whose visibility expires while waiting.
    #[tokio::test(start_paused = true)]
    async fn test_long_poll_sees_expiring_visibility() {
        let backend = InMemoryBackend::new();
        backend.send("comes back").unwrap();
        backend.receive(&request(1, 0, 5)).await.unwrap();

        let started = Instant::now();
        let messages = backend.receive(&request(1, 20, 5)).await.unwrap();

        assert_eq!(messages.len(), 1);
        assert!(started.elapsed() >= Duration::from_secs(5));
        assert!(started.elapsed() < Duration::from_secs(20));
    }

    /// Verify that acknowledging removes the message for good.
    #[tokio::test(start_paused = true)]
    async fn test_acknowledge_deletes_message() {
        let backend = InMemoryBackend::new();
        backend.send("done").unwrap();

        let messages = backend.receive(&request(1, 0, 30)).await.unwrap();
        backend.acknowledge(&messages[0].receipt).await.unwrap();
        tokio::time::advance(Duration::from_secs(60)).await;

        assert!(backend.receive(&request(1, 0, 30)).await.unwrap().is_empty());
        assert_eq!(backend.pending_count().unwrap(), 0);
    }

    /// Verify that a receipt from an expired delivery can no longer acknowledge.
    #[tokio::test(start_paused = true)]
    async fn test_stale_receipt_is_rejected() {
        let backend = InMemoryBackend::new();
        backend.send("slow").unwrap();

        let first = backend.receive(&request(1, 0, 10)).await.unwrap();
        tokio::time::advance(Duration::from_secs(11)).await;

        let result = backend.acknowledge(&first[0].receipt).await;

        assert!(matches!(result, Err(BackendError::MessageNotFound { .. })));
        assert_eq!(backend.pending_count().unwrap(), 1);
    }

    /// Verify that unknown receipts are rejected.
    #[tokio::test]
    async fn test_unknown_receipt_is_rejected() {
        let backend = InMemoryBackend::new();

        let result = backend.acknowledge(&ReceiptHandle::new("no-such-receipt")).await;

        assert!(matches!(result, Err(BackendError::MessageNotFound { .. })));
    }

    /// Verify that messages redelivered together keep their send order.
    #[tokio::test(start_paused = true)]
    async fn test_redelivery_preserves_order() {
        let backend = InMemoryBackend::new();
        for name in ["a", "b", "c"] {
            backend.send(name).unwrap();
        }

        backend.receive(&request(3, 0, 10)).await.unwrap();
        tokio::time::advance(Duration::from_secs(10)).await;
        let redelivered = backend.receive(&request(3, 0, 10)).await.unwrap();

        let contents: Vec<&str> = redelivered.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["a", "b", "c"]);
    }
}

// ============================================================================
// Lifecycle
// ============================================================================

mod lifecycle {
    use super::*;

    /// Verify that a closed backend refuses every operation.
    #[tokio::test]
    async fn test_closed_backend_is_unusable() {
        let backend = InMemoryBackend::new();
        backend.close().await.unwrap();

        assert!(backend.is_closed());
        assert!(matches!(
            backend.send("late"),
            Err(BackendError::ClientUnusable { .. })
        ));
        assert!(matches!(
            backend.receive(&request(1, 0, 30)).await,
            Err(BackendError::ClientUnusable { .. })
        ));
        assert!(backend
            .receive(&request(1, 0, 30))
            .await
            .unwrap_err()
            .is_fatal());
    }

    /// Verify the backend identifies itself.
    #[test]
    fn test_backend_kind() {
        assert_eq!(InMemoryBackend::new().kind(), BackendKind::InMemory);
    }
}
