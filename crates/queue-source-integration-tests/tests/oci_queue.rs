//! Integration tests for the poll loop against a mock OCI Queue endpoint
//!
//! These tests verify:
//! - A received message is delivered and then deleted through its receipt
//! - Server errors are retried until a receive succeeds

mod common;

use async_trait::async_trait;
use common::{spawn_listen, COMPARTMENT_ID, QUEUE_ID, REGION};
use queue_source::providers::SignedHeaders;
use queue_source::{
    AuthError, ChannelSink, Event, OciQueueBackend, PollLoop, RequestSigner, SourceConfig,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const MESSAGES_PATH: &str = "/20210201/queues/ocid1.queue.oc1.phx.integration/messages";

struct StaticSigner;

#[async_trait]
impl RequestSigner for StaticSigner {
    async fn sign(&self, _method: &str, _url: &Url) -> Result<SignedHeaders, AuthError> {
        Ok(SignedHeaders {
            date: "Mon, 01 Jan 2024 00:00:00 GMT".to_string(),
            authorization: "Signature integration".to_string(),
        })
    }
}

fn oci_loop(server: &MockServer) -> (Arc<PollLoop>, mpsc::Receiver<Event>) {
    let config = SourceConfig {
        endpoint: Some(server.uri()),
        timeout_seconds: 0,
        polling_interval: 0.05,
        ..SourceConfig::new(QUEUE_ID, COMPARTMENT_ID, REGION)
    }
    .validate()
    .unwrap();

    let backend = OciQueueBackend::with_signer(&config, Arc::new(StaticSigner)).unwrap();
    let (sink, events) = ChannelSink::channel(4);
    let poll = PollLoop::new(config, Arc::new(backend), Arc::new(sink));
    (Arc::new(poll), events)
}

/// Verify receive, delivery and delete against the queue REST API.
#[tokio::test]
async fn test_message_is_delivered_and_deleted() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(MESSAGES_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "messages": [{
                "id": 101,
                "receipt": "receipt-101",
                "content": "hello from oci",
                "deliveryCount": 1,
                "visibleAfter": "2024-01-01T00:00:30Z",
                "expireAfter": "2024-01-08T00:00:00Z",
                "createdAt": "2024-01-01T00:00:00Z"
            }]
        })))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(MESSAGES_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "messages": [] })))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path(format!("{}/receipt-101", MESSAGES_PATH)))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let (poll, mut events) = oci_loop(&server);
    let handle = spawn_listen(&poll);

    let event = tokio::time::timeout(Duration::from_secs(10), events.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(event.message_id().as_str(), "101");
    assert_eq!(event.body.content, "hello from oci");

    let mut deleted = false;
    for _ in 0..400 {
        let requests = server.received_requests().await.unwrap_or_default();
        if requests.iter().any(|r| r.method.as_str() == "DELETE") {
            deleted = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    assert!(deleted, "message was never deleted");

    poll.stop();
    let summary = handle.await.unwrap().unwrap();
    assert_eq!(summary.events_delivered, 1);
    assert_eq!(summary.acknowledged, 1);
}

/// Verify that the loop backs off through server errors and then delivers.
#[tokio::test]
async fn test_server_errors_are_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(MESSAGES_PATH))
        .respond_with(ResponseTemplate::new(503).set_body_json(json!({
            "code": "ServiceUnavailable",
            "message": "try again"
        })))
        .up_to_n_times(2)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(MESSAGES_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "messages": [{ "id": 7, "receipt": "receipt-7", "content": "after outage" }]
        })))
        .up_to_n_times(1)
        .with_priority(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(MESSAGES_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "messages": [] })))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let (poll, mut events) = oci_loop(&server);
    let handle = spawn_listen(&poll);

    let event = tokio::time::timeout(Duration::from_secs(10), events.recv())
        .await
        .unwrap()
        .unwrap();
    poll.stop();
    let summary = handle.await.unwrap().unwrap();

    assert_eq!(event.body.content, "after outage");
    assert_eq!(event.body.delivery_count, 1);
    assert_eq!(summary.receive_errors, 2);
    assert_eq!(summary.events_delivered, 1);
    assert_eq!(summary.acknowledged, 1);
}
