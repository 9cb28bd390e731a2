//! OCI Queue backend using the queue data-plane REST API.
//!
//! Calls the messages endpoint of a single queue directly over HTTP:
//!
//! - Receive: `GET /20210201/queues/{queueId}/messages?visibilityInSeconds=&timeoutInSeconds=&limit=`
//! - Acknowledge: `DELETE /20210201/queues/{queueId}/messages/{receipt}`
//!
//! Every request is signed by a [`RequestSigner`]. API-key profiles are
//! loaded from the OCI config file; other identities are supplied through
//! [`OciQueueBackend::with_signer`].
//!
//! ## Example
//!
//! ```no_run
//! use queue_source::providers::OciQueueBackend;
//! use queue_source::SourceConfig;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = SourceConfig {
//!     config_profile: "DEFAULT".to_string(),
//!     ..SourceConfig::new("ocid1.queue.oc1..example", "ocid1.compartment.oc1..example", "us-phoenix-1")
//! }
//! .validate()?;
//!
//! let backend = OciQueueBackend::from_config(&config)?;
//! # Ok(())
//! # }
//! ```

use crate::backend::{BackendKind, QueueBackend, ReceiveRequest};
use crate::config::{AuthMode, PollConfig};
use crate::error::{AuthError, BackendError, ConfigError, SourceError};
use crate::message::{MessageId, MessageMetadata, RawMessage, ReceiptHandle, Timestamp};
use crate::providers::oci_auth::{ApiKeySigner, OciProfile, RequestSigner};
use async_trait::async_trait;
use reqwest::{Client as HttpClient, Method, Response};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

#[cfg(test)]
#[path = "oci_tests.rs"]
mod tests;

/// Queue data-plane API version
pub const API_VERSION: &str = "20210201";

/// Time an HTTP call may take beyond the long-poll wait
const CLIENT_TIMEOUT_GRACE: Duration = Duration::from_secs(10);

/// Data-plane endpoint for queues in `region`
pub fn default_endpoint(region: &str) -> String {
    format!("https://cell-1.queue.messaging.{}.oci.oraclecloud.com", region)
}

// ============================================================================
// Wire Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct ReceiveResponse {
    #[serde(default)]
    messages: Vec<WireMessage>,
}

/// Message IDs are int64 on the wire; accept strings as well
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WireId {
    Number(i64),
    Text(String),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireMessage {
    id: WireId,
    receipt: String,
    #[serde(default)]
    content: String,
    #[serde(default = "default_delivery_count")]
    delivery_count: u32,
    #[serde(default)]
    visible_after: Option<Timestamp>,
    #[serde(default)]
    expire_after: Option<Timestamp>,
    #[serde(default)]
    created_at: Option<Timestamp>,
    #[serde(default)]
    metadata: Option<WireMetadata>,
}

fn default_delivery_count() -> u32 {
    1
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireMetadata {
    #[serde(default)]
    channel_id: Option<String>,
    #[serde(default)]
    custom_properties: BTreeMap<String, String>,
}

impl WireMessage {
    fn into_raw(self) -> RawMessage {
        let id = match self.id {
            WireId::Number(id) => MessageId::from(id),
            WireId::Text(id) => MessageId::new(id),
        };

        RawMessage {
            id,
            receipt: ReceiptHandle::new(self.receipt),
            content: self.content,
            delivery_count: self.delivery_count,
            visible_after: self.visible_after,
            expire_after: self.expire_after,
            created_at: self.created_at,
            metadata: self.metadata.map(|m| MessageMetadata {
                channel_id: m.channel_id,
                custom_properties: m.custom_properties,
            }),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct OciErrorBody {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

// ============================================================================
// OciQueueBackend
// ============================================================================

/// OCI Queue backend for one queue
pub struct OciQueueBackend {
    http_client: HttpClient,
    signer: Arc<dyn RequestSigner>,
    endpoint: Url,
    queue_id: String,
    request_timeout: Duration,
    closed: AtomicBool,
}

impl OciQueueBackend {
    /// Create a backend authenticating with the configured OCI profile.
    ///
    /// # Errors
    ///
    /// Returns an authentication error if the profile or its key cannot be
    /// loaded, or if instance-principal authentication is selected, which
    /// requires [`OciQueueBackend::with_signer`].
    pub fn from_config(config: &PollConfig) -> Result<Self, SourceError> {
        let signer: Arc<dyn RequestSigner> = match config.auth() {
            AuthMode::UserPrincipal {
                profile,
                config_file,
            } => {
                let path = match config_file {
                    Some(path) => path.clone(),
                    None => OciProfile::default_config_file().ok_or_else(|| {
                        AuthError::ConfigFile {
                            path: "~/.oci/config".to_string(),
                            message: "home directory could not be determined".to_string(),
                        }
                    })?,
                };

                let profile = OciProfile::load(&path, profile)?.with_region(config.region());
                Arc::new(ApiKeySigner::from_profile(&profile)?)
            }
            AuthMode::InstancePrincipal => {
                return Err(AuthError::UnsupportedMode {
                    mode: "instance_principal".to_string(),
                }
                .into())
            }
        };

        Self::with_signer(config, signer)
    }

    /// Create a backend that signs requests with `signer`
    pub fn with_signer(
        config: &PollConfig,
        signer: Arc<dyn RequestSigner>,
    ) -> Result<Self, SourceError> {
        let endpoint_str = config
            .endpoint()
            .map(str::to_string)
            .unwrap_or_else(|| default_endpoint(config.region()));
        let endpoint = Url::parse(&endpoint_str)
            .map_err(|e| ConfigError::invalid("endpoint", e.to_string()))?;

        let request_timeout =
            Duration::from_secs(u64::from(config.poll_timeout_seconds())) + CLIENT_TIMEOUT_GRACE;
        let http_client = HttpClient::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| AuthError::Client {
                message: e.to_string(),
            })?;

        info!(
            endpoint = %endpoint,
            queue_id = %config.queue_id(),
            "Created OCI Queue client"
        );

        Ok(Self {
            http_client,
            signer,
            endpoint,
            queue_id: config.queue_id().to_string(),
            request_timeout,
            closed: AtomicBool::new(false),
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    fn messages_url(&self, suffix: Option<&str>) -> Result<Url, BackendError> {
        let mut url = format!(
            "{}/{}/queues/{}/messages",
            self.endpoint.as_str().trim_end_matches('/'),
            API_VERSION,
            urlencoding::encode(&self.queue_id)
        );
        if let Some(suffix) = suffix {
            url.push('/');
            url.push_str(&urlencoding::encode(suffix));
        }

        Url::parse(&url).map_err(|e| BackendError::ClientUnusable {
            message: format!("Invalid request URL: {}", e),
        })
    }

    fn ensure_open(&self) -> Result<(), BackendError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(BackendError::ClientUnusable {
                message: "OCI Queue client has been closed".to_string(),
            });
        }
        Ok(())
    }

    /// Sign and send a request
    async fn execute(&self, method: Method, url: Url) -> Result<Response, BackendError> {
        let headers = self
            .signer
            .sign(method.as_str(), &url)
            .await
            .map_err(|e| BackendError::AuthenticationFailed {
                message: e.to_string(),
            })?;

        self.http_client
            .request(method, url)
            .header("date", headers.date)
            .header("authorization", headers.authorization)
            .header("accept", "application/json")
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    BackendError::Timeout {
                        duration: self.request_timeout,
                    }
                } else if e.is_connect() {
                    BackendError::ConnectionFailed {
                        message: format!("Connection failed: {}", e),
                    }
                } else {
                    BackendError::ConnectionFailed {
                        message: format!("HTTP request failed: {}", e),
                    }
                }
            })
    }

    /// Map a non-success response to a backend error
    async fn error_from_response(
        response: Response,
        operation: &str,
        not_found: BackendError,
    ) -> BackendError {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        let parsed: OciErrorBody = serde_json::from_str(&body).unwrap_or_else(|_| OciErrorBody {
            code: String::new(),
            message: body.clone(),
        });

        match status {
            401 => BackendError::AuthenticationFailed {
                message: parsed.message,
            },
            403 => BackendError::PermissionDenied {
                operation: operation.to_string(),
            },
            404 => not_found,
            _ => BackendError::Provider {
                status,
                code: parsed.code,
                message: parsed.message,
            },
        }
    }
}

impl fmt::Debug for OciQueueBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OciQueueBackend")
            .field("endpoint", &self.endpoint.as_str())
            .field("queue_id", &self.queue_id)
            .field("signer", &"<REDACTED>")
            .finish()
    }
}

#[async_trait]
impl QueueBackend for OciQueueBackend {
    async fn receive(&self, request: &ReceiveRequest) -> Result<Vec<RawMessage>, BackendError> {
        self.ensure_open()?;

        let mut url = self.messages_url(None)?;
        url.query_pairs_mut()
            .append_pair("visibilityInSeconds", &request.visibility_seconds.to_string())
            .append_pair("timeoutInSeconds", &request.wait_seconds.to_string())
            .append_pair("limit", &request.limit.to_string());

        let response = self.execute(Method::GET, url).await?;
        if !response.status().is_success() {
            let not_found = BackendError::QueueNotFound {
                queue_id: self.queue_id.clone(),
            };
            return Err(Self::error_from_response(response, "receive messages", not_found).await);
        }

        let body = response
            .text()
            .await
            .map_err(|e| BackendError::ConnectionFailed {
                message: format!("Failed to read response body: {}", e),
            })?;
        let parsed: ReceiveResponse =
            serde_json::from_str(&body).map_err(|e| BackendError::Serialization {
                message: format!("Invalid receive response: {}", e),
            })?;

        debug!(
            queue_id = %self.queue_id,
            count = parsed.messages.len(),
            "Received messages from OCI Queue"
        );

        Ok(parsed.messages.into_iter().map(WireMessage::into_raw).collect())
    }

    async fn acknowledge(&self, receipt: &ReceiptHandle) -> Result<(), BackendError> {
        self.ensure_open()?;

        let url = self.messages_url(Some(receipt.as_str()))?;
        let response = self.execute(Method::DELETE, url).await?;
        if !response.status().is_success() {
            let not_found = BackendError::MessageNotFound {
                receipt: receipt.redacted(),
            };
            return Err(Self::error_from_response(response, "delete message", not_found).await);
        }

        Ok(())
    }

    async fn close(&self) -> Result<(), BackendError> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            debug!(queue_id = %self.queue_id, "Closed OCI Queue client");
        }
        Ok(())
    }

    fn kind(&self) -> BackendKind {
        BackendKind::OciQueue
    }
}
