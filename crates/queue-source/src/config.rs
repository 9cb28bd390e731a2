//! Source configuration: the recognized option surface and its validated form.
//!
//! [`SourceConfig`] mirrors the options an operator writes down (all keys are
//! snake_case and carry serde defaults). [`SourceConfig::validate`] is the
//! only way to obtain a [`PollConfig`], so a poll loop can never be built from
//! out-of-range values.

use crate::backoff::{BackoffPolicy, ErrorBackoff};
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Longest long-poll wait the queue service accepts
pub const MAX_POLL_TIMEOUT_SECONDS: i64 = 20;

/// Largest batch the queue service returns from one receive call
pub const MAX_BATCH_LIMIT: i64 = 20;

/// Longest extra time a receive call may take beyond the long-poll wait
pub const MAX_RECEIVE_GRACE_SECONDS: u64 = 3600;

/// Source kind used for the event key and `meta.source.type`
pub const SOURCE_KIND: &str = "oci_queue";

fn default_name() -> String {
    SOURCE_KIND.to_string()
}

fn default_config_profile() -> String {
    "DEFAULT".to_string()
}

fn default_timeout_seconds() -> i64 {
    20
}

fn default_visibility_timeout_seconds() -> i64 {
    30
}

fn default_limit() -> i64 {
    1
}

fn default_polling_interval() -> f64 {
    5.0
}

fn default_auto_acknowledge() -> bool {
    true
}

fn default_receive_grace_seconds() -> u64 {
    10
}

// ============================================================================
// Raw configuration
// ============================================================================

/// Source options as supplied by the operator, before validation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Source name reported in `meta.source.name`
    #[serde(default = "default_name")]
    pub name: String,

    /// OCID of the queue to receive from
    #[serde(default)]
    pub queue_id: Option<String>,

    /// OCID of the compartment containing the queue
    #[serde(default)]
    pub compartment_id: Option<String>,

    /// Region hosting the queue, e.g. `us-phoenix-1`
    #[serde(default)]
    pub region: Option<String>,

    /// Authenticate as the compute instance instead of an API-key user
    #[serde(default)]
    pub use_instance_principal: bool,

    /// Profile name in the OCI config file
    #[serde(default = "default_config_profile")]
    pub config_profile: String,

    /// OCI config file location (defaults to `~/.oci/config`)
    #[serde(default)]
    pub config_file: Option<PathBuf>,

    /// Override of the queue data-plane endpoint
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Long-poll wait per receive call, 0-20 seconds
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: i64,

    /// How long received messages stay hidden from other consumers
    #[serde(default = "default_visibility_timeout_seconds")]
    pub visibility_timeout_seconds: i64,

    /// Maximum messages per receive call, 1-20
    #[serde(default = "default_limit")]
    pub limit: i64,

    /// Seconds to wait after an empty or failed receive
    #[serde(default = "default_polling_interval")]
    pub polling_interval: f64,

    /// Acknowledge each message once the sink accepted its event
    #[serde(default = "default_auto_acknowledge")]
    pub auto_acknowledge: bool,

    /// Escalating backoff for consecutive receive failures
    #[serde(default)]
    pub error_backoff: Option<ErrorBackoffConfig>,

    /// Extra time a receive call may take beyond the long-poll wait
    #[serde(default = "default_receive_grace_seconds")]
    pub receive_grace_seconds: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            queue_id: None,
            compartment_id: None,
            region: None,
            use_instance_principal: false,
            config_profile: default_config_profile(),
            config_file: None,
            endpoint: None,
            timeout_seconds: default_timeout_seconds(),
            visibility_timeout_seconds: default_visibility_timeout_seconds(),
            limit: default_limit(),
            polling_interval: default_polling_interval(),
            auto_acknowledge: default_auto_acknowledge(),
            error_backoff: None,
            receive_grace_seconds: default_receive_grace_seconds(),
        }
    }
}

/// Escalating error backoff options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBackoffConfig {
    pub initial_seconds: f64,
    pub max_seconds: f64,
    #[serde(default = "ErrorBackoffConfig::default_multiplier")]
    pub multiplier: f64,
    #[serde(default = "ErrorBackoffConfig::default_jitter")]
    pub jitter: f64,
}

impl ErrorBackoffConfig {
    fn default_multiplier() -> f64 {
        2.0
    }

    fn default_jitter() -> f64 {
        0.25
    }
}

impl SourceConfig {
    /// Create configuration for a queue with all other options defaulted
    pub fn new(
        queue_id: impl Into<String>,
        compartment_id: impl Into<String>,
        region: impl Into<String>,
    ) -> Self {
        Self {
            queue_id: Some(queue_id.into()),
            compartment_id: Some(compartment_id.into()),
            region: Some(region.into()),
            ..Default::default()
        }
    }

    /// Validate every option and produce the immutable poll configuration
    pub fn validate(&self) -> Result<PollConfig, ConfigError> {
        let queue_id = required("queue_id", &self.queue_id)?;
        let compartment_id = required("compartment_id", &self.compartment_id)?;
        let region = required("region", &self.region)?;

        if self.name.trim().is_empty() {
            return Err(ConfigError::invalid("name", "must not be empty"));
        }

        if !(0..=MAX_POLL_TIMEOUT_SECONDS).contains(&self.timeout_seconds) {
            return Err(ConfigError::invalid(
                "timeout_seconds",
                format!("must be between 0 and {}", MAX_POLL_TIMEOUT_SECONDS),
            ));
        }

        if !(1..=MAX_BATCH_LIMIT).contains(&self.limit) {
            return Err(ConfigError::invalid(
                "limit",
                format!("must be between 1 and {}", MAX_BATCH_LIMIT),
            ));
        }

        let visibility_timeout_seconds = u32::try_from(self.visibility_timeout_seconds)
            .map_err(|_| ConfigError::invalid("visibility_timeout_seconds", "must be >= 0"))?;

        if !self.polling_interval.is_finite() || self.polling_interval < 0.0 {
            return Err(ConfigError::invalid(
                "polling_interval",
                "must be a non-negative number of seconds",
            ));
        }

        if let Some(endpoint) = &self.endpoint {
            if !(endpoint.starts_with("https://") || endpoint.starts_with("http://")) {
                return Err(ConfigError::invalid(
                    "endpoint",
                    "must be an http:// or https:// URL",
                ));
            }
        }

        let idle_interval = seconds("polling_interval", self.polling_interval)?;

        if self.receive_grace_seconds > MAX_RECEIVE_GRACE_SECONDS {
            return Err(ConfigError::invalid(
                "receive_grace_seconds",
                format!("must be at most {}", MAX_RECEIVE_GRACE_SECONDS),
            ));
        }
        let receive_deadline = Duration::from_secs(self.timeout_seconds as u64)
            + Duration::from_secs(self.receive_grace_seconds);
        let backoff = match &self.error_backoff {
            Some(error_backoff) => {
                BackoffPolicy::new(idle_interval).with_error_backoff(error_backoff.validate()?)
            }
            None => BackoffPolicy::new(idle_interval),
        };

        let auth = if self.use_instance_principal {
            AuthMode::InstancePrincipal
        } else {
            AuthMode::UserPrincipal {
                profile: self.config_profile.clone(),
                config_file: self.config_file.clone(),
            }
        };

        Ok(PollConfig {
            name: self.name.clone(),
            queue_id,
            compartment_id,
            region,
            auth,
            endpoint: self.endpoint.clone(),
            // Both ranges were checked above.
            poll_timeout_seconds: self.timeout_seconds as u32,
            visibility_timeout_seconds,
            batch_limit: self.limit as u32,
            auto_acknowledge: self.auto_acknowledge,
            backoff,
            receive_deadline,
        })
    }
}

impl ErrorBackoffConfig {
    fn validate(&self) -> Result<ErrorBackoff, ConfigError> {
        if !self.initial_seconds.is_finite() || self.initial_seconds <= 0.0 {
            return Err(ConfigError::invalid(
                "error_backoff.initial_seconds",
                "must be greater than 0",
            ));
        }
        if !self.max_seconds.is_finite() || self.max_seconds < self.initial_seconds {
            return Err(ConfigError::invalid(
                "error_backoff.max_seconds",
                "must be at least initial_seconds",
            ));
        }
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err(ConfigError::invalid(
                "error_backoff.multiplier",
                "must be at least 1.0",
            ));
        }
        if !(0.0..=1.0).contains(&self.jitter) {
            return Err(ConfigError::invalid(
                "error_backoff.jitter",
                "must be between 0.0 and 1.0",
            ));
        }

        Ok(ErrorBackoff::new(
            seconds("error_backoff.initial_seconds", self.initial_seconds)?,
            seconds("error_backoff.max_seconds", self.max_seconds)?,
            self.multiplier,
        )
        .with_jitter_percent(self.jitter))
    }
}

fn seconds(field: &str, value: f64) -> Result<Duration, ConfigError> {
    Duration::try_from_secs_f64(value)
        .map_err(|_| ConfigError::invalid(field, "is not a representable number of seconds"))
}

fn required(key: &str, value: &Option<String>) -> Result<String, ConfigError> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => Err(ConfigError::Missing {
            key: key.to_string(),
        }),
    }
}

// ============================================================================
// Validated configuration
// ============================================================================

/// How the backend client authenticates
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthMode {
    /// API-key user from an OCI config file profile
    UserPrincipal {
        profile: String,
        config_file: Option<PathBuf>,
    },
    /// Identity of the compute instance the source runs on
    InstancePrincipal,
}

/// Validated, immutable configuration of one poll loop
#[derive(Debug, Clone)]
pub struct PollConfig {
    name: String,
    queue_id: String,
    compartment_id: String,
    region: String,
    auth: AuthMode,
    endpoint: Option<String>,
    poll_timeout_seconds: u32,
    visibility_timeout_seconds: u32,
    batch_limit: u32,
    auto_acknowledge: bool,
    backoff: BackoffPolicy,
    receive_deadline: Duration,
}

impl PollConfig {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn queue_id(&self) -> &str {
        &self.queue_id
    }

    pub fn compartment_id(&self) -> &str {
        &self.compartment_id
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn auth(&self) -> &AuthMode {
        &self.auth
    }

    pub fn endpoint(&self) -> Option<&str> {
        self.endpoint.as_deref()
    }

    /// Long-poll wait passed to each receive call
    pub fn poll_timeout_seconds(&self) -> u32 {
        self.poll_timeout_seconds
    }

    pub fn visibility_timeout_seconds(&self) -> u32 {
        self.visibility_timeout_seconds
    }

    pub fn batch_limit(&self) -> u32 {
        self.batch_limit
    }

    pub fn auto_acknowledge(&self) -> bool {
        self.auto_acknowledge
    }

    pub fn backoff(&self) -> &BackoffPolicy {
        &self.backoff
    }

    /// Upper bound on a single receive call, after which it counts as timed out
    pub fn receive_deadline(&self) -> Duration {
        self.receive_deadline
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
