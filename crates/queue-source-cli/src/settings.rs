//! Layered source configuration.
//!
//! Sources, applied in order (later sources override earlier ones):
//!  1. The file given by `--config` or `QUEUE_SOURCE_CONFIG`, format chosen
//!     by its extension
//!  2. Environment variables prefixed `QUEUE_SOURCE__`, with `__` between
//!     nested keys, e.g. `QUEUE_SOURCE__ERROR_BACKOFF__MAX_SECONDS=60`
//!  3. Command-line flags
//!
//! Every key carries a serde default, so only the queue identity has to be
//! supplied somewhere.

use clap::Args;
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment, File, Map, Value};
use queue_source::{ConfigError, SourceConfig};
use std::path::{Path, PathBuf};

#[cfg(test)]
#[path = "settings_tests.rs"]
mod tests;

/// Prefix of environment variables read as configuration
pub const ENV_PREFIX: &str = "QUEUE_SOURCE";

/// Configuration values given as command-line flags
#[derive(Args, Debug, Clone, Default, PartialEq)]
pub struct ConfigOverrides {
    /// Source name reported in emitted events
    #[arg(long)]
    pub name: Option<String>,

    /// OCID of the queue
    #[arg(long)]
    pub queue_id: Option<String>,

    /// OCID of the compartment containing the queue
    #[arg(long)]
    pub compartment_id: Option<String>,

    /// Region hosting the queue
    #[arg(long)]
    pub region: Option<String>,

    /// Queue data-plane endpoint
    #[arg(long)]
    pub endpoint: Option<String>,

    /// Profile in the OCI config file
    #[arg(long)]
    pub profile: Option<String>,

    /// OCI config file location
    #[arg(long)]
    pub oci_config_file: Option<PathBuf>,

    /// Authenticate as the compute instance
    #[arg(long)]
    pub instance_principal: bool,

    /// Maximum messages per receive call (1-20)
    #[arg(long)]
    pub limit: Option<i64>,

    /// Long-poll wait per receive call (0-20 seconds)
    #[arg(long)]
    pub timeout_seconds: Option<i64>,

    /// Seconds received messages stay hidden
    #[arg(long)]
    pub visibility_timeout_seconds: Option<i64>,

    /// Seconds to wait after an empty or failed receive
    #[arg(long)]
    pub polling_interval: Option<f64>,

    /// Leave messages for the consumer to acknowledge
    #[arg(long)]
    pub no_auto_acknowledge: bool,
}

impl ConfigOverrides {
    fn apply(
        &self,
        builder: ConfigBuilder<DefaultState>,
    ) -> Result<ConfigBuilder<DefaultState>, config::ConfigError> {
        let mut builder = builder;
        builder = set(builder, "name", self.name.clone())?;
        builder = set(builder, "queue_id", self.queue_id.clone())?;
        builder = set(builder, "compartment_id", self.compartment_id.clone())?;
        builder = set(builder, "region", self.region.clone())?;
        builder = set(builder, "endpoint", self.endpoint.clone())?;
        builder = set(builder, "config_profile", self.profile.clone())?;
        builder = set(
            builder,
            "config_file",
            self.oci_config_file
                .as_ref()
                .map(|path| path.display().to_string()),
        )?;
        builder = set(builder, "limit", self.limit)?;
        builder = set(builder, "timeout_seconds", self.timeout_seconds)?;
        builder = set(
            builder,
            "visibility_timeout_seconds",
            self.visibility_timeout_seconds,
        )?;
        builder = set(builder, "polling_interval", self.polling_interval)?;

        if self.instance_principal {
            builder = builder.set_override("use_instance_principal", true)?;
        }
        if self.no_auto_acknowledge {
            builder = builder.set_override("auto_acknowledge", false)?;
        }

        Ok(builder)
    }
}

fn set<T: Into<Value>>(
    builder: ConfigBuilder<DefaultState>,
    key: &str,
    value: Option<T>,
) -> Result<ConfigBuilder<DefaultState>, config::ConfigError> {
    match value {
        Some(value) => builder.set_override(key, value),
        None => Ok(builder),
    }
}

/// Load the source configuration from the file, the process environment and `overrides`
pub fn load_config(
    path: Option<&Path>,
    overrides: &ConfigOverrides,
) -> Result<SourceConfig, ConfigError> {
    load_config_with_env(path, overrides, None)
}

/// Load the source configuration, reading environment variables from `env`
/// instead of the process environment when given
pub fn load_config_with_env(
    path: Option<&Path>,
    overrides: &ConfigOverrides,
    env: Option<Map<String, String>>,
) -> Result<SourceConfig, ConfigError> {
    let mut builder = Config::builder();

    if let Some(path) = path {
        builder = builder.add_source(File::from(path).required(true));
    }

    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true)
            .source(env),
    );

    let settings = overrides
        .apply(builder)
        .and_then(|builder| builder.build())
        .map_err(parsing_error)?;

    settings.try_deserialize().map_err(parsing_error)
}

fn parsing_error(error: config::ConfigError) -> ConfigError {
    ConfigError::Parsing {
        message: error.to_string(),
    }
}
