//! # Queue Source CLI
//!
//! Command-line runner for the OCI Queue event source.
//!
//! This module provides CLI commands for:
//! - Polling a queue and writing every message to stdout as a JSON line
//! - Validating the effective configuration
//!
//! Logs go to stderr so stdout carries nothing but events.

use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand, ValueEnum};
use queue_source::{
    create_backend, ensure_available, AuthError, BackendError, BackendKind, ConfigError,
    InMemoryBackend, PollConfig, PollLoop, QueueBackend, SourceError,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub mod output;
pub mod settings;

pub use output::JsonLinesSink;
pub use settings::{load_config, ConfigOverrides};

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;

// ============================================================================
// CLI Structure
// ============================================================================

/// Queue Source CLI - OCI Queue polling event source
#[derive(Parser, Debug)]
#[command(name = "queue-source")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Poll an OCI Queue and emit each message as a JSON event")]
#[command(
    long_about = "Queue Source long-polls an OCI Queue, writes every message to stdout as a JSON event and acknowledges it once written"
)]
pub struct Cli {
    /// Configuration file path (YAML, TOML or JSON)
    #[arg(short, long, env = "QUEUE_SOURCE_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Logging level
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,

    /// Enable JSON logging
    #[arg(long, global = true)]
    pub json_logs: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Poll the queue until interrupted
    Listen {
        /// Queue backend to poll
        #[arg(long, value_enum, default_value_t = BackendChoice::Oci)]
        backend: BackendChoice,

        #[command(flatten)]
        overrides: ConfigOverrides,
    },

    /// Validate the effective configuration and exit
    Validate {
        /// Print the effective configuration as JSON
        #[arg(long)]
        show: bool,

        #[command(flatten)]
        overrides: ConfigOverrides,
    },
}

/// Queue backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BackendChoice {
    /// OCI Queue over HTTPS
    Oci,
    /// In-memory queue fed with one message per stdin line
    Memory,
}

// ============================================================================
// CLI Error Types
// ============================================================================

/// CLI-specific errors
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("Authentication error: {0}")]
    Authentication(#[from] AuthError),

    #[error("Queue backend failed: {0}")]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CliError {
    /// Process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Configuration(_) => 1,
            Self::Authentication(_) => 2,
            Self::Backend(_) => 3,
            Self::Other(_) => 4,
        }
    }
}

impl From<SourceError> for CliError {
    fn from(error: SourceError) -> Self {
        match error {
            SourceError::Configuration(e) => Self::Configuration(e),
            SourceError::Authentication(e) => Self::Authentication(e),
            SourceError::Backend(e) => Self::Backend(e),
            other => Self::Other(anyhow!(other)),
        }
    }
}

// ============================================================================
// CLI Implementation
// ============================================================================

/// Parse the command line, initialize logging and run the selected command
pub async fn run_cli() -> Result<(), CliError> {
    let cli = Cli::parse();

    init_logging(&cli.log_level, cli.json_logs)?;

    run(cli).await
}

/// Run an already parsed command line
pub async fn run(cli: Cli) -> Result<(), CliError> {
    let Cli {
        config, command, ..
    } = cli;

    match command {
        Commands::Listen { backend, overrides } => {
            execute_listen(config.as_deref(), backend, &overrides).await
        }
        Commands::Validate { show, overrides } => {
            execute_validate(config.as_deref(), show, &overrides)
        }
    }
}

/// Default log filter for `level` when `RUST_LOG` is not set
pub fn default_log_filter(level: &str) -> String {
    format!("queue_source={level},queue_source_cli={level}")
}

/// Install the global tracing subscriber, writing to stderr
pub fn init_logging(level: &str, json: bool) -> Result<(), CliError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_log_filter(level)));
    let registry = tracing_subscriber::registry().with(filter);

    let result = if json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .try_init()
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init()
    };

    result
        .map_err(|e| anyhow!("Failed to initialize logging: {}", e))
        .map_err(CliError::from)
}

fn execute_validate(
    config_path: Option<&Path>,
    show: bool,
    overrides: &ConfigOverrides,
) -> Result<(), CliError> {
    let source_config = load_config(config_path, overrides)?;
    let poll_config = source_config.validate()?;

    info!(
        name = %poll_config.name(),
        queue_id = %poll_config.queue_id(),
        region = %poll_config.region(),
        "Configuration is valid"
    );

    if show {
        let rendered = serde_json::to_string_pretty(&source_config)
            .context("Failed to render configuration")?;
        println!("{}", rendered);
    }

    Ok(())
}

async fn execute_listen(
    config_path: Option<&Path>,
    choice: BackendChoice,
    overrides: &ConfigOverrides,
) -> Result<(), CliError> {
    let source_config = load_config(config_path, overrides)?;
    let poll_config = source_config.validate()?;

    if let Some(message) = acknowledgment_warning(&poll_config) {
        warn!(
            visibility_timeout_seconds = poll_config.visibility_timeout_seconds(),
            "{}", message
        );
    }

    let backend: Arc<dyn QueueBackend> = match choice {
        BackendChoice::Oci => {
            ensure_available(BackendKind::OciQueue)?;
            create_backend(&poll_config)?
        }
        BackendChoice::Memory => {
            let memory = Arc::new(InMemoryBackend::new());
            let feeder = Arc::clone(&memory);
            tokio::spawn(async move {
                match feed_lines(BufReader::new(tokio::io::stdin()), &feeder).await {
                    Ok(count) => info!(count = count, "Finished reading messages from stdin"),
                    Err(e) => warn!(error = %e, "Stopped reading messages from stdin"),
                }
            });
            memory
        }
    };

    let poll = PollLoop::new(poll_config, backend, Arc::new(JsonLinesSink::stdout()));
    let stop = poll.stop_handle();

    tokio::spawn(async move {
        match shutdown_signal().await {
            Ok(()) => stop.stop(),
            Err(e) => {
                error!(error = %e, "Signal handling failed, stopping");
                stop.stop();
            }
        }
    });

    let summary = poll.listen().await?;

    info!(
        events_delivered = summary.events_delivered,
        acknowledged = summary.acknowledged,
        delivery_failures = summary.delivery_failures,
        "Queue source stopped"
    );

    Ok(())
}

/// Warning for a listen run whose messages nothing will acknowledge.
///
/// The runner only writes events to stdout, so with auto-acknowledge off
/// every message comes back once its visibility timeout expires.
pub fn acknowledgment_warning(config: &PollConfig) -> Option<&'static str> {
    if config.auto_acknowledge() {
        return None;
    }
    Some("Auto-acknowledge is disabled and this runner never acknowledges; messages will be redelivered after each visibility timeout")
}

/// Send every non-empty line of `reader` to `backend` as one message
pub async fn feed_lines<R>(reader: R, backend: &InMemoryBackend) -> anyhow::Result<usize>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut count = 0;

    while let Some(line) = lines
        .next_line()
        .await
        .context("Failed to read message from input")?
    {
        if line.trim().is_empty() {
            continue;
        }
        backend
            .send(line)
            .context("Failed to enqueue message in the in-memory queue")?;
        count += 1;
    }

    Ok(count)
}

/// Resolve once SIGINT (Ctrl+C) or, on Unix, SIGTERM is received
async fn shutdown_signal() -> anyhow::Result<()> {
    #[cfg(unix)]
    {
        let mut terminate =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .context("Failed to install SIGTERM signal handler")?;

        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result.context("Failed to listen for Ctrl+C")?;
                info!("Received SIGINT (Ctrl+C), stopping");
            }
            _ = terminate.recv() => {
                info!("Received SIGTERM, stopping");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c()
            .await
            .context("Failed to listen for Ctrl+C")?;
        info!("Received Ctrl+C, stopping");
    }

    Ok(())
}
