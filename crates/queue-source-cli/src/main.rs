use queue_source_cli::run_cli;
use tracing::error;

#[tokio::main]
async fn main() {
    if let Err(e) = run_cli().await {
        error!("CLI error: {}", e);
        eprintln!("queue-source: {}", e);

        std::process::exit(e.exit_code());
    }
}
