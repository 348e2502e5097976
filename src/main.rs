//! batch-receiver: a TCP receiver for batches of files
//!
//! Each connection carries one batch:
//! - A 4-byte big-endian header length
//! - A JSON header listing `{ name, size, type }` for every file
//! - The raw bytes of each file, in header order
//!
//! Features:
//! - One isolated task per connection; a failed transfer only drops its
//!   own connection
//! - Header and file size caps enforced before any proportional allocation
//! - One timestamped batch directory per connection under the storage root
//! - Configuration via CLI arguments, a TOML file, or a legacy JSON file

mod config;
mod error;
mod framing;
mod handler;
mod header;
mod server;
mod storage;

use config::Config;
use server::Server;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!(
        host = %config.host,
        port = config.port,
        root = %config.root.display(),
        max_connections = config.max_connections,
        "Starting batch-receiver"
    );

    let server = Server::bind(&config).await?;
    server.serve(shutdown_signal()).await?;
    Ok(())
}

/// Resolves on Ctrl-C. If the handler cannot be installed, never resolves.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to install Ctrl-C handler");
        std::future::pending::<()>().await;
    }
}
