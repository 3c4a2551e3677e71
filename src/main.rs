//! catalog-sync - command-line client for the product catalog

use catalog_sync::cli::{self, Cli};
use catalog_sync::core;

use anyhow::Result;
use clap::Parser;
use tracing::{debug, info};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration (CLI args, env vars and config file)
    let config = match core::config::Config::load(&cli.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            // Logging isn't initialized yet
            eprintln!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    let _logger = match core::Logger::init(&config.logging) {
        Ok(logger) => logger,
        Err(e) => {
            eprintln!("Failed to initialize logging: {}", e);
            return Err(e);
        }
    };

    info!("Starting catalog-sync v{}", env!("CARGO_PKG_VERSION"));
    debug!(
        base_url = %config.api.base_url,
        session_db = ?config.storage.session_db,
        "Configuration loaded"
    );

    cli::run(cli.command, &config).await
}
