//! Tripwire - Entry Point

use anyhow::Result;
use clap::Parser;
use tracing::info;

/// Conditional-order trigger bot
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via TRIPWIRE_CONFIG env var)
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Must run before any TLS connection is made
    tripwire_ws::init_crypto();

    let args = Args::parse();

    tripwire_telemetry::init_logging()?;

    info!("Starting tripwire v{}", env!("CARGO_PKG_VERSION"));

    // CLI arg > TRIPWIRE_CONFIG env var > default
    let config_path = args
        .config
        .or_else(|| std::env::var("TRIPWIRE_CONFIG").ok())
        .unwrap_or_else(|| "config/default.toml".to_string());

    info!(config_path = %config_path, "Loading configuration");
    let config = tripwire_bot::AppConfig::from_file(&config_path)?;
    info!(
        exchanges = config.exchanges.len(),
        port = config.server.port,
        "Configuration loaded"
    );

    let app = tripwire_bot::Application::new(config)?;
    app.run().await?;

    Ok(())
}
