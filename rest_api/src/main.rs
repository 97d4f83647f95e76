// rest_api/src/main.rs

use std::path::PathBuf;

use anyhow::Result;
use dotenv::dotenv;
use tokio::signal;
use tokio::sync::oneshot;
use tracing::info;

use rest_api::config::load_rest_api_config;
use rest_api::start_server;

/// Accepts an optional `--config <path>` pair; everything else comes from the
/// YAML file and environment.
fn config_path_from_args() -> Result<Option<PathBuf>> {
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config" {
            let path = args
                .next()
                .ok_or_else(|| anyhow::anyhow!("--config requires a file path"))?;
            return Ok(Some(PathBuf::from(path)));
        }
        anyhow::bail!("Unknown argument '{}'. Usage: rest_api [--config <path>]", arg);
    }
    Ok(None)
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt::init();

    let config = load_rest_api_config(config_path_from_args()?)?;
    info!(
        "Starting care REST API on {}:{} (persistence: {})",
        config.host,
        config.port,
        config
            .data_path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "in-memory".to_string())
    );

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl-C, draining connections");
            let _ = shutdown_tx.send(());
        }
    });

    start_server(config, shutdown_rx).await
}
