//! Entrypoint for the inventory ingestion job.

use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::EnvFilter;

use entra_inventory::{AppConfig, AppStore, Collector, GraphClient, TokenCache};

#[tokio::main]
async fn main() {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::from_env().unwrap_or_else(|e| {
        eprintln!("Configuration error: {e}");
        std::process::exit(1);
    });

    tracing::info!(
        graph_base_url = %config.azure.graph_base_url,
        lookback_days = config.lookback_days,
        page_size = config.page_size,
        "starting enterprise app ingestion run"
    );

    let store = AppStore::connect(&config.database_url)
        .await
        .unwrap_or_else(|e| {
            eprintln!("Database connection error: {e}");
            std::process::exit(1);
        });

    let result = run(config, store.clone()).await;

    // The pool is released whether the run succeeded or not.
    store.close().await;

    if let Err(err) = result {
        tracing::error!(error = %err, "ingestion run failed");
        std::process::exit(1);
    }
}

async fn run(config: AppConfig, store: AppStore) -> entra_inventory::Result<()> {
    store.ensure_schema().await?;

    let tokens = Arc::new(TokenCache::new(config.azure.clone()));
    let graph = GraphClient::new(
        tokens,
        &config.azure.graph_base_url,
        Duration::from_secs(config.azure.timeout_secs),
    )?;

    Collector::new(config, graph, store).run().await
}
