//! Metis Keepalive - keeps an account active with periodic self-transfers
//!
//! Submits a zero-value transaction to the account itself whenever the chain
//! head has been idle for longer than the configured interval, follows it to
//! confirmation, and reprices it when it gets stuck. Optionally serves the
//! chain head health over HTTP.

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

mod api;
mod chain;
mod config;
mod error;
mod health;
mod keepalive;
mod metrics;
mod tx;

use chain::{ChainClient, ChainProvider};
use config::Settings;
use health::{HealthCache, HealthMonitor};
use keepalive::{IssuancePolicy, KeepaliveEngine};
use metrics::MetricsServer;
use tx::TransactionBuilder;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    init_logging();

    info!("Starting Metis Keepalive v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let settings = Settings::load()?;
    info!(
        "Loaded configuration: rpc {}, interval {}s",
        settings.chain.rpc_url, settings.keepalive.interval_secs
    );
    if let Some(height) = settings.keepalive.start_height {
        info!(start_height = height, "Start height configured");
    }

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            shutdown_signal().await;
            info!("Shutdown signal received, stopping...");
            cancel.cancel();
        }
    });

    // Connect and fetch chain ID (fatal on failure)
    let provider = Arc::new(
        ChainProvider::connect(&settings.chain, &cancel, settings.chain.connect_timeout())
            .await
            .context("Failed to connect to chain")?,
    );
    let chain_id = provider.connected_chain_id();

    let private_key = settings.wallet.private_key()?;
    let builder = TransactionBuilder::from_hex_key(&private_key, chain_id)
        .context("Failed to load wallet")?;
    info!(address = ?builder.address(), chain_id, "chain info");

    let client: Arc<dyn ChainClient> = provider;
    let mut handles = Vec::new();

    // Head health reporting
    if settings.api.enabled {
        let cache = HealthCache::new();
        let monitor = HealthMonitor::new(client.clone(), cache.clone(), chain_id, &settings.api);
        let period = settings.api.refresh_interval();

        handles.push(tokio::spawn({
            let cancel = cancel.clone();
            async move { monitor.run(cancel, period).await }
        }));

        handles.push(tokio::spawn({
            let config = settings.api.clone();
            let cancel = cancel.clone();
            async move {
                if let Err(e) = api::run_server(config, cache, cancel.clone()).await {
                    error!("API server error: {}", e);
                    cancel.cancel();
                }
            }
        }));
    }

    // Start metrics server
    if settings.metrics.enabled {
        let server = MetricsServer::new(settings.metrics.port);
        handles.push(tokio::spawn({
            let cancel = cancel.clone();
            async move {
                if let Err(e) = server.run(cancel).await {
                    error!("Metrics server error: {}", e);
                }
            }
        }));
        info!("Metrics: http://0.0.0.0:{}/metrics", settings.metrics.port);
    }

    // Keepalive loop runs on the main task until shutdown
    let policy = IssuancePolicy::new(client, builder, &settings);
    let mut engine = KeepaliveEngine::new(policy);
    engine.run(&cancel).await;

    cancel.cancel();
    for handle in handles {
        if let Err(e) = handle.await {
            error!("Background task failed: {}", e);
        }
    }

    info!("Metis Keepalive stopped");
    Ok(())
}

fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,metis_keepalive=debug,hyper=warn"));

    let json = std::env::var("KEEPALIVE_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_target(true).with_thread_ids(true))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_thread_ids(true))
            .init();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
