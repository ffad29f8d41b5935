//! Prometheus metrics for monitoring
//!
//! Exposes metrics for:
//! - Keepalive tick decisions and failures
//! - Transaction broadcasts, confirmations and discards
//! - Wallet balance and chain head height

use crate::error::KeepaliveResult;

use axum::{http::StatusCode, routing::get, Router};
use ethers::types::U256;
use ethers::utils::format_ether;
use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_gauge_vec, register_histogram_vec, CounterVec, Encoder,
    GaugeVec, HistogramVec, TextEncoder,
};
use std::net::SocketAddr;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

lazy_static! {
    // Chain metrics
    pub static ref CHAIN_BLOCK_HEIGHT: GaugeVec = register_gauge_vec!(
        "keepalive_chain_block_height",
        "Latest observed block height",
        &["chain_id"]
    ).unwrap();

    // Tick metrics
    pub static ref TICKS_SKIPPED: CounterVec = register_counter_vec!(
        "keepalive_ticks_skipped_total",
        "Ticks that found the head fresh enough to skip issuance",
        &["chain_id"]
    ).unwrap();

    pub static ref TICKS_FAILED: CounterVec = register_counter_vec!(
        "keepalive_ticks_failed_total",
        "Ticks aborted by an error, by error kind",
        &["kind"]
    ).unwrap();

    // Transaction metrics
    pub static ref TX_SUBMITTED: CounterVec = register_counter_vec!(
        "keepalive_transactions_submitted_total",
        "Accepted broadcasts, including re-broadcasts",
        &["chain_id"]
    ).unwrap();

    pub static ref TX_CONFIRMED: CounterVec = register_counter_vec!(
        "keepalive_transactions_confirmed_total",
        "Transactions confirmed within the monitor budget",
        &["chain_id"]
    ).unwrap();

    pub static ref TX_DISCARDED: CounterVec = register_counter_vec!(
        "keepalive_transactions_discarded_total",
        "Transactions given up after the monitor budget",
        &["chain_id"]
    ).unwrap();

    pub static ref TX_LATENCY: HistogramVec = register_histogram_vec!(
        "keepalive_confirmation_latency_seconds",
        "Time from first broadcast to receipt",
        &["chain_id"],
        vec![3.0, 6.0, 9.0, 15.0, 30.0, 60.0, 90.0, 120.0]
    ).unwrap();

    // Wallet metrics
    pub static ref WALLET_BALANCE: GaugeVec = register_gauge_vec!(
        "keepalive_wallet_balance_eth",
        "Wallet balance in ETH",
        &["chain_id"]
    ).unwrap();

    // Health metrics
    pub static ref HEALTH_REFRESH_SUCCESS: CounterVec = register_counter_vec!(
        "keepalive_health_refresh_success_total",
        "Total successful head refreshes",
        &[]
    ).unwrap();

    pub static ref HEALTH_REFRESH_FAILURE: CounterVec = register_counter_vec!(
        "keepalive_health_refresh_failure_total",
        "Total failed head refreshes",
        &[]
    ).unwrap();
}

/// Prometheus metrics server
pub struct MetricsServer {
    port: u16,
}

impl MetricsServer {
    pub fn new(port: u16) -> Self {
        Self { port }
    }

    pub async fn run(&self, cancel: CancellationToken) -> KeepaliveResult<()> {
        let app = Router::new().route("/metrics", get(metrics_handler));

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        info!("Starting metrics server on {}", addr);

        let listener = tokio::net::TcpListener::bind(&addr).await?;
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { cancel.cancelled().await })
            .await?;

        Ok(())
    }
}

async fn metrics_handler() -> Result<String, StatusCode> {
    render().map_err(|e| {
        error!("Failed to encode metrics: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })
}

fn render() -> anyhow::Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

// Helper functions to record metrics

pub fn record_head_height(chain_id: u64, block_number: u64) {
    CHAIN_BLOCK_HEIGHT
        .with_label_values(&[&chain_id.to_string()])
        .set(block_number as f64);
}

pub fn record_tick_skipped(chain_id: u64) {
    TICKS_SKIPPED
        .with_label_values(&[&chain_id.to_string()])
        .inc();
}

pub fn record_tick_failed(kind: &str) {
    TICKS_FAILED.with_label_values(&[kind]).inc();
}

pub fn record_tx_submitted(chain_id: u64) {
    TX_SUBMITTED
        .with_label_values(&[&chain_id.to_string()])
        .inc();
}

pub fn record_tx_confirmed(chain_id: u64, latency_secs: f64) {
    let chain_id = chain_id.to_string();
    TX_CONFIRMED.with_label_values(&[&chain_id]).inc();
    TX_LATENCY.with_label_values(&[&chain_id]).observe(latency_secs);
}

pub fn record_tx_discarded(chain_id: u64) {
    TX_DISCARDED
        .with_label_values(&[&chain_id.to_string()])
        .inc();
}

pub fn record_wallet_balance(chain_id: u64, balance_wei: U256) {
    let balance_eth = format_ether(balance_wei).parse::<f64>().unwrap_or(f64::NAN);
    WALLET_BALANCE
        .with_label_values(&[&chain_id.to_string()])
        .set(balance_eth);
}

pub fn record_health_refresh(success: bool) {
    if success {
        HEALTH_REFRESH_SUCCESS.with_label_values(&[]).inc();
    } else {
        HEALTH_REFRESH_FAILURE.with_label_values(&[]).inc();
    }
}
