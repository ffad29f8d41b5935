//! Chain head health reporting
//!
//! A single producer (`HealthMonitor`) refreshes the latest head into a
//! single-slot cache; any number of HTTP handlers read the current snapshot.
//! Snapshots are immutable and swapped whole under the write lock.

use crate::chain::{CallScope, ChainClient};
use crate::config::ApiConfig;

use chrono::{DateTime, Utc};
use ethers::types::U64;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Body of `GET /health`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub healthy: bool,
    /// Serialized as a 0x-prefixed hex quantity
    #[serde(rename = "latest_block_number")]
    pub height: U64,
    #[serde(rename = "latest_block_timestamp")]
    pub timestamp: DateTime<Utc>,
}

/// Last known head report
#[derive(Debug, Clone, Default)]
pub struct HealthCache {
    slot: Arc<RwLock<Option<Arc<HealthReport>>>>,
}

impl HealthCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current snapshot, `None` until the first successful refresh
    pub async fn snapshot(&self) -> Option<Arc<HealthReport>> {
        self.slot.read().await.clone()
    }

    #[cfg(test)]
    pub(crate) async fn set(&self, report: HealthReport) {
        *self.slot.write().await = Some(Arc::new(report));
    }
}

/// Periodically refreshes a `HealthCache` from the chain head
pub struct HealthMonitor {
    client: Arc<dyn ChainClient>,
    cache: HealthCache,
    chain_id: u64,
    max_block_age: Duration,
    call_timeout: Duration,
}

impl HealthMonitor {
    pub fn new(
        client: Arc<dyn ChainClient>,
        cache: HealthCache,
        chain_id: u64,
        config: &ApiConfig,
    ) -> Self {
        Self {
            client,
            cache,
            chain_id,
            max_block_age: config.max_block_age(),
            call_timeout: config.call_timeout(),
        }
    }

    /// Refresh once right away, then every `period` until `cancel` fires
    pub async fn run(&self, cancel: CancellationToken, period: Duration) {
        self.refresh(&cancel).await;

        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = ticker.tick() => self.refresh(&cancel).await,
            }
        }
    }

    pub async fn refresh(&self, cancel: &CancellationToken) {
        let scope = CallScope::new(cancel, self.call_timeout);
        let head = match self.client.latest_header(&scope).await {
            Ok(head) => head,
            Err(e) => {
                error!(err = %e, "HeaderByNumber");
                crate::metrics::record_health_refresh(false);
                return;
            }
        };
        crate::metrics::record_health_refresh(true);

        if head.timestamp == 0 {
            error!(block = head.number, "Ignore 0 timestamp block");
            return;
        }
        crate::metrics::record_head_height(self.chain_id, head.number);

        let age = head.age(Utc::now());
        let mut slot = self.cache.slot.write().await;

        if let Some(current) = slot.clone() {
            if current.height.as_u64() >= head.number {
                if age > self.max_block_age && current.healthy {
                    *slot = Some(Arc::new(HealthReport {
                        healthy: false,
                        ..(*current).clone()
                    }));
                }
                return;
            }
        }

        info!(block = head.number, time = %head.time(), "refreshing");
        *slot = Some(Arc::new(HealthReport {
            healthy: age < self.max_block_age,
            height: U64::from(head.number),
            timestamp: head.time(),
        }));
    }
}
