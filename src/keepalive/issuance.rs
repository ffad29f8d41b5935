//! Issuance policy: decides on each tick whether to send a keepalive transfer
//! and at which gas price

use super::monitor::{ConfirmationMonitor, MonitorOutcome};
use crate::chain::{CallScope, ChainClient};
use crate::config::Settings;
use crate::error::{KeepaliveError, KeepaliveResult};
use crate::tx::{GasPolicy, NonceState, TransactionBuilder};

use chrono::Utc;
use ethers::types::{Address, U256};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Result of one successful tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Head is younger than the interval, nothing to do
    Skipped { block: u64, age: Duration },
    Issued {
        nonce: u64,
        gas_price: U256,
        bumped: bool,
        monitor: MonitorOutcome,
    },
}

pub struct IssuancePolicy {
    client: Arc<dyn ChainClient>,
    builder: TransactionBuilder,
    gas: GasPolicy,
    nonce: NonceState,
    monitor: ConfirmationMonitor,
    /// Zero means "always issue"
    interval: Duration,
    tick_timeout: Duration,
}

impl IssuancePolicy {
    pub fn new(
        client: Arc<dyn ChainClient>,
        builder: TransactionBuilder,
        settings: &Settings,
    ) -> Self {
        let monitor =
            ConfirmationMonitor::new(client.clone(), builder.chain_id(), &settings.monitor);

        Self {
            client,
            builder,
            gas: GasPolicy::new(&settings.gas),
            nonce: NonceState::new(),
            monitor,
            interval: settings.keepalive.interval(),
            tick_timeout: settings.keepalive.tick_timeout(),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn address(&self) -> Address {
        self.builder.address()
    }

    pub fn last_nonce(&self) -> Option<u64> {
        self.nonce.last()
    }

    /// Run one tick to completion, including the confirmation cycle of the
    /// transaction it sends. On error nothing is sent and the nonce state is
    /// left as it was.
    pub async fn tick(&mut self, cancel: &CancellationToken) -> KeepaliveResult<TickOutcome> {
        let chain_id = self.builder.chain_id();
        let scope = CallScope::new(cancel, self.tick_timeout);

        if !self.interval.is_zero() {
            let head = self.client.latest_header(&scope).await?;
            crate::metrics::record_head_height(chain_id, head.number);

            let age = head.age(Utc::now());
            if age < self.interval {
                info!(block = head.number, time = %head.time(), "No need to send a tx");
                crate::metrics::record_tick_skipped(chain_id);
                return Ok(TickOutcome::Skipped {
                    block: head.number,
                    age,
                });
            }
        }

        let address = self.builder.address();
        let nonce = self.client.nonce_at(&scope, address).await?;
        let suggested = self.client.suggest_gas_price(&scope).await?;

        let bumped = self.nonce.is_stuck(nonce);
        let gas_price = self.gas.gas_price(suggested, bumped)?;
        let gas_limit = self.gas.gas_limit();

        let balance = self.client.balance_at(&scope, address).await?;
        crate::metrics::record_wallet_balance(chain_id, balance);

        let need = GasPolicy::calculate_cost(gas_limit, gas_price);
        if balance < need {
            return Err(KeepaliveError::InsufficientBalance {
                have: balance,
                need,
            });
        }

        debug!(nonce, %gas_price, gas_limit, bumped, "Building keepalive tx");
        let tx = self.builder.build_self_transfer(nonce, gas_price, gas_limit)?;

        let monitor = self.monitor.watch(tx, cancel).await;
        // Recorded whatever the outcome so an unmined tx is repriced next time
        self.nonce.record(nonce);

        Ok(TickOutcome::Issued {
            nonce,
            gas_price,
            bumped,
            monitor,
        })
    }
}
