//! Confirmation monitor: re-broadcast and poll until mined or given up

use crate::chain::{CallScope, ChainClient};
use crate::config::MonitorConfig;
use crate::tx::SignedTransaction;

use ethers::types::TransactionReceipt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, sleep, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// The transaction a monitor cycle is tracking
#[derive(Debug, Clone)]
pub struct PendingTransaction {
    pub tx: SignedTransaction,
    pub submitted_at: Instant,
}

/// How a monitor cycle ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorOutcome {
    Confirmed {
        block: Option<u64>,
        elapsed: Duration,
    },
    /// Budget exhausted without a receipt; the tx is left to the chain
    Discarded { elapsed: Duration },
    Cancelled,
}

pub struct ConfirmationMonitor {
    client: Arc<dyn ChainClient>,
    chain_id: u64,
    poll_interval: Duration,
    resend_interval: Duration,
    timeout: Duration,
    call_timeout: Duration,
}

impl ConfirmationMonitor {
    pub fn new(client: Arc<dyn ChainClient>, chain_id: u64, config: &MonitorConfig) -> Self {
        Self {
            client,
            chain_id,
            poll_interval: config.poll_interval(),
            resend_interval: config.resend_interval(),
            timeout: config.timeout(),
            call_timeout: config.call_timeout(),
        }
    }

    /// Broadcast `tx` and follow it until it is mined, the budget runs out,
    /// or `cancel` fires. Never returns an error: failures are logged and the
    /// next issuance tick deals with whatever state the chain ends up in.
    pub async fn watch(&self, tx: SignedTransaction, cancel: &CancellationToken) -> MonitorOutcome {
        let pending = PendingTransaction {
            tx,
            submitted_at: Instant::now(),
        };

        info!(
            tx = ?pending.tx.hash,
            nonce = pending.tx.nonce,
            gas_price = %pending.tx.gas_price,
            gas_limit = pending.tx.gas_limit,
            "Sending"
        );

        let resend = sleep(Duration::ZERO);
        tokio::pin!(resend);

        let mut poll = interval_at(pending.submitted_at + self.poll_interval, self.poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    debug!(tx = ?pending.tx.hash, "Monitor cancelled");
                    return MonitorOutcome::Cancelled;
                }

                _ = &mut resend => {
                    self.broadcast(&pending, cancel).await;
                    resend.as_mut().reset(Instant::now() + self.resend_interval);
                }

                _ = poll.tick() => {
                    let elapsed = pending.submitted_at.elapsed();
                    if elapsed > self.timeout {
                        warn!(tx = ?pending.tx.hash, "Discard due to timeout");
                        crate::metrics::record_tx_discarded(self.chain_id);
                        return MonitorOutcome::Discarded { elapsed };
                    }

                    if let Some(receipt) = self.check_status(&pending, cancel).await {
                        let block = receipt.block_number.map(|n| n.as_u64());
                        info!(
                            duration = ?elapsed,
                            height = ?block,
                            "Confirmed"
                        );
                        crate::metrics::record_tx_confirmed(self.chain_id, elapsed.as_secs_f64());
                        return MonitorOutcome::Confirmed { block, elapsed };
                    }
                }
            }
        }
    }

    /// Same signed bytes every time, so repeats are no-ops at the chain level
    async fn broadcast(&self, pending: &PendingTransaction, cancel: &CancellationToken) {
        let scope = CallScope::new(cancel, self.call_timeout);

        info!("Resending");
        match self
            .client
            .send_raw_transaction(&scope, pending.tx.raw.clone())
            .await
        {
            Ok(hash) => {
                debug!(tx = ?hash, "Broadcast accepted");
                crate::metrics::record_tx_submitted(self.chain_id);
            }
            Err(e) => error!(err = %e, "Failed to send Tx"),
        }
    }

    async fn check_status(
        &self,
        pending: &PendingTransaction,
        cancel: &CancellationToken,
    ) -> Option<TransactionReceipt> {
        let scope = CallScope::new(cancel, self.call_timeout);

        info!("Checking status");
        match self.client.transaction_receipt(&scope, pending.tx.hash).await {
            Ok(receipt) => receipt,
            Err(e) => {
                error!(err = %e, "Failed to check tx");
                None
            }
        }
    }
}
