//! Top-level keepalive loop

use super::issuance::{IssuancePolicy, TickOutcome};
use crate::error::KeepaliveError;

use std::time::Duration;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Lower bound on the tick period, used in "always issue" mode
const MIN_TICK_PERIOD: Duration = Duration::from_secs(1);

/// Drives the issuance policy: one tick right away, then one every half
/// interval after the previous tick (and its confirmation cycle) finished.
pub struct KeepaliveEngine {
    policy: IssuancePolicy,
    period: Duration,
}

impl KeepaliveEngine {
    pub fn new(policy: IssuancePolicy) -> Self {
        let period = Self::tick_period(policy.interval());
        Self { policy, period }
    }

    pub fn tick_period(interval: Duration) -> Duration {
        (interval / 2).max(MIN_TICK_PERIOD)
    }

    #[cfg(test)]
    pub fn policy(&self) -> &IssuancePolicy {
        &self.policy
    }

    /// Main keepalive loop, returns once `cancel` fires
    pub async fn run(&mut self, cancel: &CancellationToken) {
        info!(address = ?self.policy.address(), period = ?self.period, "Keepalive loop started");

        let ticker = sleep(Duration::ZERO);
        tokio::pin!(ticker);

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => break,

                _ = &mut ticker => {
                    match self.policy.tick(cancel).await {
                        Ok(TickOutcome::Skipped { .. }) => {}
                        Ok(TickOutcome::Issued { nonce, monitor, .. }) => {
                            info!(nonce, outcome = ?monitor, "Keepalive cycle finished");
                        }
                        Err(KeepaliveError::Cancelled { operation }) => {
                            debug!(operation, "Tick interrupted by shutdown");
                        }
                        Err(e) if e.is_policy() => {
                            warn!(err = %e, alert = e.should_alert(), "ticker");
                            crate::metrics::record_tick_failed(e.kind());
                        }
                        Err(e) => {
                            error!(err = %e, retryable = e.is_retryable(), "ticker");
                            crate::metrics::record_tick_failed(e.kind());
                        }
                    }
                    ticker.as_mut().reset(Instant::now() + self.period);
                }
            }
        }

        info!(last_nonce = ?self.policy.last_nonce(), "Keepalive loop stopped");
    }
}
