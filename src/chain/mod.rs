//! Chain module - the I/O boundary towards the remote node
//!
//! This module provides:
//! - The `ChainClient` trait consumed by the keepalive pipeline and the health reporter
//! - `ChainProvider`, the JSON-RPC implementation on top of ethers
//! - `CallScope`, the cancellation + deadline pair every call runs under
//!
//! No retries happen here; retry policy belongs to the callers.

pub mod provider;
pub mod scope;

pub use provider::ChainProvider;
pub use scope::CallScope;

use crate::error::KeepaliveResult;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use ethers::types::{Address, Bytes, TransactionReceipt, H256, U256};
use std::time::Duration;

/// Latest block header fields the pipeline cares about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeadBlock {
    pub number: u64,
    /// Unix seconds
    pub timestamp: u64,
}

impl HeadBlock {
    pub fn time(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.timestamp as i64, 0)
            .single()
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// Age of the block relative to `now`. Blocks stamped in the future are zero aged.
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        (now - self.time()).to_std().unwrap_or(Duration::ZERO)
    }
}

/// Remote node operations. Every call is bounded by the given scope.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChainClient: Send + Sync {
    async fn chain_id(&self, scope: &CallScope) -> KeepaliveResult<u64>;

    /// Header of the latest block
    async fn latest_header(&self, scope: &CallScope) -> KeepaliveResult<HeadBlock>;

    /// Account nonce at the latest block
    async fn nonce_at(&self, scope: &CallScope, address: Address) -> KeepaliveResult<u64>;

    /// Account balance at the latest block
    async fn balance_at(&self, scope: &CallScope, address: Address) -> KeepaliveResult<U256>;

    async fn suggest_gas_price(&self, scope: &CallScope) -> KeepaliveResult<U256>;

    async fn send_raw_transaction(&self, scope: &CallScope, raw: Bytes) -> KeepaliveResult<H256>;

    /// `Ok(None)` means the transaction is not mined yet
    async fn transaction_receipt(
        &self,
        scope: &CallScope,
        hash: H256,
    ) -> KeepaliveResult<Option<TransactionReceipt>>;
}
