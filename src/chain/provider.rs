//! JSON-RPC chain provider backed by ethers

use super::{CallScope, ChainClient, HeadBlock};
use crate::config::ChainConfig;
use crate::error::{KeepaliveError, KeepaliveResult};

use async_trait::async_trait;
use ethers::prelude::*;
use ethers::providers::{Http, JsonRpcClient, Provider};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Single-endpoint provider, HTTP in production
pub struct ChainProvider<P = Http> {
    /// Endpoint URL, kept for logging
    url: String,
    http: Provider<P>,
    /// Chain ID fetched at connect time
    chain_id: u64,
}

impl ChainProvider<Http> {
    /// Dial the endpoint and fetch the chain ID within `budget`.
    ///
    /// Any failure here is fatal for the process.
    pub async fn connect(
        config: &ChainConfig,
        cancel: &CancellationToken,
        budget: Duration,
    ) -> KeepaliveResult<Self> {
        info!(rpc = %config.rpc_url, "connecting");

        let http = Provider::<Http>::try_from(config.rpc_url.as_str())
            .map_err(|e| KeepaliveError::ChainConnection(format!("{}: {}", config.rpc_url, e)))?
            .interval(Duration::from_millis(100));

        let mut provider = Self {
            url: config.rpc_url.clone(),
            http,
            chain_id: 0,
        };

        let scope = CallScope::new(cancel, budget);
        provider.chain_id = provider
            .chain_id(&scope)
            .await
            .map_err(|e| KeepaliveError::ChainConnection(e.to_string()))?;

        debug!("Connected to {} (chain {})", provider.url, provider.chain_id);
        Ok(provider)
    }
}

impl<P> ChainProvider<P> {
    /// Chain ID captured at connect time
    pub fn connected_chain_id(&self) -> u64 {
        self.chain_id
    }
}

/// Narrow a quantity returned by the node, rejecting values past `u64::MAX`
fn quantity_to_u64(operation: &'static str, value: U256) -> KeepaliveResult<u64> {
    if value.bits() > 64 {
        return Err(KeepaliveError::Rpc {
            operation,
            message: format!("quantity {} does not fit in 64 bits", value),
        });
    }
    Ok(value.as_u64())
}

#[async_trait]
impl<P: JsonRpcClient + 'static> ChainClient for ChainProvider<P> {
    async fn chain_id(&self, scope: &CallScope) -> KeepaliveResult<u64> {
        let id = scope.run("chain_id", self.http.get_chainid()).await?;
        quantity_to_u64("chain_id", id)
    }

    async fn latest_header(&self, scope: &CallScope) -> KeepaliveResult<HeadBlock> {
        let block = scope
            .run("header_by_number", self.http.get_block(BlockNumber::Latest))
            .await?
            .ok_or(KeepaliveError::Rpc {
                operation: "header_by_number",
                message: "latest block not found".to_string(),
            })?;

        let number = block.number.ok_or(KeepaliveError::Rpc {
            operation: "header_by_number",
            message: "latest block has no number".to_string(),
        })?;

        Ok(HeadBlock {
            number: number.as_u64(),
            timestamp: quantity_to_u64("header_by_number", block.timestamp)?,
        })
    }

    async fn nonce_at(&self, scope: &CallScope, address: Address) -> KeepaliveResult<u64> {
        let nonce = scope
            .run("nonce_at", self.http.get_transaction_count(address, None))
            .await?;
        quantity_to_u64("nonce_at", nonce)
    }

    async fn balance_at(&self, scope: &CallScope, address: Address) -> KeepaliveResult<U256> {
        scope
            .run("balance_at", self.http.get_balance(address, None))
            .await
    }

    async fn suggest_gas_price(&self, scope: &CallScope) -> KeepaliveResult<U256> {
        scope
            .run("suggest_gas_price", self.http.get_gas_price())
            .await
    }

    async fn send_raw_transaction(&self, scope: &CallScope, raw: Bytes) -> KeepaliveResult<H256> {
        scope
            .run("send_transaction", async {
                self.http
                    .send_raw_transaction(raw)
                    .await
                    .map(|pending| pending.tx_hash())
            })
            .await
    }

    async fn transaction_receipt(
        &self,
        scope: &CallScope,
        hash: H256,
    ) -> KeepaliveResult<Option<TransactionReceipt>> {
        scope
            .run("transaction_receipt", self.http.get_transaction_receipt(hash))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::providers::MockProvider;

    fn mocked() -> (ChainProvider<MockProvider>, MockProvider) {
        let (http, mock) = Provider::mocked();
        let provider = ChainProvider {
            url: "mock".to_string(),
            http,
            chain_id: 1088,
        };
        (provider, mock)
    }

    fn scope() -> CallScope {
        CallScope::new(&CancellationToken::new(), Duration::from_secs(3))
    }

    #[tokio::test]
    async fn test_chain_id() {
        let (provider, mock) = mocked();
        mock.push(U256::from(1088u64)).unwrap();
        assert_eq!(provider.chain_id(&scope()).await.unwrap(), 1088);
        assert_eq!(provider.connected_chain_id(), 1088);
    }

    #[tokio::test]
    async fn test_oversized_quantities_are_rpc_errors() {
        let (provider, mock) = mocked();
        mock.push(U256::MAX).unwrap();
        assert!(matches!(
            provider.chain_id(&scope()).await,
            Err(KeepaliveError::Rpc { operation: "chain_id", .. })
        ));

        mock.push(U256::from(u64::MAX) + 1).unwrap();
        assert!(matches!(
            provider.nonce_at(&scope(), Address::zero()).await,
            Err(KeepaliveError::Rpc { operation: "nonce_at", .. })
        ));

        mock.push(U256::from(u64::MAX)).unwrap();
        assert_eq!(
            provider.nonce_at(&scope(), Address::zero()).await.unwrap(),
            u64::MAX
        );
    }

    #[tokio::test]
    async fn test_latest_header() {
        let (provider, mock) = mocked();
        let block: Block<H256> = Block {
            number: Some(U64::from(15_269_065u64)),
            timestamp: U256::from(1_710_555_125u64),
            ..Default::default()
        };
        mock.push(block).unwrap();

        let head = provider.latest_header(&scope()).await.unwrap();
        assert_eq!(
            head,
            HeadBlock {
                number: 15_269_065,
                timestamp: 1_710_555_125,
            }
        );
    }

    #[tokio::test]
    async fn test_missing_latest_block_is_rpc_error() {
        let (provider, mock) = mocked();
        mock.push(Option::<Block<H256>>::None).unwrap();
        match provider.latest_header(&scope()).await {
            Err(KeepaliveError::Rpc { operation, message }) => {
                assert_eq!(operation, "header_by_number");
                assert_eq!(message, "latest block not found");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_pending_block_without_number_is_rpc_error() {
        let (provider, mock) = mocked();
        mock.push(Block::<H256>::default()).unwrap();
        match provider.latest_header(&scope()).await {
            Err(KeepaliveError::Rpc { message, .. }) => {
                assert_eq!(message, "latest block has no number");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unknown_receipt_is_none() {
        let (provider, mock) = mocked();
        mock.push(Option::<TransactionReceipt>::None).unwrap();
        let receipt = provider
            .transaction_receipt(&scope(), H256::repeat_byte(0xab))
            .await
            .unwrap();
        assert!(receipt.is_none());
    }

    #[tokio::test]
    async fn test_mined_receipt() {
        let (provider, mock) = mocked();
        let hash = H256::repeat_byte(0xab);
        mock.push(TransactionReceipt {
            transaction_hash: hash,
            block_number: Some(U64::from(15_269_066u64)),
            ..Default::default()
        })
        .unwrap();

        let receipt = provider
            .transaction_receipt(&scope(), hash)
            .await
            .unwrap()
            .expect("receipt");
        assert_eq!(receipt.transaction_hash, hash);
        assert_eq!(receipt.block_number, Some(U64::from(15_269_066u64)));
    }

    #[tokio::test]
    async fn test_send_returns_node_hash() {
        let (provider, mock) = mocked();
        let hash = H256::repeat_byte(0x42);
        mock.push(hash).unwrap();
        let sent = provider
            .send_raw_transaction(&scope(), Bytes::from(vec![0xf8, 0x6b]))
            .await
            .unwrap();
        assert_eq!(sent, hash);
    }

    #[tokio::test]
    async fn test_transport_errors_name_the_operation() {
        // nothing queued: the mock transport fails the request
        let (provider, _mock) = mocked();
        match provider.balance_at(&scope(), Address::zero()).await {
            Err(KeepaliveError::Rpc { operation, message }) => {
                assert_eq!(operation, "balance_at");
                assert!(!message.is_empty());
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert!(matches!(
            provider.suggest_gas_price(&scope()).await,
            Err(KeepaliveError::Rpc { operation: "suggest_gas_price", .. })
        ));
    }
}
