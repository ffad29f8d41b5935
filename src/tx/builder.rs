//! Signing of zero-value self-transfers

use crate::error::{KeepaliveError, KeepaliveResult};

use ethers::prelude::*;
use ethers::signers::{LocalWallet, Signer};
use ethers::types::transaction::eip2718::TypedTransaction;
use std::fmt;

/// A signed transaction ready to be broadcast (and re-broadcast) as-is
#[derive(Debug, Clone)]
pub struct SignedTransaction {
    pub hash: H256,
    pub raw: Bytes,
    pub nonce: u64,
    pub gas_price: U256,
    pub gas_limit: u64,
}

/// Builds EIP-155 legacy self-transfers for one account on one chain
pub struct TransactionBuilder {
    wallet: LocalWallet,
    chain_id: u64,
}

impl TransactionBuilder {
    /// Parse a raw hex private key (with or without `0x`) and bind it to `chain_id`
    pub fn from_hex_key(key: &str, chain_id: u64) -> KeepaliveResult<Self> {
        let key = key.trim();
        let key = key
            .strip_prefix("0x")
            .or_else(|| key.strip_prefix("0X"))
            .unwrap_or(key);

        let bytes =
            hex::decode(key).map_err(|e| KeepaliveError::Wallet(format!("Invalid private key: {}", e)))?;
        if bytes.len() != 32 {
            return Err(KeepaliveError::Wallet(format!(
                "Invalid private key: expected 32 bytes, got {}",
                bytes.len()
            )));
        }
        let wallet = LocalWallet::from_bytes(&bytes)
            .map_err(|e| KeepaliveError::Wallet(format!("Invalid private key: {}", e)))?
            .with_chain_id(chain_id);

        Ok(Self { wallet, chain_id })
    }

    /// Address derived from the signing key; also the recipient of every transfer
    pub fn address(&self) -> Address {
        self.wallet.address()
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// Build and sign a self-transfer of zero value
    pub fn build_self_transfer(
        &self,
        nonce: u64,
        gas_price: U256,
        gas_limit: u64,
    ) -> KeepaliveResult<SignedTransaction> {
        let address = self.address();
        let request = TransactionRequest::new()
            .from(address)
            .to(address)
            .value(U256::zero())
            .nonce(nonce)
            .gas(gas_limit)
            .gas_price(gas_price)
            .chain_id(self.chain_id);
        let tx = TypedTransaction::Legacy(request);

        let signature = self
            .wallet
            .sign_transaction_sync(&tx)
            .map_err(|e| KeepaliveError::Wallet(format!("Failed to sign transaction: {}", e)))?;

        Ok(SignedTransaction {
            hash: tx.hash(&signature),
            raw: tx.rlp_signed(&signature),
            nonce,
            gas_price,
            gas_limit,
        })
    }
}

impl fmt::Debug for TransactionBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionBuilder")
            .field("address", &self.address())
            .field("chain_id", &self.chain_id)
            .finish()
    }
}
