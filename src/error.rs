//! Error types for the keepalive service

use ethers::types::U256;
use thiserror::Error;

/// Main error type for the keepalive pipeline
#[derive(Error, Debug)]
pub enum KeepaliveError {
    #[error("Chain connection error: {0}")]
    ChainConnection(String),

    #[error("RPC call {operation} failed: {message}")]
    Rpc {
        operation: &'static str,
        message: String,
    },

    #[error("Timeout waiting for {operation}")]
    Timeout { operation: &'static str },

    #[error("Operation {operation} cancelled")]
    Cancelled { operation: &'static str },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Wallet error: {0}")]
    Wallet(String),

    #[error("Gas price is 0")]
    ZeroGasPrice,

    #[error("Not enough balance to send the tx: have {have}, need {need}")]
    InsufficientBalance { have: U256, need: U256 },
}

impl KeepaliveError {
    /// Conditions that clear up on their own once the fee market or the
    /// account funding changes
    pub fn is_policy(&self) -> bool {
        matches!(
            self,
            KeepaliveError::ZeroGasPrice | KeepaliveError::InsufficientBalance { .. }
        )
    }

    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            KeepaliveError::ChainConnection(_)
                | KeepaliveError::Rpc { .. }
                | KeepaliveError::Timeout { .. }
        ) || self.is_policy()
    }

    /// Check if error should trigger an alert
    pub fn should_alert(&self) -> bool {
        matches!(
            self,
            KeepaliveError::InsufficientBalance { .. } | KeepaliveError::Wallet(_)
        )
    }

    /// Short label used for metrics
    pub fn kind(&self) -> &'static str {
        match self {
            KeepaliveError::ChainConnection(_) => "connection",
            KeepaliveError::Rpc { .. } => "rpc",
            KeepaliveError::Timeout { .. } => "timeout",
            KeepaliveError::Cancelled { .. } => "cancelled",
            KeepaliveError::Io(_) => "io",
            KeepaliveError::Wallet(_) => "wallet",
            KeepaliveError::ZeroGasPrice => "zero_gas_price",
            KeepaliveError::InsufficientBalance { .. } => "insufficient_balance",
        }
    }
}

/// Result type for keepalive operations
pub type KeepaliveResult<T> = Result<T, KeepaliveError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_errors_are_retryable() {
        let err = KeepaliveError::InsufficientBalance {
            have: U256::from(1),
            need: U256::from(2),
        };
        assert!(err.is_policy());
        assert!(err.is_retryable());
        assert!(err.should_alert());
        assert_eq!(
            err.to_string(),
            "Not enough balance to send the tx: have 1, need 2"
        );

        assert!(KeepaliveError::ZeroGasPrice.is_policy());
        assert!(!KeepaliveError::Timeout { operation: "nonce_at" }.is_policy());
        assert!(!KeepaliveError::Wallet("bad key".into()).is_retryable());
    }
}
