//! Transaction building with nonce tracking and gas pricing

mod builder;
mod gas;
mod nonce;

pub use builder::{SignedTransaction, TransactionBuilder};
pub use gas::GasPolicy;
pub use nonce::NonceState;

#[cfg(test)]
pub(crate) use builder::tests::{TEST_ADDRESS, TEST_KEY};
