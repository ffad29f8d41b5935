//! Keepalive pipeline for a single account
//!
//! The pipeline is strictly sequential:
//! 1. The engine ticks (immediately, then every half interval)
//! 2. The issuance policy checks head staleness, nonce, gas price and balance
//! 3. A signed self-transfer is handed to the confirmation monitor
//! 4. The monitor re-broadcasts and polls until mined, discarded or cancelled
//!
//! At most one transaction is in flight at any time.

pub mod engine;
pub mod issuance;
pub mod monitor;

pub use engine::KeepaliveEngine;
pub use issuance::IssuancePolicy;
