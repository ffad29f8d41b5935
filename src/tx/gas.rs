//! Gas pricing and gas limit selection for keepalive transfers

use crate::config::GasConfig;
use crate::error::{KeepaliveError, KeepaliveResult};

use ethers::types::U256;
use rand::Rng;
use tracing::debug;

/// Fixed-increment pricing with a jittered gas limit
#[derive(Debug, Clone)]
pub struct GasPolicy {
    /// Added to the suggested price when the previous tx is still unmined
    bump: U256,
    base_gas_limit: u64,
    /// Upper bound (exclusive) of the random offset added to the gas limit
    gas_limit_jitter: u64,
}

impl GasPolicy {
    pub fn new(config: &GasConfig) -> Self {
        Self {
            bump: U256::from(config.bump_wei),
            base_gas_limit: config.base_gas_limit,
            gas_limit_jitter: config.gas_limit_jitter,
        }
    }

    /// Price to use given the node's suggestion; `stuck` adds the bump
    pub fn gas_price(&self, suggested: U256, stuck: bool) -> KeepaliveResult<U256> {
        if suggested.is_zero() {
            return Err(KeepaliveError::ZeroGasPrice);
        }

        if stuck {
            let bumped = suggested.saturating_add(self.bump);
            debug!("Bumping gas price {} -> {}", suggested, bumped);
            Ok(bumped)
        } else {
            Ok(suggested)
        }
    }

    pub fn gas_limit(&self) -> u64 {
        self.gas_limit_with(&mut rand::thread_rng())
    }

    pub fn gas_limit_with<R: Rng + ?Sized>(&self, rng: &mut R) -> u64 {
        if self.gas_limit_jitter == 0 {
            return self.base_gas_limit;
        }
        self.base_gas_limit + rng.gen_range(0..self.gas_limit_jitter)
    }

    /// Maximum fee reserved from the balance
    pub fn calculate_cost(gas_limit: u64, gas_price: U256) -> U256 {
        gas_price.saturating_mul(U256::from(gas_limit))
    }
}

impl Default for GasPolicy {
    fn default() -> Self {
        Self::new(&GasConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_zero_suggestion_is_rejected() {
        let policy = GasPolicy::default();
        assert!(matches!(
            policy.gas_price(U256::zero(), false),
            Err(KeepaliveError::ZeroGasPrice)
        ));
        assert!(matches!(
            policy.gas_price(U256::zero(), true),
            Err(KeepaliveError::ZeroGasPrice)
        ));
    }

    #[test]
    fn test_bump_is_additive() {
        let policy = GasPolicy::default();
        let suggested = U256::from(30_000_000_000u64);
        assert_eq!(policy.gas_price(suggested, false).unwrap(), suggested);
        assert_eq!(
            policy.gas_price(suggested, true).unwrap(),
            U256::from(31_000_000_000u64)
        );

        let tiny = U256::from(1);
        assert_eq!(
            policy.gas_price(tiny, true).unwrap(),
            U256::from(1_000_000_001u64)
        );
    }

    #[test]
    fn test_gas_limit_stays_in_jitter_window() {
        let policy = GasPolicy::default();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..500 {
            let limit = policy.gas_limit_with(&mut rng);
            assert!((200_000..201_000).contains(&limit));
        }
    }

    #[test]
    fn test_zero_jitter_uses_base_limit() {
        let policy = GasPolicy::new(&GasConfig {
            bump_wei: 1,
            base_gas_limit: 21_000,
            gas_limit_jitter: 0,
        });
        assert_eq!(policy.gas_limit(), 21_000);
    }

    #[test]
    fn test_cost() {
        assert_eq!(
            GasPolicy::calculate_cost(200_000, U256::from(10)),
            U256::from(2_000_000)
        );
    }
}
