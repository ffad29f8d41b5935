//! Tracking of the last nonce used for a keepalive transfer

/// Last nonce handed to a built transaction.
///
/// In memory only; a restart forgets it and the first issuance afterwards is
/// never bumped.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct NonceState {
    last: Option<u64>,
}

impl NonceState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last(&self) -> Option<u64> {
        self.last
    }

    /// True when the chain still reports the nonce of our previous transfer,
    /// i.e. that transfer has not been mined.
    pub fn is_stuck(&self, on_chain: u64) -> bool {
        self.last == Some(on_chain)
    }

    pub fn record(&mut self, nonce: u64) {
        self.last = Some(nonce);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_run_is_never_stuck() {
        let state = NonceState::new();
        assert_eq!(state.last(), None);
        assert!(!state.is_stuck(0));
        assert!(!state.is_stuck(5));
    }

    #[test]
    fn test_nonce_zero_is_tracked() {
        let mut state = NonceState::new();
        state.record(0);
        assert!(state.is_stuck(0));
        assert!(!state.is_stuck(1));
    }
}
