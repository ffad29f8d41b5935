//! Time budget and cancellation for a single chain call

use crate::error::{KeepaliveError, KeepaliveResult};

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio::time::{timeout_at, Instant};
use tokio_util::sync::CancellationToken;

/// Cancellation token plus deadline handed to every `ChainClient` call.
///
/// Several calls may share one scope, in which case they share its deadline.
#[derive(Debug, Clone)]
pub struct CallScope {
    cancel: CancellationToken,
    deadline: Instant,
}

impl CallScope {
    /// Derive a scope from the caller's token with the given budget
    pub fn new(parent: &CancellationToken, budget: Duration) -> Self {
        Self {
            cancel: parent.clone(),
            deadline: Instant::now() + budget,
        }
    }

    /// Drive `call` to completion unless the token fires or the deadline passes
    pub async fn run<T, E, F>(&self, operation: &'static str, call: F) -> KeepaliveResult<T>
    where
        E: Display,
        F: Future<Output = Result<T, E>>,
    {
        tokio::select! {
            biased;

            _ = self.cancel.cancelled() => Err(KeepaliveError::Cancelled { operation }),

            result = timeout_at(self.deadline, call) => match result {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(e)) => Err(KeepaliveError::Rpc {
                    operation,
                    message: e.to_string(),
                }),
                Err(_) => Err(KeepaliveError::Timeout { operation }),
            },
        }
    }
}
