use std::thread;
use std::time::Duration;

use regmirror_core::{CancelToken, MirrorError};
use tracing::warn;

/// Bounded retry for transient fetch failures; anything else surfaces at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff: Duration::from_millis(250),
        }
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            attempts: 1,
            backoff: Duration::ZERO,
        }
    }

    pub fn run<T, F>(&self, cancel: &CancelToken, mut operation: F) -> Result<T, MirrorError>
    where
        F: FnMut() -> Result<T, MirrorError>,
    {
        let attempts = self.attempts.max(1);
        let mut attempt = 1;
        loop {
            cancel.check()?;
            match operation() {
                Err(MirrorError::Fetch(err)) if err.is_transient() && attempt < attempts => {
                    warn!(url = %err.url, attempt, attempts, cause = %err.cause, "transient fetch failure, retrying");
                    thread::sleep(self.backoff.saturating_mul(attempt));
                    attempt += 1;
                }
                result => return result,
            }
        }
    }
}
