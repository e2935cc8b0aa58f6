//! Retry with exponential backoff for transient provider errors.

use engine::{CancelToken, ProviderError};
use std::thread;
use std::time::Duration;

/// Backoff parameters: `base_delay`, doubling per attempt.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryConfig {
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::ZERO,
        }
    }

    /// Delay before the retry following `attempt` (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(attempt)
    }
}

/// Run `operation`, retrying transient failures with exponential backoff.
/// Cancellation is honoured between backoff waits.
pub fn with_retry<T, F>(
    config: &RetryConfig,
    cancel: &CancelToken,
    mut operation: F,
) -> Result<T, ProviderError>
where
    F: FnMut() -> Result<T, ProviderError>,
{
    let mut attempt = 0;
    loop {
        cancel.check()?;

        match operation() {
            Ok(value) => return Ok(value),
            Err(err) => {
                if !err.is_retryable() || attempt >= config.max_retries {
                    return Err(err);
                }

                let delay = config.delay_for_attempt(attempt);
                log::debug!(
                    "attempt {}/{} failed: {err}; retrying in {delay:?}",
                    attempt + 1,
                    config.max_retries + 1,
                );

                cancel.check()?;
                thread::sleep(delay);
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn fast() -> RetryConfig {
        RetryConfig {
            max_retries: 3,
            base_delay: Duration::from_millis(1),
        }
    }

    #[test]
    fn success_on_first_try() {
        let result = with_retry(&RetryConfig::no_retry(), &CancelToken::new(), || {
            Ok::<_, ProviderError>(42)
        });
        assert_eq!(result.unwrap(), 42);
    }

    #[test]
    fn non_retryable_errors_return_immediately() {
        let attempts = Cell::new(0);
        let result: Result<(), _> = with_retry(&fast(), &CancelToken::new(), || {
            attempts.set(attempts.get() + 1);
            Err(ProviderError::Auth("expired".into()))
        });
        assert!(result.is_err());
        assert_eq!(attempts.get(), 1);
    }

    #[test]
    fn transient_errors_retry_until_success() {
        let attempts = Cell::new(0);
        let result = with_retry(&fast(), &CancelToken::new(), || {
            attempts.set(attempts.get() + 1);
            if attempts.get() < 3 {
                Err(ProviderError::Transient("flaky".into()))
            } else {
                Ok(7)
            }
        });
        assert_eq!(result.unwrap(), 7);
        assert_eq!(attempts.get(), 3);
    }

    #[test]
    fn exhausted_retries_return_last_error() {
        let attempts = Cell::new(0);
        let result: Result<(), _> = with_retry(&fast(), &CancelToken::new(), || {
            attempts.set(attempts.get() + 1);
            Err(ProviderError::Transient("still flaky".into()))
        });
        assert!(matches!(result, Err(ProviderError::Transient(_))));
        // Initial attempt plus three retries.
        assert_eq!(attempts.get(), 4);
    }

    #[test]
    fn cancellation_short_circuits_between_waits() {
        let cancel = CancelToken::new();
        let attempts = Cell::new(0);
        let result: Result<(), _> = with_retry(&fast(), &cancel, || {
            attempts.set(attempts.get() + 1);
            cancel.cancel();
            Err(ProviderError::Transient("flaky".into()))
        });
        assert!(matches!(result, Err(ProviderError::Cancelled)));
        assert_eq!(attempts.get(), 1);
    }

    #[test]
    fn backoff_doubles() {
        let config = RetryConfig {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
        };
        assert_eq!(config.delay_for_attempt(0), Duration::from_secs(1));
        assert_eq!(config.delay_for_attempt(1), Duration::from_secs(2));
        assert_eq!(config.delay_for_attempt(2), Duration::from_secs(4));
    }
}
