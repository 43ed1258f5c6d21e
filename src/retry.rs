use log::{debug, warn};
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

/// Failures worth another attempt: dropped connections, throttling and
/// server-side errors. Anything else is returned on first sight.
pub(crate) trait Transient {
    fn is_transient(&self) -> bool;
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct RetryPolicy {
    pub attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// Delay before attempt `attempt + 1`; doubles after every failure.
    fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
    }

    pub(crate) async fn run<T, E, F, Fut>(&self, what: &str, mut operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Transient + Display,
    {
        let attempts = self.attempts.max(1);
        let mut attempt = 1;
        loop {
            let err = match operation().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };
            if !err.is_transient() {
                debug!("{} failed permanently: {}", what, err);
                return Err(err);
            }
            if attempt >= attempts {
                return Err(err);
            }

            let delay = self.backoff(attempt);
            warn!(
                "Attempt {}/{} for {} failed: {}. Retrying in {:?}.",
                attempt, attempts, what, err, delay
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt;

    #[derive(Debug)]
    struct FakeError {
        transient: bool,
    }

    impl fmt::Display for FakeError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "fake (transient: {})", self.transient)
        }
    }

    impl Transient for FakeError {
        fn is_transient(&self) -> bool {
            self.transient
        }
    }

    fn quick(attempts: u32) -> RetryPolicy {
        RetryPolicy {
            attempts,
            base_delay: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn transient_failures_are_retried_until_success() {
        let mut calls = 0;
        let result = quick(3)
            .run("flaky call", || {
                calls += 1;
                let outcome = if calls < 3 {
                    Err(FakeError { transient: true })
                } else {
                    Ok(calls)
                };
                std::future::ready(outcome)
            })
            .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls, 3);
    }

    #[tokio::test]
    async fn permanent_failure_is_not_retried() {
        let mut calls = 0;
        let result: Result<(), FakeError> = quick(5)
            .run("bad request", || {
                calls += 1;
                std::future::ready(Err(FakeError { transient: false }))
            })
            .await;

        assert!(!result.unwrap_err().transient);
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn gives_up_after_last_attempt() {
        let mut calls = 0;
        let result: Result<(), FakeError> = quick(2)
            .run("throttled call", || {
                calls += 1;
                std::future::ready(Err(FakeError { transient: true }))
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls, 2);
    }

    #[test]
    fn backoff_doubles() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(1), Duration::from_secs(2));
        assert_eq!(policy.backoff(2), Duration::from_secs(4));
        assert_eq!(policy.backoff(3), Duration::from_secs(8));
    }
}
