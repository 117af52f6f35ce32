use std::future::Future;
use std::time::Duration;

/// Retry policy with a pluggable backoff curve, shared by the provider
/// clients. The embedding client retries transient HTTP failures; the
/// generation client runs with a single attempt.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    base_delay: Duration,
}

impl RetryPolicy {
    pub fn linear(max_attempts: usize, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    pub fn none() -> Self {
        Self::linear(1, Duration::ZERO)
    }

    /// Delay before the attempt following `attempt` (1-based).
    pub fn backoff(&self, attempt: usize) -> Duration {
        self.base_delay * attempt as u32
    }

    /// Runs `operation` until it succeeds or the attempt budget is spent.
    /// `is_retryable` decides whether a given failure is transient; a
    /// non-retryable error surfaces immediately.
    pub async fn run<T, E, F, Fut, P>(&self, mut operation: F, is_retryable: P) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
    {
        let mut attempt = 1;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(error) => {
                    if attempt >= self.max_attempts || !is_retryable(&error) {
                        return Err(error);
                    }
                    tokio::time::sleep(self.backoff(attempt)).await;
                    attempt += 1;
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::linear(3, Duration::from_millis(500))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[tokio::test]
    async fn succeeds_without_retrying() {
        let calls = Cell::new(0);
        let policy = RetryPolicy::linear(3, Duration::ZERO);
        let result: Result<i32, &str> = policy
            .run(
                || {
                    calls.set(calls.get() + 1);
                    async { Ok(7) }
                },
                |_| true,
            )
            .await;
        assert_eq!(result, Ok(7));
        assert_eq!(calls.get(), 1);
    }

    #[tokio::test]
    async fn exhausts_attempt_budget() {
        let calls = Cell::new(0);
        let policy = RetryPolicy::linear(3, Duration::ZERO);
        let result: Result<i32, &str> = policy
            .run(
                || {
                    calls.set(calls.get() + 1);
                    async { Err("transient") }
                },
                |_| true,
            )
            .await;
        assert_eq!(result, Err("transient"));
        assert_eq!(calls.get(), 3);
    }

    #[tokio::test]
    async fn non_retryable_errors_surface_immediately() {
        let calls = Cell::new(0);
        let policy = RetryPolicy::linear(3, Duration::ZERO);
        let result: Result<i32, &str> = policy
            .run(
                || {
                    calls.set(calls.get() + 1);
                    async { Err("fatal") }
                },
                |error| *error != "fatal",
            )
            .await;
        assert_eq!(result, Err("fatal"));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn backoff_grows_linearly() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(1), Duration::from_millis(500));
        assert_eq!(policy.backoff(2), Duration::from_millis(1000));
    }
}
