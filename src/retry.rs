use std::future::Future;
use std::time::Duration;

use tracing::warn;

/// A fixed-delay retry policy shared by the download engine and the batch
/// retry pass. Rate-limit backoff is not handled here: the catalog client
/// sleeps for whatever delay the service dictates.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    max_attempts: u32,
    delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    /// Retries without any delay between attempts.
    pub fn immediate(max_attempts: u32) -> Self {
        Self::new(max_attempts, Duration::ZERO)
    }

    /// Runs `op` up to `max_attempts` times, sleeping `delay` between
    /// attempts. The closure receives the 1-based attempt number. Returns the
    /// first success or the last error.
    pub async fn run<T, E, F, Fut>(&self, mut op: F) -> Result<T, E>
    where
        E: std::fmt::Display,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < self.max_attempts => {
                    warn!("Attempt {}/{} failed: {}", attempt, self.max_attempts, e);
                    if !self.delay.is_zero() {
                        tokio::time::sleep(self.delay).await;
                    }
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_succeeds_first_attempt() {
        let policy = RetryPolicy::immediate(3);
        let result: Result<u32, String> = policy.run(|_| async { Ok(42) }).await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let policy = RetryPolicy::immediate(3);
        let result: Result<u32, String> = policy
            .run(|attempt| async move {
                if attempt < 3 {
                    Err(format!("attempt {} failed", attempt))
                } else {
                    Ok(attempt)
                }
            })
            .await;
        assert_eq!(result.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_returns_last_error_when_exhausted() {
        let policy = RetryPolicy::immediate(2);
        let result: Result<u32, String> = policy
            .run(|attempt| async move { Err(format!("attempt {}", attempt)) })
            .await;
        assert_eq!(result.unwrap_err(), "attempt 2");
    }
}
