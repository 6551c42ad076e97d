//! Exponential backoff for transient LLM failures.
//!
//! Only transient errors are retried: rate
//! limits, 5xx responses and network timeouts (see
//! [`Error::is_transient`](crate::Error::is_transient)). A retry is invisible to the
//! clarification loop and does not use up a round.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::Result;

/// Configuration for retry behavior.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Retries after the first attempt (0 = fail immediately).
    pub max_retries: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
    /// Growth factor between consecutive delays.
    pub multiplier: f64,
    /// Scale each delay by a fixed per-attempt factor below 1.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    pub fn with_retries(retries: u32) -> Self {
        Self {
            max_retries: retries,
            ..Default::default()
        }
    }

    /// No retries at all.
    pub fn none() -> Self {
        Self::with_retries(0)
    }

    /// Delay before retry number `attempt` (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let base = self.initial_delay.as_secs_f64() * self.multiplier.powi(exponent);
        let capped = base.min(self.max_delay.as_secs_f64());
        if !self.jitter {
            return Duration::from_secs_f64(capped);
        }
        // Deterministic jitter; avoids pulling in a RNG for this alone.
        let factor = [0.75, 0.90, 0.60, 0.85][(attempt % 4) as usize];
        Duration::from_secs_f64(capped * factor)
    }
}

/// Run `call` until it succeeds, fails permanently, or retries run out.
pub async fn retry_call<T, F, Fut>(config: &RetryConfig, mut call: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        match call().await {
            Ok(v) => return Ok(v),
            Err(e) if attempt < config.max_retries && e.is_transient() => {
                let delay = config.delay_for_attempt(attempt);
                warn!(
                    "Transient LLM error (attempt {}/{}): {e}. Retrying in {delay:?}",
                    attempt + 1,
                    config.max_retries,
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast(retries: u32) -> RetryConfig {
        RetryConfig {
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
            ..RetryConfig::with_retries(retries)
        }
    }

    #[test]
    fn delay_grows_then_caps() {
        let config = RetryConfig {
            jitter: false,
            max_delay: Duration::from_secs(2),
            ..RetryConfig::with_retries(10)
        };
        assert!(config.delay_for_attempt(1) > config.delay_for_attempt(0));
        assert_eq!(config.delay_for_attempt(10), Duration::from_secs(2));
    }

    #[test]
    fn jitter_never_exceeds_base() {
        let plain = RetryConfig {
            jitter: false,
            ..Default::default()
        };
        let jittered = RetryConfig::default();
        for attempt in 0..6 {
            assert!(jittered.delay_for_attempt(attempt) < plain.delay_for_attempt(attempt));
        }
    }

    #[tokio::test]
    async fn transient_errors_are_retried() {
        let calls = AtomicU32::new(0);
        let result = retry_call(&fast(3), || async {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(Error::Http {
                    status: 503,
                    body: "busy".into(),
                })
            } else {
                Ok("done")
            }
        })
        .await;
        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_errors_fail_immediately() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = retry_call(&fast(3), || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(Error::Http {
                status: 401,
                body: "bad key".into(),
            })
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_are_bounded() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = retry_call(&fast(2), || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(Error::Http {
                status: 429,
                body: String::new(),
            })
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
