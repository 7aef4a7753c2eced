/// Exponential backoff retrier with jitter
///
/// Wraps one logical operation and re-issues it on retryable failures:
/// `delay = min(max_delay, base * 2^attempt) + jitter`, jitter uniform in
/// `[0, base)` so concurrent clients do not retry in lockstep. Rate-limited
/// errors additionally honor the server's Retry-After hint (whichever is
/// larger wins). Retry state is per call - nothing is shared across calls.
///
/// The operation closure receives the zero-based attempt index, which is
/// the fallback-selection hook: callers that can degrade (smaller model,
/// mirror endpoint) key their choice off it.
use std::future::Future;
use std::time::Duration;

use log::{debug, warn};
use rand::Rng;

use crate::config::RetryPolicy;
use crate::errors::{ApiError, ApiResult, ErrorClass};

#[derive(Debug, Clone)]
pub struct BackoffRetrier {
    policy: RetryPolicy,
}

impl BackoffRetrier {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `op` until it succeeds, fails permanently, or exhausts the
    /// attempt budget. Non-retryable errors surface unwrapped; exhaustion
    /// wraps the last cause in `RetriesExhausted`.
    pub async fn execute<T, F, Fut>(&self, operation: &str, op: F) -> ApiResult<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = ApiResult<T>>,
    {
        self.execute_inner(operation, self.policy.retry_malformed, op)
            .await
    }

    /// Like `execute`, with a per-call override for retrying malformed
    /// responses (operations the caller knows are idempotent and flaky).
    pub async fn execute_with_malformed_retry<T, F, Fut>(
        &self,
        operation: &str,
        retry_malformed: bool,
        op: F,
    ) -> ApiResult<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = ApiResult<T>>,
    {
        self.execute_inner(operation, retry_malformed, op).await
    }

    async fn execute_inner<T, F, Fut>(
        &self,
        operation: &str,
        retry_malformed: bool,
        mut op: F,
    ) -> ApiResult<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = ApiResult<T>>,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt: u32 = 0;

        loop {
            match op(attempt).await {
                Ok(value) => {
                    if attempt > 0 {
                        debug!("{} succeeded on attempt {}", operation, attempt + 1);
                    }
                    return Ok(value);
                }
                Err(err) => {
                    let retryable = match err.class() {
                        ErrorClass::Transient | ErrorClass::RateLimited => true,
                        ErrorClass::Permanent => {
                            retry_malformed && matches!(err, ApiError::Malformed { .. })
                        }
                    };

                    if !retryable {
                        return Err(err);
                    }
                    if attempt + 1 >= max_attempts {
                        warn!(
                            "{} exhausted {} attempts, last error: {}",
                            operation, max_attempts, err
                        );
                        return Err(ApiError::RetriesExhausted {
                            operation: operation.to_string(),
                            attempts: max_attempts,
                            source: Box::new(err),
                        });
                    }

                    let delay = self.delay_for(attempt, err.retry_after());
                    debug!(
                        "{} attempt {} failed ({}), retrying in {:?}",
                        operation,
                        attempt + 1,
                        err.code(),
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Backoff delay before the retry following failed attempt `attempt`.
    fn delay_for(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        let base = self.policy.base_delay_ms;
        let exp = base
            .saturating_mul(2u64.saturating_pow(attempt))
            .min(self.policy.max_delay_ms);
        let jitter = if base > 0 {
            rand::thread_rng().gen_range(0..base)
        } else {
            0
        };
        let computed = Duration::from_millis(exp + jitter);
        match retry_after {
            Some(hint) => computed.max(hint),
            None => computed,
        }
    }
}
