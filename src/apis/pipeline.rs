/// Request pipeline composing cache, limiter, retrier and telemetry
///
/// Every outbound call flows through the same sequence: cache lookup,
/// rate-limit admission, retried execution under a per-attempt timeout,
/// telemetry, response transform. Only a successfully transformed result
/// is cached, so a cache hit is always a previously good response.
///
/// Cache identity is `"<operation>:<canonical params>"`. Object keys
/// serialize in sorted order, so two calls differing only in param order
/// share one entry.
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use uuid::Uuid;

use crate::apis::limiter::TokenBucketLimiter;
use crate::apis::retry::BackoffRetrier;
use crate::apis::stats::TelemetryRecorder;
use crate::apis::transform::TransformRegistry;
use crate::cache::{FetchOptions, TtlCache};
use crate::config::RetryPolicy;
use crate::errors::{ApiError, ApiResult};

/// Per-attempt context handed to the fetcher. The correlation id is stable
/// across retries of one call; the attempt index is the fallback hook.
#[derive(Debug, Clone, Copy)]
pub struct RequestContext {
    pub correlation_id: Uuid,
    pub attempt: u32,
    pub timeout: Duration,
}

/// Per-call options. Defaults give a cached, transform-free call under the
/// pipeline's own timeout and retry policy.
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    /// Bypass any live cache entry; the fresh result still lands in cache.
    pub force_fresh: bool,
    /// Per-attempt timeout override.
    pub timeout: Option<Duration>,
    /// Named transform to apply before caching.
    pub transform: Option<String>,
    /// Overrides the policy's malformed-retry flag for this call.
    pub retry_malformed: Option<bool>,
}

pub struct RequestPipeline {
    limiter: Arc<TokenBucketLimiter>,
    cache: Arc<TtlCache>,
    retrier: BackoffRetrier,
    telemetry: Arc<TelemetryRecorder>,
    transforms: Arc<TransformRegistry>,
    default_timeout: Duration,
}

impl RequestPipeline {
    pub fn new(
        limiter: Arc<TokenBucketLimiter>,
        cache: Arc<TtlCache>,
        retry: RetryPolicy,
        telemetry: Arc<TelemetryRecorder>,
        transforms: Arc<TransformRegistry>,
        default_timeout: Duration,
    ) -> Self {
        Self {
            limiter,
            cache,
            retrier: BackoffRetrier::new(retry),
            telemetry,
            transforms,
            default_timeout,
        }
    }

    pub fn transforms(&self) -> &TransformRegistry {
        &self.transforms
    }

    pub fn telemetry(&self) -> &TelemetryRecorder {
        &self.telemetry
    }

    pub fn cache(&self) -> &TtlCache {
        &self.cache
    }

    pub fn limiter(&self) -> &TokenBucketLimiter {
        &self.limiter
    }

    /// Execute one logical operation through the full pipeline.
    ///
    /// A cache hit returns without touching the limiter or the network.
    /// On a miss, exactly one token is consumed for the whole call; an
    /// attempt that times out keeps its token and surfaces as
    /// `ApiError::Timeout`, which the retrier treats as transient.
    pub async fn call<F, Fut>(
        &self,
        operation: &str,
        category: &str,
        params: &Value,
        opts: CallOptions,
        fetcher: F,
    ) -> ApiResult<Value>
    where
        F: Fn(RequestContext) -> Fut,
        Fut: Future<Output = ApiResult<Value>>,
    {
        let key = cache_key(operation, params);
        let timeout = opts.timeout.unwrap_or(self.default_timeout);
        let retry_malformed = opts
            .retry_malformed
            .unwrap_or(self.retrier.policy().retry_malformed);
        let transform = opts.transform.as_deref();

        self.cache
            .get_or_fetch(
                &key,
                category,
                FetchOptions {
                    force_fresh: opts.force_fresh,
                },
                || async {
                    self.limiter.acquire().await;

                    let correlation_id = Uuid::new_v4();
                    let started_at = Utc::now();
                    let result = self
                        .retrier
                        .execute_with_malformed_retry(operation, retry_malformed, |attempt| {
                            let ctx = RequestContext {
                                correlation_id,
                                attempt,
                                timeout,
                            };
                            let fut = fetcher(ctx);
                            async move {
                                match tokio::time::timeout(timeout, fut).await {
                                    Ok(result) => result,
                                    Err(_) => Err(ApiError::Timeout {
                                        endpoint: operation.to_string(),
                                        timeout_ms: timeout.as_millis() as u64,
                                    }),
                                }
                            }
                        })
                        .await;

                    self.telemetry.record(
                        operation,
                        started_at,
                        Utc::now(),
                        result.is_ok(),
                        result.as_ref().err().map(|e| e.code().to_string()),
                        &telemetry_params(params),
                    );

                    self.transforms.apply(transform, result?)
                },
            )
            .await
    }
}

/// Cache identity for one call. serde_json serializes object keys sorted,
/// which makes this canonical for equal param sets.
pub fn cache_key(operation: &str, params: &Value) -> String {
    format!("{}:{}", operation, params)
}

/// Flatten top-level params into the string map telemetry stores. Nested
/// values keep their JSON rendering.
fn telemetry_params(params: &Value) -> HashMap<String, String> {
    match params {
        Value::Object(map) => map
            .iter()
            .map(|(k, v)| {
                let rendered = match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (k.clone(), rendered)
            })
            .collect(),
        Value::Null => HashMap::new(),
        other => HashMap::from([("params".to_string(), other.to_string())]),
    }
}
