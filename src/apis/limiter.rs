/// Token-bucket rate limiter with FIFO admission
///
/// Callers enqueue a oneshot waiter on an unbounded channel; a single
/// background service task refills the bucket and admits waiters strictly
/// in arrival order. Waiting is a loop over bounded sleeps, never
/// recursion, so sustained contention cannot grow the stack or starve
/// late arrivals.
///
/// `acquire` never errors - this primitive only delays. Several pipelines
/// may share one limiter to enforce a combined per-host budget.
use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
// Tokio's Instant tracks the runtime clock, keeping refill accounting
// consistent with the sleeps the service loop performs.
use tokio::time::Instant;

use crate::config::RateLimitConfig;

struct BucketState {
    tokens: u32,
    last_refill: Instant,
}

/// Point-in-time limiter snapshot for monitoring.
#[derive(Debug, Clone)]
pub struct LimiterStatus {
    pub available_tokens: u32,
    pub max_tokens: u32,
    pub time_since_last_refill: Duration,
}

pub struct TokenBucketLimiter {
    config: RateLimitConfig,
    state: Arc<Mutex<BucketState>>,
    queue: mpsc::UnboundedSender<oneshot::Sender<()>>,
    service: Mutex<Option<JoinHandle<()>>>,
}

impl TokenBucketLimiter {
    /// Create a limiter and spawn its service task. Requires a running
    /// tokio runtime.
    pub fn new(config: RateLimitConfig) -> Self {
        let state = Arc::new(Mutex::new(BucketState {
            tokens: config.max_tokens,
            last_refill: Instant::now(),
        }));
        let (tx, rx) = mpsc::unbounded_channel();
        let service = tokio::spawn(Self::service_loop(config.clone(), Arc::clone(&state), rx));

        debug!(
            "token bucket initialized: {} tokens, +{} per {}ms",
            config.max_tokens, config.refill_per_interval, config.interval_ms
        );

        Self {
            config,
            state,
            queue: tx,
            service: Mutex::new(Some(service)),
        }
    }

    /// Resolve once a token has been consumed. Admission order among
    /// waiters approximates FIFO; a disposed limiter admits immediately.
    pub async fn acquire(&self) {
        let (tx, rx) = oneshot::channel();
        if self.queue.send(tx).is_err() {
            warn!("rate limiter disposed, admitting without a token");
            return;
        }
        if rx.await.is_err() {
            // Service task went away mid-wait (disposal during shutdown).
            warn!("rate limiter service stopped, admitting without a token");
        }
    }

    pub fn status(&self) -> LimiterStatus {
        let mut state = self.state.lock();
        Self::refill(&self.config, &mut state);
        LimiterStatus {
            available_tokens: state.tokens,
            max_tokens: self.config.max_tokens,
            time_since_last_refill: state.last_refill.elapsed(),
        }
    }

    pub fn available_tokens(&self) -> u32 {
        self.status().available_tokens
    }

    /// Stop the service task. Queued waiters are admitted immediately.
    pub fn dispose(&self) {
        if let Some(handle) = self.service.lock().take() {
            handle.abort();
        }
    }

    /// Add whole elapsed intervals' worth of tokens, capped at the bucket
    /// size. `last_refill` advances by the consumed intervals only, so
    /// partial intervals are never silently discarded.
    fn refill(config: &RateLimitConfig, state: &mut BucketState) {
        let interval = config.interval();
        if interval.is_zero() {
            state.tokens = config.max_tokens;
            return;
        }
        let elapsed = state.last_refill.elapsed();
        let intervals = (elapsed.as_millis() / interval.as_millis()) as u32;
        if intervals > 0 {
            let refilled = intervals.saturating_mul(config.refill_per_interval);
            state.tokens = state.tokens.saturating_add(refilled).min(config.max_tokens);
            state.last_refill += interval * intervals;
        }
    }

    async fn service_loop(
        config: RateLimitConfig,
        state: Arc<Mutex<BucketState>>,
        mut rx: mpsc::UnboundedReceiver<oneshot::Sender<()>>,
    ) {
        // Sleep granularity while the bucket is empty: time for one token.
        let token_interval = if config.refill_per_interval > 0 {
            config.interval() / config.refill_per_interval
        } else {
            config.interval()
        };

        while let Some(waiter) = rx.recv().await {
            loop {
                let admitted = {
                    let mut state = state.lock();
                    Self::refill(&config, &mut state);
                    if state.tokens > 0 {
                        state.tokens -= 1;
                        true
                    } else {
                        false
                    }
                };
                if admitted {
                    // Receiver may have been dropped (caller cancelled);
                    // the token stays consumed either way.
                    let _ = waiter.send(());
                    break;
                }
                tokio::time::sleep(token_interval).await;
            }
        }
    }
}

impl Drop for TokenBucketLimiter {
    fn drop(&mut self) {
        self.dispose();
    }
}
