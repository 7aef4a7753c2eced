//! Resilient client layer for the tradewatch dashboard's upstream APIs.
//!
//! Every outbound call runs through one pipeline: TTL cache with stampede
//! collapse, token-bucket rate limiting with FIFO admission, exponential
//! backoff with jitter and Retry-After awareness, bounded telemetry with
//! write-time redaction, and named response transforms. Domain clients
//! (market news, tariff alerts, AI research) sit on top; `ApiManager`
//! wires everything together from a single `ClientConfig`.

pub mod apis;
pub mod cache;
pub mod config;
pub mod connectivity;
pub mod errors;
pub mod poller;

pub use apis::{ApiManager, BackoffRetrier, RequestPipeline, TelemetryRecorder, TokenBucketLimiter};
pub use cache::TtlCache;
pub use config::ClientConfig;
pub use errors::{ApiError, ApiResult, ErrorClass};
