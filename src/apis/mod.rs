/// Outbound API layer: transport, resilience primitives and domain clients
pub mod client;
pub mod limiter;
pub mod manager;
pub mod news;
pub mod pipeline;
pub mod research;
pub mod retry;
pub mod stats;
pub mod transform;

pub use client::HttpClient;
pub use limiter::{LimiterStatus, TokenBucketLimiter};
pub use manager::ApiManager;
pub use news::MarketNewsClient;
pub use pipeline::{CallOptions, RequestContext, RequestPipeline};
pub use research::ResearchClient;
pub use retry::BackoffRetrier;
pub use stats::{EventFilter, TelemetryEvent, TelemetryRecorder, TelemetrySummary};
pub use transform::{TransformFn, TransformRegistry};
