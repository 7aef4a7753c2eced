/// Client composition and lifecycle
///
/// Builds every client from one `ClientConfig`: each upstream host gets its
/// own limiter and pipeline, while telemetry, the cache and the transform
/// registry are shared so one dashboard sees one coherent picture.
/// `dispose` tears the whole set down (limiters, pollers) for host reloads.
///
/// A process-wide instance is available through `init_global`/`global` for
/// embedders that do not want to thread the manager through their call tree.
use std::sync::Arc;

use log::info;
use once_cell::sync::OnceCell;

use crate::apis::client::HttpClient;
use crate::apis::limiter::TokenBucketLimiter;
use crate::apis::news::MarketNewsClient;
use crate::apis::pipeline::RequestPipeline;
use crate::apis::research::ResearchClient;
use crate::apis::stats::TelemetryRecorder;
use crate::apis::transform::TransformRegistry;
use crate::cache::{CacheTtlConfig, TtlCache};
use crate::config::ClientConfig;
use crate::connectivity::{NetworkSignal, StaticSignal};
use crate::poller::PollerSet;

static GLOBAL: OnceCell<ApiManager> = OnceCell::new();

pub struct ApiManager {
    news: MarketNewsClient,
    research: ResearchClient,
    telemetry: Arc<TelemetryRecorder>,
    cache: Arc<TtlCache>,
    limiters: Vec<Arc<TokenBucketLimiter>>,
    pollers: PollerSet,
}

impl ApiManager {
    /// Build all clients from one config with a default network signal.
    pub fn new(config: ClientConfig) -> anyhow::Result<Self> {
        Self::with_signal(config, Arc::new(StaticSignal::default()))
    }

    pub fn with_signal(
        config: ClientConfig,
        signal: Arc<dyn NetworkSignal>,
    ) -> anyhow::Result<Self> {
        let telemetry = Arc::new(TelemetryRecorder::new(config.telemetry.clone()));
        let transforms = Arc::new(TransformRegistry::new());
        let cache = Arc::new(TtlCache::new(
            &config.cache_namespace,
            CacheTtlConfig::from_overrides(&config.cache),
        ));
        let http = Arc::new(HttpClient::new(&config)?);

        // One limiter per upstream host; both hosts share the configured
        // bucket sizing today.
        let news_limiter = Arc::new(TokenBucketLimiter::new(config.rate_limit.clone()));
        let research_limiter = Arc::new(TokenBucketLimiter::new(config.rate_limit.clone()));

        let news_pipeline = Arc::new(RequestPipeline::new(
            Arc::clone(&news_limiter),
            Arc::clone(&cache),
            config.retry.clone(),
            Arc::clone(&telemetry),
            Arc::clone(&transforms),
            config.timeout(),
        ));
        let research_pipeline = Arc::new(RequestPipeline::new(
            Arc::clone(&research_limiter),
            Arc::clone(&cache),
            config.retry.clone(),
            Arc::clone(&telemetry),
            Arc::clone(&transforms),
            config.timeout(),
        ));

        info!(
            "api manager ready: env={:?}, base_url={}",
            config.environment,
            config.base_url()
        );

        Ok(Self {
            news: MarketNewsClient::new(news_pipeline, Arc::clone(&http), signal),
            research: ResearchClient::new(research_pipeline, http, config.research_enabled),
            telemetry,
            cache,
            limiters: vec![news_limiter, research_limiter],
            pollers: PollerSet::new(),
        })
    }

    pub fn news(&self) -> &MarketNewsClient {
        &self.news
    }

    pub fn research(&self) -> &ResearchClient {
        &self.research
    }

    pub fn telemetry(&self) -> &TelemetryRecorder {
        &self.telemetry
    }

    pub fn cache(&self) -> &TtlCache {
        &self.cache
    }

    pub fn pollers(&self) -> &PollerSet {
        &self.pollers
    }

    /// Stop limiters and pollers. In-flight calls complete; new acquires
    /// are admitted without rate limiting.
    pub fn dispose(&self) {
        self.pollers.dispose();
        for limiter in &self.limiters {
            limiter.dispose();
        }
        info!("api manager disposed");
    }
}

/// Initialize the process-wide manager. Fails if called twice.
pub fn init_global(config: ClientConfig) -> anyhow::Result<&'static ApiManager> {
    if GLOBAL.get().is_some() {
        anyhow::bail!("api manager already initialized");
    }
    GLOBAL.get_or_try_init(|| ApiManager::new(config))
}

pub fn global() -> Option<&'static ApiManager> {
    GLOBAL.get()
}
