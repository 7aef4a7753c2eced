/// Market news and tariff alert client
///
/// Wraps the news upstream's list endpoints behind the request pipeline.
/// Page sizes follow the host's network signal so constrained connections
/// fetch less; responses arrive in a `{"data": ...}` envelope that is
/// unwrapped before caching.
pub mod types;

pub use types::{NewsArticle, TariffAlert};

use std::sync::Arc;

use serde_json::{json, Value};

use crate::apis::client::HttpClient;
use crate::apis::pipeline::{CallOptions, RequestPipeline};
use crate::apis::transform::unwrap_data_envelope;
use crate::cache::config::{CATEGORY_MARKET_NEWS, CATEGORY_TARIFF_ALERTS};
use crate::connectivity::NetworkSignal;
use crate::errors::{ApiError, ApiResult};

// ============================================================================
// ENDPOINTS
// ============================================================================

const TARIFF_ALERTS_ENDPOINT: &str = "/v1/tariffs/alerts";
const MARKET_NEWS_ENDPOINT: &str = "/v1/news/market";

const TRANSFORM_NEWS_ENVELOPE: &str = "news.unwrapEnvelope";

pub struct MarketNewsClient {
    pipeline: Arc<RequestPipeline>,
    http: Arc<HttpClient>,
    signal: Arc<dyn NetworkSignal>,
}

impl MarketNewsClient {
    pub fn new(
        pipeline: Arc<RequestPipeline>,
        http: Arc<HttpClient>,
        signal: Arc<dyn NetworkSignal>,
    ) -> Self {
        pipeline
            .transforms()
            .register(TRANSFORM_NEWS_ENVELOPE, unwrap_data_envelope(MARKET_NEWS_ENDPOINT));
        Self {
            pipeline,
            http,
            signal,
        }
    }

    /// Active tariff alerts for a country. Cached per country and page size.
    pub async fn get_tariff_alerts(&self, country: &str) -> ApiResult<Vec<TariffAlert>> {
        let page_size = self.signal.effective_page_size();
        let params = json!({ "country": country, "pageSize": page_size });
        let query = vec![
            ("country", country.to_string()),
            ("pageSize", page_size.to_string()),
        ];

        let http = Arc::clone(&self.http);
        let value = self
            .pipeline
            .call(
                "getTariffAlerts",
                CATEGORY_TARIFF_ALERTS,
                &params,
                CallOptions {
                    transform: Some(TRANSFORM_NEWS_ENVELOPE.to_string()),
                    ..Default::default()
                },
                move |ctx| {
                    let http = Arc::clone(&http);
                    let query = query.clone();
                    async move { http.get_json(TARIFF_ALERTS_ENDPOINT, &query, &ctx).await }
                },
            )
            .await?;
        parse_list(TARIFF_ALERTS_ENDPOINT, value)
    }

    /// Latest market news for a region.
    pub async fn get_market_news(&self, region: &str) -> ApiResult<Vec<NewsArticle>> {
        let page_size = self.signal.effective_page_size();
        let params = json!({ "region": region, "pageSize": page_size });
        let query = vec![
            ("region", region.to_string()),
            ("pageSize", page_size.to_string()),
        ];

        let http = Arc::clone(&self.http);
        let value = self
            .pipeline
            .call(
                "getMarketNews",
                CATEGORY_MARKET_NEWS,
                &params,
                CallOptions {
                    transform: Some(TRANSFORM_NEWS_ENVELOPE.to_string()),
                    ..Default::default()
                },
                move |ctx| {
                    let http = Arc::clone(&http);
                    let query = query.clone();
                    async move { http.get_json(MARKET_NEWS_ENDPOINT, &query, &ctx).await }
                },
            )
            .await?;
        parse_list(MARKET_NEWS_ENDPOINT, value)
    }
}

/// Deserialize an unwrapped list payload, mapping shape mismatches onto the
/// error taxonomy.
fn parse_list<T: serde::de::DeserializeOwned>(endpoint: &str, value: Value) -> ApiResult<Vec<T>> {
    serde_json::from_value(value).map_err(|e| ApiError::Malformed {
        endpoint: endpoint.to_string(),
        message: format!("unexpected list shape: {}", e),
    })
}
