/// Thin HTTP transport shared by the domain clients
///
/// Owns the reqwest client, base URL and credentials. Every response funnels
/// through one status-mapping path so the error taxonomy stays consistent
/// across upstreams: Retry-After is read from headers before the body is
/// consumed, 429 becomes `RateLimited`, 401/403 become `Auth`, parse
/// failures become `Malformed`.
use std::time::Duration;

use anyhow::Context;
use log::debug;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use serde_json::Value;
use url::Url;

use crate::apis::pipeline::RequestContext;
use crate::config::ClientConfig;
use crate::errors::{ApiError, ApiResult};

pub struct HttpClient {
    http: reqwest::Client,
    base_url: Url,
    api_key: Option<String>,
}

impl HttpClient {
    pub fn new(config: &ClientConfig) -> anyhow::Result<Self> {
        let base_url = Url::parse(config.base_url())
            .with_context(|| format!("invalid base URL '{}'", config.base_url()))?;
        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            http,
            base_url,
            api_key: config.api_key.clone(),
        })
    }

    pub async fn get_json(
        &self,
        path: &str,
        query: &[(&str, String)],
        ctx: &RequestContext,
    ) -> ApiResult<Value> {
        let url = self.endpoint(path)?;
        debug!("GET {} [{}]", url, ctx.correlation_id);
        let request = self
            .http
            .get(url)
            .query(query)
            .timeout(ctx.timeout)
            .header("X-Request-ID", ctx.correlation_id.to_string());
        self.execute(path, request, ctx.timeout).await
    }

    pub async fn post_json(
        &self,
        path: &str,
        body: &Value,
        ctx: &RequestContext,
    ) -> ApiResult<Value> {
        let url = self.endpoint(path)?;
        debug!("POST {} [{}]", url, ctx.correlation_id);
        let request = self
            .http
            .post(url)
            .json(body)
            .timeout(ctx.timeout)
            .header("X-Request-ID", ctx.correlation_id.to_string());
        self.execute(path, request, ctx.timeout).await
    }

    fn endpoint(&self, path: &str) -> ApiResult<Url> {
        self.base_url.join(path).map_err(|e| ApiError::Network {
            endpoint: path.to_string(),
            message: format!("invalid endpoint path: {}", e),
        })
    }

    async fn execute(
        &self,
        path: &str,
        request: reqwest::RequestBuilder,
        timeout: Duration,
    ) -> ApiResult<Value> {
        let request = match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        };
        let response = request
            .send()
            .await
            .map_err(|e| ApiError::from_reqwest(path, timeout, e))?;

        let status = response.status();
        if !status.is_success() {
            // Header must be read before the body consumes the response.
            let retry_after_ms = parse_retry_after(response.headers());
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::from_status(
                path,
                status.as_u16(),
                retry_after_ms,
                body,
            ));
        }

        response.json::<Value>().await.map_err(|e| ApiError::Malformed {
            endpoint: path.to_string(),
            message: format!("invalid JSON body: {}", e),
        })
    }
}

/// Parse a Retry-After header in its delay-seconds form. The HTTP-date form
/// is rare on the upstreams this crate talks to and is ignored.
fn parse_retry_after(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        // The value is server-controlled; never trust it not to overflow.
        .map(|secs| secs.saturating_mul(1_000))
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn test_retry_after_seconds_parsed_to_millis() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("30"));
        assert_eq!(parse_retry_after(&headers), Some(30_000));
    }

    #[test]
    fn test_retry_after_http_date_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert(
            RETRY_AFTER,
            HeaderValue::from_static("Fri, 29 Aug 2025 09:00:00 GMT"),
        );
        assert_eq!(parse_retry_after(&headers), None);
    }

    #[test]
    fn test_retry_after_absent() {
        assert_eq!(parse_retry_after(&HeaderMap::new()), None);
    }

    #[test]
    fn test_retry_after_huge_value_saturates() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("18446744073709551615"));
        assert_eq!(parse_retry_after(&headers), Some(u64::MAX));
    }

    #[test]
    fn test_invalid_base_url_rejected() {
        let config = ClientConfig {
            base_url: Some("not a url".to_string()),
            ..Default::default()
        };
        assert!(HttpClient::new(&config).is_err());
    }

    #[test]
    fn test_endpoint_joins_against_base() {
        let config = ClientConfig {
            base_url: Some("https://api.example.com".to_string()),
            ..Default::default()
        };
        let client = HttpClient::new(&config).unwrap();
        let url = client.endpoint("/v1/tariffs/alerts").unwrap();
        assert_eq!(url.as_str(), "https://api.example.com/v1/tariffs/alerts");
    }
}
