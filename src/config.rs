/// Client configuration schemas
///
/// Everything a client instance needs is carried in one `ClientConfig` value
/// handed to the constructor - no hidden globals. All sections deserialize
/// from JSON config files with per-field defaults so partial configs work.
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

// ============================================================================
// DEFAULTS
// ============================================================================

/// Default per-request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Default outbound budget: 60 requests per minute, refilled one per second.
pub const DEFAULT_MAX_TOKENS: u32 = 60;
pub const DEFAULT_REFILL_PER_INTERVAL: u32 = 1;
pub const DEFAULT_REFILL_INTERVAL_MS: u64 = 1_000;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_BASE_DELAY_MS: u64 = 1_000;
pub const DEFAULT_MAX_DELAY_MS: u64 = 10_000;

pub const DEFAULT_TELEMETRY_CAPACITY: usize = 500;
pub const DEFAULT_TELEMETRY_MAX_AGE_SECS: u64 = 24 * 3600;

// ============================================================================
// ENVIRONMENT
// ============================================================================

/// Deployment environment, selecting the upstream base URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

impl Environment {
    pub fn default_base_url(&self) -> &'static str {
        match self {
            Environment::Development => "https://dev-api.tradewatch.io",
            Environment::Staging => "https://staging-api.tradewatch.io",
            Environment::Production => "https://api.tradewatch.io",
        }
    }
}

// ============================================================================
// SECTIONS
// ============================================================================

/// Token bucket sizing for one rate-limit domain (one upstream host).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub max_tokens: u32,
    pub refill_per_interval: u32,
    pub interval_ms: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_tokens: DEFAULT_MAX_TOKENS,
            refill_per_interval: DEFAULT_REFILL_PER_INTERVAL,
            interval_ms: DEFAULT_REFILL_INTERVAL_MS,
        }
    }
}

impl RateLimitConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// Retry policy for one pipeline. `retry_malformed` opts a client into
/// retrying parse failures; only set it for operations known to be
/// idempotent and flaky upstream.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub retry_malformed: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
            retry_malformed: false,
        }
    }
}

/// Telemetry ring-buffer sizing, redaction patterns and optional persistence.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Ring buffer capacity; the oldest event is evicted past this.
    pub capacity: usize,
    /// Case-insensitive substrings; any param key matching one is redacted
    /// at write time.
    pub sensitive_fields: Vec<String>,
    /// Persisted events older than this are swept on load.
    pub max_age_secs: u64,
    /// When set, events are persisted to this JSON file best-effort.
    pub persist_path: Option<PathBuf>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_TELEMETRY_CAPACITY,
            sensitive_fields: vec![
                "key".to_string(),
                "token".to_string(),
                "secret".to_string(),
                "query".to_string(),
                "email".to_string(),
            ],
            max_age_secs: DEFAULT_TELEMETRY_MAX_AGE_SECS,
            persist_path: None,
        }
    }
}

/// Per-category cache TTLs in seconds, with a fallback for unknown
/// categories. Categories are free-form labels chosen by callers.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CacheTtlOverrides {
    pub default_ttl_secs: u64,
    pub categories: HashMap<String, u64>,
}

impl Default for CacheTtlOverrides {
    fn default() -> Self {
        Self {
            default_ttl_secs: 300,
            categories: HashMap::new(),
        }
    }
}

// ============================================================================
// TOP-LEVEL CONFIG
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub environment: Environment,
    /// Overrides the environment base URL when set.
    pub base_url: Option<String>,
    /// Bearer token attached as `Authorization` when present.
    pub api_key: Option<String>,
    pub timeout_secs: u64,
    pub rate_limit: RateLimitConfig,
    pub retry: RetryPolicy,
    pub telemetry: TelemetryConfig,
    pub cache: CacheTtlOverrides,
    /// Key namespace for the durable cache variant.
    pub cache_namespace: String,
    /// Kill switch for the AI research client (its upstream is billed
    /// per call).
    pub research_enabled: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            environment: Environment::default(),
            base_url: None,
            api_key: None,
            timeout_secs: 0,
            rate_limit: RateLimitConfig::default(),
            retry: RetryPolicy::default(),
            telemetry: TelemetryConfig::default(),
            cache: CacheTtlOverrides::default(),
            cache_namespace: String::new(),
            research_enabled: true,
        }
    }
}

impl ClientConfig {
    pub fn base_url(&self) -> &str {
        self.base_url
            .as_deref()
            .unwrap_or_else(|| self.environment.default_base_url())
    }

    pub fn timeout(&self) -> Duration {
        let secs = if self.timeout_secs == 0 {
            DEFAULT_TIMEOUT_SECS
        } else {
            self.timeout_secs
        };
        Duration::from_secs(secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = ClientConfig::default();
        assert_eq!(cfg.environment, Environment::Development);
        assert_eq!(cfg.rate_limit.max_tokens, DEFAULT_MAX_TOKENS);
        assert_eq!(cfg.retry.max_attempts, 3);
        assert!(!cfg.retry.retry_malformed);
        assert_eq!(cfg.telemetry.capacity, DEFAULT_TELEMETRY_CAPACITY);
        assert_eq!(cfg.timeout(), Duration::from_secs(DEFAULT_TIMEOUT_SECS));
        assert!(cfg.research_enabled);
    }

    #[test]
    fn test_zero_timeout_falls_back_to_default() {
        let cfg = ClientConfig {
            timeout_secs: 0,
            ..Default::default()
        };
        assert_eq!(cfg.timeout(), Duration::from_secs(DEFAULT_TIMEOUT_SECS));
    }

    #[test]
    fn test_base_url_override_wins() {
        let cfg = ClientConfig {
            environment: Environment::Production,
            base_url: Some("https://mirror.example.com".to_string()),
            ..Default::default()
        };
        assert_eq!(cfg.base_url(), "https://mirror.example.com");
    }

    #[test]
    fn test_environment_base_urls() {
        assert!(Environment::Production.default_base_url().contains("api."));
        assert!(Environment::Staging.default_base_url().contains("staging"));
    }

    #[test]
    fn test_partial_config_deserializes() {
        let cfg: ClientConfig = serde_json::from_str(
            r#"{
                "environment": "production",
                "rate_limit": { "max_tokens": 10 },
                "retry": { "max_attempts": 5 }
            }"#,
        )
        .unwrap();
        assert_eq!(cfg.environment, Environment::Production);
        assert_eq!(cfg.rate_limit.max_tokens, 10);
        // Unspecified fields keep their defaults.
        assert_eq!(cfg.rate_limit.interval_ms, DEFAULT_REFILL_INTERVAL_MS);
        assert_eq!(cfg.retry.max_attempts, 5);
        assert_eq!(cfg.retry.base_delay_ms, DEFAULT_BASE_DELAY_MS);
    }
}
