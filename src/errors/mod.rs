/// Error types for the outbound API client layer
///
/// Every failure an upstream call can produce is represented here with enough
/// structure for the retrier to classify it and for telemetry to record a
/// stable error code. Variants carry the endpoint so operators can tell
/// which upstream misbehaved without re-deriving it from logs.
use std::time::Duration;

use thiserror::Error;

pub type ApiResult<T> = Result<T, ApiError>;

// =============================================================================
// ERROR TYPE
// =============================================================================

// Clone lets a collapsed in-flight fetch hand one failure to every waiter.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// The request did not complete within its deadline. The upstream likely
    /// received it, so any consumed rate-limit token is not refunded.
    #[error("connection timeout to {endpoint} after {timeout_ms}ms")]
    Timeout { endpoint: String, timeout_ms: u64 },

    /// Connection-level failure (reset, DNS, TLS, refused).
    #[error("network error calling {endpoint}: {message}")]
    Network { endpoint: String, message: String },

    /// Non-success HTTP status other than 401/403/429.
    #[error("HTTP {status} from {endpoint}: {body}")]
    Http {
        endpoint: String,
        status: u16,
        body: String,
    },

    /// HTTP 429. `retry_after_ms` carries the server's Retry-After hint
    /// when one was present.
    #[error("rate limited by {endpoint}")]
    RateLimited {
        endpoint: String,
        retry_after_ms: Option<u64>,
    },

    /// HTTP 401/403 - bad or missing credentials.
    #[error("authentication failed for {endpoint}: {message}")]
    Auth { endpoint: String, message: String },

    /// The response arrived but could not be parsed into the expected shape.
    #[error("malformed response from {endpoint}: {message}")]
    Malformed { endpoint: String, message: String },

    /// The client was disabled via configuration.
    #[error("client disabled via configuration (endpoint={endpoint})")]
    Disabled { endpoint: String },

    /// All retry attempts were consumed. Carries the last underlying cause.
    #[error("{operation} failed after {attempts} attempts")]
    RetriesExhausted {
        operation: String,
        attempts: u32,
        #[source]
        source: Box<ApiError>,
    },
}

// =============================================================================
// CLASSIFICATION
// =============================================================================

/// Retry classification for an error, per the taxonomy the retrier enforces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Worth retrying with backoff (timeouts, connection failures, 5xx).
    Transient,
    /// Worth retrying, and the delay must honor any Retry-After hint.
    RateLimited,
    /// Retrying will not help (4xx, malformed payloads, disabled clients).
    Permanent,
}

impl ApiError {
    pub fn class(&self) -> ErrorClass {
        match self {
            ApiError::Timeout { .. } | ApiError::Network { .. } => ErrorClass::Transient,
            ApiError::Http { status, .. } if *status >= 500 => ErrorClass::Transient,
            ApiError::RateLimited { .. } => ErrorClass::RateLimited,
            ApiError::Http { .. }
            | ApiError::Auth { .. }
            | ApiError::Malformed { .. }
            | ApiError::Disabled { .. }
            | ApiError::RetriesExhausted { .. } => ErrorClass::Permanent,
        }
    }

    /// Server-provided minimum delay before the next attempt, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            ApiError::RateLimited {
                retry_after_ms: Some(ms),
                ..
            } => Some(Duration::from_millis(*ms)),
            _ => None,
        }
    }

    /// Stable short code for telemetry and log aggregation.
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Timeout { .. } => "timeout",
            ApiError::Network { .. } => "network",
            ApiError::Http { .. } => "http_status",
            ApiError::RateLimited { .. } => "rate_limited",
            ApiError::Auth { .. } => "auth",
            ApiError::Malformed { .. } => "malformed",
            ApiError::Disabled { .. } => "disabled",
            ApiError::RetriesExhausted { .. } => "retries_exhausted",
        }
    }

    /// Map a reqwest transport error onto the taxonomy.
    pub fn from_reqwest(endpoint: &str, timeout: Duration, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ApiError::Timeout {
                endpoint: endpoint.to_string(),
                timeout_ms: timeout.as_millis() as u64,
            }
        } else {
            ApiError::Network {
                endpoint: endpoint.to_string(),
                message: err.to_string(),
            }
        }
    }

    /// Map a non-success HTTP status onto the taxonomy.
    pub fn from_status(
        endpoint: &str,
        status: u16,
        retry_after_ms: Option<u64>,
        body: String,
    ) -> Self {
        match status {
            429 => ApiError::RateLimited {
                endpoint: endpoint.to_string(),
                retry_after_ms,
            },
            401 | 403 => ApiError::Auth {
                endpoint: endpoint.to_string(),
                message: body,
            },
            _ => ApiError::Http {
                endpoint: endpoint.to_string(),
                status,
                body,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_is_transient() {
        let err = ApiError::Timeout {
            endpoint: "/v1/news".into(),
            timeout_ms: 5000,
        };
        assert_eq!(err.class(), ErrorClass::Transient);
        assert_eq!(err.code(), "timeout");
    }

    #[test]
    fn test_5xx_is_transient_4xx_is_permanent() {
        let server = ApiError::from_status("/v1/news", 503, None, String::new());
        assert_eq!(server.class(), ErrorClass::Transient);

        let client = ApiError::from_status("/v1/news", 404, None, String::new());
        assert_eq!(client.class(), ErrorClass::Permanent);
    }

    #[test]
    fn test_429_maps_to_rate_limited_with_hint() {
        let err = ApiError::from_status("/v1/news", 429, Some(2500), String::new());
        assert_eq!(err.class(), ErrorClass::RateLimited);
        assert_eq!(err.retry_after(), Some(Duration::from_millis(2500)));
    }

    #[test]
    fn test_auth_statuses_map_to_auth() {
        let err = ApiError::from_status("/v1/research", 401, None, "bad key".into());
        assert!(matches!(err, ApiError::Auth { .. }));
        assert_eq!(err.class(), ErrorClass::Permanent);
    }

    #[test]
    fn test_malformed_is_permanent() {
        let err = ApiError::Malformed {
            endpoint: "/v1/news".into(),
            message: "expected array".into(),
        };
        assert_eq!(err.class(), ErrorClass::Permanent);
    }

    #[test]
    fn test_retries_exhausted_carries_cause() {
        let err = ApiError::RetriesExhausted {
            operation: "getTariffAlerts".into(),
            attempts: 3,
            source: Box::new(ApiError::Timeout {
                endpoint: "/v1/tariffs/alerts".into(),
                timeout_ms: 5000,
            }),
        };
        assert_eq!(err.code(), "retries_exhausted");
        let source = std::error::Error::source(&err).expect("source should be set");
        assert!(source.to_string().contains("timeout"));
    }
}
