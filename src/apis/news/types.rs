/// Response types for the market news upstream
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One tariff alert as published by the alerts feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TariffAlert {
    pub id: String,
    pub country: String,
    pub title: String,
    #[serde(default)]
    pub summary: Option<String>,
    /// Free-form severity label from the feed (`low`, `medium`, `high`).
    #[serde(default)]
    pub severity: Option<String>,
    #[serde(default)]
    pub effective_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub source_url: Option<String>,
}

/// One market news article.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewsArticle {
    pub id: String,
    pub headline: String,
    #[serde(default)]
    pub summary: Option<String>,
    pub source: String,
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
}
