/// Cache TTLs per response category
///
/// TTLs tuned for how fast each upstream's data actually moves:
/// - Market news: short TTL (headlines churn)
/// - Tariff alerts: medium TTL (published on a schedule)
/// - Simulation inputs: long TTL (reference data, expensive to rebuild)
/// - Research answers: medium TTL (AI completions are costly to refetch)
use std::collections::HashMap;
use std::time::Duration;

use crate::config::CacheTtlOverrides;

pub const CATEGORY_MARKET_NEWS: &str = "marketNews";
pub const CATEGORY_TARIFF_ALERTS: &str = "tariffAlerts";
pub const CATEGORY_SIMULATION_INPUTS: &str = "simulationInputs";
pub const CATEGORY_RESEARCH: &str = "research";

#[derive(Debug, Clone)]
pub struct CacheTtlConfig {
    ttls: HashMap<String, Duration>,
    default_ttl: Duration,
}

impl CacheTtlConfig {
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            ttls: HashMap::new(),
            default_ttl,
        }
    }

    pub fn with_category(mut self, category: &str, ttl: Duration) -> Self {
        self.ttls.insert(category.to_string(), ttl);
        self
    }

    /// TTL for a category, falling back to the default for unknown labels.
    pub fn ttl_for(&self, category: &str) -> Duration {
        self.ttls
            .get(category)
            .copied()
            .unwrap_or(self.default_ttl)
    }

    /// Build from the deserialized config section, layered over the presets.
    pub fn from_overrides(overrides: &CacheTtlOverrides) -> Self {
        let mut cfg = Self::default();
        cfg.default_ttl = Duration::from_secs(overrides.default_ttl_secs);
        for (category, secs) in &overrides.categories {
            cfg.ttls
                .insert(category.clone(), Duration::from_secs(*secs));
        }
        cfg
    }
}

impl Default for CacheTtlConfig {
    fn default() -> Self {
        Self::new(Duration::from_secs(300))
            .with_category(CATEGORY_MARKET_NEWS, Duration::from_secs(300))
            .with_category(CATEGORY_TARIFF_ALERTS, Duration::from_secs(600))
            .with_category(CATEGORY_SIMULATION_INPUTS, Duration::from_secs(3600))
            .with_category(CATEGORY_RESEARCH, Duration::from_secs(1800))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets() {
        let cfg = CacheTtlConfig::default();
        assert_eq!(
            cfg.ttl_for(CATEGORY_SIMULATION_INPUTS),
            Duration::from_secs(3600)
        );
        assert_eq!(cfg.ttl_for(CATEGORY_MARKET_NEWS), Duration::from_secs(300));
    }

    #[test]
    fn test_unknown_category_uses_default() {
        let cfg = CacheTtlConfig::default();
        assert_eq!(cfg.ttl_for("somethingElse"), Duration::from_secs(300));
    }

    #[test]
    fn test_overrides_layer_over_presets() {
        let mut categories = HashMap::new();
        categories.insert(CATEGORY_MARKET_NEWS.to_string(), 30);
        let overrides = CacheTtlOverrides {
            default_ttl_secs: 120,
            categories,
        };
        let cfg = CacheTtlConfig::from_overrides(&overrides);
        assert_eq!(cfg.ttl_for(CATEGORY_MARKET_NEWS), Duration::from_secs(30));
        // Preset categories not overridden keep their preset value.
        assert_eq!(
            cfg.ttl_for(CATEGORY_TARIFF_ALERTS),
            Duration::from_secs(600)
        );
        assert_eq!(cfg.ttl_for("unknown"), Duration::from_secs(120));
    }
}
