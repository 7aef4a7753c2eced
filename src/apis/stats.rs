/// Request telemetry with bounded memory and write-time redaction
///
/// Every pipeline call records one event: operation name, timing, outcome.
/// Events live in a fixed-capacity ring buffer; the oldest is evicted when
/// full. Sensitive params are redacted BEFORE the event enters the buffer,
/// so no raw secret ever sits in memory or on disk.
use std::collections::HashMap;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use log::warn;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::TelemetryConfig;

/// Replacement for a fully redacted value.
const REDACTED: &str = "***";

/// One recorded pipeline call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryEvent {
    pub id: Uuid,
    pub operation: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub success: bool,
    /// Stable error code (`timeout`, `rate_limited`, ...) when failed.
    pub error_code: Option<String>,
    /// Redacted request params, for debugging call shapes.
    pub params: HashMap<String, String>,
}

/// Filter for `events` and `summarize`. All fields are conjunctive.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub operation: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub success: Option<bool>,
}

impl EventFilter {
    fn matches(&self, event: &TelemetryEvent) -> bool {
        if let Some(op) = &self.operation {
            if event.operation != *op {
                return false;
            }
        }
        if let Some(since) = self.since {
            if event.ended_at < since {
                return false;
            }
        }
        if let Some(success) = self.success {
            if event.success != success {
                return false;
            }
        }
        true
    }
}

/// Aggregate view over the retained window.
#[derive(Debug, Clone, Serialize)]
pub struct TelemetrySummary {
    pub total: usize,
    pub failures: usize,
    /// failures / total, 0.0 when empty.
    pub error_rate: f64,
    pub avg_duration_ms: f64,
    /// Operations by call count, descending.
    pub top_operations: Vec<(String, usize)>,
}

pub struct TelemetryRecorder {
    config: TelemetryConfig,
    events: Mutex<VecDeque<TelemetryEvent>>,
}

impl TelemetryRecorder {
    pub fn new(config: TelemetryConfig) -> Self {
        let events = match &config.persist_path {
            Some(path) => Self::load(path, config.max_age_secs, config.capacity),
            None => VecDeque::with_capacity(config.capacity),
        };
        Self {
            config,
            events: Mutex::new(events),
        }
    }

    /// Record one call. Params are redacted here, at write time. A zero
    /// capacity disables recording entirely.
    pub fn record(
        &self,
        operation: &str,
        started_at: DateTime<Utc>,
        ended_at: DateTime<Utc>,
        success: bool,
        error_code: Option<String>,
        params: &HashMap<String, String>,
    ) {
        if self.config.capacity == 0 {
            return;
        }
        let duration_ms = (ended_at - started_at).num_milliseconds().max(0) as u64;
        let event = TelemetryEvent {
            id: Uuid::new_v4(),
            operation: operation.to_string(),
            started_at,
            ended_at,
            duration_ms,
            success,
            error_code,
            params: self.redact(params),
        };

        let snapshot = {
            let mut events = self.events.lock();
            if events.len() >= self.config.capacity {
                events.pop_front();
            }
            events.push_back(event);
            self.config.persist_path.as_ref().map(|_| events.clone())
        };
        if let (Some(path), Some(events)) = (&self.config.persist_path, snapshot) {
            Self::persist(path, &events);
        }
    }

    /// Events matching the filter, oldest first.
    pub fn events(&self, filter: &EventFilter) -> Vec<TelemetryEvent> {
        self.events
            .lock()
            .iter()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect()
    }

    pub fn summarize(&self, filter: &EventFilter) -> TelemetrySummary {
        let events = self.events(filter);
        let total = events.len();
        let failures = events.iter().filter(|e| !e.success).count();
        let avg_duration_ms = if total > 0 {
            events.iter().map(|e| e.duration_ms as f64).sum::<f64>() / total as f64
        } else {
            0.0
        };

        let mut counts: HashMap<&str, usize> = HashMap::new();
        for event in &events {
            *counts.entry(event.operation.as_str()).or_default() += 1;
        }
        let mut top_operations: Vec<(String, usize)> = counts
            .into_iter()
            .map(|(op, n)| (op.to_string(), n))
            .collect();
        top_operations.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

        TelemetrySummary {
            total,
            failures,
            error_rate: if total > 0 {
                failures as f64 / total as f64
            } else {
                0.0
            },
            avg_duration_ms,
            top_operations,
        }
    }

    pub fn clear(&self) {
        self.events.lock().clear();
        if let Some(path) = &self.config.persist_path {
            Self::persist(path, &VecDeque::new());
        }
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    /// A param whose key contains a sensitive substring (case-insensitive)
    /// keeps at most its last four characters: `"abcd1234"` becomes
    /// `"***1234"`. Shorter values are replaced entirely.
    fn redact(&self, params: &HashMap<String, String>) -> HashMap<String, String> {
        params
            .iter()
            .map(|(key, value)| {
                let lower = key.to_lowercase();
                let sensitive = self
                    .config
                    .sensitive_fields
                    .iter()
                    .any(|field| lower.contains(&field.to_lowercase()));
                let value = if sensitive {
                    redact_value(value)
                } else {
                    value.clone()
                };
                (key.clone(), value)
            })
            .collect()
    }

    fn load(path: &Path, max_age_secs: u64, capacity: usize) -> VecDeque<TelemetryEvent> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return VecDeque::with_capacity(capacity)
            }
            Err(e) => {
                warn!("failed to read telemetry file, starting empty: {}", e);
                return VecDeque::with_capacity(capacity);
            }
        };
        let events: Vec<TelemetryEvent> = match serde_json::from_str(&raw) {
            Ok(events) => events,
            Err(e) => {
                warn!("telemetry file corrupt, starting empty: {}", e);
                return VecDeque::with_capacity(capacity);
            }
        };
        // Age sweep on load: drop events past the retention window.
        let cutoff = Utc::now() - ChronoDuration::seconds(max_age_secs as i64);
        let mut kept: VecDeque<TelemetryEvent> =
            events.into_iter().filter(|e| e.ended_at >= cutoff).collect();
        while kept.len() > capacity {
            kept.pop_front();
        }
        kept
    }

    fn persist(path: &PathBuf, events: &VecDeque<TelemetryEvent>) {
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        match serde_json::to_string(&events.iter().collect::<Vec<_>>()) {
            Ok(json) => {
                if let Err(e) = std::fs::write(path, json) {
                    warn!("failed to persist telemetry: {}", e);
                }
            }
            Err(e) => warn!("failed to serialize telemetry: {}", e),
        }
    }
}

fn redact_value(value: &str) -> String {
    if value.chars().count() > 4 {
        let tail: String = value
            .chars()
            .rev()
            .take(4)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();
        format!("{}{}", REDACTED, tail)
    } else {
        REDACTED.to_string()
    }
}
