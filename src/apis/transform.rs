/// Named response transforms
///
/// Upstreams wrap their payloads in envelopes (`{"status": ..., "data": ...}`
/// and friends). Clients register a transform once under a name and reference
/// it per call; the pipeline applies it to the raw response before caching.
use std::collections::HashMap;
use std::sync::Arc;

use log::debug;
use parking_lot::RwLock;
use serde_json::Value;

use crate::errors::{ApiError, ApiResult};

pub type TransformFn = Arc<dyn Fn(Value) -> ApiResult<Value> + Send + Sync>;

#[derive(Default)]
pub struct TransformRegistry {
    transforms: RwLock<HashMap<String, TransformFn>>,
}

impl TransformRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a transform, replacing any previous one under the name.
    pub fn register<F>(&self, name: &str, transform: F)
    where
        F: Fn(Value) -> ApiResult<Value> + Send + Sync + 'static,
    {
        self.transforms
            .write()
            .insert(name.to_string(), Arc::new(transform));
    }

    /// Apply the named transform; `None` is the identity.
    pub fn apply(&self, name: Option<&str>, value: Value) -> ApiResult<Value> {
        let Some(name) = name else {
            return Ok(value);
        };
        let transform = self.transforms.read().get(name).cloned();
        match transform {
            Some(transform) => transform(value),
            None => {
                debug!("no transform registered under '{}', passing through", name);
                Ok(value)
            }
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.transforms.read().contains_key(name)
    }
}

/// Transform for the common `{"data": ...}` envelope. Fails as malformed when
/// the field is absent so the error is attributable to the upstream shape.
pub fn unwrap_data_envelope(endpoint: &'static str) -> impl Fn(Value) -> ApiResult<Value> {
    move |mut value: Value| match value.get_mut("data") {
        Some(data) => Ok(data.take()),
        None => Err(ApiError::Malformed {
            endpoint: endpoint.to_string(),
            message: "response missing 'data' envelope".to_string(),
        }),
    }
}
