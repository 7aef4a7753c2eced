/// AI research client with model fallback
///
/// Sends questions to a chat-completions upstream. Each retry attempt
/// downshifts one step along a fixed model ladder, so a question that
/// overloads the strongest model still gets an answer from a cheaper one.
/// Answers are cached - the same question inside the TTL costs nothing.
pub mod types;

pub use types::ResearchAnswer;

use std::sync::Arc;

use log::debug;
use serde_json::{json, Value};

use crate::apis::client::HttpClient;
use crate::apis::pipeline::{CallOptions, RequestPipeline};
use crate::cache::config::CATEGORY_RESEARCH;
use crate::errors::{ApiError, ApiResult};
use types::CompletionResponse;

// ============================================================================
// ENDPOINTS AND MODELS
// ============================================================================

const RESEARCH_ENDPOINT: &str = "/v1/research/chat/completions";

/// Fallback ladder, strongest first. Attempts past the end stay on the
/// last entry.
const MODEL_LADDER: [&str; 3] = ["sonar-pro", "sonar", "sonar-mini"];

/// Model for a given zero-based retry attempt.
fn model_for_attempt(attempt: u32) -> &'static str {
    let idx = (attempt as usize).min(MODEL_LADDER.len() - 1);
    MODEL_LADDER[idx]
}

pub struct ResearchClient {
    pipeline: Arc<RequestPipeline>,
    http: Arc<HttpClient>,
    enabled: bool,
}

impl ResearchClient {
    pub fn new(pipeline: Arc<RequestPipeline>, http: Arc<HttpClient>, enabled: bool) -> Self {
        Self {
            pipeline,
            http,
            enabled,
        }
    }

    /// Answer a research question. Cached by the question text.
    pub async fn ask(&self, question: &str) -> ApiResult<ResearchAnswer> {
        if !self.enabled {
            return Err(ApiError::Disabled {
                endpoint: RESEARCH_ENDPOINT.to_string(),
            });
        }
        let params = json!({ "question": question });
        let question = question.to_string();

        let http = Arc::clone(&self.http);
        let value = self
            .pipeline
            .call(
                "ask",
                CATEGORY_RESEARCH,
                &params,
                CallOptions::default(),
                move |ctx| {
                    let http = Arc::clone(&http);
                    let model = model_for_attempt(ctx.attempt);
                    if ctx.attempt > 0 {
                        debug!("research fallback: attempt {} uses {}", ctx.attempt, model);
                    }
                    let body = json!({
                        "model": model,
                        "messages": [{ "role": "user", "content": question }],
                    });
                    async move { http.post_json(RESEARCH_ENDPOINT, &body, &ctx).await }
                },
            )
            .await?;
        parse_answer(value)
    }
}

fn parse_answer(value: Value) -> ApiResult<ResearchAnswer> {
    let response: CompletionResponse =
        serde_json::from_value(value).map_err(|e| ApiError::Malformed {
            endpoint: RESEARCH_ENDPOINT.to_string(),
            message: format!("unexpected completion shape: {}", e),
        })?;
    let answer = response
        .choices
        .into_iter()
        .next()
        .map(|choice| choice.message.content)
        .ok_or_else(|| ApiError::Malformed {
            endpoint: RESEARCH_ENDPOINT.to_string(),
            message: "completion has no choices".to_string(),
        })?;
    Ok(ResearchAnswer {
        answer,
        model: response.model,
        citations: response.citations,
    })
}
