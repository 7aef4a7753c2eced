/// Types for the AI research upstream (chat-completions wire shape)
use serde::{Deserialize, Serialize};

/// Parsed research answer handed to callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchAnswer {
    pub answer: String,
    /// Model that actually produced the answer (fallbacks may downshift).
    pub model: String,
    #[serde(default)]
    pub citations: Vec<String>,
}

// Wire shapes, kept private to the parser.

#[derive(Debug, Deserialize)]
pub(crate) struct CompletionResponse {
    pub model: String,
    pub choices: Vec<CompletionChoice>,
    #[serde(default)]
    pub citations: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CompletionChoice {
    pub message: CompletionMessage,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CompletionMessage {
    pub content: String,
}
