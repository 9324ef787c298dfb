//! LLM trait definitions

use crate::error::Result;
use crate::prompt::RenderedPrompt;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Embedding generation trait
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Generate a fixed-dimensionality embedding for one text
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Get the embedding deployment name
    fn model_name(&self) -> &str;
}

/// Token accounting returned by the completion service
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenUsage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
    #[serde(default)]
    pub total_tokens: u32,
}

/// Generated answer plus usage metadata
#[derive(Debug, Clone)]
pub struct Completion {
    pub answer: String,
    pub usage: TokenUsage,
}

/// Chat completion trait
#[async_trait]
pub trait CompletionModel: Send + Sync {
    /// Send a rendered prompt to the chat model
    async fn complete(&self, prompt: &RenderedPrompt) -> Result<Completion>;

    /// Get the chat deployment name
    fn deployment(&self) -> &str;
}
