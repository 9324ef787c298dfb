//! LLM integration
//!
//! Traits and the Azure OpenAI REST client for:
//! - embedding generation
//! - chat completions with usage accounting

mod client;
mod traits;

pub use client::{AzureOpenAiClient, ChatMessage, ModelConfig};
pub use traits::{Completion, CompletionModel, Embedder, TokenUsage};
