//! Chat request pipeline
//!
//! One request runs four stages strictly in sequence; each stage's output
//! is the next stage's input, so there is no intra-request parallelism.
//! Any stage error ends the request with the originating error and no
//! compensation. The pipeline holds no mutable state, so concurrent
//! requests over one instance are safe.

use crate::error::Result;
use crate::llm::{CompletionModel, Embedder, TokenUsage};
use crate::prompt::PromptTemplate;
use crate::search::{RetrievedDocument, Retriever, DEFAULT_TOP_K};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// One prior question/answer exchange
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatTurn {
    pub question: String,
    pub answer: String,
}

/// Final answer plus the context documents used to produce it
#[derive(Debug, Clone, Serialize)]
pub struct ChatResponse {
    pub answer: String,
    /// Documents in retriever order, exactly as rendered into the prompt
    pub context: Vec<RetrievedDocument>,
    pub usage: TokenUsage,
}

/// Pipeline stage progression: linear, no branching, no loop-back
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Embedding,
    Retrieving,
    Rendering,
    Completing,
    Done,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Embedding => "embedding",
            Self::Retrieving => "retrieving",
            Self::Rendering => "rendering",
            Self::Completing => "completing",
            Self::Done => "done",
        };
        f.write_str(s)
    }
}

/// Anything that can answer a question with context
#[async_trait]
pub trait ChatService: Send + Sync {
    async fn answer(&self, question: &str, history: &[ChatTurn]) -> Result<ChatResponse>;
}

/// The embed → retrieve → render → complete orchestrator
pub struct ChatPipeline {
    embedder: Arc<dyn Embedder>,
    retriever: Arc<dyn Retriever>,
    template: PromptTemplate,
    completions: Arc<dyn CompletionModel>,
    top_k: usize,
}

impl ChatPipeline {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        retriever: Arc<dyn Retriever>,
        template: PromptTemplate,
        completions: Arc<dyn CompletionModel>,
    ) -> Self {
        Self {
            embedder,
            retriever,
            template,
            completions,
            top_k: DEFAULT_TOP_K,
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }
}

#[async_trait]
impl ChatService for ChatPipeline {
    async fn answer(&self, question: &str, history: &[ChatTurn]) -> Result<ChatResponse> {
        tracing::debug!(stage = %Stage::Embedding, question, "chat request started");
        let embedding = self.embedder.embed(question).await?;

        tracing::debug!(stage = %Stage::Retrieving, top_k = self.top_k, "searching index");
        let context = self
            .retriever
            .retrieve(question, &embedding, self.top_k)
            .await?;

        tracing::debug!(stage = %Stage::Rendering, documents = context.len(), "rendering prompt");
        let prompt = self.template.render(question, &context, history)?;

        tracing::debug!(stage = %Stage::Completing, "requesting completion");
        let completion = self.completions.complete(&prompt).await?;

        tracing::debug!(
            stage = %Stage::Done,
            total_tokens = completion.usage.total_tokens,
            "chat request complete"
        );
        Ok(ChatResponse {
            answer: completion.answer,
            context,
            usage: completion.usage,
        })
    }
}
