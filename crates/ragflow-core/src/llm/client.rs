//! Azure OpenAI REST client for embeddings and chat completions

use crate::config::{Credential, ServiceConfig, Settings};
use crate::error::{CompletionErrorKind, RagFlowError, Result};
use crate::llm::{Completion, CompletionModel, Embedder, TokenUsage};
use crate::prompt::RenderedPrompt;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Chat message for completion requests
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Deployment names and generation parameters
#[derive(Debug, Clone)]
pub struct ModelConfig {
    pub chat_deployment: String,
    pub embedding_deployment: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl ModelConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            chat_deployment: settings.chat_deployment.clone(),
            embedding_deployment: settings.embedding_deployment.clone(),
            max_tokens: settings.max_tokens,
            temperature: 0.7,
        }
    }
}

/// Classify a non-success completion status into a failure kind
fn completion_error_kind(status: reqwest::StatusCode, body: &str) -> CompletionErrorKind {
    match status.as_u16() {
        429 => CompletionErrorKind::RateLimited,
        401 | 403 => CompletionErrorKind::Auth,
        400 if body.contains("content_filter") => CompletionErrorKind::ContentFiltered,
        _ => CompletionErrorKind::Upstream,
    }
}

/// Azure OpenAI client over the deployments REST surface
pub struct AzureOpenAiClient {
    http: reqwest::Client,
    config: Arc<ServiceConfig>,
    model: ModelConfig,
}

impl AzureOpenAiClient {
    pub fn new(config: Arc<ServiceConfig>, model: ModelConfig, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            config,
            model,
        })
    }

    fn deployment_url(&self, deployment: &str, operation: &str) -> String {
        format!(
            "{}/openai/deployments/{}/{}?api-version={}",
            self.config.openai_endpoint.trim_end_matches('/'),
            deployment,
            operation,
            self.config.api_version
        )
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.credential {
            Credential::ApiKey(key) => request.header("api-key", key),
            Credential::Bearer(token) => request.bearer_auth(token),
        }
    }
}

#[async_trait]
impl Embedder for AzureOpenAiClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        #[derive(Serialize)]
        struct EmbeddingRequest<'a> {
            input: &'a str,
        }

        #[derive(Deserialize)]
        struct EmbeddingResponse {
            data: Vec<EmbeddingData>,
        }

        #[derive(Deserialize)]
        struct EmbeddingData {
            embedding: Vec<f32>,
        }

        let url = self.deployment_url(&self.model.embedding_deployment, "embeddings");
        let response = self
            .authorize(self.http.post(&url))
            .json(&EmbeddingRequest { input: text })
            .send()
            .await
            .map_err(|e| RagFlowError::Embedding(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(RagFlowError::Embedding(format!(
                "embedding service error (HTTP {status}): {body}"
            )));
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| RagFlowError::Embedding(e.to_string()))?;

        parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| RagFlowError::Embedding("no embedding returned".to_string()))
    }

    fn model_name(&self) -> &str {
        &self.model.embedding_deployment
    }
}

#[async_trait]
impl CompletionModel for AzureOpenAiClient {
    async fn complete(&self, prompt: &RenderedPrompt) -> Result<Completion> {
        #[derive(Serialize)]
        struct ChatRequest {
            messages: Vec<ChatMessage>,
            temperature: f32,
            max_tokens: u32,
        }

        #[derive(Deserialize)]
        struct ChatResponseBody {
            choices: Vec<ChatChoice>,
            #[serde(default)]
            usage: Option<TokenUsage>,
        }

        #[derive(Deserialize)]
        struct ChatChoice {
            message: ChatMessage,
            #[serde(default)]
            finish_reason: Option<String>,
        }

        let request = ChatRequest {
            messages: vec![
                ChatMessage::system(&prompt.system),
                ChatMessage::user(&prompt.user),
            ],
            temperature: self.model.temperature,
            max_tokens: self.model.max_tokens,
        };

        let url = self.deployment_url(&self.model.chat_deployment, "chat/completions");
        let response = self
            .authorize(self.http.post(&url))
            .json(&request)
            .send()
            .await
            .map_err(|e| RagFlowError::completion(CompletionErrorKind::Upstream, e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let kind = completion_error_kind(status, &body);
            return Err(RagFlowError::completion(
                kind,
                format!("completion service error (HTTP {status}): {body}"),
            ));
        }

        let parsed: ChatResponseBody = response
            .json()
            .await
            .map_err(|e| RagFlowError::completion(CompletionErrorKind::Upstream, e.to_string()))?;

        let choice = parsed.choices.into_iter().next().ok_or_else(|| {
            RagFlowError::completion(CompletionErrorKind::Upstream, "no response from chat model")
        })?;

        if choice.finish_reason.as_deref() == Some("content_filter") {
            return Err(RagFlowError::completion(
                CompletionErrorKind::ContentFiltered,
                "response suppressed by content filter",
            ));
        }

        Ok(Completion {
            answer: choice.message.content,
            usage: parsed.usage.unwrap_or_default(),
        })
    }

    fn deployment(&self) -> &str {
        &self.model.chat_deployment
    }
}
