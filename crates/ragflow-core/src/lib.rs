//! Ragflow Core Library
//!
//! Retrieval-augmented chat over Azure OpenAI and Azure AI Search.
//!
//! # Features
//! - Configuration resolution with an ordered fallback chain (environment,
//!   workspace connections, account key fetch)
//! - Sequential embed → retrieve → render → complete chat pipeline
//! - LLM-judged answer-quality evaluation over JSONL datasets
//! - Managed online endpoint provisioning with IAM role grants

pub mod auth;
pub mod config;
pub mod deploy;
pub mod error;
pub mod eval;
pub mod llm;
pub mod pipeline;
pub mod prompt;
pub mod search;

pub use auth::{default_chain, ChainTokenProvider, EnvTokenProvider, ImdsTokenProvider, TokenProvider};
pub use config::{
    domain_prefix, resolve, resolve_from_settings, AccountKeys, Connection, ConnectionRegistry,
    Credential, ServiceConfig, Settings, AOAI_CONNECTION, SEARCH_CONNECTION,
};
pub use deploy::{DeploymentSpec, EndpointSpec, Provisioner, RoleAssignment};
pub use error::{CompletionErrorKind, Error, RagFlowError, Result};
pub use eval::{
    load_dataset, run_name, write_artifacts, EvalHarness, EvalInput, EvaluationRecord,
    EvaluationSummary, MetricScores, ResultsReporter, WorkspaceReporter,
};
pub use llm::{
    AzureOpenAiClient, ChatMessage, Completion, CompletionModel, Embedder, ModelConfig, TokenUsage,
};
pub use pipeline::{ChatPipeline, ChatResponse, ChatService, ChatTurn, Stage};
pub use prompt::{PromptTemplate, RenderedPrompt};
pub use search::{RetrievedDocument, Retriever, SearchIndexClient, DEFAULT_TOP_K};
