//! Command implementations

pub mod chat;
pub mod deploy;
pub mod eval;

use anyhow::Result;
use ragflow_core::{
    AzureOpenAiClient, ChatPipeline, ModelConfig, PromptTemplate, SearchIndexClient,
    ServiceConfig, Settings,
};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Resolve settings and service configuration once for a command
pub async fn resolve_config() -> Result<(Settings, Arc<ServiceConfig>)> {
    let settings = Settings::from_env()?;
    let config = Arc::new(ragflow_core::resolve_from_settings(&settings).await?);
    Ok((settings, config))
}

/// Build the chat pipeline from resolved configuration
pub fn build_pipeline(
    settings: &Settings,
    config: Arc<ServiceConfig>,
    template_path: Option<&Path>,
) -> Result<(ChatPipeline, Arc<AzureOpenAiClient>)> {
    let timeout = Duration::from_secs(settings.timeout_secs);
    let model = ModelConfig::from_settings(settings);
    let client = Arc::new(AzureOpenAiClient::new(config.clone(), model, timeout)?);
    let retriever = Arc::new(SearchIndexClient::new(
        config,
        settings.search_index.clone(),
        timeout,
    )?);

    let template = match template_path {
        Some(path) => PromptTemplate::load(path)?,
        None => PromptTemplate::default_chat()?,
    };

    let pipeline = ChatPipeline::new(client.clone(), retriever, template, client.clone());
    Ok((pipeline, client))
}
