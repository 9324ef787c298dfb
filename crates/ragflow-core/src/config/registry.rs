//! Management-plane clients for workspace connections and account keys

use crate::config::Settings;
use crate::error::{RagFlowError, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

const MANAGEMENT_BASE: &str = "https://management.azure.com";
const WORKSPACE_API_VERSION: &str = "2024-04-01";
const COGNITIVE_API_VERSION: &str = "2023-05-01";

/// A named workspace connection: target URL plus service metadata
#[derive(Debug, Clone, Deserialize)]
pub struct Connection {
    pub target: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// Lookup of named connections in the workspace registry
#[async_trait]
pub trait ConnectionRegistry: Send + Sync {
    async fn get_connection(&self, name: &str) -> Result<Connection>;
}

/// Lookup of account primary keys via the key-management API
#[async_trait]
pub trait AccountKeys: Send + Sync {
    async fn primary_key(&self, resource_group: &str, account_name: &str) -> Result<String>;
}

fn management_token(token: &Option<String>) -> Result<&str> {
    token.as_deref().ok_or_else(|| {
        RagFlowError::Authorization(
            "no management credential available; set AZURE_ACCESS_TOKEN or run with a managed identity".into(),
        )
    })
}

fn map_status(status: reqwest::StatusCode, context: &str, body: String) -> RagFlowError {
    match status.as_u16() {
        401 | 403 => RagFlowError::Authorization(format!("{context} (HTTP {status}): {body}")),
        _ => RagFlowError::Config(format!("{context} (HTTP {status}): {body}")),
    }
}

/// Connection registry backed by the workspace management REST API
pub struct WorkspaceClient {
    http: reqwest::Client,
    subscription_id: String,
    resource_group: String,
    project_name: String,
    token: Option<String>,
}

impl WorkspaceClient {
    pub fn new(settings: &Settings, token: Option<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()?;
        Ok(Self {
            http,
            subscription_id: settings.subscription_id.clone(),
            resource_group: settings.resource_group.clone(),
            project_name: settings.project_name.clone(),
            token,
        })
    }
}

#[async_trait]
impl ConnectionRegistry for WorkspaceClient {
    async fn get_connection(&self, name: &str) -> Result<Connection> {
        #[derive(Deserialize)]
        struct ConnectionResource {
            properties: Connection,
        }

        let token = management_token(&self.token)?;
        let url = format!(
            "{MANAGEMENT_BASE}/subscriptions/{}/resourceGroups/{}/providers/Microsoft.MachineLearningServices/workspaces/{}/connections/{}?api-version={WORKSPACE_API_VERSION}",
            self.subscription_id, self.resource_group, self.project_name, name
        );

        let response = self.http.get(&url).bearer_auth(token).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(map_status(
                status,
                &format!("workspace connection '{name}' lookup failed"),
                body,
            ));
        }

        let resource: ConnectionResource = response.json().await?;
        Ok(resource.properties)
    }
}

/// Account key client backed by the Cognitive Services management API
pub struct CognitiveAccountKeys {
    http: reqwest::Client,
    subscription_id: String,
    token: Option<String>,
}

impl CognitiveAccountKeys {
    pub fn new(settings: &Settings, token: Option<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()?;
        Ok(Self {
            http,
            subscription_id: settings.subscription_id.clone(),
            token,
        })
    }
}

#[async_trait]
impl AccountKeys for CognitiveAccountKeys {
    async fn primary_key(&self, resource_group: &str, account_name: &str) -> Result<String> {
        #[derive(Deserialize)]
        struct AccountKeysResponse {
            key1: String,
        }

        let token = management_token(&self.token)?;
        let url = format!(
            "{MANAGEMENT_BASE}/subscriptions/{}/resourceGroups/{resource_group}/providers/Microsoft.CognitiveServices/accounts/{account_name}/listKeys?api-version={COGNITIVE_API_VERSION}",
            self.subscription_id
        );

        let response = self.http.post(&url).bearer_auth(token).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(map_status(
                status,
                &format!("listKeys for account '{account_name}' failed"),
                body,
            ));
        }

        let keys: AccountKeysResponse = response.json().await?;
        Ok(keys.key1)
    }
}
