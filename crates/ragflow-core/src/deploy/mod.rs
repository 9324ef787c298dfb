//! Managed online endpoint provisioning
//!
//! Creates the hosting endpoint for the chat flow, deploys the flow behind
//! it, routes traffic, and grants the endpoint's system-assigned identity
//! the IAM roles it needs on the OpenAI account, the search service, the
//! resource group, and the workspace.

use crate::config::ServiceConfig;
use crate::error::{RagFlowError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

const MANAGEMENT_BASE: &str = "https://management.azure.com";
const ML_API_VERSION: &str = "2024-04-01";
const AUTH_API_VERSION: &str = "2022-04-01";

/// Roles granted to the endpoint identity, paired with their scope kind
const DEFAULT_ROLE_GRANTS: [(&str, ScopeKind); 5] = [
    ("Cognitive Services OpenAI User", ScopeKind::OpenAiAccount),
    ("Cognitive Services Contributor", ScopeKind::OpenAiAccount),
    ("Contributor", ScopeKind::ResourceGroup),
    ("Search Index Data Contributor", ScopeKind::SearchService),
    ("Contributor", ScopeKind::Workspace),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScopeKind {
    OpenAiAccount,
    SearchService,
    ResourceGroup,
    Workspace,
}

fn validate_resource_name(kind: &str, name: &str) -> Result<()> {
    let ok = !name.is_empty()
        && name.len() <= 52
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-')
        && !name.starts_with('-')
        && !name.ends_with('-');
    if !ok {
        return Err(RagFlowError::Deployment(format!(
            "invalid {kind} name '{name}': expected 1-52 alphanumeric/dash characters"
        )));
    }
    Ok(())
}

/// Managed online endpoint request, validated at construction
#[derive(Debug, Clone)]
pub struct EndpointSpec {
    pub name: String,
}

impl EndpointSpec {
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        validate_resource_name("endpoint", &name)?;
        Ok(Self { name })
    }
}

/// Online deployment request, validated at construction
#[derive(Debug, Clone)]
pub struct DeploymentSpec {
    pub name: String,
    pub endpoint_name: String,
    pub instance_type: String,
    pub instance_count: u32,
    pub environment_variables: BTreeMap<String, String>,
}

impl DeploymentSpec {
    pub fn new(name: impl Into<String>, endpoint_name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let endpoint_name = endpoint_name.into();
        validate_resource_name("deployment", &name)?;
        validate_resource_name("endpoint", &endpoint_name)?;
        Ok(Self {
            name,
            endpoint_name,
            instance_type: "Standard_DS3_v2".to_string(),
            instance_count: 1,
            environment_variables: BTreeMap::new(),
        })
    }

    pub fn with_instances(mut self, instance_type: impl Into<String>, count: u32) -> Result<Self> {
        if count == 0 {
            return Err(RagFlowError::Deployment(
                "instance count must be at least 1".into(),
            ));
        }
        self.instance_type = instance_type.into();
        self.instance_count = count;
        Ok(self)
    }

    /// Environment passed through to the hosted flow
    pub fn with_service_environment(mut self, config: &ServiceConfig) -> Self {
        let vars = [
            ("AZURE_SUBSCRIPTION_ID", config.subscription_id.as_str()),
            ("AZURE_RESOURCE_GROUP", config.resource_group.as_str()),
            ("AZUREAI_PROJECT_NAME", config.project_name.as_str()),
            ("AZURE_OPENAI_ENDPOINT", config.openai_endpoint.as_str()),
            ("AZURE_OPENAI_API_VERSION", config.api_version.as_str()),
            ("AZURE_SEARCH_ENDPOINT", config.search_endpoint.as_str()),
        ];
        for (key, value) in vars {
            self.environment_variables
                .insert(key.to_string(), value.to_string());
        }
        self
    }
}

/// Role assignment request, validated at construction
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleAssignment {
    pub role_definition_id: String,
    pub principal_id: String,
    pub principal_type: &'static str,
}

impl RoleAssignment {
    pub fn new(role_definition_id: impl Into<String>, principal_id: impl Into<String>) -> Result<Self> {
        let role_definition_id = role_definition_id.into();
        let principal_id = principal_id.into();
        if role_definition_id.is_empty() || principal_id.is_empty() {
            return Err(RagFlowError::Deployment(
                "role assignment requires a role definition id and a principal id".into(),
            ));
        }
        Ok(Self {
            role_definition_id,
            principal_id,
            principal_type: "ServicePrincipal",
        })
    }
}

/// A provisioned endpoint's identity
#[derive(Debug, Clone, Deserialize)]
pub struct EndpointIdentity {
    #[serde(rename = "principalId")]
    pub principal_id: String,
}

#[derive(Debug, Clone, Deserialize)]
struct EndpointResource {
    identity: EndpointIdentity,
}

/// Management-plane client that provisions the hosting endpoint
pub struct Provisioner {
    http: reqwest::Client,
    config: Arc<ServiceConfig>,
    token: String,
}

impl Provisioner {
    pub fn new(config: Arc<ServiceConfig>, token: String, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            config,
            token,
        })
    }

    fn resource_group_scope(&self) -> String {
        format!(
            "/subscriptions/{}/resourceGroups/{}",
            self.config.subscription_id, self.config.resource_group
        )
    }

    fn workspace_scope(&self) -> String {
        format!(
            "{}/providers/Microsoft.MachineLearningServices/workspaces/{}",
            self.resource_group_scope(),
            self.config.project_name
        )
    }

    fn openai_scope(&self) -> Result<String> {
        let account = self.config.openai_account.as_deref().ok_or_else(|| {
            RagFlowError::Deployment("cannot derive OpenAI account name from endpoint".into())
        })?;
        Ok(format!(
            "{}/providers/Microsoft.CognitiveServices/accounts/{}",
            self.resource_group_scope(),
            account
        ))
    }

    fn search_scope(&self) -> Result<String> {
        let service = self.config.search_account.as_deref().ok_or_else(|| {
            RagFlowError::Deployment("cannot derive search service name from endpoint".into())
        })?;
        Ok(format!(
            "{}/providers/Microsoft.Search/searchServices/{}",
            self.resource_group_scope(),
            service
        ))
    }

    fn scope_for(&self, kind: ScopeKind) -> Result<String> {
        match kind {
            ScopeKind::OpenAiAccount => self.openai_scope(),
            ScopeKind::SearchService => self.search_scope(),
            ScopeKind::ResourceGroup => Ok(self.resource_group_scope()),
            ScopeKind::Workspace => Ok(self.workspace_scope()),
        }
    }

    /// Fetch the workspace location, needed for endpoint creation
    async fn workspace_location(&self) -> Result<String> {
        #[derive(Deserialize)]
        struct Workspace {
            location: String,
        }

        let url = format!(
            "{MANAGEMENT_BASE}{}?api-version={ML_API_VERSION}",
            self.workspace_scope()
        );
        let response = self.http.get(&url).bearer_auth(&self.token).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            return Err(RagFlowError::Deployment(format!(
                "workspace lookup failed (HTTP {status})"
            )));
        }
        let workspace: Workspace = response.json().await?;
        Ok(workspace.location)
    }

    /// Get the endpoint if it exists, otherwise create it with a
    /// system-assigned identity and AAD token auth
    pub async fn ensure_endpoint(&self, spec: &EndpointSpec) -> Result<EndpointIdentity> {
        let url = format!(
            "{MANAGEMENT_BASE}{}/onlineEndpoints/{}?api-version={ML_API_VERSION}",
            self.workspace_scope(),
            spec.name
        );

        let existing = self.http.get(&url).bearer_auth(&self.token).send().await?;
        if existing.status().is_success() {
            tracing::info!(endpoint = %spec.name, "endpoint already exists");
            let resource: EndpointResource = existing.json().await?;
            return Ok(resource.identity);
        }

        tracing::info!(endpoint = %spec.name, "creating online endpoint");
        let location = self.workspace_location().await?;
        let body = serde_json::json!({
            "location": location,
            "identity": { "type": "SystemAssigned" },
            "properties": {
                "authMode": "AADToken",
                "properties": {
                    "enforce_access_to_default_secret_stores": "enabled"
                }
            }
        });

        let response = self
            .http
            .put(&url)
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await?;
        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(RagFlowError::Deployment(format!(
                "endpoint creation failed (HTTP {status}): {text}"
            )));
        }
        let resource: EndpointResource = response.json().await?;
        Ok(resource.identity)
    }

    /// Create the deployment behind an endpoint
    pub async fn create_deployment(&self, spec: &DeploymentSpec) -> Result<()> {
        let url = format!(
            "{MANAGEMENT_BASE}{}/onlineEndpoints/{}/deployments/{}?api-version={ML_API_VERSION}",
            self.workspace_scope(),
            spec.endpoint_name,
            spec.name
        );
        let location = self.workspace_location().await?;
        let body = serde_json::json!({
            "location": location,
            "properties": {
                "endpointComputeType": "Managed",
                "instanceType": spec.instance_type,
                "scaleSettings": {
                    "scaleType": "Default"
                },
                "properties": {
                    "azureml.promptflow.mode": "chat",
                    "azureml.promptflow.chat_input": "question",
                    "azureml.promptflow.chat_output": "answer"
                },
                "environmentVariables": spec.environment_variables,
            },
            "sku": {
                "name": "Default",
                "capacity": spec.instance_count
            }
        });

        tracing::info!(deployment = %spec.name, endpoint = %spec.endpoint_name, "creating deployment");
        let response = self
            .http
            .put(&url)
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await?;
        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(RagFlowError::Deployment(format!(
                "deployment creation failed (HTTP {status}): {text}"
            )));
        }
        Ok(())
    }

    /// Route all traffic to one deployment
    pub async fn route_all_traffic(&self, endpoint_name: &str, deployment_name: &str) -> Result<()> {
        let url = format!(
            "{MANAGEMENT_BASE}{}/onlineEndpoints/{}?api-version={ML_API_VERSION}",
            self.workspace_scope(),
            endpoint_name
        );
        let body = serde_json::json!({
            "properties": {
                "traffic": { deployment_name: 100 }
            }
        });

        let response = self
            .http
            .patch(&url)
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await?;
        if !response.status().is_success() {
            let status = response.status();
            return Err(RagFlowError::Deployment(format!(
                "traffic update failed (HTTP {status})"
            )));
        }
        Ok(())
    }

    /// Look up a role definition id by display name within a scope
    async fn find_role_definition(&self, scope: &str, role_name: &str) -> Result<String> {
        #[derive(Deserialize)]
        struct RoleDefinitionList {
            value: Vec<RoleDefinition>,
        }

        #[derive(Deserialize)]
        struct RoleDefinition {
            id: String,
        }

        let url = format!(
            "{MANAGEMENT_BASE}{scope}/providers/Microsoft.Authorization/roleDefinitions?api-version={AUTH_API_VERSION}&$filter=roleName eq '{role_name}'"
        );
        let response = self.http.get(&url).bearer_auth(&self.token).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
                return Err(RagFlowError::Authorization(format!(
                    "role definition lookup denied (HTTP {status})"
                )));
            }
            return Err(RagFlowError::Deployment(format!(
                "role definition lookup failed (HTTP {status})"
            )));
        }

        let list: RoleDefinitionList = response.json().await?;
        list.value
            .into_iter()
            .next()
            .map(|d| d.id)
            .ok_or_else(|| {
                RagFlowError::Deployment(format!("role '{role_name}' not found at scope {scope}"))
            })
    }

    /// Grant a role to a principal at a scope.
    ///
    /// An assignment that already exists (HTTP 409) is logged and skipped;
    /// permission denials surface as authorization errors.
    pub async fn assign_role(&self, scope: &str, role_name: &str, principal_id: &str) -> Result<()> {
        let role_definition_id = self.find_role_definition(scope, role_name).await?;
        let assignment = RoleAssignment::new(role_definition_id, principal_id)?;

        let assignment_name = uuid::Uuid::new_v4();
        let url = format!(
            "{MANAGEMENT_BASE}{scope}/providers/Microsoft.Authorization/roleAssignments/{assignment_name}?api-version={AUTH_API_VERSION}"
        );
        let body = serde_json::json!({ "properties": assignment });

        let response = self
            .http
            .put(&url)
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => {
                tracing::info!(role = role_name, scope, "role assigned");
                Ok(())
            }
            reqwest::StatusCode::CONFLICT => {
                tracing::info!(role = role_name, scope, "role assignment already exists, skipping");
                Ok(())
            }
            reqwest::StatusCode::UNAUTHORIZED | reqwest::StatusCode::FORBIDDEN => {
                let status = response.status();
                let text = response.text().await.unwrap_or_default();
                Err(RagFlowError::Authorization(format!(
                    "role assignment denied (HTTP {status}): {text}"
                )))
            }
            status => {
                let text = response.text().await.unwrap_or_default();
                Err(RagFlowError::Deployment(format!(
                    "role assignment failed (HTTP {status}): {text}"
                )))
            }
        }
    }

    /// Grant the endpoint identity every role the chat flow depends on
    pub async fn grant_default_roles(&self, principal_id: &str) -> Result<()> {
        for (role_name, scope_kind) in DEFAULT_ROLE_GRANTS {
            let scope = self.scope_for(scope_kind)?;
            self.assign_role(&scope, role_name, principal_id).await?;
        }
        Ok(())
    }

    /// Studio URL for inspecting the deployment
    pub fn studio_url(&self, endpoint_name: &str, deployment_name: &str) -> String {
        format!(
            "https://ai.azure.com/projectdeployments/realtime/{endpoint_name}/{deployment_name}/detail?wsid={}&deploymentName={deployment_name}",
            self.workspace_scope()
        )
    }
}
