//! Service configuration resolution
//!
//! Identifiers come from the environment; service endpoints resolve through
//! an ordered fallback chain:
//! 1. direct endpoint overrides from the environment
//! 2. named connections in the workspace connection registry
//! 3. a primary key fetched from the account key-management API when
//!    neither an API key nor a bearer token is configured
//!
//! Resolution happens once at process start; the resulting [`ServiceConfig`]
//! is immutable and safe to share behind an `Arc`.

pub mod registry;

use crate::auth::TokenProvider;
use crate::error::{RagFlowError, Result};
use regex::Regex;
use std::sync::OnceLock;

pub use registry::{AccountKeys, CognitiveAccountKeys, Connection, ConnectionRegistry, WorkspaceClient};

/// Workspace connection name for the Azure OpenAI account
pub const AOAI_CONNECTION: &str = "aoai-connection";

/// Workspace connection name for the AI Search service
pub const SEARCH_CONNECTION: &str = "rag-search";

/// Environment variables that must be present before anything else runs
const MANDATORY_VARS: [&str; 3] = [
    "AZURE_SUBSCRIPTION_ID",
    "AZURE_RESOURCE_GROUP",
    "AZUREAI_PROJECT_NAME",
];

fn default_api_version() -> String {
    "2024-02-01".to_string()
}

fn default_search_api_version() -> String {
    "2024-07-01".to_string()
}

/// Raw environment snapshot, read once and never mutated.
///
/// Construction is a pure read: no network calls happen here, so missing
/// mandatory variables fail before any credential or endpoint is touched.
#[derive(Debug, Clone)]
pub struct Settings {
    pub subscription_id: String,
    pub resource_group: String,
    pub project_name: String,

    /// Direct endpoint overrides; when both are present the connection
    /// registry is never consulted.
    pub openai_endpoint: Option<String>,
    pub search_endpoint: Option<String>,
    pub api_version: Option<String>,
    pub search_api_version: String,

    pub openai_api_key: Option<String>,
    pub access_token: Option<String>,

    pub chat_deployment: String,
    pub embedding_deployment: String,
    pub search_index: String,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

impl Settings {
    /// Read settings from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    /// Read settings from an injectable variable lookup
    pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let missing: Vec<&str> = MANDATORY_VARS
            .iter()
            .filter(|name| lookup(name).map_or(true, |v| v.is_empty()))
            .copied()
            .collect();
        if !missing.is_empty() {
            return Err(RagFlowError::Config(format!(
                "the following environment variables are required but not set: {}",
                missing.join(", ")
            )));
        }

        Ok(Self {
            subscription_id: lookup("AZURE_SUBSCRIPTION_ID").unwrap_or_default(),
            resource_group: lookup("AZURE_RESOURCE_GROUP").unwrap_or_default(),
            project_name: lookup("AZUREAI_PROJECT_NAME").unwrap_or_default(),
            openai_endpoint: lookup("AZURE_OPENAI_ENDPOINT"),
            search_endpoint: lookup("AZURE_SEARCH_ENDPOINT"),
            api_version: lookup("AZURE_OPENAI_API_VERSION"),
            search_api_version: lookup("AZURE_SEARCH_API_VERSION")
                .unwrap_or_else(default_search_api_version),
            openai_api_key: lookup("AZURE_OPENAI_API_KEY"),
            access_token: lookup("AZURE_ACCESS_TOKEN"),
            chat_deployment: lookup("AZURE_OPENAI_CHAT_DEPLOYMENT")
                .unwrap_or_else(|| "gpt-4o".to_string()),
            embedding_deployment: lookup("AZURE_OPENAI_EMBEDDING_DEPLOYMENT")
                .unwrap_or_else(|| "text-embedding-ada-002".to_string()),
            search_index: lookup("AZURE_SEARCH_INDEX").unwrap_or_else(|| "rag-index".to_string()),
            max_tokens: lookup("AZURE_OPENAI_MAX_TOKENS")
                .and_then(|s| s.parse().ok())
                .unwrap_or(512),
            timeout_secs: lookup("AZURE_REQUEST_TIMEOUT_SECS")
                .and_then(|s| s.parse().ok())
                .unwrap_or(30),
        })
    }
}

/// Auth material for data-plane calls
#[derive(Debug, Clone)]
pub enum Credential {
    /// AAD bearer token (managed identity or user token)
    Bearer(String),
    /// Account API key
    ApiKey(String),
}

/// Fully resolved service configuration, immutable for the process lifetime
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub subscription_id: String,
    pub resource_group: String,
    pub project_name: String,
    pub openai_endpoint: String,
    pub search_endpoint: String,
    pub api_version: String,
    pub search_api_version: String,
    pub credential: Credential,
    /// First hostname label of the OpenAI endpoint (the account name)
    pub openai_account: Option<String>,
    /// First hostname label of the search endpoint (the service name)
    pub search_account: Option<String>,
}

/// Extract the first hostname label from a service URL
pub fn domain_prefix(url: &str) -> Option<&str> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"^https?://([^./]+)").expect("valid regex"));
    re.captures(url)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// First fallback: both endpoints supplied directly via the environment
fn direct_endpoints(settings: &Settings) -> Option<(String, String, String)> {
    match (&settings.openai_endpoint, &settings.search_endpoint) {
        (Some(openai), Some(search)) => Some((
            openai.clone(),
            search.clone(),
            settings
                .api_version
                .clone()
                .unwrap_or_else(default_api_version),
        )),
        _ => None,
    }
}

/// Resolve endpoints and a credential using the ordered fallback chain.
///
/// Idempotent, but each invocation may hit the registry and key APIs;
/// callers should resolve once per process and share the result.
pub async fn resolve(
    settings: &Settings,
    registry: &dyn ConnectionRegistry,
    keys: &dyn AccountKeys,
) -> Result<ServiceConfig> {
    let (openai_endpoint, search_endpoint, api_version) = match direct_endpoints(settings) {
        Some(resolved) => resolved,
        None => {
            tracing::debug!("endpoints not set, querying workspace connections");
            let aoai = registry.get_connection(AOAI_CONNECTION).await?;
            let search = registry.get_connection(SEARCH_CONNECTION).await?;
            let api_version = settings
                .api_version
                .clone()
                .or_else(|| aoai.metadata.get("ApiVersion").cloned())
                .unwrap_or_else(default_api_version);
            (aoai.target, search.target, api_version)
        }
    };

    let credential = match (&settings.openai_api_key, &settings.access_token) {
        (Some(key), _) => Credential::ApiKey(key.clone()),
        (None, Some(token)) => Credential::Bearer(token.clone()),
        (None, None) => {
            // Last resort: derive the account name from the endpoint and
            // fetch the rotating primary key from the management plane.
            let account = domain_prefix(&openai_endpoint).ok_or_else(|| {
                RagFlowError::Config(format!(
                    "cannot derive account name from endpoint '{openai_endpoint}'"
                ))
            })?;
            tracing::debug!(account, "fetching primary key for OpenAI account");
            let key = keys.primary_key(&settings.resource_group, account).await?;
            Credential::ApiKey(key)
        }
    };

    Ok(ServiceConfig {
        subscription_id: settings.subscription_id.clone(),
        resource_group: settings.resource_group.clone(),
        project_name: settings.project_name.clone(),
        openai_account: domain_prefix(&openai_endpoint).map(str::to_string),
        search_account: domain_prefix(&search_endpoint).map(str::to_string),
        openai_endpoint,
        search_endpoint,
        api_version,
        search_api_version: settings.search_api_version.clone(),
        credential,
    })
}

/// True when resolution will have to call the management plane: an endpoint
/// is missing from the environment, or no data-plane credential is configured
fn needs_management_credential(settings: &Settings) -> bool {
    direct_endpoints(settings).is_none()
        || (settings.openai_api_key.is_none() && settings.access_token.is_none())
}

/// Resolve using the default management-plane clients.
///
/// Convenience wrapper for binaries: builds the REST clients, then runs
/// [`resolve`]. Token acquisition, including the instance-metadata probe, is
/// skipped entirely when the environment already supplies both endpoints and
/// a credential.
pub async fn resolve_from_settings(settings: &Settings) -> Result<ServiceConfig> {
    let token = if needs_management_credential(settings) {
        crate::auth::default_chain()?.token().await?
    } else {
        None
    };

    let registry = WorkspaceClient::new(settings, token.clone())?;
    let keys = CognitiveAccountKeys::new(settings, token)?;
    resolve(settings, &registry, &keys).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    fn base_env() -> Vec<(&'static str, &'static str)> {
        vec![
            ("AZURE_SUBSCRIPTION_ID", "sub-123"),
            ("AZURE_RESOURCE_GROUP", "rg-test"),
            ("AZUREAI_PROJECT_NAME", "proj-test"),
        ]
    }

    struct FakeRegistry {
        connections: HashMap<String, Connection>,
    }

    #[async_trait]
    impl ConnectionRegistry for FakeRegistry {
        async fn get_connection(&self, name: &str) -> Result<Connection> {
            self.connections
                .get(name)
                .cloned()
                .ok_or_else(|| RagFlowError::Config(format!("connection '{name}' not found")))
        }
    }

    struct FakeKeys {
        key: Option<String>,
    }

    #[async_trait]
    impl AccountKeys for FakeKeys {
        async fn primary_key(&self, _resource_group: &str, _account: &str) -> Result<String> {
            self.key
                .clone()
                .ok_or_else(|| RagFlowError::Authorization("listKeys denied".into()))
        }
    }

    fn no_registry() -> FakeRegistry {
        FakeRegistry {
            connections: HashMap::new(),
        }
    }

    #[test]
    fn missing_mandatory_vars_are_all_named() {
        let err = Settings::from_vars(env(&[("AZURE_RESOURCE_GROUP", "rg")])).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("AZURE_SUBSCRIPTION_ID"));
        assert!(msg.contains("AZUREAI_PROJECT_NAME"));
        assert!(!msg.contains("AZURE_RESOURCE_GROUP,"));
    }

    #[test]
    fn empty_mandatory_var_counts_as_missing() {
        let mut vars = base_env();
        vars[0] = ("AZURE_SUBSCRIPTION_ID", "");
        let err = Settings::from_vars(env(&vars)).unwrap_err();
        assert!(err.to_string().contains("AZURE_SUBSCRIPTION_ID"));
    }

    #[test]
    fn defaults_apply_when_optionals_absent() {
        let settings = Settings::from_vars(env(&base_env())).unwrap();
        assert_eq!(settings.max_tokens, 512);
        assert_eq!(settings.timeout_secs, 30);
        assert_eq!(settings.search_index, "rag-index");
        assert!(settings.openai_endpoint.is_none());
    }

    #[test]
    fn domain_prefix_extracts_first_label() {
        assert_eq!(
            domain_prefix("https://my-account.openai.azure.com/"),
            Some("my-account")
        );
        assert_eq!(domain_prefix("http://search-svc.search.windows.net"), Some("search-svc"));
        assert_eq!(domain_prefix("not a url"), None);
    }

    #[test]
    fn fully_configured_environment_needs_no_management_credential() {
        let mut vars = base_env();
        vars.push(("AZURE_OPENAI_ENDPOINT", "https://aoai.openai.azure.com"));
        vars.push(("AZURE_SEARCH_ENDPOINT", "https://idx.search.windows.net"));
        vars.push(("AZURE_OPENAI_API_KEY", "k"));
        let settings = Settings::from_vars(env(&vars)).unwrap();
        assert!(!needs_management_credential(&settings));
    }

    #[test]
    fn missing_endpoint_or_credential_needs_management() {
        // No endpoints configured at all.
        let settings = Settings::from_vars(env(&base_env())).unwrap();
        assert!(needs_management_credential(&settings));

        // Endpoints present but no key and no token.
        let mut vars = base_env();
        vars.push(("AZURE_OPENAI_ENDPOINT", "https://aoai.openai.azure.com"));
        vars.push(("AZURE_SEARCH_ENDPOINT", "https://idx.search.windows.net"));
        let settings = Settings::from_vars(env(&vars)).unwrap();
        assert!(needs_management_credential(&settings));
    }

    #[tokio::test]
    async fn resolve_prefers_direct_endpoints() {
        let mut vars = base_env();
        vars.push(("AZURE_OPENAI_ENDPOINT", "https://aoai.openai.azure.com"));
        vars.push(("AZURE_SEARCH_ENDPOINT", "https://idx.search.windows.net"));
        vars.push(("AZURE_OPENAI_API_KEY", "sekrit"));
        let settings = Settings::from_vars(env(&vars)).unwrap();

        // Registry is empty: resolution must not need it.
        let config = resolve(&settings, &no_registry(), &FakeKeys { key: None })
            .await
            .unwrap();
        assert_eq!(config.openai_endpoint, "https://aoai.openai.azure.com");
        assert_eq!(config.openai_account.as_deref(), Some("aoai"));
        assert!(matches!(config.credential, Credential::ApiKey(ref k) if k == "sekrit"));
    }

    #[tokio::test]
    async fn resolve_falls_back_to_connection_registry() {
        let mut vars = base_env();
        vars.push(("AZURE_ACCESS_TOKEN", "tok"));
        let settings = Settings::from_vars(env(&vars)).unwrap();

        let mut connections = HashMap::new();
        connections.insert(
            AOAI_CONNECTION.to_string(),
            Connection {
                target: "https://conn-aoai.openai.azure.com".into(),
                metadata: HashMap::from([("ApiVersion".to_string(), "2024-06-01".to_string())]),
            },
        );
        connections.insert(
            SEARCH_CONNECTION.to_string(),
            Connection {
                target: "https://conn-search.search.windows.net".into(),
                metadata: HashMap::new(),
            },
        );

        let config = resolve(
            &settings,
            &FakeRegistry { connections },
            &FakeKeys { key: None },
        )
        .await
        .unwrap();
        assert_eq!(config.openai_endpoint, "https://conn-aoai.openai.azure.com");
        assert_eq!(config.search_endpoint, "https://conn-search.search.windows.net");
        assert_eq!(config.api_version, "2024-06-01");
        assert!(matches!(config.credential, Credential::Bearer(_)));
    }

    #[tokio::test]
    async fn resolve_fetches_primary_key_when_no_credential_configured() {
        let mut vars = base_env();
        vars.push(("AZURE_OPENAI_ENDPOINT", "https://acct.openai.azure.com"));
        vars.push(("AZURE_SEARCH_ENDPOINT", "https://idx.search.windows.net"));
        let settings = Settings::from_vars(env(&vars)).unwrap();

        let config = resolve(
            &settings,
            &no_registry(),
            &FakeKeys {
                key: Some("fetched-key".into()),
            },
        )
        .await
        .unwrap();
        assert!(matches!(config.credential, Credential::ApiKey(ref k) if k == "fetched-key"));
    }

    #[tokio::test]
    async fn key_fetch_failure_propagates() {
        let mut vars = base_env();
        vars.push(("AZURE_OPENAI_ENDPOINT", "https://acct.openai.azure.com"));
        vars.push(("AZURE_SEARCH_ENDPOINT", "https://idx.search.windows.net"));
        let settings = Settings::from_vars(env(&vars)).unwrap();

        let err = resolve(&settings, &no_registry(), &FakeKeys { key: None })
            .await
            .unwrap_err();
        assert!(matches!(err, RagFlowError::Authorization(_)));
    }
}
