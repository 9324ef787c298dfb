//! Bearer token acquisition for management-plane calls
//!
//! Tokens come from `AZURE_ACCESS_TOKEN` when set, otherwise from the
//! instance metadata service when running on a host with a managed identity.
//! A provider returning `Ok(None)` means "no token from this source"; the
//! chain moves on to the next one.

use crate::error::Result;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

/// AAD resource for Azure Resource Manager tokens
pub const MANAGEMENT_RESOURCE: &str = "https://management.azure.com/";

const IMDS_TOKEN_URL: &str = "http://169.254.169.254/metadata/identity/oauth2/token";
const IMDS_API_VERSION: &str = "2018-02-01";
const IMDS_TIMEOUT: Duration = Duration::from_secs(2);

/// Source of AAD bearer tokens
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Produce a token, or `None` when this source has nothing to offer
    async fn token(&self) -> Result<Option<String>>;
}

/// Token from the `AZURE_ACCESS_TOKEN` environment variable
pub struct EnvTokenProvider;

#[async_trait]
impl TokenProvider for EnvTokenProvider {
    async fn token(&self) -> Result<Option<String>> {
        Ok(std::env::var("AZURE_ACCESS_TOKEN")
            .ok()
            .filter(|t| !t.is_empty()))
    }
}

/// Token from the instance metadata service (managed identity)
pub struct ImdsTokenProvider {
    http: reqwest::Client,
}

impl ImdsTokenProvider {
    pub fn new() -> Result<Self> {
        // Short timeout: off-platform the endpoint is unreachable and the
        // probe should fail quickly.
        let http = reqwest::Client::builder().timeout(IMDS_TIMEOUT).build()?;
        Ok(Self { http })
    }
}

#[async_trait]
impl TokenProvider for ImdsTokenProvider {
    async fn token(&self) -> Result<Option<String>> {
        #[derive(Deserialize)]
        struct ImdsToken {
            access_token: String,
        }

        let response = self
            .http
            .get(IMDS_TOKEN_URL)
            .query(&[
                ("api-version", IMDS_API_VERSION),
                ("resource", MANAGEMENT_RESOURCE),
            ])
            .header("Metadata", "true")
            .send()
            .await;

        match response {
            Ok(resp) if resp.status().is_success() => {
                let token: ImdsToken = resp.json().await?;
                Ok(Some(token.access_token))
            }
            Ok(resp) => {
                tracing::debug!(status = %resp.status(), "IMDS token request rejected");
                Ok(None)
            }
            Err(err) => {
                tracing::debug!(%err, "IMDS endpoint unreachable");
                Ok(None)
            }
        }
    }
}

/// Ordered chain of token sources, first hit wins
pub struct ChainTokenProvider {
    providers: Vec<Box<dyn TokenProvider>>,
}

impl ChainTokenProvider {
    pub fn new(providers: Vec<Box<dyn TokenProvider>>) -> Self {
        Self { providers }
    }
}

#[async_trait]
impl TokenProvider for ChainTokenProvider {
    async fn token(&self) -> Result<Option<String>> {
        for provider in &self.providers {
            if let Some(token) = provider.token().await? {
                return Ok(Some(token));
            }
        }
        Ok(None)
    }
}

/// Default chain: environment token, then managed identity
pub fn default_chain() -> Result<ChainTokenProvider> {
    Ok(ChainTokenProvider::new(vec![
        Box::new(EnvTokenProvider),
        Box::new(ImdsTokenProvider::new()?),
    ]))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StaticProvider(Option<&'static str>);

    #[async_trait]
    impl TokenProvider for StaticProvider {
        async fn token(&self) -> Result<Option<String>> {
            Ok(self.0.map(str::to_string))
        }
    }

    #[tokio::test]
    async fn chain_returns_first_available_token() {
        let chain = ChainTokenProvider::new(vec![
            Box::new(StaticProvider(None)),
            Box::new(StaticProvider(Some("second"))),
            Box::new(StaticProvider(Some("third"))),
        ]);
        assert_eq!(chain.token().await.unwrap().as_deref(), Some("second"));
    }

    #[tokio::test]
    async fn chain_returns_none_when_exhausted() {
        let chain = ChainTokenProvider::new(vec![Box::new(StaticProvider(None))]);
        assert_eq!(chain.token().await.unwrap(), None);
    }

    #[test]
    fn default_chain_builds() {
        assert!(default_chain().is_ok());
    }
}
