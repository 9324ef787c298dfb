//! Document retrieval against a remote search index
//!
//! One hybrid query per request: lexical match on the question, vector
//! similarity on the embedding, and a semantic re-rank pass with extractive
//! captions and answers. Result order is the service's relevance ranking
//! and is never re-sorted locally.

use crate::config::{Credential, ServiceConfig};
use crate::error::{RagFlowError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Default number of documents per retrieval
pub const DEFAULT_TOP_K: usize = 3;

/// Vector field queried in the index
const VECTOR_FIELD: &str = "contentVector";

/// Semantic configuration name used for re-ranking
const SEMANTIC_CONFIGURATION: &str = "default";

/// A document returned by the index, best match first
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrievedDocument {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub url: String,
}

/// Retrieval trait for the pipeline seam
#[async_trait]
pub trait Retriever: Send + Sync {
    /// Retrieve up to `top_k` documents for the question/embedding pair.
    ///
    /// Zero matches is an empty list, not an error.
    async fn retrieve(
        &self,
        question: &str,
        embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<RetrievedDocument>>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct VectorQuery<'a> {
    kind: &'static str,
    vector: &'a [f32],
    k: usize,
    fields: &'a str,
}

/// Hybrid search request body (typed, not an ad-hoc map)
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchRequest<'a> {
    search: &'a str,
    vector_queries: Vec<VectorQuery<'a>>,
    query_type: &'static str,
    semantic_configuration: &'a str,
    captions: &'static str,
    answers: &'static str,
    top: usize,
}

impl<'a> SearchRequest<'a> {
    fn hybrid(question: &'a str, embedding: &'a [f32], top_k: usize) -> Self {
        Self {
            search: question,
            vector_queries: vec![VectorQuery {
                kind: "vector",
                vector: embedding,
                k: top_k,
                fields: VECTOR_FIELD,
            }],
            query_type: "semantic",
            semantic_configuration: SEMANTIC_CONFIGURATION,
            captions: "extractive",
            answers: "extractive",
            top: top_k,
        }
    }
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    value: Vec<RetrievedDocument>,
}

/// Retriever backed by the search index REST API
pub struct SearchIndexClient {
    http: reqwest::Client,
    config: Arc<ServiceConfig>,
    index_name: String,
}

impl SearchIndexClient {
    pub fn new(config: Arc<ServiceConfig>, index_name: String, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            config,
            index_name,
        })
    }

    pub fn index_name(&self) -> &str {
        &self.index_name
    }
}

#[async_trait]
impl Retriever for SearchIndexClient {
    async fn retrieve(
        &self,
        question: &str,
        embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<RetrievedDocument>> {
        let url = format!(
            "{}/indexes/{}/docs/search?api-version={}",
            self.config.search_endpoint.trim_end_matches('/'),
            self.index_name,
            self.config.search_api_version
        );

        let body = SearchRequest::hybrid(question, embedding, top_k);
        let mut request = self.http.post(&url).json(&body);
        request = match &self.config.credential {
            Credential::ApiKey(key) => request.header("api-key", key),
            Credential::Bearer(token) => request.bearer_auth(token),
        };

        let response = request
            .send()
            .await
            .map_err(|e| RagFlowError::Retrieval(e.to_string()))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(RagFlowError::Retrieval(format!(
                "index '{}' not found",
                self.index_name
            )));
        }
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(RagFlowError::Retrieval(format!(
                "search service error (HTTP {status}): {body}"
            )));
        }

        let parsed: SearchResponse = response
            .json()
            .await
            .map_err(|e| RagFlowError::Retrieval(e.to_string()))?;

        tracing::debug!(
            count = parsed.value.len(),
            index = %self.index_name,
            "retrieved documents"
        );
        Ok(parsed.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn hybrid_request_serializes_expected_shape() {
        let embedding = [0.5_f32, 0.25, 0.125];
        let request = SearchRequest::hybrid("medical records", &embedding, 3);
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(
            value,
            json!({
                "search": "medical records",
                "vectorQueries": [{
                    "kind": "vector",
                    "vector": [0.5, 0.25, 0.125],
                    "k": 3,
                    "fields": "contentVector"
                }],
                "queryType": "semantic",
                "semanticConfiguration": "default",
                "captions": "extractive",
                "answers": "extractive",
                "top": 3
            })
        );
    }

    #[test]
    fn response_preserves_service_order() {
        let body = r#"{"value": [
            {"id": "b", "title": "Second best?", "content": "x", "url": "u1"},
            {"id": "a", "title": "Top hit", "content": "y", "url": "u2"}
        ]}"#;
        let parsed: SearchResponse = serde_json::from_str(body).unwrap();
        let ids: Vec<&str> = parsed.value.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
    }

    #[test]
    fn response_tolerates_missing_optional_fields() {
        let parsed: SearchResponse = serde_json::from_str(r#"{"value": [{"id": "1"}]}"#).unwrap();
        assert_eq!(parsed.value[0].title, "");
        assert_eq!(parsed.value[0].url, "");
    }

    #[test]
    fn empty_result_set_is_not_an_error() {
        let parsed: SearchResponse = serde_json::from_str(r#"{"value": []}"#).unwrap();
        assert!(parsed.value.is_empty());
    }
}
