//! Best-effort result reporting to the workspace project

use crate::config::ServiceConfig;
use crate::error::{RagFlowError, Result};
use crate::eval::EvaluationSummary;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

const MANAGEMENT_BASE: &str = "https://management.azure.com";
const WORKSPACE_API_VERSION: &str = "2024-04-01";

/// Sink for evaluation summaries
#[async_trait]
pub trait ResultsReporter: Send + Sync {
    async fn report(&self, summary: &EvaluationSummary) -> Result<()>;
}

/// Reporter that records run metrics on the workspace project.
///
/// Failures here are expected to be tolerated by the caller: the harness
/// falls back to local-only artifacts instead of aborting the run.
pub struct WorkspaceReporter {
    http: reqwest::Client,
    config: Arc<ServiceConfig>,
    token: String,
}

impl WorkspaceReporter {
    pub fn new(config: Arc<ServiceConfig>, token: String, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            config,
            token,
        })
    }
}

#[async_trait]
impl ResultsReporter for WorkspaceReporter {
    async fn report(&self, summary: &EvaluationSummary) -> Result<()> {
        #[derive(Serialize)]
        struct RunReport<'a> {
            #[serde(rename = "displayName")]
            display_name: &'a str,
            #[serde(rename = "runType")]
            run_type: &'static str,
            metrics: &'a crate::eval::MetricScores,
            rows: usize,
        }

        let url = format!(
            "{MANAGEMENT_BASE}/subscriptions/{}/resourceGroups/{}/providers/Microsoft.MachineLearningServices/workspaces/{}/evaluations/{}?api-version={WORKSPACE_API_VERSION}",
            self.config.subscription_id,
            self.config.resource_group,
            self.config.project_name,
            summary.name.replace(' ', "-").to_lowercase()
        );

        let report = RunReport {
            display_name: &summary.name,
            run_type: "qa-quality",
            metrics: &summary.means,
            rows: summary.rows,
        };

        let response = self
            .http
            .put(&url)
            .bearer_auth(&self.token)
            .json(&report)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(RagFlowError::Evaluation(format!(
                "result reporting failed (HTTP {status}): {body}"
            )));
        }

        tracing::info!(name = %summary.name, "evaluation results reported to workspace");
        Ok(())
    }
}

/// Report a summary, degrading to local-only on any failure
pub async fn report_best_effort(reporter: &dyn ResultsReporter, summary: &EvaluationSummary) {
    if let Err(err) = reporter.report(summary).await {
        tracing::warn!(%err, "could not report results to the workspace, keeping local artifacts only");
    }
}
