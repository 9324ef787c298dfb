//! Answer-quality evaluation
//!
//! Runs the chat pipeline over a JSONL dataset, then grades each answer
//! with LLM-judged metrics: fluency, groundedness, relevance, coherence.
//! Each metric asks the judge model for a 1-5 score and parses the scalar
//! from the reply. A failed grade leaves that score empty rather than
//! aborting the run, and remote result reporting degrades to local-only
//! artifacts on failure.

use crate::error::{RagFlowError, Result};
use crate::llm::CompletionModel;
use crate::pipeline::{ChatService, ChatTurn};
use crate::search::RetrievedDocument;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

mod graders;
mod report;

pub use graders::{parse_score, Grader, GRADERS};
pub use report::{report_best_effort, ResultsReporter, WorkspaceReporter};

/// One dataset row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalInput {
    pub question: String,
    #[serde(default, deserialize_with = "flexible_history")]
    pub chat_history: Vec<ChatTurn>,
    #[serde(default)]
    pub ground_truth: Option<String>,
}

/// Accept chat history as a turn array or a stringified JSON array
fn flexible_history<'de, D>(deserializer: D) -> std::result::Result<Vec<ChatTurn>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum HistoryRepr {
        Turns(Vec<ChatTurn>),
        Raw(String),
    }

    match HistoryRepr::deserialize(deserializer)? {
        HistoryRepr::Turns(turns) => Ok(turns),
        HistoryRepr::Raw(raw) if raw.trim().is_empty() => Ok(Vec::new()),
        HistoryRepr::Raw(raw) => serde_json::from_str(&raw).map_err(serde::de::Error::custom),
    }
}

/// Load a newline-delimited JSON dataset
pub fn load_dataset(path: &Path) -> Result<Vec<EvalInput>> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        RagFlowError::Evaluation(format!("failed to read dataset {}: {e}", path.display()))
    })?;

    let mut inputs = Vec::new();
    for (lineno, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let input: EvalInput = serde_json::from_str(line).map_err(|e| {
            RagFlowError::Evaluation(format!(
                "invalid dataset row at {}:{}: {e}",
                path.display(),
                lineno + 1
            ))
        })?;
        inputs.push(input);
    }
    Ok(inputs)
}

/// Per-record metric scores; `None` means the grade failed or was skipped
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricScores {
    pub fluency: Option<f32>,
    pub groundedness: Option<f32>,
    pub relevance: Option<f32>,
    pub coherence: Option<f32>,
}

impl MetricScores {
    fn set(&mut self, metric: &str, value: f32) {
        match metric {
            "fluency" => self.fluency = Some(value),
            "groundedness" => self.groundedness = Some(value),
            "relevance" => self.relevance = Some(value),
            "coherence" => self.coherence = Some(value),
            _ => {}
        }
    }

    fn get(&self, metric: &str) -> Option<f32> {
        match metric {
            "fluency" => self.fluency,
            "groundedness" => self.groundedness,
            "relevance" => self.relevance,
            "coherence" => self.coherence,
            _ => None,
        }
    }
}

/// One evaluated row: inputs, produced outputs, attached scores
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationRecord {
    pub question: String,
    pub chat_history: Vec<ChatTurn>,
    pub answer: String,
    pub context: Vec<RetrievedDocument>,
    pub ground_truth: Option<String>,
    #[serde(default)]
    pub scores: MetricScores,
    /// Pipeline failure for this row; a failed row is never graded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Whole-run artifact: records plus per-metric means
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationSummary {
    pub name: String,
    pub created_at: String,
    pub rows: usize,
    #[serde(default)]
    pub failures: usize,
    pub means: MetricScores,
    pub records: Vec<EvaluationRecord>,
}

impl EvaluationSummary {
    fn compute_means(records: &[EvaluationRecord]) -> MetricScores {
        let mut means = MetricScores::default();
        for grader in &GRADERS {
            let values: Vec<f32> = records
                .iter()
                .filter_map(|r| r.scores.get(grader.name))
                .collect();
            if !values.is_empty() {
                let mean = values.iter().sum::<f32>() / values.len() as f32;
                means.set(grader.name, mean);
            }
        }
        means
    }
}

/// Name for an evaluation run: `PREFIX` env override or a timestamp
pub fn run_name() -> String {
    let prefix = std::env::var("PREFIX")
        .ok()
        .filter(|p| !p.is_empty())
        .unwrap_or_else(|| chrono::Utc::now().format("%y%m%d%H%M%S").to_string());
    let prefix: String = prefix.chars().take(14).collect();
    format!("{prefix} Quality Evaluation")
}

/// Batch evaluation driver
pub struct EvalHarness {
    service: std::sync::Arc<dyn ChatService>,
    judge: std::sync::Arc<dyn CompletionModel>,
    concurrency: usize,
}

impl EvalHarness {
    pub fn new(
        service: std::sync::Arc<dyn ChatService>,
        judge: std::sync::Arc<dyn CompletionModel>,
        concurrency: usize,
    ) -> Self {
        Self {
            service,
            judge,
            concurrency: concurrency.max(1),
        }
    }

    /// Answer every row, then grade every answer.
    ///
    /// Rows run concurrently up to the configured limit; output order
    /// matches input order regardless of completion order. A row whose
    /// pipeline run fails stays in the summary with its error recorded and
    /// no scores, so one bad row cannot discard the rest of the batch.
    pub async fn run(&self, name: String, inputs: Vec<EvalInput>) -> Result<EvaluationSummary> {
        tracing::info!(rows = inputs.len(), concurrency = self.concurrency, "starting evaluation");

        let mut answered: Vec<(usize, EvaluationRecord)> =
            stream::iter(inputs.into_iter().enumerate())
                .map(|(idx, input)| {
                    let service = self.service.clone();
                    async move {
                        let result = service.answer(&input.question, &input.chat_history).await;
                        let record = match result {
                            Ok(response) => EvaluationRecord {
                                question: input.question,
                                chat_history: input.chat_history,
                                answer: response.answer,
                                context: response.context,
                                ground_truth: input.ground_truth,
                                scores: MetricScores::default(),
                                error: None,
                            },
                            Err(err) => {
                                tracing::warn!(question = %input.question, %err, "row failed, recording error");
                                EvaluationRecord {
                                    question: input.question,
                                    chat_history: input.chat_history,
                                    answer: String::new(),
                                    context: Vec::new(),
                                    ground_truth: input.ground_truth,
                                    scores: MetricScores::default(),
                                    error: Some(err.to_string()),
                                }
                            }
                        };
                        (idx, record)
                    }
                })
                .buffer_unordered(self.concurrency)
                .collect()
                .await;

        answered.sort_by_key(|(idx, _)| *idx);
        let mut records: Vec<EvaluationRecord> =
            answered.into_iter().map(|(_, record)| record).collect();
        let failures = records.iter().filter(|r| r.error.is_some()).count();

        for record in records.iter_mut().filter(|r| r.error.is_none()) {
            for grader in &GRADERS {
                match grader.grade(self.judge.as_ref(), record).await {
                    Ok(score) => record.scores.set(grader.name, score),
                    Err(err) => {
                        tracing::warn!(metric = grader.name, %err, "grading failed, leaving score empty");
                    }
                }
            }
        }

        let means = EvaluationSummary::compute_means(&records);
        Ok(EvaluationSummary {
            name,
            created_at: chrono::Utc::now().to_rfc3339(),
            rows: records.len(),
            failures,
            means,
            records,
        })
    }
}

/// Write the JSON summary and CSV export, returning both paths
pub fn write_artifacts(summary: &EvaluationSummary, dir: &Path) -> Result<(PathBuf, PathBuf)> {
    std::fs::create_dir_all(dir)?;

    let json_path = dir.join("qa_quality_eval.json");
    let file = std::fs::File::create(&json_path)?;
    serde_json::to_writer_pretty(file, summary)?;

    let csv_path = dir.join("responses.csv");
    let mut writer = csv::Writer::from_path(&csv_path)
        .map_err(|e| RagFlowError::Evaluation(format!("cannot write {}: {e}", csv_path.display())))?;
    writer
        .write_record([
            "question",
            "answer",
            "ground_truth",
            "context",
            "fluency",
            "groundedness",
            "relevance",
            "coherence",
        ])
        .map_err(|e| RagFlowError::Evaluation(e.to_string()))?;

    let fmt = |score: Option<f32>| score.map(|s| s.to_string()).unwrap_or_default();
    for record in &summary.records {
        let context = record
            .context
            .iter()
            .map(|d| d.title.as_str())
            .collect::<Vec<_>>()
            .join("; ");
        let fluency = fmt(record.scores.fluency);
        let groundedness = fmt(record.scores.groundedness);
        let relevance = fmt(record.scores.relevance);
        let coherence = fmt(record.scores.coherence);
        writer
            .write_record([
                record.question.as_str(),
                record.answer.as_str(),
                record.ground_truth.as_deref().unwrap_or(""),
                context.as_str(),
                fluency.as_str(),
                groundedness.as_str(),
                relevance.as_str(),
                coherence.as_str(),
            ])
            .map_err(|e| RagFlowError::Evaluation(e.to_string()))?;
    }
    writer
        .flush()
        .map_err(|e| RagFlowError::Evaluation(e.to_string()))?;

    Ok((json_path, csv_path))
}
