//! Answer-quality evaluation runner

use crate::app::EvalArgs;
use anyhow::Result;
use ragflow_core::eval::report_best_effort;
use ragflow_core::{load_dataset, run_name, write_artifacts, EvalHarness, WorkspaceReporter};
use std::sync::Arc;
use std::time::Duration;

pub async fn run(args: EvalArgs) -> Result<()> {
    let (settings, config) = super::resolve_config().await?;
    let (pipeline, judge) = super::build_pipeline(&settings, config.clone(), None)?;

    let inputs = load_dataset(&args.data)?;
    let name = run_name();
    println!("Executing evaluation: {name} ({} rows)", inputs.len());

    let harness = EvalHarness::new(Arc::new(pipeline), judge, args.concurrency);
    let summary = harness.run(name, inputs).await?;

    // Reporting is best-effort: failure keeps local artifacts only.
    if let Some(token) = std::env::var("AZURE_ACCESS_TOKEN").ok().filter(|t| !t.is_empty()) {
        let reporter = WorkspaceReporter::new(
            config,
            token,
            Duration::from_secs(settings.timeout_secs),
        )?;
        report_best_effort(&reporter, &summary).await;
    } else {
        tracing::debug!("no management token, skipping remote result reporting");
    }

    let (json_path, csv_path) = write_artifacts(&summary, &args.output_dir)?;

    println!();
    println!("Mean scores over {} rows:", summary.rows);
    if summary.failures > 0 {
        println!("  ({} row(s) failed and were not graded)", summary.failures);
    }
    let fmt = |v: Option<f32>| v.map(|s| format!("{s:.2}")).unwrap_or_else(|| "-".into());
    println!("  Fluency:      {}", fmt(summary.means.fluency));
    println!("  Groundedness: {}", fmt(summary.means.groundedness));
    println!("  Relevance:    {}", fmt(summary.means.relevance));
    println!("  Coherence:    {}", fmt(summary.means.coherence));
    println!();
    println!("Summary: {}", json_path.display());
    println!("Export:  {}", csv_path.display());
    Ok(())
}
