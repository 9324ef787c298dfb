//! Single-question chat runner

use crate::app::ChatArgs;
use anyhow::Result;
use ragflow_core::ChatService;

pub async fn run(args: ChatArgs) -> Result<()> {
    let (settings, config) = super::resolve_config().await?;
    let (pipeline, _client) =
        super::build_pipeline(&settings, config, args.template.as_deref())?;

    tracing::info!(question = %args.question, "running chat flow");
    let response = pipeline.answer(&args.question, &[]).await?;

    println!("{}", response.answer);

    if args.show_context {
        println!();
        for (rank, doc) in response.context.iter().enumerate() {
            println!("[{}] {} ({})", rank + 1, doc.title, doc.url);
        }
    }

    tracing::debug!(
        prompt_tokens = response.usage.prompt_tokens,
        completion_tokens = response.usage.completion_tokens,
        "token usage"
    );
    Ok(())
}
