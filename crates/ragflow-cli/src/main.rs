//! Ragflow CLI
//!
//! Run, evaluate, and deploy the retrieval-augmented chat flow.

use clap::Parser;
use ragflow_core::error::exit_codes;
use ragflow_core::RagFlowError;

mod app;
mod commands;

use app::{Cli, Commands};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(default_level.into()),
        )
        .init();

    let result = match cli.command {
        Commands::Chat(args) => commands::chat::run(args).await,
        Commands::Eval(args) => commands::eval::run(args).await,
        Commands::Deploy(args) => commands::deploy::run(args).await,
    };

    if let Err(err) = result {
        eprintln!("Error: {err:#}");
        let code = err
            .downcast_ref::<RagFlowError>()
            .map(RagFlowError::exit_code)
            .unwrap_or(exit_codes::GENERAL_ERROR);
        std::process::exit(code);
    }
}
