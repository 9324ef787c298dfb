//! CLI argument definitions

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

pub const DEFAULT_QUESTION: &str =
    "Are telehealth services covered by insurance at Lamna Healthcare?";

#[derive(Parser)]
#[command(name = "ragflow")]
#[command(
    author,
    version,
    about = "Retrieval-augmented chat over Azure OpenAI and AI Search"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Ask the chat flow a single question
    Chat(ChatArgs),

    /// Run the answer-quality evaluation over a dataset
    Eval(EvalArgs),

    /// Provision the managed online endpoint and deploy the flow
    Deploy(DeployArgs),
}

#[derive(Args)]
pub struct ChatArgs {
    /// Question to ask
    #[arg(default_value = DEFAULT_QUESTION)]
    pub question: String,

    /// Print the retrieved context documents after the answer
    #[arg(long)]
    pub show_context: bool,

    /// Path to a custom prompt template
    #[arg(long)]
    pub template: Option<PathBuf>,
}

#[derive(Args)]
pub struct EvalArgs {
    /// Path to the JSONL dataset
    #[arg(long, default_value = "data/test-dataset.jsonl")]
    pub data: PathBuf,

    /// Directory for the JSON summary and CSV export
    #[arg(long, default_value = ".")]
    pub output_dir: PathBuf,

    /// Maximum concurrent pipeline runs
    #[arg(long, default_value = "4")]
    pub concurrency: usize,
}

#[derive(Args)]
pub struct DeployArgs {
    /// Endpoint name to use when deploying the flow
    #[arg(long)]
    pub endpoint_name: Option<String>,

    /// Deployment name used behind the online endpoint
    #[arg(long)]
    pub deployment_name: Option<String>,
}
