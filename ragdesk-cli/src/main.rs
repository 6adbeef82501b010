//! ragdesk CLI: terminal console for a RAG backend service.
//!
//! Uploads documents, runs single test queries, submits batch evaluations,
//! and follows evaluation jobs until their results can be opened.

mod commands;

use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// ragdesk: upload, test, and evaluate against a RAG backend
#[derive(Parser, Debug)]
#[command(name = "ragdesk", version, about, long_about = None)]
pub(crate) struct Cli {
    /// Workspace directory
    #[arg(short, long, default_value = ".", global = true)]
    workspace: PathBuf,

    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Backend base URL (overrides configuration)
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
pub(crate) enum Commands {
    /// Upload PDF documents, or point the backend at an S3 location
    Upload(UploadArgs),
    /// Run a single test query
    Test(TestArgs),
    /// Submit a batch evaluation from a CSV of query/answer pairs
    Evaluate(EvaluateArgs),
    /// Refresh the status of an evaluation job
    Status {
        /// Task ID of a job submitted from this workspace, or its status URL
        job: String,
    },
    /// Open the results page of a completed evaluation job
    Download {
        /// Task ID of a job submitted from this workspace, or its status URL
        job: String,
        /// Results URL, for jobs not submitted from this workspace
        #[arg(long)]
        download_url: Option<String>,
        /// Print the link instead of opening a browser
        #[arg(long)]
        print: bool,
    },
    /// Fill in and submit a use-case form
    Form {
        /// Use case name (built-in or from the use-case directory)
        #[arg(long, default_value = "generic")]
        use_case: String,
        /// Field values as key=value pairs
        #[arg(long = "set", value_name = "KEY=VALUE")]
        values: Vec<String>,
    },
    /// List use cases, tools, and agents, or show one use case's form
    Catalog {
        /// Use case to describe
        use_case: Option<String>,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Args, Debug, Default)]
pub(crate) struct UploadArgs {
    /// Use case ID the documents belong to
    #[arg(short, long)]
    usecase_id: Option<String>,

    /// PDF files to upload (other file types are skipped)
    files: Vec<PathBuf>,

    /// Read documents from this S3 bucket instead of uploading files
    #[arg(long)]
    s3_bucket: Option<String>,

    /// S3 region
    #[arg(long)]
    s3_region: Option<String>,

    /// S3 key prefix
    #[arg(long)]
    s3_prefix: Option<String>,

    /// Build a vector index for the documents
    #[arg(long)]
    vector: bool,

    /// Chunk size for vector indexing
    #[arg(long)]
    chunk_size: Option<String>,

    /// Chunk overlap for vector indexing
    #[arg(long)]
    overlap: Option<String>,

    /// Send to the upload endpoint of this use case
    #[arg(long)]
    use_case: Option<String>,
}

#[derive(clap::Args, Debug, Default)]
pub(crate) struct TestArgs {
    /// Use case ID to query
    #[arg(short, long)]
    usecase_id: Option<String>,

    /// The question to ask
    query: Option<String>,

    #[command(flatten)]
    run: RunArgs,
}

#[derive(clap::Args, Debug, Default)]
pub(crate) struct EvaluateArgs {
    /// Use case ID to evaluate
    #[arg(short, long)]
    usecase_id: Option<String>,

    /// CSV file with "query" and "answer" columns
    csv: PathBuf,

    /// Submit without asking for confirmation
    #[arg(short, long)]
    yes: bool,

    #[command(flatten)]
    run: RunArgs,
}

/// Options shared by test and evaluate.
#[derive(clap::Args, Debug, Default)]
pub(crate) struct RunArgs {
    /// Number of results to retrieve (1-10)
    #[arg(long)]
    top_k: Option<String>,

    /// Sampling temperature
    #[arg(long)]
    temperature: Option<String>,

    /// Maximum tokens to generate
    #[arg(long)]
    max_tokens: Option<String>,

    /// Retrieve from the vector index
    #[arg(long)]
    vector: bool,

    /// System prompt for the model
    #[arg(long)]
    system_prompt: Option<String>,

    /// Tool to enable (repeatable)
    #[arg(long = "tool", value_name = "ID")]
    tools: Vec<String>,

    /// Run in agentic mode
    #[arg(long)]
    agentic: bool,

    /// Agent to enable (repeatable)
    #[arg(long = "agent", value_name = "ID")]
    agents: Vec<String>,

    /// Guardrail instructions; enables guardrails
    #[arg(long)]
    guardrails: Option<String>,

    /// External API endpoint; enables the API integration
    #[arg(long)]
    api_endpoint: Option<String>,

    /// Auth token for the external API
    #[arg(long)]
    api_token: Option<String>,

    /// Send to the endpoints of this use case
    #[arg(long)]
    use_case: Option<String>,
}

#[derive(clap::Subcommand, Debug)]
pub(crate) enum ConfigAction {
    /// Create a default configuration file in the workspace
    Init,
    /// Show the merged configuration
    Show,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // Set up tracing: human-readable stderr + JSON file logging
    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::new(filter));

    let log_dir = ragdesk_core::config::log_dir();
    let _ = std::fs::create_dir_all(&log_dir);
    let file_appender = tracing_appender::rolling::daily(&log_dir, "ragdesk.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let json_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking)
        .with_filter(EnvFilter::new("debug"));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    // Resolve workspace
    let workspace = cli
        .workspace
        .canonicalize()
        .unwrap_or_else(|_| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    let options = commands::GlobalOptions {
        workspace,
        config_file: cli.config,
        base_url: cli.base_url,
        quiet: cli.quiet,
    };
    commands::handle_command(cli.command, &options).await
}
