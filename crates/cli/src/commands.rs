//! Commands module
//!
//! Defines the `cfy` subcommands and their handlers.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use tokio_util::sync::CancellationToken;

use comfyctl_comfyui::{ComfyUIClient, ExecuteOptions, Execution, Orchestrator, Scheme};
use comfyctl_core::JobTemplate;

use crate::params;

/// Top-level CLI commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Execute a workflow with prompt values and output images
    #[command(name = "qp")]
    QueuePrompt(QueuePromptArgs),
    /// Track the execution status of workflows on the server
    Watch(WatchArgs),
}

/// Server connection flags shared by every command.
#[derive(Debug, Clone, Args)]
pub struct ConnectionArgs {
    /// ComfyUI server address (host:port)
    #[arg(short = 'c', long = "connect", env = "COMFYCTL_HOST", default_value = "127.0.0.1:8188")]
    pub host: String,

    /// Client id; generated when omitted
    #[arg(long = "id", env = "COMFYCTL_CLIENT_ID")]
    pub client_id: Option<String>,

    /// Use http/ws instead of https/wss
    #[arg(long, env = "COMFYCTL_PLAINTEXT")]
    pub plaintext: bool,
}

impl ConnectionArgs {
    pub fn client(&self) -> ComfyUIClient {
        ComfyUIClient::new(
            &self.host,
            Scheme::from_plaintext(self.plaintext),
            self.client_id.clone(),
        )
    }
}

#[derive(Debug, Clone, Args)]
pub struct QueuePromptArgs {
    #[command(flatten)]
    pub connection: ConnectionArgs,

    /// Workflow parameters as a JSON object
    #[arg(short = 'd', long = "data", default_value = "{}")]
    pub data: String,

    /// Workflow template file
    #[arg(short = 'f', long = "file")]
    pub file: PathBuf,

    /// Sampler seed; 0 picks a random one
    #[arg(short = 's', long = "seed", default_value_t = 0)]
    pub seed: u64,

    /// Image output directory
    #[arg(short = 'o', long = "output", env = "COMFYCTL_OUTPUT", default_value = "output")]
    pub output: PathBuf,

    /// Input image uploaded before the workflow is queued
    #[arg(short = 'i', long = "input")]
    pub input: Option<PathBuf>,

    /// Track the execution and download the outputs
    #[arg(short = 'w', long = "watch")]
    pub watch: bool,
}

#[derive(Debug, Clone, Args)]
pub struct WatchArgs {
    #[command(flatten)]
    pub connection: ConnectionArgs,
}

/// Route a command to its handler.
pub async fn handle_command(command: Commands, cancel: CancellationToken) -> Result<()> {
    match command {
        Commands::QueuePrompt(args) => queue_prompt(args, cancel).await,
        Commands::Watch(args) => watch(args, cancel).await,
    }
}

async fn queue_prompt(args: QueuePromptArgs, cancel: CancellationToken) -> Result<()> {
    let (values, seed) = params::template_values(&args.data, args.seed)?;
    tracing::info!(seed, "Using sampler seed");

    let job = JobTemplate::from_file(&args.file)?
        .render(&values)
        .with_context(|| format!("failed to render {}", args.file.display()))?;

    let orchestrator = Orchestrator::new(args.connection.client());
    tracing::info!(client_id = %orchestrator.client().client_id(), "Client ready");

    let options = ExecuteOptions {
        output_dir: args.output,
        input_image: args.input,
        track: args.watch,
    };

    match orchestrator.execute(&job, &options, cancel).await? {
        Execution::Queued { prompt_id } => {
            tracing::info!(prompt_id = %prompt_id, "Prompt queued");
            println!("{prompt_id}");
        }
        Execution::Finished { prompt_id, outputs } => {
            tracing::info!(prompt_id = %prompt_id, outputs = ?outputs, "Prompt finished");
            for output in outputs {
                println!("{}", options.output_dir.join(output).display());
            }
        }
    }
    Ok(())
}

async fn watch(args: WatchArgs, cancel: CancellationToken) -> Result<()> {
    let orchestrator = Orchestrator::new(args.connection.client());
    tracing::info!(client_id = %orchestrator.client().client_id(), "Watching ComfyUI events");
    orchestrator.observe(cancel).await?;
    Ok(())
}
