//! `cfy` -- ComfyUI command-line client.
//!
//! Queues rendered workflows on a ComfyUI server, optionally follows
//! their execution over the event stream and downloads the outputs.
//!
//! # Environment variables
//!
//! | Variable             | Default          | Description                          |
//! |----------------------|------------------|--------------------------------------|
//! | `COMFYCTL_HOST`      | `127.0.0.1:8188` | Server address (`-c/--connect`)      |
//! | `COMFYCTL_CLIENT_ID` | generated        | Client id (`--id`)                   |
//! | `COMFYCTL_PLAINTEXT` | `false`          | Use http/ws (`--plaintext`)          |
//! | `COMFYCTL_OUTPUT`    | `output`         | Output directory (`qp -o`)           |
//! | `COMFYCTL_LOG_JSON`  | `false`          | JSON log lines (`--log-json`)        |
//! | `RUST_LOG`           | `cfy=info,...`   | Log filter                           |

use anyhow::Result;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use comfyctl::commands::{handle_command, Commands};

#[derive(Parser)]
#[command(name = "cfy", version)]
#[command(about = "cfy is a ComfyUI command-line client", long_about = None)]
struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true, env = "COMFYCTL_LOG_JSON")]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "cfy=info,comfyctl=info,comfyctl_comfyui=info".into());
    tracing_subscriber::registry()
        .with(filter)
        .with(cli.log_json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!cli.log_json).then(|| tracing_subscriber::fmt::layer()))
        .init();

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupt");
            interrupt.cancel();
        }
    });

    handle_command(cli.command, cancel).await
}
