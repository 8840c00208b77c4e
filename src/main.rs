//! compilespace
//!
//! Execution backend for the CompileSpace editor. Serves HTTP by default,
//! or MCP over stdio with `--stdio`.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use compilespace::{config::Config, executor::Executor, http, mcp};

#[derive(Parser, Debug)]
#[command(name = "compilespace")]
#[command(about = "Run submitted code in per-language containers")]
struct Args {
    /// Run in stdio mode (for MCP clients) instead of serving HTTP
    #[arg(long)]
    stdio: bool,

    /// Path to a JSON configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// HTTP listen address (overrides configuration)
    #[arg(long)]
    listen: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging (stderr so stdout is free for MCP protocol)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut config = Config::load(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(listen) = args.listen {
        config.listen = listen;
    }

    info!(
        runtime = ?config.runtime,
        work_dir = %config.work_dir.display(),
        timeout_seconds = config.timeout_seconds,
        "Loaded configuration"
    );

    let executor = Arc::new(Executor::from_config(&config));

    if args.stdio {
        mcp::serve_stdio(executor).await?;
    } else {
        http::serve(&config.listen, executor).await?;
    }

    Ok(())
}
