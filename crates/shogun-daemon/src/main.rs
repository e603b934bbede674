//! `shogun` binary
//!
//! Coordinates a commander, a steward and a fixed set of laborers, each
//! backed by a persistent `claude` runner process, over a YAML command queue
//! and a shared markdown dashboard.

mod cli;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::debug;

#[derive(Parser, Debug)]
#[command(name = "shogun")]
#[command(version, about = "Shogun - persistent Claude Code worker hierarchy")]
struct Args {
    /// Workspace root holding the queue, reports and dashboard
    #[arg(long, global = true, env = "SHOGUN_WORKSPACE")]
    workspace: Option<PathBuf>,

    /// Path to the `claude` CLI binary
    #[arg(long, global = true, env = "SHOGUN_CLAUDE_BIN")]
    claude_bin: Option<PathBuf>,

    /// Log level filter (e.g. "info", "debug", "warn").
    #[arg(long, global = true, env = "SHOGUN_LOG_LEVEL")]
    log_level: Option<String>,

    /// Output logs as JSON (for structured log aggregation).
    #[arg(long, global = true, env = "SHOGUN_LOG_JSON")]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create the workspace layout and a default dashboard
    Init,

    /// Add a pending command to the queue
    Enqueue {
        /// Instruction text
        text: String,
        #[arg(long)]
        project: Option<String>,
        #[arg(long)]
        priority: Option<String>,
    },

    /// Show the queue and the last aggregate status
    Status,

    /// Run one queued command
    Run {
        /// Command id, e.g. `cmd_001`
        id: String,
    },

    /// Resolve free-form input through the commander, enqueue and run it
    Submit {
        text: String,
        #[arg(long)]
        project: Option<String>,
    },

    /// Start the pool and process pending commands until stopped
    Serve {
        /// Fallback queue rescan period in seconds
        #[arg(long, default_value_t = 30)]
        rescan_secs: u64,
    },

    /// Serve jobs over stdin/stdout (started by the pool)
    #[command(hide = true)]
    Runner {
        /// Bound on one CLI invocation in seconds
        #[arg(long)]
        timeout_secs: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = shogun_core::config::load_config(args.workspace.as_deref())?;
    if let Some(bin) = args.claude_bin {
        config.runtime.claude_bin = bin;
    }
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }
    if args.log_json {
        config.logging.json = true;
    }

    let log_filter = format!(
        "shogun={level},shogun_daemon={level},shogun_core={level}",
        level = config.logging.level
    );
    if matches!(args.command, Commands::Runner { .. }) {
        shogun_core::tracing_init::init_tracing_stderr(&log_filter);
    } else {
        shogun_core::tracing_init::init_tracing(&log_filter, config.logging.json);
    }

    let root = match config.workspace.root.clone() {
        Some(root) => root,
        None => std::env::current_dir()?,
    };
    debug!(workspace = %root.display(), "Workspace resolved");
    let ctx = cli::Context { config, root };

    match args.command {
        Commands::Init => cli::init(&ctx).await,
        Commands::Enqueue {
            text,
            project,
            priority,
        } => cli::enqueue(&ctx, &text, project.as_deref(), priority.as_deref()).await,
        Commands::Status => cli::status(&ctx).await,
        Commands::Run { id } => cli::run(&ctx, &id).await,
        Commands::Submit { text, project } => cli::submit(&ctx, &text, project.as_deref()).await,
        Commands::Serve { rescan_secs } => cli::serve(&ctx, rescan_secs).await,
        Commands::Runner { timeout_secs } => cli::runner(&ctx, timeout_secs).await,
    }
}
