// aterm - terminal assistant that lets Claude call MCP tools
// Main entry point

use anyhow::{Context, Result};
use clap::Parser;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::prelude::*;

use aterm::agent::TurnController;
use aterm::claude::ClaudeClient;
use aterm::cli::Repl;
use aterm::config::{load_config, ConfigOverrides};
use aterm::errors::{session_start_error, AgentError};
use aterm::tools::{Approver, AutoApprover, SessionRegistry, TerminalApprover, ToolExecutor};

/// Exit status after Ctrl-C
const INTERRUPTED_EXIT_CODE: i32 = 130;

#[derive(Parser, Debug)]
#[command(name = "aterm")]
#[command(about = "Chat with Claude and let it call MCP tools, one approved call at a time", version)]
struct Args {
    /// Config file (JSON, or TOML with a .toml extension)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Model id, overrides the config file
    #[arg(long)]
    model: Option<String>,

    /// Completion calls allowed per query, overrides the config file
    #[arg(long = "max-turns")]
    max_turns: Option<usize>,

    /// Run a single query and exit
    #[arg(long)]
    query: Option<String>,

    /// Approve every tool call without asking
    #[arg(long)]
    yes: bool,

    /// Mirror info-level logs to stderr
    #[arg(long)]
    verbose: bool,

    /// Log file, overrides the config file
    #[arg(long = "log-file")]
    log_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = load_config(args.config.as_deref())?;
    config.apply_overrides(ConfigOverrides {
        model: args.model.clone(),
        max_turns: args.max_turns,
        log_file: args.log_file.clone(),
    });
    config.validate()?;

    init_tracing(&config.log_path(), args.verbose)?;
    tracing::info!(
        "Starting aterm: model={}, max_turns={}, servers={}",
        config.model,
        config.max_turns,
        config.mcp_servers.len()
    );

    let cancel = CancellationToken::new();
    spawn_interrupt_watcher(cancel.clone());

    let registry = tokio::select! {
        _ = cancel.cancelled() => {
            println!("\nShutting down...");
            std::process::exit(INTERRUPTED_EXIT_CODE);
        }
        registry = SessionRegistry::from_config(&config.mcp_servers) => match registry {
            Ok(registry) => Arc::new(registry),
            Err(e) => {
                tracing::error!("Tool session startup failed: {}", e);
                eprintln!("{}", session_start_error(&e));
                std::process::exit(1);
            }
        },
    };

    let approver: Arc<dyn Approver> = if args.yes {
        Arc::new(AutoApprover)
    } else {
        Arc::new(TerminalApprover::new())
    };
    let client = ClaudeClient::from_config(&config)?;
    let executor = ToolExecutor::new(Arc::clone(&registry), approver);
    let controller = TurnController::new(Arc::new(client), executor, config.max_turns)?;
    let mut repl = Repl::new(controller, cancel.clone());

    let result = match args.query.as_deref() {
        Some(query) => repl.run_one_shot(query).await.map(|_| ()).map_err(anyhow::Error::from),
        None => repl.run_interactive().await,
    };

    registry.shutdown().await;

    match result {
        Err(e) if matches!(e.downcast_ref::<AgentError>(), Some(AgentError::Interrupted)) => {
            tracing::info!("Interrupted by operator");
            println!("\nShutting down...");
            // A pending approval read keeps a blocking thread alive; skip runtime teardown
            std::process::exit(INTERRUPTED_EXIT_CODE);
        }
        Err(e) => {
            tracing::error!("aterm failed: {:#}", e);
            Err(e)
        }
        Ok(()) => Ok(()),
    }
}

/// Cancel the token on the first Ctrl-C
fn spawn_interrupt_watcher(cancel: CancellationToken) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::debug!("Ctrl-C received");
                cancel.cancel();
            }
            Err(e) => tracing::warn!("Failed to listen for Ctrl-C: {}", e),
        }
    });
}

/// Log to a file; `--verbose` mirrors info-level events to stderr
fn init_tracing(log_path: &Path, verbose: bool) -> Result<()> {
    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)
        .with_context(|| format!("Failed to open log file {}", log_path.display()))?;

    // Default: DEBUG for the file, can be overridden with RUST_LOG
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug"));

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(Mutex::new(log_file))
        .with_ansi(false)
        .with_filter(env_filter);

    let stderr_layer = verbose.then(|| {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_filter(LevelFilter::INFO)
    });

    tracing_subscriber::registry()
        .with(file_layer)
        .with(stderr_layer)
        .try_init()
        .context("Failed to initialize logging")?;

    // Bridge log crate → tracing (for dependencies using log crate)
    tracing_log::LogTracer::init().context("Failed to bridge log records")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_tracing_installs_log_bridge() {
        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join("aterm.log");

        init_tracing(&log_path, false).unwrap();

        assert!(log_path.exists());
        // A second bridge cannot be installed once ours is in place
        assert!(tracing_log::LogTracer::init().is_err());
    }
}
