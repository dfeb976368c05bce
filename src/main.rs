//! editor-bridge-mcp: the broker binary.
//!
//! Launched by the agent framework with stdio. Discovers the host
//! project upward from the working directory (or `--project`), keeps a
//! connection to the in-host agent, and bridges the framework's
//! JSON-RPC dialect to the inner wire protocol.

use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info, Level};
use tracing_subscriber::EnvFilter;

use editor_bridge_mcp::broker::{BrokerServer, ReconnectController, ReconnectTimeouts, ToolSurface};
use editor_bridge_mcp::config;

/// MCP bridge between an interactive editor host and AI assistants.
///
/// The host side is discovered through `Library/MCPInstance.json`
/// under the project root; the tool surface follows whatever the host
/// currently exposes.
#[derive(Parser, Debug)]
#[command(name = "editor-bridge-mcp")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Starting directory for project discovery (defaults to the
    /// current working directory)
    #[arg(long, value_name = "PATH")]
    project: Option<std::path::PathBuf>,

    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<std::path::PathBuf>,

    /// Increase logging verbosity (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Decrease logging verbosity (only show errors)
    #[arg(short, long)]
    quiet: bool,
}

/// Determines the log level from CLI arguments.
fn get_log_level(verbose: u8, quiet: bool, config_level: &str) -> Level {
    if quiet {
        return Level::ERROR;
    }

    match verbose {
        0 => match config_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "error" => Level::ERROR,
            _ => Level::WARN,
        },
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

/// Initialises the tracing subscriber. Logs go to stderr: stdout
/// belongs to the JSON-RPC transport.
fn init_tracing(level: Level) {
    let filter = EnvFilter::from_default_env().add_directive(level.into());

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Entry point for the broker.
fn main() -> ExitCode {
    let args = Args::parse();

    // Load configuration first to get the log level.
    let cfg = match config::load_config(args.config.as_deref()) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let log_level = get_log_level(args.verbose, args.quiet, &cfg.logging.level);
    init_tracing(log_level);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting editor-bridge-mcp broker"
    );

    let start_dir = match args.project {
        Some(path) => path,
        None => match std::env::current_dir() {
            Ok(dir) => dir,
            Err(e) => {
                error!(error = %e, "Cannot determine working directory");
                return ExitCode::FAILURE;
            }
        },
    };

    let timeouts = ReconnectTimeouts {
        ping: cfg.connection.ping_timeout(),
        reload_budget: cfg.connection.reload_timeout(),
    };
    let controller = ReconnectController::new(start_dir, timeouts);
    let surface = ToolSurface::new(
        cfg.compiled_reload_triggers(),
        cfg.connection.request_timeout(),
    );
    let mut server = BrokerServer::new(controller, surface);

    info!("Broker ready, waiting for client connection...");

    // Current-thread runtime: single-connection stdio transport and a
    // single agent session need no worker threads.
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(error = %e, "Failed to create Tokio runtime");
            return ExitCode::FAILURE;
        }
    };

    let result = runtime.block_on(async {
        tokio::select! {
            result = server.run() => result,
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted; shutting down");
                Ok(())
            }
        }
    });

    match result {
        Ok(()) => {
            info!("Broker shut down gracefully");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "Broker error");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Args::command().debug_assert();
    }

    #[test]
    fn log_level_precedence() {
        assert_eq!(get_log_level(0, true, "trace"), Level::ERROR);
        assert_eq!(get_log_level(2, false, "warn"), Level::DEBUG);
        assert_eq!(get_log_level(0, false, "info"), Level::INFO);
        assert_eq!(get_log_level(0, false, "bogus"), Level::WARN);
    }
}
