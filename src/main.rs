//! netpipe - pipe everything to everyone
//!
//! Relays raw bytes between connected peers and the local terminal or a
//! spawned subprocess.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use netpipe::config::{CliOverrides, ConfigManager, Protocol};
use netpipe::{ConnectionManager, ShutdownCoordinator};

/// CLI arguments for netpipe
#[derive(Parser, Debug)]
#[command(name = "netpipe")]
#[command(about = "Relay raw bytes between every connected peer and a terminal or subprocess")]
#[command(version)]
#[command(long_about = "
netpipe relays raw bytes between a set of connected peers and either this
terminal or a spawned subprocess. Whatever any peer sends is written to the
terminal (or the subprocess's stdin); whatever the terminal (or subprocess)
prints is sent to every peer.

Configuration priority (highest to lowest):
1. Command-line arguments
2. Configuration file
3. Environment variables
4. Built-in defaults

Environment variables:
  NETPIPE_PROTOCOL      - tcp or udp
  NETPIPE_LISTEN        - Listen address (e.g., :3000)
  NETPIPE_CONNECT       - Address to connect to (e.g., 127.0.0.1:3000)
  NETPIPE_EXEC          - Command to run for each peer (e.g., bc -l)
  NETPIPE_SHELL         - Shell mode (true/false)
  NETPIPE_DIAL_TIMEOUT  - Dial timeout (e.g., 10s)
  NETPIPE_LOG_LEVEL     - Log level (trace, debug, info, warn, error)

Logs are written to stderr; stdout carries relayed bytes only.
")]
pub struct CliArgs {
    /// Transport protocol
    #[arg(short, long, value_enum, help = "Protocol: tcp or udp")]
    pub protocol: Option<Protocol>,

    /// Listen address
    #[arg(short, long, help = "Listen on address (e.g., -l :3000)")]
    pub listen: Option<String>,

    /// Connect address
    #[arg(short, long, help = "Connect to address (e.g., -c 127.0.0.1:3000)")]
    pub connect: Option<String>,

    /// Command to run for each peer
    #[arg(short, long, help = "Execute a command for each peer (e.g., --exec bc)")]
    pub exec: Option<String>,

    /// Shell mode
    #[arg(short, long, help = "Shell mode: execute the platform shell for each peer")]
    pub shell: bool,

    /// Configuration file path
    #[arg(long, help = "Path to a TOML configuration file")]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, help = "Log level")]
    pub log_level: Option<String>,

    /// Enable verbose logging (sets log level to debug)
    #[arg(short, long, help = "Enable verbose logging")]
    pub verbose: bool,

    /// Validate configuration and exit
    #[arg(long, help = "Validate configuration and exit")]
    pub validate_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();

    // Configuration priority: CLI args > config file > environment > defaults
    let mut config = ConfigManager::load(args.config.as_deref())?;

    config.merge_with_cli_args(&CliOverrides {
        protocol: args.protocol,
        listen: args.listen.clone(),
        connect: args.connect.clone(),
        exec: args.exec.clone(),
        shell: args.shell,
        log_level: if args.verbose {
            Some("debug".to_string())
        } else {
            args.log_level.clone()
        },
    });

    init_tracing(&config.logging.level)?;

    config.validate().context("Configuration validation failed")?;

    if args.validate_config {
        info!("Configuration is valid");
        info!("  Protocol: {}", config.relay.protocol);
        info!("  Mode: {:?}", config.mode()?);
        info!("  Exec: {:?}", config.effective_exec());
        return Ok(());
    }

    let shutdown_coordinator = ShutdownCoordinator::new();
    let mut manager = ConnectionManager::new(Arc::new(config), shutdown_coordinator.subscribe());

    // A delivered signal is observed by the manager, which then returns Ok
    let result = tokio::select! {
        result = manager.start() => result,
        Err(e) = shutdown_coordinator.listen_for_signals() => Err(e),
    };

    let code = match result {
        Ok(()) => 0,
        Err(e) => {
            error!("{:#}", e);
            1
        }
    };
    info!("netpipe stopped");

    // The local stdin reader blocks runtime shutdown until its next read returns
    std::process::exit(code);
}

/// Initialize tracing/logging on stderr
fn init_tracing(log_level: &str) -> Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_level(true),
        )
        .with(env_filter)
        .init();

    Ok(())
}
