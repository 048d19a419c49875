//! ==============================================================================
//! main.rs - walktrack entry point
//! ==============================================================================
//!
//! purpose:
//!     starts one node in the role the configuration asks for:
//!     - hub: rest server over a json data file (dashboard + tracker target)
//!     - tracker: sampling loop + offline queue + sync loop + status api
//!
//! relationships:
//!     - uses: config.rs (walktrack.toml + env overrides)
//!     - uses: server.rs (hub role)
//!     - uses: tracker.rs (tracker role)
//!
//! ==============================================================================

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn, Level};
use tracing_subscriber::EnvFilter;

use walktrack::config::{ConfigOrigin, Role, WalkConfig};
use walktrack::storage::StepStore;

/// step tracker hub / tracker node
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to walktrack.toml (searched in ./config and ../config otherwise)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override node.role (hub or tracker)
    #[arg(short, long)]
    role: Option<Role>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // step 1: load configuration
    let (mut config, origin) = match &args.config {
        Some(path) => (WalkConfig::load(path)?, ConfigOrigin::File(path.clone())),
        None => WalkConfig::load_or_default(),
    };
    config.apply_env();
    if let Some(role) = args.role {
        config.node.role = role;
    }

    // step 2: logging
    let level = args.log_level.as_deref().unwrap_or(&config.logging.level);
    init_tracing(level);

    info!("WalkTrack v{}", env!("CARGO_PKG_VERSION"));
    match &origin {
        ConfigOrigin::File(path) => info!("[CONFIG] Loaded from {}", path.display()),
        ConfigOrigin::Defaults(failures) => {
            for failure in failures {
                warn!("[CONFIG] {}", failure);
            }
            warn!("[CONFIG] No config file found - using defaults");
        }
    }
    config.log_summary();

    // step 3: run the requested role
    match config.node.role {
        Role::Hub => {
            let store = Arc::new(StepStore::new(config.server.data_file.clone()));
            let listener = tokio::net::TcpListener::bind(config.server.bind)
                .await
                .with_context(|| format!("failed to bind {}", config.server.bind))?;

            tokio::select! {
                res = walktrack::server::run_server(listener, store) => res?,
                _ = tokio::signal::ctrl_c() => info!("[HUB] shutting down"),
            }
        }
        Role::Tracker => walktrack::tracker::run_tracker(&config).await?,
    }

    Ok(())
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = match level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        };
        EnvFilter::from_default_env().add_directive(level.into())
    });

    tracing_subscriber::fmt().with_env_filter(filter).init();
}
