//! auth-extproc: API key authentication and per-user quota for Envoy.
//!
//! # Architecture Overview
//!
//! ```text
//!   Client ──▶ Envoy ──────────────────────────────▶ Upstream
//!                │  ▲
//!   ext_proc     │  │ continue / immediate response
//!   stream       ▼  │
//!          ┌──────────────────────────────────────────────┐
//!          │                 AUTH-EXTPROC                  │
//!          │                                               │
//!          │  ┌─────────┐   ┌────────────┐   ┌──────────┐  │
//!          │  │   net   │──▶│  ext_proc  │──▶│ response │  │
//!          │  │ server  │   │ processor  │   │ builder  │  │
//!          │  └─────────┘   └─────┬──────┘   └──────────┘  │
//!          │                      │                        │
//!          │             ┌────────┴────────┐               │
//!          │             ▼                 ▼               │
//!          │       ┌──────────┐     ┌─────────────┐        │
//!          │       │ KeyStore │     │QuotaTracker │        │
//!          │       └──────────┘     └─────────────┘        │
//!          │                                               │
//!          │  config · observability · lifecycle           │
//!          └──────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;

use auth_extproc::config::{load_config, FilterConfig};
use auth_extproc::lifecycle::{signals, startup, Shutdown};
use auth_extproc::observability::logging;

#[derive(Parser, Debug)]
#[command(name = "auth-extproc", version, about = "Envoy ext_proc filter: API key auth and per-user quota")]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(short, long, env = "EXTPROC_CONFIG")]
    config: Option<PathBuf>,

    /// Path to the API key file (`API_KEY,USERNAME` per line).
    #[arg(short, long, env = "KEY_FILE")]
    key_file: Option<PathBuf>,

    /// Override `listener.bind_address`.
    #[arg(long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => match load_config(path) {
            Ok(config) => config,
            Err(e) => {
                logging::init(&FilterConfig::default().observability);
                tracing::error!(path = %path.display(), error = %e, "Failed to load configuration");
                return Err(e.into());
            }
        },
        None => FilterConfig::default(),
    };

    if let Some(key_file) = cli.key_file {
        config.keys.path = Some(key_file);
    }
    if let Some(bind) = cli.bind {
        config.listener.bind_address = bind;
    }

    logging::init(&config.observability);

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "auth-extproc starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        key_file = ?config.keys.path,
        max_requests_per_user = config.quota.max_requests_per_user,
        max_concurrent_streams = ?config.listener.max_concurrent_streams,
        "Configuration loaded"
    );

    let shutdown = Shutdown::new();
    let signalled = shutdown.signalled();
    tokio::spawn(async move {
        signals::wait_for_shutdown_signal().await;
        shutdown.trigger();
    });

    if let Err(e) = startup::run(config, signalled).await {
        tracing::error!(error = %e, "Fatal error");
        return Err(e.into());
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
