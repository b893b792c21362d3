//! ssa-ui - Substack Subscriber Analytics dashboard
//!
//! Serves the local dashboard over the extracted exports found under
//! `<root>/datasets`. Binds to localhost only.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use ssa_common::config::{resolve_config_path, resolve_root_folder, AppConfig};
use ssa_common::dataset::DatasetCatalog;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use ssa_ui::session::SessionId;
use ssa_ui::{build_router, AppState};

/// Command-line arguments for ssa-ui
#[derive(Parser, Debug)]
#[command(name = "ssa-ui")]
#[command(about = "Local analytics dashboard for Substack newsletter exports")]
#[command(version)]
struct Args {
    /// Root folder holding `datasets/` (overrides SSA_ROOT_FOLDER and the config file)
    #[arg(short, long)]
    root_folder: Option<String>,

    /// Config file path (overrides SSA_CONFIG)
    #[arg(short, long, value_name = "FILE")]
    config: Option<String>,

    /// Port to listen on
    #[arg(short, long, env = "SSA_PORT")]
    port: Option<u16>,

    /// Dataset id to activate for the default session at startup
    #[arg(short, long, env = "SSA_DATASET")]
    dataset: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Config is read before tracing so its log level can seed the filter
    let config_path = resolve_config_path(args.config.as_deref());
    let config = match &config_path {
        Some(path) => AppConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => AppConfig::default(),
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .init();

    info!(
        "Starting Substack Subscriber Analytics (ssa-ui) v{}",
        env!("CARGO_PKG_VERSION")
    );
    match &config_path {
        Some(path) => info!("Config file: {}", path.display()),
        None => warn!("No config directory available, using defaults"),
    }

    let root_folder: PathBuf = resolve_root_folder(args.root_folder.as_deref(), &config);
    let catalog = DatasetCatalog::new(&root_folder);
    info!("Datasets folder: {}", catalog.datasets_dir().display());

    let state = AppState::new(catalog, config.engine());

    if let Some(id) = &args.dataset {
        match state.activate(SessionId::Default, id).await {
            Ok(snapshot) => info!(
                "✓ Activated dataset '{}' as of {}",
                id,
                snapshot.dataset().as_of()
            ),
            Err(e) => warn!("Could not activate dataset '{}': {}", id, e),
        }
    }

    let app = build_router(state);

    let port = args.port.unwrap_or_else(|| config.port());
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("ssa-ui listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Resolves on Ctrl+C (or SIGTERM on unix)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
