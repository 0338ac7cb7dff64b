//! carscan-ai - Vehicle damage analysis service
//!
//! Accepts uploaded vehicle photos, runs three independent damage analyzers
//! on each, reconciles their verdicts by majority vote and keeps a history of
//! the results.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use carscan_common::config::{ensure_directory, resolve_root_folder, ROOT_FOLDER_ENV};
use clap::Parser;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use carscan_ai::config::{ServiceConfig, CONFIG_FILE_NAME};
use carscan_ai::orchestrator::AnalysisOrchestrator;
use carscan_ai::storage::ImageStore;
use carscan_ai::AppState;

/// Command-line arguments for carscan-ai
#[derive(Parser, Debug)]
#[command(name = "carscan-ai")]
#[command(about = "Vehicle damage analysis service")]
#[command(version)]
struct Args {
    /// Root folder holding the database, uploads and analyzer scripts
    #[arg(short, long, env = ROOT_FOLDER_ENV)]
    root_folder: Option<PathBuf>,

    /// Service config file (default: <root>/carscan-ai.toml)
    #[arg(short, long, env = "CARSCAN_CONFIG")]
    config: Option<PathBuf>,

    /// Port to listen on (overrides config file)
    #[arg(short, long, env = "CARSCAN_PORT")]
    port: Option<u16>,

    /// Address to bind (overrides config file)
    #[arg(short, long, env = "CARSCAN_BIND")]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Step 1: Resolve root folder and load config
    let root_folder = resolve_root_folder(args.root_folder.as_deref(), ROOT_FOLDER_ENV);
    ensure_directory(&root_folder)
        .with_context(|| format!("Failed to initialize root folder {}", root_folder.display()))?;

    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| root_folder.join(CONFIG_FILE_NAME));
    let mut config =
        ServiceConfig::load(&config_path, &root_folder).context("Failed to load configuration")?;
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(bind) = args.bind {
        config.bind_address = bind;
    }

    // Step 2: Initialize tracing (RUST_LOG wins over the configured level)
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting carscan-ai {}", env!("CARGO_PKG_VERSION"));
    info!(
        "Build: {} ({}, {})",
        env!("GIT_HASH"),
        env!("BUILD_PROFILE"),
        env!("BUILD_TIMESTAMP")
    );
    info!("Root folder: {}", root_folder.display());
    info!("Config: {}", config_path.display());

    // Step 3: Storage
    ensure_directory(&config.upload_dir).context("Failed to create upload directory")?;
    info!("Uploads: {}", config.upload_dir.display());

    let db_pool = carscan_ai::db::init_database_pool(&config.database_file)
        .await
        .context("Failed to open database")?;
    info!("Database: {}", config.database_file.display());

    // Step 4: Analysis pipeline
    let orchestrator = AnalysisOrchestrator::from_config(&config);
    info!(
        primary = %orchestrator.primary(),
        primary_failure = ?config.consensus.primary_failure,
        count_synthetic_votes = config.consensus.count_synthetic_votes,
        "Analyzers configured"
    );

    let state = AppState::new(db_pool, orchestrator, ImageStore::from_config(&config));
    let app = carscan_ai::build_router(state);

    // Step 5: Serve
    let ip = config
        .bind_address
        .parse::<std::net::IpAddr>()
        .with_context(|| format!("Invalid bind address '{}'", config.bind_address))?;
    let addr = SocketAddr::new(ip, config.port);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("Listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
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
