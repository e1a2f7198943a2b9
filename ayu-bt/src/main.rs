//! Batch Traceability service (ayu-bt) - Main entry point
//!
//! Serves the batch lifecycle REST API, the notification inbox and the
//! `/events` SSE stream.

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result};
use ayu_common::auth::{store_token, AuthContext, Role};
use ayu_common::config::{RootFolderInitializer, RootFolderResolver, TomlConfig};
use ayu_common::events::EventBus;
use ayu_common::time::secs_to_duration;
use clap::Parser;
use sqlx::SqlitePool;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use ayu_bt::{build_router, build_verification_gate, db, AppState};

/// Command-line arguments for ayu-bt
#[derive(Parser, Debug)]
#[command(name = "ayu-bt")]
#[command(about = "Herb batch traceability service")]
#[command(version)]
struct Args {
    /// Root folder holding ayusethu.toml and ayusethu.db
    #[arg(short, long, env = "AYU_ROOT_FOLDER")]
    root_folder: Option<PathBuf>,

    /// Explicit config file (defaults to <root>/ayusethu.toml)
    #[arg(short, long, env = "AYU_BT_CONFIG")]
    config: Option<PathBuf>,

    /// Port to listen on (overrides the config file)
    #[arg(short, long, env = "AYU_BT_PORT")]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let root_folder = RootFolderResolver::new("ayu-bt")
        .with_cli_arg(args.root_folder.clone())
        .resolve();
    let initializer = RootFolderInitializer::new(root_folder);
    initializer
        .ensure_directory_exists()
        .context("Failed to create root folder")?;

    let config_path = args.config.clone().unwrap_or_else(|| initializer.config_path());
    let config = TomlConfig::load_or_default(&config_path);

    init_tracing(&config)?;

    info!(
        "Starting ayu-bt v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );
    info!("Root folder: {}", initializer.root_folder().display());

    let db_path = initializer.database_path();
    let pool = db::init_database_pool(&db_path)
        .await
        .with_context(|| format!("Failed to open database {}", db_path.display()))?;
    info!("Database ready: {}", db_path.display());

    seed_tokens(&pool, &config).await?;

    let event_bus = EventBus::new(config.event_capacity);
    let gate = build_verification_gate(&config).context("Failed to build verification gate")?;
    let state = AppState::new(pool, event_bus, gate)
        .with_request_timeout(secs_to_duration(config.request_timeout_secs));

    let app = build_router(state);

    let port = args.port.unwrap_or_else(|| config.port());
    let addr = format!("{}:{}", config.host(), port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// RUST_LOG wins over the configured level; a configured file replaces stderr.
fn init_tracing(config: &TomlConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let (stderr_layer, file_layer) = match &config.logging.file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(file));
            (None, Some(layer))
        }
        None => (Some(tracing_subscriber::fmt::layer()), None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();
    Ok(())
}

/// Provision the tokens listed in the config file
///
/// Entries with an unknown role are skipped with a warning.
async fn seed_tokens(pool: &SqlitePool, config: &TomlConfig) -> Result<()> {
    for entry in &config.tokens {
        let role = match entry.role.parse::<Role>() {
            Ok(role) => role,
            Err(e) => {
                warn!("Skipping token for {}: {}", entry.user_id, e);
                continue;
            }
        };
        let context = AuthContext::new(entry.user_id.clone(), role);
        store_token(pool, &entry.token, &context)
            .await
            .with_context(|| format!("Failed to store token for {}", entry.user_id))?;
    }
    if !config.tokens.is_empty() {
        info!("Provisioned {} API token(s)", config.tokens.len());
    }
    Ok(())
}

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
            Ok(mut sig) => {
                sig.recv().await;
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
