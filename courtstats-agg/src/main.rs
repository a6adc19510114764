//! courtstats-agg - boxscore aggregation service
//!
//! Accepts boxscore CSV uploads, keeps season aggregates current with
//! incremental deltas, and reconciles active seasons on a schedule.

use anyhow::{Context, Result};
use clap::Parser;
use courtstats_common::config::{load_config, resolve_config_path};
use courtstats_common::store::{DocumentStore, SqliteStore};
use courtstats_agg::reconcile::spawn_schedule;
use courtstats_agg::{build_router, rebuild, AppState};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for courtstats-agg
#[derive(Parser, Debug)]
#[command(name = "courtstats-agg")]
#[command(about = "Boxscore aggregation and reconciliation service")]
#[command(version)]
struct Args {
    /// Config file (TOML)
    #[arg(short, long, env = "COURTSTATS_CONFIG")]
    config: Option<PathBuf>,

    /// Address to listen on (overrides bind_address)
    #[arg(short, long, env = "COURTSTATS_BIND")]
    bind: Option<String>,

    /// SQLite database file (overrides database_path)
    #[arg(short, long, env = "COURTSTATS_DATABASE")]
    database: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Config is read before tracing starts so log_level can seed the filter
    let mut config = load_config(args.config.as_deref()).context("Failed to load configuration")?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting courtstats-agg v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );
    match resolve_config_path(args.config.as_deref()) {
        Some(path) => info!(path = %path.display(), "Configuration file"),
        None => info!("No configuration file, using compiled defaults"),
    }

    if let Some(bind) = args.bind {
        config.bind_address = bind;
    }
    if let Some(database) = args.database {
        config.database_path = database;
    }

    let store = SqliteStore::open(&config.database_path)
        .await
        .with_context(|| format!("Failed to open database {}", config.database_path.display()))?
        .with_batch_limit(config.aggregation.batch_limit)
        .with_max_wait_ms(config.aggregation.transaction_max_wait_ms);
    info!(path = %config.database_path.display(), "Database opened");
    let store: Arc<dyn DocumentStore> = Arc::new(store);

    let (rebuild_handle, _rebuild_worker) = rebuild::from_config(&config.cache_rebuild);

    let state = AppState::new(store, &config, rebuild_handle);

    if config.reconciliation.enabled {
        let period = Duration::from_secs(config.reconciliation.interval_secs.max(60));
        info!(interval_secs = period.as_secs(), "Scheduled reconciliation enabled");
        spawn_schedule(state.reconciler.clone(), period);
    } else {
        info!("Scheduled reconciliation disabled");
    }

    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_address)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_address))?;
    info!("courtstats-agg listening on http://{}", config.bind_address);
    info!("Health check: http://{}/health", config.bind_address);

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
