// ABOUTME: Entry point for the fieldtrail binary.
// ABOUTME: Loads config, opens the stores, starts the retention reaper, and serves the HTTP API.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use fieldtrail_server::{AppState, FieldtrailConfig, create_router};
use fieldtrail_store::{EventStore, FileEventStore, RetentionReaper, UserStore};

/// Field-level audit trail service.
#[derive(Debug, Parser)]
#[command(name = "fieldtrail")]
struct Cli {
    /// Data directory (overrides FIELDTRAIL_HOME).
    #[arg(long)]
    home: Option<PathBuf>,

    /// Socket address to bind (overrides FIELDTRAIL_BIND).
    #[arg(long)]
    bind: Option<std::net::SocketAddr>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fieldtrail=debug,tower_http=debug".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();
    let mut config = FieldtrailConfig::from_env().context("loading configuration")?;
    if let Some(home) = cli.home {
        config.home = home;
    }
    if let Some(bind) = cli.bind {
        config.bind = bind;
    }

    let store = UserStore::open(&config.home.join("users.db")).context("opening primary store")?;
    let gateway: Arc<dyn EventStore> = Arc::new(
        FileEventStore::open(config.home.join("streams")).context("opening event store")?,
    );

    let reaper = RetentionReaper::new(
        store.clone(),
        Arc::clone(&gateway),
        chrono::Duration::seconds(config.grace_secs as i64),
        Duration::from_secs(config.sweep_secs),
    );
    let reaper_handle = reaper.start();
    tracing::info!(
        "retention reaper running (grace {}s, sweep every {}s)",
        config.grace_secs,
        config.sweep_secs
    );

    let state = Arc::new(AppState::new(store, gateway, config.history_limit));
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("binding {}", config.bind))?;
    tracing::info!("fieldtrail listening on {}", config.bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving HTTP")?;

    reaper_handle.stop().await;
    tracing::info!("fieldtrail shut down");

    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
