//! Card Sync Service — Binary Entrypoint
//! Loads config, wires the pipeline, arms the cron schedule and serves the HTTP surface.

use std::net::SocketAddr;

use anyhow::Context;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use card_sync::app;
use card_sync::config::SyncConfig;
use card_sync::pipeline::scheduler::{spawn_startup_run, start_scheduler};

/// Compact logs by default; `LOG_FORMAT=json` switches to one JSON object per line.
fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("card_sync=info,warn"));

    let json = std::env::var("LOG_FORMAT")
        .ok()
        .is_some_and(|v| v.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().compact()).init();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; no-op when the file is absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = SyncConfig::load().context("loading sync config")?;
    tracing::info!(
        cron = %cfg.cron_schedule,
        sync_on_startup = cfg.sync_on_startup,
        store = %cfg.database_url,
        notifications = cfg.webhook_url.is_some(),
        retry_unsaved = cfg.retry_unsaved,
        "configuration loaded"
    );

    let app = app::build(&cfg).await.context("building app")?;
    let mut scheduler = start_scheduler(app.orchestrator.clone(), &cfg.cron_schedule).await?;
    let startup = spawn_startup_run(app.orchestrator.clone(), cfg.sync_on_startup);

    let addr = SocketAddr::from(([0, 0, 0, 0], cfg.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!(%addr, "listening");

    let orchestrator = app.orchestrator.clone();
    axum::serve(listener, app.router)
        .with_graceful_shutdown(async move { orchestrator.shutdown_on(shutdown_signal()).await })
        .await
        .context("http server")?;

    tracing::info!("shutting down");
    if let Err(e) = scheduler.shutdown().await {
        tracing::warn!(error = %e, "scheduler shutdown failed");
    }
    if let Some(handle) = startup {
        let _ = handle.await;
    }
    Ok(())
}
