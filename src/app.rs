// src/app.rs
//! Explicit wiring of the service from a validated [`SyncConfig`].

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::Router;

use crate::api::{self, AppState};
use crate::config::SyncConfig;
use crate::extract::browser::{BrowserListingProvider, BrowserOptions};
use crate::extract::{ListingExtractor, ListingProvider};
use crate::metrics::Metrics;
use crate::notify::{DigestDispatcher, DigestNotifier, DiscordWebhook, DisabledNotifier};
use crate::pipeline::retry::RetryBuffer;
use crate::pipeline::{Orchestrator, SyncPipeline};
use crate::store::memory::InMemoryListingRepository;
use crate::store::sqlite::SqliteListingRepository;
use crate::store::ListingRepository;

pub struct App {
    pub orchestrator: Arc<Orchestrator>,
    pub router: Router,
}

pub async fn build(cfg: &SyncConfig) -> anyhow::Result<App> {
    let metrics = Metrics::init()?;
    let provider = build_provider(cfg)?;
    let repository = build_repository(cfg).await?;
    let notifier = build_notifier(cfg);

    let orchestrator = Arc::new(Orchestrator::new(build_pipeline(
        cfg, provider, repository, notifier,
    )));
    let router = api::router(AppState::new(orchestrator.clone(), metrics));
    Ok(App {
        orchestrator,
        router,
    })
}

/// Assemble the pipeline from already-built stages.
pub fn build_pipeline(
    cfg: &SyncConfig,
    provider: Arc<dyn ListingProvider>,
    repository: Arc<dyn ListingRepository>,
    notifier: Arc<dyn DigestNotifier>,
) -> SyncPipeline {
    let pipeline = SyncPipeline::new(provider, repository, notifier, cfg.source_label.clone());
    if cfg.retry_unsaved {
        pipeline.with_retry_buffer(RetryBuffer::default())
    } else {
        pipeline
    }
}

pub fn build_provider(cfg: &SyncConfig) -> anyhow::Result<Arc<dyn ListingProvider>> {
    let extractor = ListingExtractor::new(&cfg.origin, cfg.source.clone())?;
    let opts = BrowserOptions {
        navigation_timeout: Duration::from_secs(cfg.navigation_timeout_secs),
        settle_delay: Duration::from_secs(cfg.settle_delay_secs),
        executable: cfg.chrome_executable.clone(),
        ..BrowserOptions::default()
    };
    Ok(Arc::new(BrowserListingProvider::new(
        cfg.target_url.clone(),
        opts,
        extractor,
    )))
}

pub async fn build_repository(cfg: &SyncConfig) -> anyhow::Result<Arc<dyn ListingRepository>> {
    if cfg.uses_memory_store() {
        tracing::warn!(target: "store", "in-memory listing store; data is lost on restart");
        return Ok(Arc::new(InMemoryListingRepository::new()));
    }
    ensure_db_dir(&cfg.database_url)?;
    let repo = SqliteListingRepository::connect(&cfg.database_url)
        .await
        .with_context(|| format!("opening listing store at {}", cfg.database_url))?;
    Ok(Arc::new(repo))
}

pub fn build_notifier(cfg: &SyncConfig) -> Arc<dyn DigestNotifier> {
    match &cfg.webhook_url {
        Some(url) => {
            let hook = DiscordWebhook::new(url.clone()).with_username(cfg.webhook_username.clone());
            Arc::new(DigestDispatcher::new(hook))
        }
        None => {
            tracing::info!(target: "notify", "no webhook configured; notifications disabled");
            Arc::new(DisabledNotifier)
        }
    }
}

/// SQLite creates the file but not its parent directory.
fn ensure_db_dir(url: &str) -> anyhow::Result<()> {
    if url.contains(":memory:") || url.contains("mode=memory") {
        return Ok(());
    }
    let path = url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:");
    let path = path.split('?').next().unwrap_or(path);
    if let Some(parent) = Path::new(path).parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating database directory {}", parent.display()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn db_dir_is_created_for_file_urls() {
        let tmp = tempfile::tempdir().unwrap();
        let db = tmp.path().join("nested/dir/cards.db");
        ensure_db_dir(&format!("sqlite://{}", db.display())).unwrap();
        assert!(db.parent().unwrap().is_dir());
        ensure_db_dir("sqlite::memory:").unwrap();
    }
}
