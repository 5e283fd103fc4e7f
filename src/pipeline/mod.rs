// src/pipeline/mod.rs
//! One sync run: Extraction -> Persistence -> Notification.
//!
//! Each arrow is a hard sequence point. A failed stage aborts the following ones but never
//! rolls back what an earlier stage committed.

pub mod orchestrator;
pub mod retry;
pub mod scheduler;

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use metrics::{counter, gauge, histogram};
use serde::Serialize;

use crate::error::SyncResult;
use crate::extract::ListingProvider;
use crate::listing::{collapse_by_key, ListingEntity};
use crate::notify::DigestNotifier;
use crate::store::{ListingRepository, SaveSummary};
use retry::RetryBuffer;

pub use orchestrator::{Orchestrator, RunOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Idle,
    Fetching,
    Persisting,
    Notifying,
}

impl RunState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::Fetching,
            2 => Self::Persisting,
            3 => Self::Notifying,
            _ => Self::Idle,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunTrigger {
    Schedule,
    Startup,
    Manual,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub trigger: RunTrigger,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub fetched: usize,
    /// Entities carried over from an earlier run whose save failed.
    pub replayed: usize,
    pub saved: SaveSummary,
    pub notified: usize,
}

/// Current stage of the pipeline; resets to `Idle` when the run ends, fails, or is dropped.
#[derive(Debug, Default)]
struct StateCell(AtomicU8);

impl StateCell {
    fn get(&self) -> RunState {
        RunState::from_u8(self.0.load(Ordering::Acquire))
    }

    fn set(&self, s: RunState) {
        self.0.store(s as u8, Ordering::Release);
        tracing::debug!(target: "pipeline", state = ?s, "state transition");
    }

    fn enter(&self, s: RunState) -> IdleOnDrop<'_> {
        self.set(s);
        IdleOnDrop(self)
    }
}

struct IdleOnDrop<'a>(&'a StateCell);

impl Drop for IdleOnDrop<'_> {
    fn drop(&mut self) {
        self.0.set(RunState::Idle);
    }
}

pub struct SyncPipeline {
    provider: Arc<dyn ListingProvider>,
    repository: Arc<dyn ListingRepository>,
    notifier: Arc<dyn DigestNotifier>,
    source_label: String,
    retry: Option<RetryBuffer>,
    state: StateCell,
}

impl SyncPipeline {
    pub fn new(
        provider: Arc<dyn ListingProvider>,
        repository: Arc<dyn ListingRepository>,
        notifier: Arc<dyn DigestNotifier>,
        source_label: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            repository,
            notifier,
            source_label: source_label.into(),
            retry: None,
            state: StateCell::default(),
        }
    }

    /// Keep entities from a failed save and replay them on the next run.
    pub fn with_retry_buffer(mut self, buffer: RetryBuffer) -> Self {
        self.retry = Some(buffer);
        self
    }

    pub fn state(&self) -> RunState {
        self.state.get()
    }

    pub fn pending_retries(&self) -> usize {
        self.retry.as_ref().map_or(0, RetryBuffer::len)
    }

    pub fn source_label(&self) -> &str {
        &self.source_label
    }

    pub async fn run(&self, trigger: RunTrigger) -> SyncResult<RunReport> {
        let started_at = Utc::now();
        let t0 = std::time::Instant::now();
        let _idle = self.state.enter(RunState::Fetching);

        let raw = self.provider.fetch_listings().await?;
        let fetched = raw.len();
        tracing::info!(
            target: "pipeline",
            provider = self.provider.name(),
            fetched,
            "listings fetched"
        );

        let pending = self
            .retry
            .as_ref()
            .map(RetryBuffer::snapshot)
            .unwrap_or_default();
        let replayed = pending.len();
        // Older buffered data first so fresh fields win on a shared key.
        let batch: Vec<ListingEntity> = pending
            .into_iter()
            .chain(raw.into_iter().map(ListingEntity::from))
            .collect();

        self.state.set(RunState::Persisting);
        let saved = match self.repository.save(&batch).await {
            Ok(s) => s,
            Err(e) => {
                if let Some(buf) = &self.retry {
                    buf.stash(&batch);
                    tracing::warn!(
                        target: "pipeline",
                        buffered = buf.len(),
                        "save failed; entities kept for next run"
                    );
                }
                return Err(e);
            }
        };
        if let Some(buf) = &self.retry {
            buf.clear();
        }
        tracing::info!(
            target: "pipeline",
            inserted = saved.inserted,
            updated = saved.updated,
            replayed,
            "listings saved"
        );

        self.state.set(RunState::Notifying);
        let (synced, _) = collapse_by_key(&batch);
        self.notifier.send_digest(&synced, &self.source_label).await;

        let finished_at = Utc::now();
        histogram!("sync_run_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
        gauge!("sync_last_success_ts").set(finished_at.timestamp() as f64);
        counter!("sync_listings_synced_total").increment(synced.len() as u64);

        Ok(RunReport {
            trigger,
            started_at,
            finished_at,
            fetched,
            replayed,
            saved,
            notified: synced.len(),
        })
    }
}
