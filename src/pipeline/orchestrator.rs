// src/pipeline/orchestrator.rs
//! Run isolation and serialization around [`SyncPipeline`].

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use metrics::counter;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use super::{RunReport, RunState, RunTrigger, SyncPipeline};

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RunOutcome {
    Completed(RunReport),
    Failed { kind: String, message: String },
    /// Another run was still in flight.
    Skipped,
    /// Shutdown aborted the run; nothing from it was persisted after the abort.
    Cancelled,
}

impl RunOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Completed(_) => "completed",
            Self::Failed { .. } => "failed",
            Self::Skipped => "skipped",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Completed(_))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LastRun {
    pub trigger: RunTrigger,
    pub at: DateTime<Utc>,
    pub result: RunOutcome,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub state: RunState,
    pub in_flight: bool,
    pub pending_retries: usize,
    pub last_run: Option<LastRun>,
}

pub struct Orchestrator {
    pipeline: SyncPipeline,
    in_flight: tokio::sync::Mutex<()>,
    cancel: CancellationToken,
    last: Mutex<Option<LastRun>>,
}

impl Orchestrator {
    pub fn new(pipeline: SyncPipeline) -> Self {
        Self {
            pipeline,
            in_flight: tokio::sync::Mutex::new(()),
            cancel: CancellationToken::new(),
            last: Mutex::new(None),
        }
    }

    pub fn pipeline(&self) -> &SyncPipeline {
        &self.pipeline
    }

    /// Run the pipeline now unless a run is already in flight.
    ///
    /// Never returns an error and never panics: every failure is logged and folded into the
    /// returned [`RunOutcome`], so schedules stay armed.
    pub async fn trigger(&self, trigger: RunTrigger) -> RunOutcome {
        let Ok(_running) = self.in_flight.try_lock() else {
            counter!("sync_runs_total", "outcome" => "skipped").increment(1);
            tracing::warn!(
                target: "pipeline",
                ?trigger,
                "sync already in progress; trigger skipped"
            );
            return RunOutcome::Skipped;
        };
        if self.cancel.is_cancelled() {
            return RunOutcome::Cancelled;
        }

        tracing::info!(target: "pipeline", ?trigger, "sync run started");
        let run = AssertUnwindSafe(self.pipeline.run(trigger)).catch_unwind();
        let outcome = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                tracing::warn!(target: "pipeline", ?trigger, "sync run cancelled by shutdown");
                RunOutcome::Cancelled
            }
            res = run => match res {
                Ok(Ok(report)) => {
                    tracing::info!(
                        target: "pipeline",
                        ?trigger,
                        fetched = report.fetched,
                        inserted = report.saved.inserted,
                        updated = report.saved.updated,
                        "sync run completed"
                    );
                    RunOutcome::Completed(report)
                }
                Ok(Err(e)) => {
                    tracing::error!(
                        target: "pipeline",
                        ?trigger,
                        kind = e.kind(),
                        error = %e,
                        "sync run failed"
                    );
                    RunOutcome::Failed { kind: e.kind().to_string(), message: e.to_string() }
                }
                Err(panic) => {
                    let message = panic_message(panic.as_ref());
                    tracing::error!(target: "pipeline", ?trigger, %message, "sync run panicked");
                    RunOutcome::Failed { kind: "panic".into(), message }
                }
            },
        };

        counter!("sync_runs_total", "outcome" => outcome.label()).increment(1);
        *self.last.lock().expect("last-run mutex poisoned") = Some(LastRun {
            trigger,
            at: Utc::now(),
            result: outcome.clone(),
        });
        outcome
    }

    /// Abort the in-flight run (if any) and refuse new ones.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Wait for `signal`, then [`Orchestrator::shutdown`].
    ///
    /// Used as the HTTP server's graceful-shutdown future, so the in-flight run is cancelled
    /// before the server drains pending requests.
    pub async fn shutdown_on<F>(&self, signal: F)
    where
        F: Future<Output = ()>,
    {
        signal.await;
        tracing::info!(target: "pipeline", "shutdown signal received; cancelling sync runs");
        self.shutdown();
    }

    pub fn status(&self) -> StatusSnapshot {
        StatusSnapshot {
            state: self.pipeline.state(),
            in_flight: self.in_flight.try_lock().is_err(),
            pending_retries: self.pipeline.pending_retries(),
            last_run: self.last.lock().expect("last-run mutex poisoned").clone(),
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
