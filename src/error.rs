// src/error.rs
//! Error taxonomy for one pipeline run.
//!
//! Every stage error ends at the orchestrator's per-run handler. Notification failures have no
//! variant here: they never leave the `notify` module.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    /// Target site unreachable, browser could not start, navigation failed.
    #[error("network error: {0}")]
    Network(String),

    /// Navigation (or another bounded wait) exceeded its deadline.
    #[error("timed out after {secs}s: {what}")]
    Timeout { what: String, secs: u64 },

    /// Storage unavailable or a write was rejected.
    #[error("persistence error: {0}")]
    Persistence(#[from] sqlx::Error),

    /// Invalid configuration detected at construction time.
    #[error("configuration error: {0}")]
    Config(String),
}

impl SyncError {
    pub fn network(msg: impl Into<String>) -> Self {
        Self::Network(msg.into())
    }

    /// Short stable label, used as a metrics tag and in run reports.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Network(_) => "network",
            Self::Timeout { .. } => "timeout",
            Self::Persistence(_) => "persistence",
            Self::Config(_) => "config",
        }
    }
}

pub type SyncResult<T> = std::result::Result<T, SyncError>;
