// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod api;
pub mod app;
pub mod config;
pub mod error;
pub mod extract;
pub mod listing;
pub mod metrics;
pub mod notify;
pub mod pipeline;
pub mod store;

pub use crate::api::router;
pub use crate::error::{SyncError, SyncResult};
pub use crate::pipeline::{Orchestrator, RunOutcome, RunTrigger, SyncPipeline};
