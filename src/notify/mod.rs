// src/notify/mod.rs
//! Notification stage. Delivery is best effort: nothing in here returns an error to the
//! pipeline. Failures end at this boundary as a log line and a counter.

pub mod digest;
pub mod discord;

use async_trait::async_trait;
use thiserror::Error;

use crate::listing::ListingEntity;

pub use digest::DigestDispatcher;
pub use discord::DiscordWebhook;

/// Failure of one outbound message. Never escapes [`DigestNotifier`].
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("webhook request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("webhook returned HTTP {0}")]
    Status(u16),
    #[error("{0}")]
    Other(String),
}

/// Fallible transport for a single text message.
#[async_trait]
pub trait MessageSink: Send + Sync {
    async fn send(&self, text: &str) -> Result<(), NotifyError>;
}

/// Digest delivery as seen by the orchestrator: infallible by contract.
#[async_trait]
pub trait DigestNotifier: Send + Sync {
    async fn send_digest(&self, entities: &[ListingEntity], source_label: &str);
}

/// Used when no webhook is configured: the digest only reaches the logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledNotifier;

#[async_trait]
impl DigestNotifier for DisabledNotifier {
    async fn send_digest(&self, entities: &[ListingEntity], source_label: &str) {
        tracing::debug!(
            target: "notify",
            entities = entities.len(),
            source = source_label,
            "notifications disabled (no webhook configured)"
        );
    }
}
