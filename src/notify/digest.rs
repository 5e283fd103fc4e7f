// src/notify/digest.rs
use std::time::Duration;

use async_trait::async_trait;
use metrics::counter;

use super::{DigestNotifier, MessageSink};
use crate::listing::ListingEntity;

pub const CHUNK_SIZE: usize = 10;
pub const CHUNK_DELAY: Duration = Duration::from_secs(2);

/// Discord rejects `content` longer than this.
pub const MAX_MESSAGE_CHARS: usize = 2000;

pub fn format_summary(count: usize, source_label: &str) -> String {
    format!("✅ Sync completed: {count} cards from {source_label}")
}

pub fn format_chunk(chunk: &[ListingEntity], number: usize, total: usize) -> String {
    let body = chunk
        .iter()
        .map(|e| format!("**{}** - {}\n{}", e.title, e.price, e.link))
        .collect::<Vec<_>>()
        .join("\n\n");
    format!("📦 Cards {number}/{total}:\n\n{body}")
}

/// Cut `text` to the channel limit on a char boundary, marking the cut with an ellipsis.
pub fn truncate_message(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars.saturating_sub(1)).collect();
    out.push('…');
    out
}

/// Summary + chunked digest over any [`MessageSink`], with a fixed gap between chunk messages.
pub struct DigestDispatcher<S> {
    sink: S,
    chunk_size: usize,
    chunk_delay: Duration,
}

impl<S: MessageSink> DigestDispatcher<S> {
    pub fn new(sink: S) -> Self {
        Self {
            sink,
            chunk_size: CHUNK_SIZE,
            chunk_delay: CHUNK_DELAY,
        }
    }

    /// Send one message; any failure is logged and swallowed.
    async fn deliver(&self, text: &str, kind: &'static str) -> bool {
        let text = truncate_message(text, MAX_MESSAGE_CHARS);
        match self.sink.send(&text).await {
            Ok(()) => {
                counter!("notify_messages_total", "kind" => kind).increment(1);
                true
            }
            Err(e) => {
                counter!("notify_failures_total", "kind" => kind).increment(1);
                tracing::warn!(target: "notify", error = %e, kind, "notification send failed");
                false
            }
        }
    }
}

#[async_trait]
impl<S: MessageSink> DigestNotifier for DigestDispatcher<S> {
    async fn send_digest(&self, entities: &[ListingEntity], source_label: &str) {
        let summary = format_summary(entities.len(), source_label);
        let mut delivered = usize::from(self.deliver(&summary, "summary").await);
        let mut attempted = 1usize;

        let chunks: Vec<&[ListingEntity]> = entities.chunks(self.chunk_size.max(1)).collect();
        let total = chunks.len();
        for (i, chunk) in chunks.into_iter().enumerate() {
            attempted += 1;
            let text = format_chunk(chunk, i + 1, total);
            delivered += usize::from(self.deliver(&text, "chunk").await);
            // Receiver-side rate limit: ~30 requests/minute.
            if i + 1 < total {
                tokio::time::sleep(self.chunk_delay).await;
            }
        }

        tracing::info!(
            target: "notify",
            source = source_label,
            entities = entities.len(),
            chunks = total,
            delivered,
            failed = attempted - delivered,
            "digest dispatched"
        );
    }
}
