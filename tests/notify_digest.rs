// tests/notify_digest.rs
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::time::Instant;

use card_sync::listing::ListingEntity;
use card_sync::notify::digest::{CHUNK_DELAY, MAX_MESSAGE_CHARS};
use card_sync::notify::{DigestDispatcher, DigestNotifier, MessageSink, NotifyError};

#[derive(Clone, Default)]
struct MockSink {
    sent: Arc<Mutex<Vec<(Instant, String)>>>,
    /// Zero-based indices of sends that fail.
    fail_on: Vec<usize>,
}

impl MockSink {
    fn failing(fail_on: Vec<usize>) -> Self {
        Self {
            fail_on,
            ..Self::default()
        }
    }

    fn messages(&self) -> Vec<(Instant, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl MessageSink for MockSink {
    async fn send(&self, text: &str) -> Result<(), NotifyError> {
        let mut sent = self.sent.lock().unwrap();
        let idx = sent.len();
        sent.push((Instant::now(), text.to_string()));
        if self.fail_on.contains(&idx) {
            return Err(NotifyError::Status(500));
        }
        Ok(())
    }
}

fn entities(n: usize) -> Vec<ListingEntity> {
    (0..n)
        .map(|i| ListingEntity {
            surrogate_id: format!("card-{i}"),
            source: "gamestore".into(),
            title: format!("Card {i}"),
            price: "4,99 €".into(),
            link: format!("https://www.game.es/p/{i}"),
            image_url: String::new(),
            first_seen_at: Utc::now(),
            last_synced_at: Utc::now(),
        })
        .collect()
}

#[tokio::test(start_paused = true)]
async fn twenty_three_entities_make_one_summary_three_chunks_two_delays() {
    let sink = MockSink::default();
    let dispatcher = DigestDispatcher::new(sink.clone());
    let start = Instant::now();

    dispatcher.send_digest(&entities(23), "GAME").await;

    let msgs = sink.messages();
    assert_eq!(msgs.len(), 4);
    assert_eq!(msgs[0].1, "✅ Sync completed: 23 cards from GAME");
    assert!(msgs[1]
        .1
        .starts_with("📦 Cards 1/3:\n\n**Card 0** - 4,99 €\nhttps://www.game.es/p/0"));
    assert!(msgs[2].1.starts_with("📦 Cards 2/3:"));
    assert!(msgs[3].1.starts_with("📦 Cards 3/3:"));
    assert_eq!(msgs[1].1.matches("**Card").count(), 10);
    assert_eq!(msgs[3].1.matches("**Card").count(), 3);

    // no delay before the first chunk; one between each consecutive pair; none after the last
    assert_eq!(msgs[1].0 - msgs[0].0, Duration::ZERO);
    assert_eq!(msgs[2].0 - msgs[1].0, CHUNK_DELAY);
    assert_eq!(msgs[3].0 - msgs[2].0, CHUNK_DELAY);
    assert_eq!(Instant::now() - start, CHUNK_DELAY * 2);
}

#[tokio::test(start_paused = true)]
async fn exactly_one_chunk_means_no_delay() {
    let sink = MockSink::default();
    let start = Instant::now();
    DigestDispatcher::new(sink.clone())
        .send_digest(&entities(10), "GAME")
        .await;
    assert_eq!(sink.messages().len(), 2);
    assert_eq!(Instant::now() - start, Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn empty_run_still_sends_the_summary() {
    let sink = MockSink::default();
    DigestDispatcher::new(sink.clone())
        .send_digest(&[], "GAME")
        .await;
    let msgs = sink.messages();
    assert_eq!(msgs.len(), 1);
    assert_eq!(msgs[0].1, "✅ Sync completed: 0 cards from GAME");
}

#[tokio::test(start_paused = true)]
async fn failed_sends_are_swallowed_and_the_digest_continues() {
    // summary and second chunk fail
    let sink = MockSink::failing(vec![0, 2]);
    DigestDispatcher::new(sink.clone())
        .send_digest(&entities(25), "GAME")
        .await;
    assert_eq!(sink.messages().len(), 4, "every message is still attempted");
}

#[tokio::test(start_paused = true)]
async fn oversized_chunks_are_truncated_to_the_channel_limit() {
    let mut batch = entities(10);
    for e in &mut batch {
        e.title = "X".repeat(400);
    }
    let sink = MockSink::default();
    DigestDispatcher::new(sink.clone())
        .send_digest(&batch, "GAME")
        .await;
    let chunk = &sink.messages()[1].1;
    assert_eq!(chunk.chars().count(), MAX_MESSAGE_CHARS);
    assert!(chunk.ends_with('…'));
}
