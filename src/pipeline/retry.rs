// src/pipeline/retry.rs
use std::sync::Mutex;

use crate::listing::{collapse_by_key, ListingEntity};

/// Upper bound on buffered entities; older ones are dropped first.
pub const DEFAULT_RETRY_CAPACITY: usize = 10_000;

/// Entities whose persistence failed, replayed ahead of the next run's fresh data.
#[derive(Debug)]
pub struct RetryBuffer {
    inner: Mutex<Vec<ListingEntity>>,
    cap: usize,
}

impl RetryBuffer {
    pub fn with_capacity(cap: usize) -> Self {
        Self {
            inner: Mutex::new(Vec::new()),
            cap: cap.max(1),
        }
    }

    /// Copy of the pending entities. The buffer is only cleared by [`RetryBuffer::clear`], so a
    /// run cancelled between snapshot and save loses nothing.
    pub fn snapshot(&self) -> Vec<ListingEntity> {
        self.inner.lock().expect("retry buffer poisoned").clone()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("retry buffer poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Replace the pending set with `entities`, collapsed per key and capped.
    pub fn stash(&self, entities: &[ListingEntity]) {
        let (mut batch, _) = collapse_by_key(entities);
        if batch.len() > self.cap {
            let excess = batch.len() - self.cap;
            batch.drain(0..excess);
            tracing::warn!(target: "pipeline", dropped = excess, "retry buffer full");
        }
        *self.inner.lock().expect("retry buffer poisoned") = batch;
    }

    pub fn clear(&self) {
        self.inner.lock().expect("retry buffer poisoned").clear();
    }
}

impl Default for RetryBuffer {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_RETRY_CAPACITY)
    }
}
