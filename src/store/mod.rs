// src/store/mod.rs
//! Persistence stage: idempotent upsert of listings by natural key.

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::SyncResult;
use crate::listing::{ListingEntity, ListingKey};

/// What one `save` call did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SaveSummary {
    pub inserted: usize,
    pub updated: usize,
    /// Entries folded into a later duplicate of the same key within the batch.
    pub collapsed: usize,
}

impl SaveSummary {
    pub fn written(&self) -> usize {
        self.inserted + self.updated
    }
}

#[async_trait]
pub trait ListingRepository: Send + Sync {
    /// Upsert every entity by `(source, link)`.
    ///
    /// Insert stamps `first_seen_at` and `last_synced_at` with the save time; update overwrites
    /// the non-timestamp fields and refreshes `last_synced_at` only. Within one batch the last
    /// occurrence of a key wins. An empty batch performs no writes.
    async fn save(&self, entities: &[ListingEntity]) -> SyncResult<SaveSummary>;

    async fn get(&self, key: &ListingKey) -> SyncResult<Option<ListingEntity>>;

    async fn count(&self) -> SyncResult<u64>;
}
