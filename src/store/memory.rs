// src/store/memory.rs
use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use super::{ListingRepository, SaveSummary};
use crate::error::SyncResult;
use crate::listing::{collapse_by_key, ListingEntity, ListingKey};

/// Process-local repository with the same upsert semantics as the SQLite one.
#[derive(Debug, Default)]
pub struct InMemoryListingRepository {
    rows: Mutex<HashMap<ListingKey, ListingEntity>>,
}

impl InMemoryListingRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Vec<ListingEntity> {
        let rows = self.rows.lock().expect("listing map poisoned");
        let mut out: Vec<_> = rows.values().cloned().collect();
        out.sort_by(|a, b| a.key().cmp(&b.key()));
        out
    }
}

#[async_trait]
impl ListingRepository for InMemoryListingRepository {
    async fn save(&self, entities: &[ListingEntity]) -> SyncResult<SaveSummary> {
        if entities.is_empty() {
            return Ok(SaveSummary::default());
        }
        let (batch, collapsed) = collapse_by_key(entities);
        let now = Utc::now();
        let mut summary = SaveSummary {
            collapsed,
            ..SaveSummary::default()
        };

        let mut rows = self.rows.lock().expect("listing map poisoned");
        for e in batch {
            match rows.get_mut(&e.key()) {
                Some(stored) => {
                    let first_seen_at = stored.first_seen_at;
                    *stored = ListingEntity {
                        first_seen_at,
                        last_synced_at: now,
                        ..e
                    };
                    summary.updated += 1;
                }
                None => {
                    rows.insert(
                        e.key(),
                        ListingEntity {
                            first_seen_at: now,
                            last_synced_at: now,
                            ..e
                        },
                    );
                    summary.inserted += 1;
                }
            }
        }
        Ok(summary)
    }

    async fn get(&self, key: &ListingKey) -> SyncResult<Option<ListingEntity>> {
        Ok(self.rows.lock().expect("listing map poisoned").get(key).cloned())
    }

    async fn count(&self) -> SyncResult<u64> {
        Ok(self.rows.lock().expect("listing map poisoned").len() as u64)
    }
}
