// src/store/sqlite.rs
//! SQLite-backed listing repository.
//!
//! Uniqueness of `(source, link)` is enforced by a unique index, so duplicate or concurrent
//! upserts can never produce two rows for one key.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::Utc;
use metrics::{counter, histogram};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;

use super::{ListingRepository, SaveSummary};
use crate::error::SyncResult;
use crate::listing::{collapse_by_key, ListingEntity, ListingKey};

const CREATE_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS listings (
        id             INTEGER PRIMARY KEY AUTOINCREMENT,
        source         TEXT NOT NULL,
        link           TEXT NOT NULL,
        surrogate_id   TEXT NOT NULL DEFAULT '',
        title          TEXT NOT NULL,
        price          TEXT NOT NULL DEFAULT '',
        image_url      TEXT NOT NULL DEFAULT '',
        first_seen_at  TEXT NOT NULL,
        last_synced_at TEXT NOT NULL
    )
"#;

const CREATE_KEY_INDEX: &str =
    "CREATE UNIQUE INDEX IF NOT EXISTS listings_source_link ON listings (source, link)";

// Both timestamps are bound from ?7 on insert; an updated row always has a later
// last_synced_at, so equality tells the two paths apart.
const UPSERT: &str = r#"
    INSERT INTO listings
        (source, link, surrogate_id, title, price, image_url, first_seen_at, last_synced_at)
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
    ON CONFLICT (source, link) DO UPDATE SET
        surrogate_id   = excluded.surrogate_id,
        title          = excluded.title,
        price          = excluded.price,
        image_url      = excluded.image_url,
        last_synced_at = excluded.last_synced_at
    RETURNING first_seen_at = last_synced_at AS inserted
"#;

const SELECT_BY_KEY: &str = r#"
    SELECT surrogate_id, source, title, price, link, image_url, first_seen_at, last_synced_at
    FROM listings WHERE source = ? AND link = ?
"#;

#[derive(Clone)]
pub struct SqliteListingRepository {
    pool: SqlitePool,
}

impl SqliteListingRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open (creating if missing) the database at `url` and make sure the schema exists.
    /// In-memory URLs get a single long-lived connection so the data outlives idle reaping.
    pub async fn connect(url: &str) -> SyncResult<Self> {
        let opts = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let in_memory = url.contains(":memory:") || url.contains("mode=memory");
        let pool = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(opts)
                .await?
        } else {
            SqlitePoolOptions::new()
                .max_connections(4)
                .connect_with(opts)
                .await?
        };
        let repo = Self::new(pool);
        repo.ensure_schema().await?;
        tracing::info!(target: "store", url = %url, "listing store ready");
        Ok(repo)
    }

    pub async fn ensure_schema(&self) -> SyncResult<()> {
        sqlx::query(CREATE_TABLE).execute(&self.pool).await?;
        sqlx::query(CREATE_KEY_INDEX).execute(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn row_to_entity(row: &SqliteRow) -> Result<ListingEntity, sqlx::Error> {
    Ok(ListingEntity {
        surrogate_id: row.try_get("surrogate_id")?,
        source: row.try_get("source")?,
        title: row.try_get("title")?,
        price: row.try_get("price")?,
        link: row.try_get("link")?,
        image_url: row.try_get("image_url")?,
        first_seen_at: row.try_get("first_seen_at")?,
        last_synced_at: row.try_get("last_synced_at")?,
    })
}

#[async_trait]
impl ListingRepository for SqliteListingRepository {
    async fn save(&self, entities: &[ListingEntity]) -> SyncResult<SaveSummary> {
        if entities.is_empty() {
            return Ok(SaveSummary::default());
        }
        let t0 = std::time::Instant::now();
        let (batch, collapsed) = collapse_by_key(entities);
        let now = Utc::now();
        let mut summary = SaveSummary {
            collapsed,
            ..SaveSummary::default()
        };

        let mut tx = self.pool.begin().await?;
        for e in &batch {
            let inserted: i64 = sqlx::query_scalar(UPSERT)
                .bind(&e.source)
                .bind(&e.link)
                .bind(&e.surrogate_id)
                .bind(&e.title)
                .bind(&e.price)
                .bind(&e.image_url)
                .bind(now)
                .fetch_one(&mut *tx)
                .await?;
            if inserted != 0 {
                summary.inserted += 1;
            } else {
                summary.updated += 1;
            }
        }
        tx.commit().await?;

        counter!("store_upserts_total", "op" => "insert").increment(summary.inserted as u64);
        counter!("store_upserts_total", "op" => "update").increment(summary.updated as u64);
        histogram!("store_save_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
        tracing::debug!(
            target: "store",
            inserted = summary.inserted,
            updated = summary.updated,
            collapsed = summary.collapsed,
            "batch saved"
        );
        Ok(summary)
    }

    async fn get(&self, key: &ListingKey) -> SyncResult<Option<ListingEntity>> {
        let row = sqlx::query(SELECT_BY_KEY)
            .bind(&key.source)
            .bind(&key.link)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(row_to_entity).transpose()?)
    }

    async fn count(&self) -> SyncResult<u64> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM listings")
            .fetch_one(&self.pool)
            .await?;
        Ok(n.max(0) as u64)
    }
}
