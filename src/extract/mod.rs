// src/extract/mod.rs
//! Extraction stage: rendered page -> normalized [`RawEntry`] values.

pub mod browser;
pub mod cascade;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics::counter;
use scraper::Html;
use url::Url;

use crate::error::{SyncError, SyncResult};
use crate::listing::RawEntry;
use cascade::{ExtractContext, FieldChains, SelectorCascade, MIN_TITLE_CHARS};

/// Source of listing candidates for one run.
#[async_trait]
pub trait ListingProvider: Send + Sync {
    async fn fetch_listings(&self) -> SyncResult<Vec<RawEntry>>;
    fn name(&self) -> &str;
}

/// Pure HTML -> entries extraction for one site.
pub struct ListingExtractor {
    origin: Url,
    source: String,
    cascade: SelectorCascade,
    fields: FieldChains,
    min_title_chars: usize,
}

impl ListingExtractor {
    pub fn new(origin: &str, source: impl Into<String>) -> SyncResult<Self> {
        let origin = Url::parse(origin)
            .map_err(|e| SyncError::Config(format!("invalid origin `{origin}`: {e}")))?;
        Ok(Self {
            origin,
            source: source.into(),
            cascade: SelectorCascade::with_defaults()?,
            fields: FieldChains::with_defaults()?,
            min_title_chars: MIN_TITLE_CHARS,
        })
    }

    pub fn with_cascade(mut self, cascade: SelectorCascade) -> Self {
        self.cascade = cascade;
        self
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Run the cascade over `html`. Every entry carries `scraped_at` and the source tag.
    pub fn extract(&self, html: &str, scraped_at: DateTime<Utc>) -> Vec<RawEntry> {
        let page = Html::parse_document(html);
        let ctx = ExtractContext {
            origin: &self.origin,
            source: &self.source,
            scraped_at,
            fields: &self.fields,
            min_title_chars: self.min_title_chars,
        };
        let hit = self.cascade.run(&page, &ctx);

        counter!("extract_entries_total").increment(hit.entries.len() as u64);
        match &hit.strategy {
            Some(s) => tracing::debug!(
                target: "extract",
                strategy = %s,
                entries = hit.entries.len(),
                "cascade hit"
            ),
            None => tracing::info!(target: "extract", "no selector matched any listing"),
        }
        hit.entries
    }
}

/// Serves a fixed HTML document; used for dry runs and tests.
pub struct FixtureListingProvider {
    html: String,
    extractor: ListingExtractor,
}

impl FixtureListingProvider {
    pub fn new(html: impl Into<String>, extractor: ListingExtractor) -> Self {
        Self {
            html: html.into(),
            extractor,
        }
    }
}

#[async_trait]
impl ListingProvider for FixtureListingProvider {
    async fn fetch_listings(&self) -> SyncResult<Vec<RawEntry>> {
        Ok(self.extractor.extract(&self.html, Utc::now()))
    }

    fn name(&self) -> &str {
        "fixture"
    }
}
