// src/listing.rs
//! Listing ("card") types shared by every stage of the pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Natural identity of a stored listing. Surrogate ids never take part in it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ListingKey {
    pub source: String,
    pub link: String,
}

/// One entry as produced by extraction, before it ever touches storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawEntry {
    pub surrogate_id: String, // slug of the title, informational only
    pub source: String,       // e.g. "gamestore"
    pub title: String,
    pub price: String, // raw label, may be non-numeric ("MERCHANDISING")
    pub link: String,
    pub image_url: String,
    pub scraped_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingEntity {
    pub surrogate_id: String,
    pub source: String,
    pub title: String,
    pub price: String,
    pub link: String,
    pub image_url: String,
    pub first_seen_at: DateTime<Utc>,
    pub last_synced_at: DateTime<Utc>,
}

impl ListingEntity {
    pub fn key(&self) -> ListingKey {
        ListingKey {
            source: self.source.clone(),
            link: self.link.clone(),
        }
    }

    /// True when every non-timestamp field matches `other`.
    pub fn same_content(&self, other: &ListingEntity) -> bool {
        self.surrogate_id == other.surrogate_id
            && self.source == other.source
            && self.title == other.title
            && self.price == other.price
            && self.link == other.link
            && self.image_url == other.image_url
    }
}

impl From<RawEntry> for ListingEntity {
    /// Timestamps are provisional; the repository stamps the real ones on save.
    fn from(raw: RawEntry) -> Self {
        Self {
            surrogate_id: raw.surrogate_id,
            source: raw.source,
            title: raw.title,
            price: raw.price,
            link: raw.link,
            image_url: raw.image_url,
            first_seen_at: raw.scraped_at,
            last_synced_at: raw.scraped_at,
        }
    }
}

/// Collapse a batch so that each key appears once, keeping the LAST occurrence's fields.
/// Position follows the first occurrence of each key. Returns the collapsed batch and how many
/// entries were folded away.
pub fn collapse_by_key(entities: &[ListingEntity]) -> (Vec<ListingEntity>, usize) {
    use std::collections::HashMap;

    let mut slot_of: HashMap<ListingKey, usize> = HashMap::with_capacity(entities.len());
    let mut out: Vec<ListingEntity> = Vec::with_capacity(entities.len());
    for e in entities {
        match slot_of.get(&e.key()) {
            Some(&i) => out[i] = e.clone(),
            None => {
                slot_of.insert(e.key(), out.len());
                out.push(e.clone());
            }
        }
    }
    let collapsed = entities.len() - out.len();
    (out, collapsed)
}

/// Collapse whitespace runs to single spaces and trim.
pub fn normalize_text(s: &str) -> String {
    static RE_WS: once_cell::sync::OnceCell<regex::Regex> = once_cell::sync::OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").expect("static regex"));
    re_ws.replace_all(s, " ").trim().to_string()
}

/// Lowercase ASCII slug of a title ("Caja Colección EX" -> "caja-colecci-n-ex").
pub fn slugify(title: &str) -> String {
    static RE_NON_ALNUM: once_cell::sync::OnceCell<regex::Regex> =
        once_cell::sync::OnceCell::new();
    let re = RE_NON_ALNUM.get_or_init(|| regex::Regex::new(r"[^a-z0-9]+").expect("static regex"));
    let lower = title.to_lowercase();
    re.replace_all(&lower, "-").trim_matches('-').to_string()
}
