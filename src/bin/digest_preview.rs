//! Dry run over a saved HTML page: extract listings and print the digest that would be posted.
//!
//! Usage: `cargo run --bin digest-preview -- page.html [label]`

use anyhow::Context;
use chrono::Utc;

use card_sync::config::sync::{DEFAULT_ORIGIN, DEFAULT_SOURCE, DEFAULT_SOURCE_LABEL};
use card_sync::extract::ListingExtractor;
use card_sync::listing::{collapse_by_key, ListingEntity};
use card_sync::notify::digest::{format_chunk, format_summary, CHUNK_SIZE};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_target(false).init();

    let mut args = std::env::args().skip(1);
    let path = args.next().context("usage: digest-preview <page.html> [label]")?;
    let label = args.next().unwrap_or_else(|| DEFAULT_SOURCE_LABEL.to_string());

    let html = std::fs::read_to_string(&path).with_context(|| format!("reading {path}"))?;
    let extractor = ListingExtractor::new(DEFAULT_ORIGIN, DEFAULT_SOURCE)?;
    let entities: Vec<ListingEntity> = extractor
        .extract(&html, Utc::now())
        .into_iter()
        .map(ListingEntity::from)
        .collect();
    let (entities, collapsed) = collapse_by_key(&entities);

    println!("{}", format_summary(entities.len(), &label));
    let total = entities.len().div_ceil(CHUNK_SIZE);
    for (i, chunk) in entities.chunks(CHUNK_SIZE).enumerate() {
        println!("\n---\n{}", format_chunk(chunk, i + 1, total));
    }
    println!("\ndigest-preview done ({collapsed} duplicate links collapsed)");
    Ok(())
}
