// tests/extract_cascade.rs
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::{TimeZone, Utc};
use scraper::Html;
use url::Url;

use card_sync::extract::cascade::{
    ExtractContext, FieldChains, ListingStrategy, SelectorCascade, MIN_TITLE_CHARS,
};
use card_sync::extract::{FixtureListingProvider, ListingExtractor, ListingProvider};
use card_sync::listing::RawEntry;

const ARTICLES: &str = include_str!("fixtures/gamestore_articles.html");
const PRODUCTS: &str = include_str!("fixtures/gamestore_products.html");

fn extractor() -> ListingExtractor {
    ListingExtractor::new("https://www.game.es", "gamestore").unwrap()
}

#[test]
fn article_layout_yields_normalized_entries() {
    let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
    let out = extractor().extract(ARTICLES, at);

    // "New" is shorter than the minimum title length and is dropped.
    assert_eq!(out.len(), 3);
    assert!(out.iter().all(|e| e.source == "gamestore" && e.scraped_at == at));

    let sobre = &out[0];
    assert_eq!(sobre.title, "Sobre Escarlata y Púrpura");
    assert_eq!(sobre.price, "4,99 €");
    assert_eq!(
        sobre.link,
        "https://www.game.es/pokemon-tcg/sobre-escarlata-purpura"
    );
    assert_eq!(sobre.image_url, "https://media.game.es/sobre.jpg");
    assert_eq!(sobre.surrogate_id, "sobre-escarlata-y-p-rpura");

    let caja = &out[1];
    assert_eq!(caja.title, "Caja Entrenador Élite");
    assert_eq!(caja.price, "59,99 €");
    assert_eq!(caja.link, "https://www.game.es/pokemon-tcg/caja-entrenador-elite");
    assert_eq!(caja.image_url, "", "placeholder image must be blanked");

    let lata = &out[2];
    assert_eq!(lata.title, "Lata Coleccionista Pikachu");
    assert_eq!(lata.price, "MERCHANDISING");
    assert_eq!(lata.link, "https://www.game.es/lata-pikachu");
    assert_eq!(lata.image_url, "https://www.game.es/img/lata-pikachu.jpg");
}

#[test]
fn noise_only_strategy_falls_through_to_the_next() {
    let out = extractor().extract(PRODUCTS, Utc::now());
    let titles: Vec<&str> = out.iter().map(|e| e.title.as_str()).collect();
    assert_eq!(
        titles,
        vec![
            "Blíster Triple Chispas Fulgurantes",
            "Baraja Liga de Batalla Charizard ex"
        ]
    );
    assert_eq!(out[0].price, "12,95 €");
    assert_eq!(out[1].link, "https://www.game.es/baraja-charizard");
    // inline data: URIs are skipped in favour of the lazy-load attribute
    assert_eq!(out[1].image_url, "https://www.game.es/img/baraja.jpg");
}

#[test]
fn page_without_listings_is_an_empty_result() {
    let out = extractor().extract("<html><body><p>Sin resultados</p></body></html>", Utc::now());
    assert!(out.is_empty());
}

/// Records how often it was evaluated and returns a canned answer.
struct Counting {
    name: &'static str,
    calls: Arc<AtomicUsize>,
    answer: Option<Vec<RawEntry>>,
}

impl ListingStrategy for Counting {
    fn name(&self) -> &str {
        self.name
    }

    fn extract(&self, _page: &Html, _ctx: &ExtractContext<'_>) -> Option<Vec<RawEntry>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.answer.clone()
    }
}

fn canned(title: &str) -> RawEntry {
    RawEntry {
        surrogate_id: title.to_lowercase(),
        source: "gamestore".into(),
        title: title.into(),
        price: String::new(),
        link: String::new(),
        image_url: String::new(),
        scraped_at: Utc::now(),
    }
}

#[test]
fn first_non_empty_strategy_short_circuits_the_cascade() {
    let counters: Vec<Arc<AtomicUsize>> = (0..4).map(|_| Arc::new(AtomicUsize::new(0))).collect();
    let mut cascade = SelectorCascade::new();
    cascade
        .push(Counting {
            name: "none",
            calls: counters[0].clone(),
            answer: None,
        })
        .push(Counting {
            name: "empty",
            calls: counters[1].clone(),
            answer: Some(Vec::new()),
        })
        .push(Counting {
            name: "hit",
            calls: counters[2].clone(),
            answer: Some(vec![canned("Winner")]),
        })
        .push(Counting {
            name: "never",
            calls: counters[3].clone(),
            answer: Some(vec![canned("Loser")]),
        });

    let origin = Url::parse("https://www.game.es").unwrap();
    let fields = FieldChains::with_defaults().unwrap();
    let ctx = ExtractContext {
        origin: &origin,
        source: "gamestore",
        scraped_at: Utc::now(),
        fields: &fields,
        min_title_chars: MIN_TITLE_CHARS,
    };
    let page = Html::parse_document("<html></html>");
    let hit = cascade.run(&page, &ctx);

    assert_eq!(hit.strategy.as_deref(), Some("hit"));
    assert_eq!(hit.entries.len(), 1);
    assert_eq!(hit.entries[0].title, "Winner");
    let calls: Vec<usize> = counters.iter().map(|c| c.load(Ordering::SeqCst)).collect();
    assert_eq!(calls, vec![1, 1, 1, 0]);
}

#[test]
fn custom_cascade_order_is_respected() {
    // Prefer product tiles even when articles with real titles exist.
    let cascade = SelectorCascade::from_css(&[r#"[class*="product"]"#, "article"]).unwrap();
    let mixed = format!(
        "{}{}",
        ARTICLES.replace("</body>", ""),
        r#"<div class="product-tile"><h3>Sobre Mejorado 151</h3><a href="/151">x</a></div></body>"#
    );
    let out = extractor().with_cascade(cascade).extract(&mixed, Utc::now());
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].title, "Sobre Mejorado 151");
}

#[test]
fn invalid_selector_is_a_config_error() {
    let err = SelectorCascade::from_css(&["div[[["]).err().unwrap();
    assert_eq!(err.kind(), "config");
}

#[tokio::test]
async fn fixture_provider_serves_extracted_entries() {
    let provider = FixtureListingProvider::new(ARTICLES, extractor());
    assert_eq!(provider.name(), "fixture");
    let out = provider.fetch_listings().await.unwrap();
    assert_eq!(out.len(), 3);
}
