// src/extract/cascade.rs
//! Selector cascade and per-field fallback chains over a rendered DOM.
//!
//! Everything here is synchronous and browser-free: it takes the page HTML the browser rendered
//! and turns it into [`RawEntry`] values. `scraper::Html` is not `Send`, so callers must parse and
//! extract without holding the document across an `.await`.

use chrono::{DateTime, Utc};
use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::error::{SyncError, SyncResult};
use crate::listing::{normalize_text, slugify, RawEntry};

/// Listing-container selectors, narrowest first.
pub const DEFAULT_CONTAINER_SELECTORS: &[&str] = &[
    "article",
    r#"[class*="product"]"#,
    r#"[class*="item"]"#,
    r#"li[class*="product"]"#,
    r#"div[class*="product"]"#,
    ".search-results article",
    ".results article",
];

/// Images the site serves when a product picture is missing.
pub const PLACEHOLDER_IMAGE_MARKERS: &[&str] = &["no_disponible.png"];

/// Titles shorter than this are treated as noise matches.
pub const MIN_TITLE_CHARS: usize = 4;

fn parse_selector(css: &str) -> SyncResult<Selector> {
    Selector::parse(css).map_err(|e| SyncError::Config(format!("invalid selector `{css}`: {e}")))
}

/// Everything a strategy needs besides the page itself.
pub struct ExtractContext<'a> {
    pub origin: &'a Url,
    pub source: &'a str,
    pub scraped_at: DateTime<Utc>,
    pub fields: &'a FieldChains,
    pub min_title_chars: usize,
}

/// One step of the cascade. `None` (or an empty vec) means "try the next strategy".
pub trait ListingStrategy: Send + Sync {
    fn name(&self) -> &str;
    fn extract(&self, page: &Html, ctx: &ExtractContext<'_>) -> Option<Vec<RawEntry>>;
}

/// Strategy matching listing containers with one CSS selector.
pub struct CssStrategy {
    css: String,
    selector: Selector,
}

impl CssStrategy {
    pub fn new(css: &str) -> SyncResult<Self> {
        Ok(Self {
            css: css.to_string(),
            selector: parse_selector(css)?,
        })
    }
}

impl ListingStrategy for CssStrategy {
    fn name(&self) -> &str {
        &self.css
    }

    fn extract(&self, page: &Html, ctx: &ExtractContext<'_>) -> Option<Vec<RawEntry>> {
        let mut matched = 0usize;
        let mut out = Vec::new();
        for el in page.select(&self.selector) {
            matched += 1;
            if let Some(entry) = extract_element(el, ctx) {
                out.push(entry);
            }
        }
        tracing::debug!(
            target: "extract",
            selector = %self.css,
            matched,
            kept = out.len(),
            "strategy evaluated"
        );
        if out.is_empty() {
            None
        } else {
            Some(out)
        }
    }
}

/// Result of running the cascade: which strategy won and what it produced.
#[derive(Debug, Default)]
pub struct CascadeHit {
    pub strategy: Option<String>,
    pub entries: Vec<RawEntry>,
}

/// Ordered fallback list of strategies; the first non-empty result short-circuits.
#[derive(Default)]
pub struct SelectorCascade {
    strategies: Vec<Box<dyn ListingStrategy>>,
}

impl SelectorCascade {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_css<S: AsRef<str>>(selectors: &[S]) -> SyncResult<Self> {
        let mut cascade = Self::new();
        for css in selectors {
            cascade.push(CssStrategy::new(css.as_ref())?);
        }
        Ok(cascade)
    }

    pub fn with_defaults() -> SyncResult<Self> {
        Self::from_css(DEFAULT_CONTAINER_SELECTORS)
    }

    pub fn push<S: ListingStrategy + 'static>(&mut self, strategy: S) -> &mut Self {
        self.strategies.push(Box::new(strategy));
        self
    }

    pub fn run(&self, page: &Html, ctx: &ExtractContext<'_>) -> CascadeHit {
        for strategy in &self.strategies {
            match strategy.extract(page, ctx) {
                Some(entries) if !entries.is_empty() => {
                    return CascadeHit {
                        strategy: Some(strategy.name().to_string()),
                        entries,
                    };
                }
                _ => continue,
            }
        }
        CascadeHit::default()
    }
}

enum Probe {
    /// Text content of the first descendant matching the selector.
    Text(Selector),
    /// Attribute of the first descendant matching the selector.
    Attr(Selector, &'static str),
    /// Attribute of the container element itself.
    OwnAttr(&'static str),
}

impl Probe {
    fn read(&self, el: ElementRef<'_>) -> Option<String> {
        let value = match self {
            Probe::Text(sel) => {
                let found = el.select(sel).next()?;
                normalize_text(&found.text().collect::<String>())
            }
            Probe::Attr(sel, attr) => el.select(sel).next()?.value().attr(attr)?.trim().to_string(),
            Probe::OwnAttr(attr) => el.value().attr(attr)?.trim().to_string(),
        };
        Some(value)
    }
}

/// Independent fallback chain for one field: first accepted, non-empty probe wins.
pub struct FieldChain {
    probes: Vec<Probe>,
    accept: fn(&str) -> bool,
}

impl FieldChain {
    fn new(probes: Vec<Probe>) -> Self {
        Self {
            probes,
            accept: |_| true,
        }
    }

    fn accepting(mut self, accept: fn(&str) -> bool) -> Self {
        self.accept = accept;
        self
    }

    pub fn first(&self, el: ElementRef<'_>) -> Option<String> {
        self.probes
            .iter()
            .filter_map(|p| p.read(el))
            .find(|v| !v.is_empty() && (self.accept)(v))
    }
}

/// Per-field chains used for every matched container.
pub struct FieldChains {
    pub title: FieldChain,
    pub price: FieldChain,
    pub link: FieldChain,
    pub image: FieldChain,
}

impl FieldChains {
    pub fn with_defaults() -> SyncResult<Self> {
        let text = |css: &str| parse_selector(css).map(Probe::Text);
        let attr =
            |css: &str, name: &'static str| parse_selector(css).map(|s| Probe::Attr(s, name));

        Ok(Self {
            // Picked by selector priority, not document order: a heading beats an earlier
            // `a[title]` wrapper.
            title: FieldChain::new(vec![
                text("h3")?,
                text("h2")?,
                text("h4")?,
                text(".title")?,
                text(r#"[class*="title"]"#)?,
                text("a[title]")?,
                attr("a[title]", "title")?,
            ]),
            price: FieldChain::new(vec![
                text(r#"[class*="price"]"#)?,
                text(".price")?,
                text("span")?,
            ]),
            link: FieldChain::new(vec![attr("a[href]", "href")?, Probe::OwnAttr("href")]),
            image: FieldChain::new(vec![
                attr("img", "data-src")?,
                attr("img", "src")?,
                attr("img", "data-lazy-src")?,
            ])
            .accepting(|v| !v.starts_with("data:")),
        })
    }
}

/// Resolve `raw` against the site origin. Absolute http(s) links are kept verbatim.
pub fn absolutize(raw: &str, origin: &Url) -> String {
    let raw = raw.trim();
    if raw.is_empty() {
        return String::new();
    }
    if raw.starts_with("http://") || raw.starts_with("https://") {
        return raw.to_string();
    }
    if let Some(rest) = raw.strip_prefix("//") {
        return format!("https://{rest}");
    }
    origin.join(raw).map(|u| u.to_string()).unwrap_or_default()
}

/// Absolute image URL, or empty for missing/placeholder pictures.
pub fn normalize_image(raw: &str, origin: &Url) -> String {
    let url = absolutize(raw, origin);
    if PLACEHOLDER_IMAGE_MARKERS.iter().any(|m| url.contains(m)) {
        return String::new();
    }
    url
}

/// Build one entry from a matched container, or `None` when the title is noise.
pub fn extract_element(el: ElementRef<'_>, ctx: &ExtractContext<'_>) -> Option<RawEntry> {
    let fields = ctx.fields;
    let title = fields.title.first(el).unwrap_or_default();
    if title.chars().count() < ctx.min_title_chars {
        return None;
    }
    let price = fields.price.first(el).unwrap_or_default();
    let link = fields
        .link
        .first(el)
        .map(|l| absolutize(&l, ctx.origin))
        .unwrap_or_default();
    let image_url = fields
        .image
        .first(el)
        .map(|i| normalize_image(&i, ctx.origin))
        .unwrap_or_default();

    Some(RawEntry {
        surrogate_id: slugify(&title),
        source: ctx.source.to_string(),
        title,
        price,
        link,
        image_url,
        scraped_at: ctx.scraped_at,
    })
}
