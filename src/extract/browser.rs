// src/extract/browser.rs
//! Headless browser session scoped to one extraction call.

use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::fetch::{
    EnableParams, EventRequestPaused, FailRequestParams, RequestPattern, RequestStage,
};
use chromiumoxide::cdp::browser_protocol::network::{
    ErrorReason, ResourceType, SetUserAgentOverrideParams,
};
use chromiumoxide::Page;
use chrono::Utc;
use futures::StreamExt;
use metrics::{counter, histogram};
use tokio::task::JoinHandle;

use super::{ListingExtractor, ListingProvider};
use crate::error::{SyncError, SyncResult};
use crate::listing::RawEntry;

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Low-memory container profile.
const LAUNCH_ARGS: &[&str] = &[
    "--disable-setuid-sandbox",
    "--disable-dev-shm-usage",
    "--disable-gpu",
    "--disable-extensions",
    "--disable-background-networking",
    "--disable-default-apps",
    "--disable-sync",
    "--disable-translate",
    "--metrics-recording-only",
    "--mute-audio",
    "--no-first-run",
    "--safebrowsing-disable-auto-update",
];

/// Sub-resources aborted before they hit the network. Scripts and stylesheets pass.
const BLOCKED_RESOURCES: &[ResourceType] =
    &[ResourceType::Image, ResourceType::Font, ResourceType::Media];

#[derive(Debug, Clone)]
pub struct BrowserOptions {
    pub user_agent: String,
    pub navigation_timeout: Duration,
    pub settle_delay: Duration,
    /// Explicit Chrome/Chromium binary; autodetected when `None`.
    pub executable: Option<String>,
}

impl Default for BrowserOptions {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            navigation_timeout: Duration::from_secs(20),
            settle_delay: Duration::from_secs(3),
            executable: None,
        }
    }
}

/// Owns the browser process and its CDP handler task.
///
/// Release paths:
/// 1. [`BrowserSession::close`] - closes the browser and waits for the process to exit.
/// 2. `Drop` - aborts the background tasks; dropping `Browser` kills the child process. This is
///    what runs when the owning future is cancelled mid-navigation.
pub struct BrowserSession {
    browser: Option<Browser>,
    handler: JoinHandle<()>,
    interceptor: Option<JoinHandle<()>>,
}

impl BrowserSession {
    pub async fn launch(opts: &BrowserOptions) -> SyncResult<Self> {
        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .request_timeout(opts.navigation_timeout)
            .args(LAUNCH_ARGS.iter().copied());
        if let Some(path) = &opts.executable {
            builder = builder.chrome_executable(path);
        }
        let config = builder
            .build()
            .map_err(|e| SyncError::network(format!("browser config: {e}")))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| SyncError::network(format!("browser launch: {e}")))?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    tracing::debug!(target: "extract", error = %e, "cdp handler stopped");
                    break;
                }
            }
        });

        tracing::debug!(target: "extract", "browser session launched");
        Ok(Self {
            browser: Some(browser),
            handler,
            interceptor: None,
        })
    }

    /// Navigate to `url` and return the rendered HTML after the settle delay.
    pub async fn render(&mut self, url: &str, opts: &BrowserOptions) -> SyncResult<String> {
        let browser = self
            .browser
            .as_ref()
            .ok_or_else(|| SyncError::network("browser session already closed"))?;
        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| SyncError::network(format!("new page: {e}")))?;

        self.interceptor = Some(block_heavy_resources(&page).await?);

        page.set_user_agent(user_agent_override(opts))
            .await
            .map_err(|e| SyncError::network(format!("set user agent: {e}")))?;

        let secs = opts.navigation_timeout.as_secs();
        match tokio::time::timeout(opts.navigation_timeout, page.goto(url)).await {
            Err(_) => {
                return Err(SyncError::Timeout {
                    what: format!("navigation to {url}"),
                    secs,
                })
            }
            Ok(Err(e)) => return Err(SyncError::network(format!("navigation to {url}: {e}"))),
            Ok(Ok(_)) => {}
        }

        // No reliable "listings rendered" signal exists; give client-side code time to run.
        tokio::time::sleep(opts.settle_delay).await;

        page.content()
            .await
            .map_err(|e| SyncError::network(format!("read page content: {e}")))
    }

    pub async fn close(mut self) {
        if let Some(task) = self.interceptor.take() {
            task.abort();
        }
        if let Some(mut browser) = self.browser.take() {
            if let Err(e) = browser.close().await {
                tracing::warn!(target: "extract", error = %e, "browser close failed");
            }
            if let Err(e) = browser.wait().await {
                tracing::warn!(target: "extract", error = %e, "browser wait failed");
            }
        }
        self.handler.abort();
        tracing::debug!(target: "extract", "browser session closed");
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        if let Some(task) = self.interceptor.take() {
            task.abort();
        }
        self.handler.abort();
        if self.browser.take().is_some() {
            tracing::warn!(
                target: "extract",
                "browser session dropped without close; process killed"
            );
        }
    }
}

fn user_agent_override(opts: &BrowserOptions) -> SetUserAgentOverrideParams {
    SetUserAgentOverrideParams::new(opts.user_agent.clone())
}

async fn block_heavy_resources(page: &Page) -> SyncResult<JoinHandle<()>> {
    let patterns = BLOCKED_RESOURCES
        .iter()
        .map(|rt| RequestPattern {
            url_pattern: None,
            resource_type: Some(rt.clone()),
            request_stage: Some(RequestStage::Request),
        })
        .collect::<Vec<_>>();

    let mut paused = page
        .event_listener::<EventRequestPaused>()
        .await
        .map_err(|e| SyncError::network(format!("request listener: {e}")))?;

    page.execute(EnableParams {
        patterns: Some(patterns),
        handle_auth_requests: None,
    })
    .await
    .map_err(|e| SyncError::network(format!("enable interception: {e}")))?;

    // Only blocked resource types are paused, so every paused request gets failed.
    let page = page.clone();
    Ok(tokio::spawn(async move {
        while let Some(ev) = paused.next().await {
            let fail = FailRequestParams::new(ev.request_id.clone(), ErrorReason::BlockedByClient);
            if let Err(e) = page.execute(fail).await {
                tracing::trace!(target: "extract", error = %e, "fail request");
            }
        }
    }))
}

/// Production provider: one browser session per call against the configured search page.
pub struct BrowserListingProvider {
    target_url: String,
    opts: BrowserOptions,
    extractor: ListingExtractor,
}

impl BrowserListingProvider {
    pub fn new(
        target_url: impl Into<String>,
        opts: BrowserOptions,
        extractor: ListingExtractor,
    ) -> Self {
        Self {
            target_url: target_url.into(),
            opts,
            extractor,
        }
    }
}

#[async_trait]
impl ListingProvider for BrowserListingProvider {
    async fn fetch_listings(&self) -> SyncResult<Vec<RawEntry>> {
        let t0 = std::time::Instant::now();
        let rendered = match BrowserSession::launch(&self.opts).await {
            Ok(mut session) => {
                let rendered = session.render(&self.target_url, &self.opts).await;
                session.close().await;
                rendered
            }
            Err(e) => Err(e),
        };

        let html = match rendered {
            Ok(html) => html,
            Err(e) => {
                counter!("extract_errors_total", "kind" => e.kind()).increment(1);
                return Err(e);
            }
        };
        histogram!("extract_render_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);

        let entries = self.extractor.extract(&html, Utc::now());
        tracing::info!(
            target: "extract",
            url = %self.target_url,
            html_bytes = html.len(),
            entries = entries.len(),
            "page extracted"
        );
        Ok(entries)
    }

    fn name(&self) -> &str {
        self.extractor.source()
    }
}
