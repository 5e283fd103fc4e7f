// src/metrics.rs
use axum::{routing::get, Router};
use metrics::{describe_counter, describe_gauge, describe_histogram, Unit};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

static HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

#[derive(Clone)]
pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the Prometheus recorder once per process; later calls reuse it.
    pub fn init() -> anyhow::Result<Self> {
        let handle = HANDLE.get_or_try_init(|| {
            let handle = PrometheusBuilder::new().install_recorder()?;
            describe_all();
            Ok::<_, anyhow::Error>(handle)
        })?;
        Ok(Self {
            handle: handle.clone(),
        })
    }

    /// Returns a router exposing `/metrics` with the Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}

fn describe_all() {
    describe_counter!("sync_runs_total", "Sync runs by outcome");
    describe_histogram!("sync_run_ms", Unit::Milliseconds, "Duration of successful runs");
    describe_gauge!("sync_last_success_ts", Unit::Seconds, "Unix time of the last successful run");
    describe_counter!("sync_listings_synced_total", "Listings persisted by successful runs");
    describe_counter!("extract_entries_total", "Entries produced by the selector cascade");
    describe_counter!("extract_errors_total", "Extraction failures by kind");
    describe_histogram!("extract_render_ms", Unit::Milliseconds, "Browser render time");
    describe_counter!("store_upserts_total", "Repository writes by operation");
    describe_histogram!("store_save_ms", Unit::Milliseconds, "Repository batch save time");
    describe_counter!("notify_messages_total", "Delivered notification messages");
    describe_counter!("notify_failures_total", "Notification messages that failed to send");
}
