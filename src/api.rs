// src/api.rs
use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde_json::json;
use tower_http::cors::CorsLayer;

use crate::metrics::Metrics;
use crate::pipeline::{Orchestrator, RunOutcome, RunTrigger};

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(orchestrator: Arc<Orchestrator>, metrics: Metrics) -> Self {
        Self {
            orchestrator,
            metrics,
        }
    }
}

pub fn router(state: AppState) -> Router {
    let metrics = state.metrics.router();
    Router::new()
        .route("/", get(info))
        .route("/health", get(health))
        .route("/sync", post(sync_now))
        .route("/sync/status", get(sync_status))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
        .merge(metrics)
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

async fn info() -> Json<serde_json::Value> {
    Json(json!({
        "message": "Card listing sync service",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "health": "GET /health",
            "metrics": "GET /metrics",
            "sync": "POST /sync",
            "status": "GET /sync/status",
        },
    }))
}

/// Run a sync now and answer with its outcome.
async fn sync_now(State(st): State<AppState>) -> Response {
    let outcome = st.orchestrator.trigger(RunTrigger::Manual).await;
    let code = match &outcome {
        RunOutcome::Completed(_) => StatusCode::OK,
        RunOutcome::Skipped => StatusCode::CONFLICT,
        RunOutcome::Failed { .. } => StatusCode::BAD_GATEWAY,
        RunOutcome::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
    };
    (code, Json(outcome)).into_response()
}

async fn sync_status(State(st): State<AppState>) -> impl IntoResponse {
    Json(st.orchestrator.status())
}
