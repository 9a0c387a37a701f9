use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use std::sync::atomic::Ordering;

use crate::http::server::AppState;
use crate::security::rate_limit::WindowStore;

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub uptime_secs: u64,
    pub requests_seen: usize,
    pub tracked_windows: usize,
    pub stages: Vec<&'static str>,
}

#[derive(Serialize)]
pub struct RateLimitSummary {
    pub tracked_windows: usize,
}

#[derive(Serialize)]
pub struct ResetResult {
    pub key: String,
    pub cleared: Vec<&'static str>,
}

pub async fn get_status(State(state): State<AppState>) -> Json<SystemStatus> {
    let inner = state.inner.load();
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        uptime_secs: inner.started_at.elapsed().as_secs(),
        requests_seen: inner.request_count.load(Ordering::Relaxed),
        tracked_windows: inner.window_store.tracked(),
        stages: inner.pipeline.stage_names(),
    })
}

pub async fn get_ratelimit(State(state): State<AppState>) -> Json<RateLimitSummary> {
    let inner = state.inner.load();
    Json(RateLimitSummary {
        tracked_windows: inner.window_store.tracked(),
    })
}

/// Reset every window (all profiles and the delay counter) for a client.
pub async fn reset_ratelimit(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<ResetResult>, StatusCode> {
    let inner = state.inner.load();
    let mut cleared = Vec::new();
    for namespace in ["auth", "api", "payment", "delay"] {
        if inner.window_store.reset(&format!("{namespace}:{key}")) {
            cleared.push(namespace);
        }
    }
    if cleared.is_empty() {
        return Err(StatusCode::NOT_FOUND);
    }
    tracing::info!(client = %key, ?cleared, "Rate-limit windows reset by admin");
    Ok(Json(ResetResult { key, cleared }))
}
