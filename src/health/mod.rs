//! Health check endpoints
//!
//! Per-worker liveness, readiness and Prometheus metrics.

use crate::gateway::state::ShardState;
use crate::metrics::SwarmMetrics;
use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub worker_index: usize,
}

/// Readiness check response
#[derive(Debug, Serialize)]
pub struct ReadyResponse {
    pub ready: bool,
    pub worker_index: usize,
    pub shards_total: usize,
    pub shards_connected: usize,
    pub shards_failed: usize,
    pub guilds_total: u64,
}

/// Application state for health endpoints
#[derive(Clone)]
pub struct AppState {
    pub shard_state: ShardState,
    pub metrics: Option<Arc<SwarmMetrics>>,
}

/// Create the health check router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/ready", get(ready_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

/// Health endpoint - always returns 200 if process is running
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        worker_index: state.shard_state.worker_index(),
    })
}

/// Readiness endpoint - returns 200 if at least one shard is connected
async fn ready_handler(State(state): State<AppState>) -> impl IntoResponse {
    let shards_connected = state.shard_state.connected_shards();
    let is_ready = state.shard_state.is_ready();

    let response = ReadyResponse {
        ready: is_ready,
        worker_index: state.shard_state.worker_index(),
        shards_total: state.shard_state.shard_count(),
        shards_connected,
        shards_failed: state.shard_state.failed_shards(),
        guilds_total: state.shard_state.total_guilds(),
    };

    if is_ready {
        (StatusCode::OK, Json(response))
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(response))
    }
}

/// Metrics endpoint - returns Prometheus format metrics
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    let Some(metrics) = state.metrics else {
        return (StatusCode::NOT_FOUND, "metrics recorder not installed").into_response();
    };

    metrics.set_shards_connected(
        state.shard_state.worker_index(),
        state.shard_state.connected_shards(),
    );

    (
        StatusCode::OK,
        [(axum::http::header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        metrics.render(),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::state::ShardPhase;

    #[test]
    fn health_response_serializes() {
        let response = HealthResponse {
            status: "healthy",
            version: "0.1.0",
            worker_index: 0,
        };

        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("healthy"));
    }

    #[test]
    fn ready_response_reflects_shard_phases() {
        let state = ShardState::new(1, [4u64, 5].into_iter(), 10);
        state.set_phase(4, ShardPhase::Connected);
        state.set_phase(5, ShardPhase::Failed);

        let response = ReadyResponse {
            ready: state.is_ready(),
            worker_index: state.worker_index(),
            shards_total: state.shard_count(),
            shards_connected: state.connected_shards(),
            shards_failed: state.failed_shards(),
            guilds_total: state.total_guilds(),
        };

        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("\"ready\":true"));
        assert!(json.contains("\"shards_failed\":1"));
    }
}
