//! Liveness (`/health`) and readiness (`/ready`) probes.
//!
//! Liveness never touches a dependency — it answers as long as the process
//! is scheduling tasks. Readiness round-trips MongoDB and Redis so a load
//! balancer stops routing to an instance that can't actually serve a
//! request.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

use crate::state::AppState;

/// Prometheus text-format exposition. Returns a placeholder body when
/// metrics are disabled rather than a 404, so scrape configs don't need to
/// special-case environments.
pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    (StatusCode::OK, state.metrics.get_metrics())
}

#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service is alive")),
    tag = "health"
)]
pub async fn health_check() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "service": "cve-api",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

#[utoipa::path(
    get,
    path = "/ready",
    responses(
        (status = 200, description = "Service is ready"),
        (status = 503, description = "A dependency is unreachable")
    ),
    tag = "health"
)]
pub async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    let (store_healthy, cache_healthy) = state.check_ready().await;
    let is_ready = store_healthy && cache_healthy;

    let status = if is_ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (
        status,
        Json(json!({
            "ready": is_ready,
            "checks": {"mongodb": store_healthy, "redis": cache_healthy},
        })),
    )
}
