//! Crawler REST surface: manual trigger, status, and the
//! registry listing.

use crate::state::AppState;
use axum::{
    extract::{Extension, Path, State},
    middleware::from_fn,
    routing::{get, post},
    Json, Router,
};
use cve_auth::require_admin;
use cve_core::RequestContext;
use cve_domain::RunStatus;
use serde_json::{json, Value};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/crawlers/run/:id", post(run).route_layer(from_fn(require_admin)))
        .route("/crawlers/status", get(status))
        .route("/crawlers/available", get(available))
}

async fn run(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<String>,
) -> cve_core::Result<Json<Value>> {
    let status = state.crawler_scheduler.run(&id, ctx.username.clone(), false).await?;
    match status {
        RunStatus::Started => Ok(Json(json!({"status": "running", "crawler_id": id}))),
        RunStatus::AlreadyRunning { progress } => {
            Ok(Json(json!({"status": "already_running", "crawler_id": id, "progress": progress})))
        }
    }
}

/// `{isRunning, lastUpdate, results}`, one entry per registered crawler.
async fn status(State(state): State<AppState>) -> cve_core::Result<Json<Value>> {
    let mut results = Vec::new();
    for (crawler_id, _) in state.crawler_registry.list_available() {
        results.push(state.crawler_scheduler.status(crawler_id).await?);
    }

    let is_running = results.iter().any(|r: &cve_domain::CrawlerStatus| r.is_running);
    let last_update = results.iter().filter_map(|r| r.last_update).max();

    Ok(Json(json!({
        "isRunning": is_running,
        "lastUpdate": last_update,
        "results": results,
    })))
}

async fn available(State(state): State<AppState>) -> Json<Value> {
    let items: Vec<Value> = state
        .crawler_registry
        .list_available()
        .into_iter()
        .map(|(id, display_name)| json!({"crawler_id": id, "display_name": display_name}))
        .collect();
    Json(json!({"crawlers": items}))
}
