//! CVE upsert REST surface: list/detail/create/patch/delete,
//! the edit-lock pair, and bulk upsert.

use crate::state::AppState;
use axum::{
    extract::{Extension, Path, Query, State},
    middleware::from_fn,
    routing::{delete, get, post},
    Json, Router,
};
use cve_auth::require_admin;
use cve_core::{CveState, Error, ErrorCode, RequestContext, Severity};
use cve_domain::{CveFilters, CveUpsertItem};
use serde::Deserialize;
use serde_json::Value;

/// `DELETE /cves/{id}` is admin-only; it's registered on its own
/// sub-router so `route_layer` gates just that one method instead of the
/// whole `/cves/:id` path.
pub fn routes() -> Router<AppState> {
    let admin_only = Router::new()
        .route("/cves/:id", delete(remove))
        .route_layer(from_fn(require_admin));

    Router::new()
        .route("/cves", get(list).post(create))
        .route("/cves/stats", get(stats))
        .route("/cves/bulk", post(bulk))
        .route("/cves/:id", get(detail).patch(update))
        .route("/cves/:id/lock", post(acquire_lock).delete(release_lock))
        .merge(admin_only)
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    page: Option<u32>,
    limit: Option<u32>,
    status: Option<CveState>,
    severity: Option<Severity>,
    search: Option<String>,
}

async fn list(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> cve_core::Result<Json<Value>> {
    let result = state
        .cve_service
        .get_list(
            query.page.unwrap_or(1),
            query.limit.unwrap_or(20),
            CveFilters { status: query.status, severity: query.severity, search: query.search },
        )
        .await?;
    Ok(Json(serde_json::json!(result)))
}

async fn stats(State(state): State<AppState>) -> cve_core::Result<Json<Value>> {
    let stats = state.cve_service.stats().await?;
    Ok(Json(serde_json::json!(stats)))
}

async fn detail(State(state): State<AppState>, Path(id): Path<String>) -> cve_core::Result<Json<Value>> {
    let cve = state
        .cve_service
        .get_detail(&id)
        .await?
        .ok_or_else(|| Error::not_found(format!("{id} not found")))?;
    Ok(Json(serde_json::json!(cve)))
}

async fn create(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Json(item): Json<CveUpsertItem>,
) -> cve_core::Result<Json<Value>> {
    let creator = username_of(&ctx)?;
    let cve = state.cve_service.create(item, creator).await?;
    Ok(Json(serde_json::json!(cve)))
}

async fn update(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<String>,
    Json(patch): Json<Value>,
) -> cve_core::Result<Json<Value>> {
    let updater = username_of(&ctx)?;
    let cve = state.cve_service.update(&id, patch, updater).await?;
    Ok(Json(serde_json::json!(cve)))
}

async fn remove(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<String>,
) -> cve_core::Result<Json<Value>> {
    let deleter = username_of(&ctx)?;
    let deleted = state.cve_service.delete(&id, deleter).await?;
    if !deleted {
        return Err(Error::not_found(format!("{id} not found")));
    }
    Ok(Json(serde_json::json!({"deleted": true})))
}

async fn bulk(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Json(items): Json<Vec<CveUpsertItem>>,
) -> cve_core::Result<Json<Value>> {
    let creator = username_of(&ctx)?;
    let result = state.cve_service.bulk_upsert(items, creator).await;
    Ok(Json(serde_json::json!(result)))
}

async fn acquire_lock(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<String>,
) -> cve_core::Result<Json<Value>> {
    let username = username_of(&ctx)?;
    let cve = state.cve_service.acquire_lock(&id, username).await?;
    Ok(Json(serde_json::json!(cve)))
}

async fn release_lock(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<String>,
) -> cve_core::Result<Json<Value>> {
    let username = username_of(&ctx)?;
    let cve = state.cve_service.release_lock(&id, username).await?;
    Ok(Json(serde_json::json!(cve)))
}

fn username_of(ctx: &RequestContext) -> cve_core::Result<&str> {
    ctx.username
        .as_deref()
        .ok_or_else(|| Error::new(ErrorCode::AuthenticationRequired, "Missing principal"))
}
