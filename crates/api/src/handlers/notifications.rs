//! Notification REST surface: paged list with total/unread count
//! headers, plus the three read-state mutations.

use crate::state::AppState;
use axum::{
    extract::{Extension, Path, Query, State},
    http::HeaderMap,
    routing::{get, post, put},
    Json, Router,
};
use cve_core::{Error, ErrorCode, RequestContext};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/notifications", get(list))
        .route("/notifications/:id/read", put(mark_one_read))
        .route("/notifications/read-all", put(mark_all_read))
        .route("/notifications/read-multiple", post(mark_many_read))
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    skip: Option<u64>,
    limit: Option<u32>,
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MarkManyRequest {
    notification_ids: Vec<Uuid>,
}

async fn list(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Query(query): Query<ListQuery>,
) -> cve_core::Result<(HeaderMap, Json<Value>)> {
    let recipient = username_of(&ctx)?;
    let unread_only = query.status.as_deref() == Some("unread");
    let result = state
        .notification_service
        .list_for_skip(recipient, unread_only, query.skip.unwrap_or(0), query.limit.unwrap_or(20))
        .await?;
    let unread_count = state.notification_service.unread_count(recipient).await?;

    let mut headers = HeaderMap::new();
    headers.insert("x-total-count", result.total.into());
    headers.insert("x-unread-count", unread_count.into());
    Ok((headers, Json(json!(result))))
}

async fn mark_one_read(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<Uuid>,
) -> cve_core::Result<Json<Value>> {
    let recipient = username_of(&ctx)?;
    state.notification_service.mark_read(id, recipient).await?;
    Ok(Json(json!({"status": "read"})))
}

async fn mark_all_read(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
) -> cve_core::Result<Json<Value>> {
    let recipient = username_of(&ctx)?;
    let count = state.notification_service.mark_all_read(recipient).await?;
    Ok(Json(json!({"marked": count})))
}

async fn mark_many_read(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Json(request): Json<MarkManyRequest>,
) -> cve_core::Result<Json<Value>> {
    let recipient = username_of(&ctx)?;
    let count = state
        .notification_service
        .mark_many_read(&request.notification_ids, recipient)
        .await?;
    Ok(Json(json!({"marked": count})))
}

fn username_of(ctx: &RequestContext) -> cve_core::Result<&str> {
    ctx.username
        .as_deref()
        .ok_or_else(|| Error::new(ErrorCode::AuthenticationRequired, "Missing principal"))
}
