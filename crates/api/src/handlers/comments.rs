//! Comment mutations on a CVE record. Reads come through the CVE detail
//! view (comments are embedded), so only the write paths live here.

use crate::state::AppState;
use axum::{
    extract::{Extension, Path, Query, State},
    routing::post,
    Json, Router,
};
use cve_core::{Error, ErrorCode, RequestContext};
use serde::Deserialize;
use serde_json::{json, Value};

pub fn routes() -> Router<AppState> {
    Router::new().route("/cves/:id/comments", post(add)).route(
        "/cves/:id/comments/:comment_id",
        axum::routing::patch(update).delete(remove),
    )
}

#[derive(Debug, Deserialize)]
struct AddCommentRequest {
    content: String,
    parent_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UpdateCommentRequest {
    content: String,
}

#[derive(Debug, Deserialize)]
struct DeleteQuery {
    #[serde(default)]
    permanent: bool,
}

async fn add(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<String>,
    Json(request): Json<AddCommentRequest>,
) -> cve_core::Result<Json<Value>> {
    let author = username_of(&ctx)?;
    let comment = state
        .comment_service
        .add(&id, &request.content, request.parent_id, author)
        .await?;
    Ok(Json(json!(comment)))
}

async fn update(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path((id, comment_id)): Path<(String, String)>,
    Json(request): Json<UpdateCommentRequest>,
) -> cve_core::Result<Json<Value>> {
    let editor = username_of(&ctx)?;
    state
        .comment_service
        .update(&id, &comment_id, &request.content, editor)
        .await?;
    Ok(Json(json!({"status": "updated"})))
}

async fn remove(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path((id, comment_id)): Path<(String, String)>,
    Query(query): Query<DeleteQuery>,
) -> cve_core::Result<Json<Value>> {
    let requester = username_of(&ctx)?;
    state
        .comment_service
        .delete(&id, &comment_id, requester, ctx.is_admin, query.permanent)
        .await?;
    Ok(Json(json!({"status": "deleted"})))
}

fn username_of(ctx: &RequestContext) -> cve_core::Result<&str> {
    ctx.username
        .as_deref()
        .ok_or_else(|| Error::new(ErrorCode::AuthenticationRequired, "Missing principal"))
}
