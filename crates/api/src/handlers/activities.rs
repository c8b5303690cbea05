//! User activity log queries: by user, by target, and a combined filter
//! with comma-separated OR on `target_type`/`action` plus an inclusive
//! timestamp range.

use crate::state::AppState;
use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use cve_core::{ActivityAction, ActivityFilter, ActivityTargetType, Error};
use serde::Deserialize;
use serde_json::{json, Value};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/activities", get(query))
        .route("/activities/user/:username", get(by_user))
        .route("/activities/target/:target_type/:target_id", get(by_target))
}

#[derive(Debug, Deserialize)]
struct Paging {
    page: Option<u32>,
    limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct CombinedQuery {
    target_type: Option<String>,
    action: Option<String>,
    username: Option<String>,
    target_id: Option<String>,
    start_time: Option<chrono::DateTime<chrono::Utc>>,
    end_time: Option<chrono::DateTime<chrono::Utc>>,
    page: Option<u32>,
    limit: Option<u32>,
}

async fn query(
    State(state): State<AppState>,
    Query(query): Query<CombinedQuery>,
) -> cve_core::Result<Json<Value>> {
    let mut builder = ActivityFilter::builder();
    if let Some(raw) = &query.target_type {
        builder = builder.target_types(parse_csv::<ActivityTargetType>(raw, "target_type")?);
    }
    if let Some(raw) = &query.action {
        builder = builder.actions(parse_csv::<ActivityAction>(raw, "action")?);
    }
    if let Some(username) = &query.username {
        builder = builder.username(username.as_str());
    }
    if let Some(target_id) = &query.target_id {
        builder = builder.target_id(target_id.as_str());
    }
    let filter = match (query.start_time, query.end_time) {
        (Some(start), Some(end)) => builder.time_range(start, end).build(),
        (start, end) => {
            let mut filter = builder.build();
            filter.start_time = start;
            filter.end_time = end;
            filter
        }
    };

    let result = state
        .activity_service
        .query(&filter, query.page.unwrap_or(1), query.limit.unwrap_or(20))
        .await?;
    Ok(Json(json!(result)))
}

async fn by_user(
    State(state): State<AppState>,
    Path(username): Path<String>,
    Query(paging): Query<Paging>,
) -> cve_core::Result<Json<Value>> {
    let result = state
        .activity_service
        .by_username(&username, paging.page.unwrap_or(1), paging.limit.unwrap_or(20))
        .await?;
    Ok(Json(json!(result)))
}

async fn by_target(
    State(state): State<AppState>,
    Path((target_type, target_id)): Path<(String, String)>,
    Query(paging): Query<Paging>,
) -> cve_core::Result<Json<Value>> {
    let target_type = parse_one::<ActivityTargetType>(&target_type, "target_type")?;
    let result = state
        .activity_service
        .by_target(target_type, &target_id, paging.page.unwrap_or(1), paging.limit.unwrap_or(20))
        .await?;
    Ok(Json(json!(result)))
}

/// Parses a comma-separated OR list (`?target_type=cve,comment`) into the
/// typed enum values, rejecting unknown tokens rather than dropping them.
fn parse_csv<T: serde::de::DeserializeOwned>(raw: &str, field: &str) -> cve_core::Result<Vec<T>> {
    raw.split(',')
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(|token| parse_one(token, field))
        .collect()
}

fn parse_one<T: serde::de::DeserializeOwned>(token: &str, field: &str) -> cve_core::Result<T> {
    serde_json::from_value(Value::String(token.to_string()))
        .map_err(|_| Error::validation(format!("Unknown {field} value: {token}")))
}
