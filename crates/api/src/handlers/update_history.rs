//! `/update-history`: an aggregated read over every CVE's
//! `modification_history`, independent of any single CVE's detail view.

use crate::state::AppState;
use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/update-history/recent", get(recent))
        .route("/update-history/stats", get(stats))
}

#[derive(Debug, Deserialize)]
struct RecentQuery {
    days: Option<i64>,
    #[serde(default)]
    crawlers_only: bool,
    username: Option<String>,
    page: Option<u32>,
    limit: Option<u32>,
}

async fn recent(
    State(state): State<AppState>,
    Query(query): Query<RecentQuery>,
) -> cve_core::Result<Json<Value>> {
    let page = query.page.unwrap_or(1).max(1);
    let limit = query.limit.unwrap_or(20).clamp(1, 100);
    let skip = u64::from(page - 1) * u64::from(limit);

    let crawler_usernames = state.crawler_registry.source_names();

    let (total, items) = state
        .cve_service
        .update_history_recent(
            query.days.unwrap_or(30),
            query.crawlers_only,
            &crawler_usernames,
            query.username.as_deref(),
            i64::from(limit),
            skip,
        )
        .await?;

    Ok(Json(json!({"total": total, "items": items, "page": page, "limit": limit})))
}

#[derive(Debug, Deserialize)]
struct StatsQuery {
    days: Option<i64>,
}

async fn stats(
    State(state): State<AppState>,
    Query(query): Query<StatsQuery>,
) -> cve_core::Result<Json<Value>> {
    let stats = state.cve_service.update_history_stats(query.days.unwrap_or(30)).await?;
    Ok(Json(json!(stats)))
}
