//! User activity log.
//!
//! Every mutation that passes through the CVE upsert engine, every
//! login/logout, and every comment mutation writes one append-only
//! [`UserActivity`] record. `log` is the decorator-like entry point other
//! services call so they don't duplicate record construction; the three
//! read paths (by user, by target, combined filter) all funnel through the
//! store's [`ActivityFilter`]-driven query.

use cve_core::{
    ActivityAction, ActivityFilter, ActivityTargetType, ChangeRecord, CveStore, Result,
    UserActivity,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::warn;

#[derive(Debug, Serialize)]
pub struct ActivityListResult {
    pub total: u64,
    pub items: Vec<UserActivity>,
    pub page: u32,
    pub limit: u32,
}

pub struct ActivityService {
    store: Arc<CveStore>,
}

impl ActivityService {
    pub fn new(store: Arc<CveStore>) -> Self {
        Self { store }
    }

    /// Appends a record. Failures are logged, not propagated — a dropped
    /// activity record must never fail the mutation it describes.
    pub async fn log(
        &self,
        username: &str,
        action: ActivityAction,
        target_type: ActivityTargetType,
        target_id: impl Into<String>,
        target_title: Option<String>,
        changes: Vec<ChangeRecord>,
    ) {
        let activity = UserActivity {
            id: None,
            username: username.to_string(),
            timestamp: cve_core::clock::now(),
            action,
            target_type,
            target_id: target_id.into(),
            target_title,
            changes,
        };
        if let Err(e) = self.store.append_activity(&activity).await {
            warn!(error = %e, username, "failed to record activity");
        }
    }

    pub async fn by_username(
        &self,
        username: &str,
        page: u32,
        limit: u32,
    ) -> Result<ActivityListResult> {
        let filter = ActivityFilter::builder().username(username).build();
        self.query(&filter, page, limit).await
    }

    pub async fn by_target(
        &self,
        target_type: ActivityTargetType,
        target_id: &str,
        page: u32,
        limit: u32,
    ) -> Result<ActivityListResult> {
        let filter = ActivityFilter::builder()
            .target_types(vec![target_type])
            .target_id(target_id)
            .build();
        self.query(&filter, page, limit).await
    }

    pub async fn query(
        &self,
        filter: &ActivityFilter,
        page: u32,
        limit: u32,
    ) -> Result<ActivityListResult> {
        let page = page.max(1);
        let limit = limit.clamp(1, 100);
        let skip = u64::from(page - 1) * u64::from(limit);

        let (total, items) = self.store.list_activities(filter, i64::from(limit), skip).await?;
        Ok(ActivityListResult { total, items, page, limit })
    }

    /// The 30-day (configurable) retention sweep: deletes activity records
    /// older than `retention`.
    pub async fn purge_older_than(&self, retention: chrono::Duration) -> Result<u64> {
        let cutoff = cve_core::clock::now() - retention;
        self.store.delete_activities_older_than(cutoff).await
    }
}
