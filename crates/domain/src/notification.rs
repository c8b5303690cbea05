//! Notifications: created by mention extraction, CVE state
//! transitions, and explicit API calls; delivered best-effort over the
//! push fabric; queried paged, by status, and by unread count.

use cve_core::{CveStore, Error, Notification, NotificationStatus, NotificationType, Result};
use cve_push::{events, PushFabric, PushTarget};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

static MENTION_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"@([A-Za-z0-9_.-]+)").unwrap());

/// Extracts the set of usernames mentioned via `@username` in `content`,
/// in first-appearance order with duplicates removed.
pub fn extract_mentions(content: &str) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut mentions = Vec::new();
    for capture in MENTION_RE.captures_iter(content) {
        let username = capture[1].to_string();
        if seen.insert(username.clone()) {
            mentions.push(username);
        }
    }
    mentions
}

#[derive(Debug, Serialize)]
pub struct NotificationListResult {
    pub total: u64,
    pub items: Vec<Notification>,
    pub page: u32,
    pub limit: u32,
}

pub struct NotificationService {
    store: Arc<CveStore>,
    push: PushFabric,
}

impl NotificationService {
    pub fn new(store: Arc<CveStore>, push: PushFabric) -> Self {
        Self { store, push }
    }

    /// Persists the notification unread/undelivered, then best-effort
    /// delivers it in real time. Delivery failure never aborts creation —
    /// it's only ever logged.
    pub async fn create(
        &self,
        notification_type: NotificationType,
        recipient_id: &str,
        content: impl Into<String>,
        sender_id: Option<String>,
        cve_id: Option<String>,
        metadata: serde_json::Value,
    ) -> Result<Notification> {
        let notification = Notification {
            id: Some(Uuid::new_v4()),
            recipient_id: recipient_id.to_string(),
            sender_id,
            notification_type,
            content: content.into(),
            cve_id,
            metadata,
            status: NotificationStatus::Unread,
            delivered: false,
            created_at: cve_core::clock::now(),
            read_at: None,
        };

        self.store.insert_notification(&notification).await?;
        self.deliver(&notification).await;
        Ok(notification)
    }

    /// One notification per unique `@username` found in `content`, skipping
    /// the author mentioning themself.
    pub async fn notify_mentions(
        &self,
        content: &str,
        author: &str,
        cve_id: &str,
    ) -> Vec<Notification> {
        let mut created = Vec::new();
        for username in extract_mentions(content) {
            if username == author {
                continue;
            }
            let display = format!("@{author}");
            let message = format!("{display} mentioned you in a comment on {cve_id}");
            match self
                .create(
                    NotificationType::Mention,
                    &username,
                    message,
                    Some(author.to_string()),
                    Some(cve_id.to_string()),
                    json!({}),
                )
                .await
            {
                Ok(notification) => created.push(notification),
                Err(e) => warn!(error = %e, username, "failed to create mention notification"),
            }
        }
        created
    }

    /// Notifies a CVE's assignee that its state changed, if it has one.
    pub async fn notify_state_transition(
        &self,
        cve_id: &str,
        assignee: Option<&str>,
        new_status: &str,
        actor: &str,
    ) {
        let Some(assignee) = assignee else { return };
        if assignee == actor {
            return;
        }
        let message = format!("{cve_id} moved to {new_status}");
        if let Err(e) = self
            .create(
                NotificationType::CveUpdate,
                assignee,
                message,
                Some(actor.to_string()),
                Some(cve_id.to_string()),
                json!({"status": new_status}),
            )
            .await
        {
            warn!(error = %e, cve_id, "failed to create state-transition notification");
        }
    }

    async fn deliver(&self, notification: &Notification) {
        let Some(id) = notification.id else { return };
        let unread_count = self
            .store
            .count_unread_notifications(&notification.recipient_id)
            .await
            .unwrap_or(0);

        let receivers = self
            .push
            .emit(
                events::NOTIFICATION,
                json!({"notification": notification, "unreadCount": unread_count}),
                PushTarget::Username(notification.recipient_id.clone()),
            )
            .await;

        // A recipient with no live session keeps `delivered = false`; they
        // pick the notification up from the REST list on next login.
        if receivers == 0 {
            return;
        }
        if let Err(e) = self.store.mark_notification_delivered(id).await {
            warn!(error = %e, notification_id = %id, "failed to mark notification delivered");
        }
    }

    pub async fn list_for(
        &self,
        recipient_id: &str,
        unread_only: bool,
        page: u32,
        limit: u32,
    ) -> Result<NotificationListResult> {
        let page = page.max(1);
        let limit = limit.clamp(1, 100);
        let skip = u64::from(page - 1) * u64::from(limit);
        self.list_for_skip(recipient_id, unread_only, skip, limit).await
    }

    /// Same query, addressed by `skip` directly rather than a page number —
    /// matches the REST surface's `?skip&limit` pagination for this endpoint.
    pub async fn list_for_skip(
        &self,
        recipient_id: &str,
        unread_only: bool,
        skip: u64,
        limit: u32,
    ) -> Result<NotificationListResult> {
        let limit = limit.clamp(1, 100);
        let page = u32::try_from(skip / u64::from(limit)).unwrap_or(0) + 1;

        let (total, items) = self
            .store
            .list_notifications_for(recipient_id, unread_only, i64::from(limit), skip)
            .await?;
        Ok(NotificationListResult { total, items, page, limit })
    }

    pub async fn unread_count(&self, recipient_id: &str) -> Result<u64> {
        self.store.count_unread_notifications(recipient_id).await
    }

    pub async fn mark_read(&self, notification_id: Uuid, recipient_id: &str) -> Result<()> {
        let marked = self
            .store
            .mark_notification_read(notification_id, recipient_id, cve_core::clock::now())
            .await?;
        if !marked {
            return Err(Error::not_found("notification not found"));
        }
        self.push_read_event(recipient_id, notification_id).await;
        Ok(())
    }

    pub async fn mark_many_read(&self, notification_ids: &[Uuid], recipient_id: &str) -> Result<u64> {
        let count = self
            .store
            .mark_notifications_read(notification_ids, recipient_id, cve_core::clock::now())
            .await?;
        if count > 0 {
            for id in notification_ids {
                self.push_read_event(recipient_id, *id).await;
            }
        }
        Ok(count)
    }

    pub async fn mark_all_read(&self, recipient_id: &str) -> Result<u64> {
        let count = self
            .store
            .mark_all_notifications_read(recipient_id, cve_core::clock::now())
            .await?;
        if count > 0 {
            self.push
                .emit(
                    events::ALL_NOTIFICATIONS_READ,
                    json!({}),
                    PushTarget::Username(recipient_id.to_string()),
                )
                .await;
        }
        Ok(count)
    }

    async fn push_read_event(&self, recipient_id: &str, notification_id: Uuid) {
        self.push
            .emit(
                events::NOTIFICATION_READ,
                json!({"notification_id": notification_id}),
                PushTarget::Username(recipient_id.to_string()),
            )
            .await;
    }

    /// The optional 30-day (configurable) retention sweep.
    pub async fn purge_older_than(&self, retention: chrono::Duration) -> Result<u64> {
        let cutoff = cve_core::clock::now() - retention;
        self.store.delete_notifications_older_than(cutoff).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_unique_mentions_in_order() {
        let mentions = extract_mentions("hey @alice and @bob, also @alice again");
        assert_eq!(mentions, vec!["alice".to_string(), "bob".to_string()]);
    }

    #[test]
    fn ignores_bare_at_sign() {
        assert!(extract_mentions("look at this @ sign").is_empty());
    }
}
