//! Comment management on CVE records.
//!
//! Comments live as a flat embedded list on the CVE document; threading is
//! expressed through `parent_id` with the depth precomputed at insert time
//! and hard-capped. Soft delete is the default so replies keep their
//! anchor; permanent removal is reserved for administrators. Comment
//! mutations only stale the single detail view, never the list caches.

use crate::activity::ActivityService;
use crate::notification::{extract_mentions, NotificationService};
use cve_core::{
    ActivityAction, ActivityTargetType, Comment, Cve, CveStore, Error, ResponseCache, Result,
};
use cve_push::{events, PushFabric, PushTarget};
use serde_json::json;
use std::sync::Arc;

pub struct CommentService {
    store: Arc<CveStore>,
    cache: Arc<ResponseCache>,
    push: PushFabric,
    activity: Arc<ActivityService>,
    notifications: Arc<NotificationService>,
}

impl CommentService {
    pub fn new(
        store: Arc<CveStore>,
        cache: Arc<ResponseCache>,
        push: PushFabric,
        activity: Arc<ActivityService>,
        notifications: Arc<NotificationService>,
    ) -> Self {
        Self { store, cache, push, activity, notifications }
    }

    pub async fn add(
        &self,
        cve_id: &str,
        content: &str,
        parent_id: Option<String>,
        author: &str,
    ) -> Result<Comment> {
        if content.trim().is_empty() {
            return Err(Error::validation("Comment content must not be empty"));
        }

        let canonical = Cve::canonical_id(cve_id);
        let cve = self
            .store
            .find_cve(&canonical)
            .await?
            .ok_or_else(|| Error::not_found(format!("{canonical} not found")))?;

        let depth = resolve_depth(&cve.comments, parent_id.as_deref())?;
        let now = cve_core::clock::now();
        let comment = Comment {
            id: cve_core::clock::new_id(),
            content: content.to_string(),
            created_by: author.to_string(),
            parent_id,
            depth,
            is_deleted: false,
            created_at: now,
            last_modified_at: now,
            mentions: extract_mentions(content),
        };

        self.store.push_cve_comment(&canonical, &comment).await?;
        let active_count = active_comment_count(&cve.comments) + 1;
        self.after_comment_write(&canonical, events::COMMENT_ADDED, &comment.id, active_count)
            .await;

        self.notifications.notify_mentions(content, author, &canonical).await;
        self.activity
            .log(
                author,
                ActivityAction::Add,
                ActivityTargetType::Comment,
                comment.id.clone(),
                Some(canonical),
                Vec::new(),
            )
            .await;

        Ok(comment)
    }

    /// Rewrites a comment's content. Only the author may edit; mentions are
    /// recomputed and newly-mentioned users are notified.
    pub async fn update(
        &self,
        cve_id: &str,
        comment_id: &str,
        content: &str,
        editor: &str,
    ) -> Result<()> {
        if content.trim().is_empty() {
            return Err(Error::validation("Comment content must not be empty"));
        }

        let canonical = Cve::canonical_id(cve_id);
        let cve = self
            .store
            .find_cve(&canonical)
            .await?
            .ok_or_else(|| Error::not_found(format!("{canonical} not found")))?;
        let existing = cve
            .comments
            .iter()
            .find(|c| c.id == comment_id)
            .ok_or_else(|| Error::not_found("Comment not found"))?;

        if existing.created_by != editor {
            return Err(Error::forbidden("Only the author may edit a comment"));
        }
        if existing.is_deleted {
            return Err(Error::validation("Cannot edit a deleted comment"));
        }

        let mentions = extract_mentions(content);
        let matched = self
            .store
            .update_cve_comment(&canonical, comment_id, content, &mentions, cve_core::clock::now())
            .await?;
        if !matched {
            return Err(Error::not_found("Comment not found"));
        }

        self.after_comment_write(
            &canonical,
            events::COMMENT_UPDATED,
            comment_id,
            active_comment_count(&cve.comments),
        )
        .await;

        self.notifications.notify_mentions(content, editor, &canonical).await;
        self.activity
            .log(
                editor,
                ActivityAction::Update,
                ActivityTargetType::Comment,
                comment_id.to_string(),
                Some(canonical),
                Vec::new(),
            )
            .await;
        Ok(())
    }

    /// Soft-deletes by default. `permanent` pulls the comment out of the
    /// document entirely and requires an administrator; soft delete is
    /// allowed to the author or an administrator.
    pub async fn delete(
        &self,
        cve_id: &str,
        comment_id: &str,
        requester: &str,
        is_admin: bool,
        permanent: bool,
    ) -> Result<()> {
        let canonical = Cve::canonical_id(cve_id);
        let cve = self
            .store
            .find_cve(&canonical)
            .await?
            .ok_or_else(|| Error::not_found(format!("{canonical} not found")))?;
        let existing = cve
            .comments
            .iter()
            .find(|c| c.id == comment_id)
            .ok_or_else(|| Error::not_found("Comment not found"))?;

        if permanent {
            if !is_admin {
                return Err(Error::forbidden("Permanent deletion requires an administrator"));
            }
            self.store.pull_cve_comment(&canonical, comment_id).await?;
        } else {
            if existing.created_by != requester && !is_admin {
                return Err(Error::forbidden("Only the author or an administrator may delete a comment"));
            }
            self.store
                .soft_delete_cve_comment(&canonical, comment_id, cve_core::clock::now())
                .await?;
        }

        let active_count = active_comment_count(&cve.comments)
            .saturating_sub(usize::from(!existing.is_deleted));
        self.after_comment_write(&canonical, events::COMMENT_DELETED, comment_id, active_count)
            .await;

        self.activity
            .log(
                requester,
                ActivityAction::Delete,
                ActivityTargetType::Comment,
                comment_id.to_string(),
                Some(canonical),
                Vec::new(),
            )
            .await;
        Ok(())
    }

    /// Comment mutations only stale the one detail view: list
    /// caches don't render comments, so they stay warm.
    async fn after_comment_write(
        &self,
        cve_id: &str,
        event: &str,
        comment_id: &str,
        active_count: usize,
    ) {
        if let Err(e) = self.cache.invalidate_cve_detail_only(cve_id).await {
            tracing::warn!(error = %e, cve_id, "failed to invalidate CVE detail after comment write");
        }
        self.push
            .emit(
                event,
                json!({"cve_id": cve_id, "comment_id": comment_id}),
                PushTarget::CveSubscribers(cve_id.to_string()),
            )
            .await;
        self.push
            .emit(
                events::COMMENT_COUNT_UPDATE,
                json!({"cve_id": cve_id, "count": active_count}),
                PushTarget::CveSubscribers(cve_id.to_string()),
            )
            .await;
    }
}

/// Root comments sit at depth 0; replies sit one below their parent. A
/// reply that would land past the cap is rejected, not clipped.
fn resolve_depth(comments: &[Comment], parent_id: Option<&str>) -> Result<u32> {
    let Some(parent_id) = parent_id else {
        return Ok(0);
    };
    let parent = comments
        .iter()
        .find(|c| c.id == parent_id)
        .ok_or_else(|| Error::validation("Parent comment not found"))?;
    let depth = parent.depth + 1;
    if depth > Comment::MAX_DEPTH {
        return Err(Error::validation(format!(
            "Maximum comment depth ({}) exceeded",
            Comment::MAX_DEPTH
        )));
    }
    Ok(depth)
}

fn active_comment_count(comments: &[Comment]) -> usize {
    comments.iter().filter(|c| !c.is_deleted).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn comment(id: &str, parent_id: Option<&str>, depth: u32) -> Comment {
        let now = cve_core::clock::now();
        Comment {
            id: id.to_string(),
            content: "hello".to_string(),
            created_by: "alice".to_string(),
            parent_id: parent_id.map(str::to_string),
            depth,
            is_deleted: false,
            created_at: now,
            last_modified_at: now,
            mentions: Vec::new(),
        }
    }

    #[test]
    fn root_comment_gets_depth_zero() {
        assert_eq!(resolve_depth(&[], None).unwrap(), 0);
    }

    #[test]
    fn reply_depth_is_parent_plus_one() {
        let comments = vec![comment("c1", None, 0), comment("c2", Some("c1"), 1)];
        assert_eq!(resolve_depth(&comments, Some("c2")).unwrap(), 2);
    }

    #[test]
    fn reply_to_unknown_parent_is_rejected() {
        assert!(resolve_depth(&[], Some("ghost")).is_err());
    }

    #[test]
    fn reply_past_depth_cap_is_rejected() {
        let comments = vec![comment("deep", None, Comment::MAX_DEPTH)];
        let err = resolve_depth(&comments, Some("deep")).unwrap_err();
        assert_eq!(err.code, cve_core::ErrorCode::ValidationFailed);
    }

    #[test]
    fn deleted_comments_drop_out_of_the_active_count() {
        let mut comments = vec![comment("c1", None, 0), comment("c2", None, 0)];
        comments[1].is_deleted = true;
        assert_eq!(active_comment_count(&comments), 1);
    }
}
