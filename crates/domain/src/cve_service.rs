//! CVE upsert engine.
//!
//! The single write path for CVE documents: every create/update/replace
//! invalidates the cache and emits the matching push event
//! scoped to that CVE's subscribers after the commit returns.

use crate::activity::ActivityService;
use crate::change_detector;
use crate::notification::NotificationService;
use cve_core::{
    ActivityAction, ActivityTargetType, CacheKind, ChangeAction, Cve, CveState, Error, ErrorCode,
    ModificationHistoryEntry, Result, Severity,
};
use cve_push::{PushFabric, PushTarget};
use mongodb::bson::Document;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::warn;

pub struct CveService {
    store: Arc<cve_core::CveStore>,
    cache: Arc<cve_core::ResponseCache>,
    push: PushFabric,
    activity: Arc<ActivityService>,
    notifications: Arc<NotificationService>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CveFilters {
    pub status: Option<CveState>,
    pub severity: Option<Severity>,
    pub search: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CveListResult {
    pub total: u64,
    pub items: Vec<Cve>,
    pub page: u32,
    pub limit: u32,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CveStats {
    pub total_count: u64,
    pub high_severity_count: u64,
    pub new_last_week_count: u64,
    pub in_progress_count: u64,
    pub completed_count: u64,
}

#[derive(Debug, Serialize)]
pub struct BulkUpsertResult {
    pub success: std::collections::HashMap<String, &'static str>,
    pub errors: std::collections::HashMap<String, String>,
}

/// One item of a bulk-upsert batch or a single crawler-produced record,
/// identical in shape to what the three crawlers emit. `severity` arrives
/// as the raw upstream string and is normalized on write.
#[derive(Debug, Clone, Deserialize)]
pub struct CveUpsertItem {
    pub cve_id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, alias = "severity")]
    pub severity_raw: Option<String>,
    /// Upstream content digest (stored as `nuclei_hash`) used by crawlers
    /// as a skip-unchanged shortcut on later runs.
    #[serde(default)]
    pub source_hash: Option<String>,
    #[serde(default)]
    pub references: Vec<cve_core::Reference>,
    #[serde(default)]
    pub pocs: Vec<cve_core::ProofOfConcept>,
    #[serde(default)]
    pub snort_rules: Vec<cve_core::SnortRule>,
}

impl CveService {
    pub fn new(
        store: Arc<cve_core::CveStore>,
        cache: Arc<cve_core::ResponseCache>,
        push: PushFabric,
        activity: Arc<ActivityService>,
        notifications: Arc<NotificationService>,
    ) -> Self {
        Self { store, cache, push, activity, notifications }
    }

    pub async fn get_list(
        &self,
        page: u32,
        limit: u32,
        filters: CveFilters,
    ) -> Result<CveListResult> {
        let page = page.max(1);
        let limit = limit.clamp(1, 200);
        let skip = u64::from(page - 1) * u64::from(limit);

        let cache_key = list_cache_key(page, limit, &filters);
        if let Some(cached) = self
            .cache
            .get::<CveListResult>(CacheKind::CveList, &cache_key)
            .await?
        {
            return Ok(cached);
        }

        let (total, items) = self
            .store
            .list_cves_page(
                filters.status,
                filters.severity,
                filters.search.as_deref(),
                i64::from(limit),
                skip,
            )
            .await?;

        let result = CveListResult { total, items, page, limit };
        self.cache.set(CacheKind::CveList, &cache_key, &result).await.ok();
        Ok(result)
    }

    pub async fn get_detail(&self, cve_id: &str) -> Result<Option<Cve>> {
        let canonical = Cve::canonical_id(cve_id);
        if let Some(cached) = self.cache.get::<Cve>(CacheKind::CveDetail, &canonical).await? {
            return Ok(Some(cached));
        }
        let found = self.store.find_cve(cve_id).await?;
        if let Some(cve) = &found {
            self.cache.set(CacheKind::CveDetail, &canonical, cve).await.ok();
        }
        Ok(found)
    }

    /// Rejects malformed identifiers, and ids that already exist
    /// (case-insensitively).
    pub async fn create(&self, item: CveUpsertItem, creator: &str) -> Result<Cve> {
        if !cve_core::utils::is_valid_cve_id(&item.cve_id) {
            return Err(Error::validation(format!(
                "'{}' is not a valid CVE identifier",
                item.cve_id
            )));
        }
        let canonical = Cve::canonical_id(&item.cve_id);
        if self.store.find_cve(&canonical).await?.is_some() {
            return Err(Error::new(
                ErrorCode::CveAlreadyExists,
                format!("{canonical} already exists"),
            ));
        }

        let now = cve_core::clock::now();
        let severity = item
            .severity_raw
            .as_deref()
            .map(Severity::from_upstream)
            .unwrap_or(Severity::Unknown);

        let creation_summary = ModificationHistoryEntry {
            username: creator.to_string(),
            modified_at: now,
            changes: vec![cve_core::ChangeRecord {
                field: "cve_id".to_string(),
                field_label: "CVE".to_string(),
                action: ChangeAction::Add,
                detail_type: cve_core::DetailType::Simple,
                before: None,
                after: Some(canonical.clone()),
                summary: "신규 등록".to_string(),
            }],
        };

        let cve = Cve {
            id: None,
            cve_id: canonical.clone(),
            title: item.title,
            description: item.description,
            state: CveState::New,
            assignee: None,
            severity,
            created_at: now,
            last_modified_at: now,
            created_by: creator.to_string(),
            last_modified_by: creator.to_string(),
            nuclei_hash: item.source_hash,
            notes: None,
            edit_lock: cve_core::EditLock::default(),
            references: item.references,
            pocs: item.pocs,
            snort_rules: item.snort_rules,
            comments: Vec::new(),
            modification_history: vec![creation_summary],
        };

        self.store.put_cve(&cve).await?;
        self.after_write(&canonical, cve_push::events::CVE_CREATED).await;
        self.activity
            .log(
                creator,
                ActivityAction::Create,
                ActivityTargetType::Cve,
                canonical,
                Some(cve.title.clone()),
                cve.modification_history.last().map(|h| h.changes.clone()).unwrap_or_default(),
            )
            .await;
        Ok(cve)
    }

    /// Loads the current document, diffs `patch` against it with the change detector, and
    /// `$set`s only the changed fields plus a new history entry. Falls back
    /// to a full [`Self::replace`] if the partial update fails.
    pub async fn update(&self, cve_id: &str, patch: Value, updater: &str) -> Result<Cve> {
        let canonical = Cve::canonical_id(cve_id);
        let current = self
            .store
            .find_cve(&canonical)
            .await?
            .ok_or_else(|| Error::not_found(format!("{canonical} not found")))?;

        let mut patch_map = match patch {
            Value::Object(map) => map,
            _ => serde_json::Map::new(),
        };
        patch_map.remove("_id");
        patch_map.remove("cve_id");

        if let Some(raw) = patch_map.get("severity").and_then(|v| v.as_str()) {
            let normalized = Severity::from_upstream(raw);
            patch_map.insert("severity".to_string(), json!(normalized));
        }
        if let Some(status) = patch_map.get("status") {
            if serde_json::from_value::<CveState>(status.clone()).is_err() {
                return Err(Error::validation("Invalid status value"));
            }
        }

        let old_value = serde_json::to_value(&current)
            .map_err(|e| Error::internal(format!("failed to serialize current CVE: {e}")))?;
        let mut new_value = old_value.clone();
        if let Value::Object(new_map) = &mut new_value {
            for (key, value) in &patch_map {
                new_map.insert(key.clone(), value.clone());
            }
        }

        let now = cve_core::clock::now();
        if let Value::Object(new_map) = &mut new_value {
            new_map.insert("last_modified_at".to_string(), json!(now));
            new_map.insert("last_modified_by".to_string(), json!(updater));
        }

        let changes = change_detector::detect_changes(&old_value, &new_value, &[]);
        if changes.is_empty() {
            return Ok(current);
        }

        let mut set_fields = Document::new();
        for (key, value) in &patch_map {
            set_fields.insert(
                key.clone(),
                mongodb::bson::to_bson(value)
                    .map_err(|e| Error::internal(format!("failed to serialize patch field: {e}")))?,
            );
        }
        set_fields.insert("last_modified_at", cve_core::clock::to_store_format(now));
        set_fields.insert("last_modified_by", updater);

        let history_entry = ModificationHistoryEntry {
            username: updater.to_string(),
            modified_at: now,
            changes,
        };

        if let Err(e) = self.store.patch_cve(&canonical, set_fields, &history_entry).await {
            warn!(error = %e, cve_id = %canonical, "partial update failed, falling back to replace");
            let mut replaced = current.clone();
            merge_patch_onto(&mut replaced, &patch_map);
            replaced.last_modified_at = now;
            replaced.last_modified_by = updater.to_string();
            replaced.modification_history.push(history_entry);
            return self.replace(&canonical, replaced).await;
        }

        self.after_write(&canonical, cve_push::events::CVE_UPDATED).await;
        let updated = self
            .store
            .find_cve(&canonical)
            .await?
            .ok_or_else(|| Error::internal("CVE disappeared after update"))?;

        self.activity
            .log(
                updater,
                ActivityAction::Update,
                ActivityTargetType::Cve,
                canonical.clone(),
                Some(updated.title.clone()),
                history_entry.changes,
            )
            .await;

        if patch_map.contains_key("status") {
            self.notifications
                .notify_state_transition(
                    &canonical,
                    updated.assignee.as_deref(),
                    &format!("{:?}", updated.state),
                    updater,
                )
                .await;
        }

        Ok(updated)
    }

    /// Whole-document swap, preserving `_id`. Used directly by crawlers when
    /// their `source_hash` check indicates a full rewrite is needed.
    pub async fn replace(&self, cve_id: &str, mut doc: Cve) -> Result<Cve> {
        let canonical = Cve::canonical_id(cve_id);
        doc.cve_id = canonical.clone();
        self.store.put_cve(&doc).await?;
        self.after_write(&canonical, cve_push::events::CVE_UPDATED).await;
        self.activity
            .log(
                &doc.last_modified_by,
                ActivityAction::Update,
                ActivityTargetType::Cve,
                canonical,
                Some(doc.title.clone()),
                doc.modification_history.last().map(|h| h.changes.clone()).unwrap_or_default(),
            )
            .await;
        Ok(doc)
    }

    pub async fn delete(&self, cve_id: &str, deleter: &str) -> Result<bool> {
        let canonical = Cve::canonical_id(cve_id);
        let deleted = self.store.delete_cve(&canonical).await?;
        if deleted {
            self.after_write(&canonical, cve_push::events::CVE_DELETED).await;
            self.activity
                .log(
                    deleter,
                    ActivityAction::Delete,
                    ActivityTargetType::Cve,
                    canonical,
                    None,
                    Vec::new(),
                )
                .await;
        }
        Ok(deleted)
    }

    /// Acquires the edit lock, rejecting with `423 Locked` (via
    /// `ErrorCode::EditLockHeld`) if someone else's unexpired lease is held.
    pub async fn acquire_lock(&self, cve_id: &str, username: &str) -> Result<Cve> {
        let canonical = Cve::canonical_id(cve_id);
        let current = self
            .store
            .find_cve(&canonical)
            .await?
            .ok_or_else(|| Error::not_found(format!("{canonical} not found")))?;

        let now = cve_core::clock::now();
        if current.edit_lock.blocks(username, now) {
            return Err(Error::new(
                ErrorCode::EditLockHeld,
                format!("locked by {}", current.edit_lock.locked_by.as_deref().unwrap_or("another user")),
            ));
        }

        let lock = cve_core::EditLock::acquire(username, now);
        let mut set_fields = Document::new();
        set_fields.insert(
            "edit_lock",
            mongodb::bson::to_bson(&lock)
                .map_err(|e| Error::internal(format!("failed to serialize edit lock: {e}")))?,
        );
        self.store.set_cve_fields(&canonical, set_fields).await?;
        self.after_write(&canonical, cve_push::events::CVE_UPDATED).await;

        self.store
            .find_cve(&canonical)
            .await?
            .ok_or_else(|| Error::internal("CVE disappeared after lock"))
    }

    /// Releases the lock only if `username` is the current holder.
    pub async fn release_lock(&self, cve_id: &str, username: &str) -> Result<Cve> {
        let canonical = Cve::canonical_id(cve_id);
        let current = self
            .store
            .find_cve(&canonical)
            .await?
            .ok_or_else(|| Error::not_found(format!("{canonical} not found")))?;

        if current.edit_lock.is_locked && current.edit_lock.locked_by.as_deref() != Some(username) {
            return Err(Error::new(ErrorCode::EditLockHeld, "lock held by another user"));
        }

        let mut set_fields = Document::new();
        set_fields.insert(
            "edit_lock",
            mongodb::bson::to_bson(&cve_core::EditLock::default())
                .map_err(|e| Error::internal(format!("failed to serialize edit lock: {e}")))?,
        );
        self.store.set_cve_fields(&canonical, set_fields).await?;
        self.after_write(&canonical, cve_push::events::CVE_UPDATED).await;

        self.store
            .find_cve(&canonical)
            .await?
            .ok_or_else(|| Error::internal("CVE disappeared after unlock"))
    }

    /// A single item's failure is recorded in `errors` and does not abort
    /// the rest of the batch.
    pub async fn bulk_upsert(
        &self,
        items: Vec<CveUpsertItem>,
        creator: &str,
    ) -> BulkUpsertResult {
        let mut success = std::collections::HashMap::new();
        let mut errors = std::collections::HashMap::new();

        for item in items {
            let cve_id = Cve::canonical_id(&item.cve_id);
            let exists = match self.store.find_cve(&cve_id).await {
                Ok(existing) => existing.is_some(),
                Err(e) => {
                    errors.insert(cve_id, e.to_string());
                    continue;
                }
            };

            let outcome = if exists {
                self.merge_from_source(&cve_id, &item, creator)
                    .await
                    .map(|wrote| if wrote { "updated" } else { "unchanged" })
            } else {
                self.create(item, creator).await.map(|_| "created")
            };

            match outcome {
                Ok(status) => {
                    success.insert(cve_id, status);
                }
                Err(e) => {
                    errors.insert(cve_id, e.to_string());
                }
            }
        }

        BulkUpsertResult { success, errors }
    }

    /// Merges a crawler-produced item's source-owned collections into an
    /// existing document without touching human-editable fields, per the
    /// collection-merging rules. A re-ingest of identical data is a
    /// no-op: nothing is written, no history entry is appended, and
    /// `last_modified_at` stays put. Returns whether a write happened.
    pub(crate) async fn merge_from_source(
        &self,
        cve_id: &str,
        item: &CveUpsertItem,
        source: &str,
    ) -> Result<bool> {
        let current = self
            .store
            .find_cve(cve_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("{cve_id} not found")))?;

        let mut merged = current.clone();
        merge_references(&mut merged.references, &item.references, source);
        merge_pocs(&mut merged.pocs, &item.pocs, source);
        merge_snort_rules(&mut merged.snort_rules, &item.snort_rules);

        let old_value = serde_json::to_value(&current)
            .map_err(|e| Error::internal(format!("failed to serialize CVE: {e}")))?;
        let new_value = serde_json::to_value(&merged)
            .map_err(|e| Error::internal(format!("failed to serialize merged CVE: {e}")))?;
        let changes = change_detector::detect_changes(&old_value, &new_value, &[]);
        if changes.is_empty() {
            return Ok(false);
        }

        let now = cve_core::clock::now();
        merged.last_modified_at = now;
        merged.last_modified_by = source.to_string();
        merged.modification_history.push(ModificationHistoryEntry {
            username: source.to_string(),
            modified_at: now,
            changes: changes.clone(),
        });

        self.store.put_cve(&merged).await?;
        self.after_write(cve_id, cve_push::events::CVE_UPDATED).await;
        self.activity
            .log(
                source,
                ActivityAction::Update,
                ActivityTargetType::Cve,
                cve_id.to_string(),
                Some(merged.title.clone()),
                changes,
            )
            .await;
        Ok(true)
    }

    pub async fn stats(&self) -> Result<CveStats> {
        if let Some(cached) = self.cache.get::<CveStats>(CacheKind::Stats, "overview").await? {
            return Ok(cached);
        }

        let week_ago = cve_core::clock::now() - chrono::Duration::days(7);
        let stats = CveStats {
            total_count: self.store.count_cves(None, None).await?,
            high_severity_count: self
                .store
                .count_cves(None, Some(Severity::Critical))
                .await?
                + self.store.count_cves(None, Some(Severity::High)).await?,
            new_last_week_count: self.store.count_cves_created_since(week_ago).await?,
            in_progress_count: self.store.count_cves(Some(CveState::Analyzing), None).await?,
            completed_count: self
                .store
                .count_cves(Some(CveState::ReleaseComplete), None)
                .await?,
        };

        self.cache.set(CacheKind::Stats, "overview", &stats).await.ok();
        Ok(stats)
    }

    /// Aggregated `modification_history` across every CVE, newest first.
    /// `crawlers_only` restricts to entries authored by one of
    /// `crawler_usernames`; an explicit `username` narrows further (and
    /// wins if both are given, matching the store's precedence).
    pub async fn update_history_recent(
        &self,
        days: i64,
        crawlers_only: bool,
        crawler_usernames: &[String],
        username: Option<&str>,
        limit: i64,
        skip: u64,
    ) -> Result<(u64, Vec<cve_core::ModificationHistoryRecord>)> {
        let since = cve_core::clock::now() - chrono::Duration::days(days);
        let scoped = crawlers_only.then_some(crawler_usernames);
        self.store
            .recent_modification_history(since, scoped, username, limit, skip)
            .await
    }

    pub async fn update_history_stats(&self, days: i64) -> Result<cve_core::ModificationHistoryStats> {
        let since = cve_core::clock::now() - chrono::Duration::days(days);
        self.store.modification_history_stats(since).await
    }

    /// The post-write protocol: invalidate the cache, emit
    /// `event` scoped to the CVE's subscribers, then announce the
    /// invalidation itself so list-view clients know to refetch.
    async fn after_write(&self, cve_id: &str, event: &str) {
        let (invalidated_detail, invalidated_lists) = self.cache.invalidate_cve(cve_id).await;
        self.push
            .emit(
                event,
                json!({ "cve_id": cve_id }),
                PushTarget::CveSubscribers(cve_id.to_string()),
            )
            .await;
        self.push
            .emit(
                cve_push::events::CACHE_INVALIDATED,
                json!({
                    "cve_id": cve_id,
                    "invalidated_detail": invalidated_detail,
                    "invalidated_lists": invalidated_lists,
                }),
                PushTarget::All,
            )
            .await;
    }
}

/// Serializes the full query into the `cve_list:<serialized-query>` cache
/// key so every distinct filter combination caches independently.
fn list_cache_key(page: u32, limit: u32, filters: &CveFilters) -> String {
    let enum_str = |v: serde_json::Value| v.as_str().map(str::to_string).unwrap_or_default();
    let status = filters
        .status
        .and_then(|s| serde_json::to_value(s).ok())
        .map(enum_str)
        .unwrap_or_default();
    let severity = filters
        .severity
        .and_then(|s| serde_json::to_value(s).ok())
        .map(enum_str)
        .unwrap_or_default();
    format!(
        "page={page}&limit={limit}&status={status}&severity={severity}&search={}",
        filters.search.as_deref().unwrap_or_default()
    )
}

fn merge_patch_onto(cve: &mut Cve, patch: &serde_json::Map<String, Value>) {
    if let Some(title) = patch.get("title").and_then(|v| v.as_str()) {
        cve.title = title.to_string();
    }
    if let Some(description) = patch.get("description").and_then(|v| v.as_str()) {
        cve.description = description.to_string();
    }
    if let Some(notes) = patch.get("notes").and_then(|v| v.as_str()) {
        cve.notes = Some(notes.to_string());
    }
    if let Some(assignee) = patch.get("assigned_to").and_then(|v| v.as_str()) {
        cve.assignee = Some(assignee.to_string());
    }
    if let Some(severity) = patch.get("severity").and_then(|v| v.as_str()) {
        cve.severity = Severity::from_upstream(severity);
    }
    if let Some(status) = patch.get("status").cloned() {
        if let Ok(state) = serde_json::from_value::<CveState>(status) {
            cve.state = state;
        }
    }
    if let Some(hash) = patch.get("nuclei_hash") {
        cve.nuclei_hash = hash.as_str().map(str::to_string);
    }
    if let Some(references) = patch.get("references").cloned() {
        if let Ok(references) = serde_json::from_value(references) {
            cve.references = references;
        }
    }
    if let Some(pocs) = patch.get("pocs").cloned() {
        if let Ok(pocs) = serde_json::from_value(pocs) {
            cve.pocs = pocs;
        }
    }
}

pub(crate) fn merge_references(existing: &mut Vec<cve_core::Reference>, incoming: &[cve_core::Reference], source: &str) {
    for item in incoming {
        if let Some(found) = existing.iter_mut().find(|r| r.url == item.url) {
            if found.category != item.category || found.description != item.description {
                found.category = item.category;
                found.description = item.description.clone();
                found.audit.last_modified_at = cve_core::clock::now();
                found.audit.last_modified_by = source.to_string();
            }
        } else {
            let mut item = item.clone();
            item.audit = cve_core::AuditQuadruple::new(source, cve_core::clock::now());
            existing.push(item);
        }
    }
}

pub(crate) fn merge_pocs(existing: &mut Vec<cve_core::ProofOfConcept>, incoming: &[cve_core::ProofOfConcept], source: &str) {
    for item in incoming {
        if !existing.iter().any(|p| p.url == item.url) {
            let mut item = item.clone();
            item.audit = cve_core::AuditQuadruple::new(source, cve_core::clock::now());
            existing.push(item);
        }
    }
}

fn merge_snort_rules(existing: &mut Vec<cve_core::SnortRule>, incoming: &[cve_core::SnortRule]) {
    for item in incoming {
        if item.sid.is_none() {
            existing.push(item.clone());
            continue;
        }
        if let Some(found) = existing.iter_mut().find(|r| r.sid == item.sid) {
            found.rule = item.rule.clone();
            found.rule_type = item.rule_type.clone();
            found.description = item.description.clone();
        } else {
            existing.push(item.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_references_dedupes_by_url() {
        let mut existing = vec![cve_core::Reference {
            url: "https://a".to_string(),
            category: cve_core::ReferenceCategory::Nvd,
            description: None,
            audit: cve_core::AuditQuadruple::new("crawler", cve_core::clock::now()),
        }];
        let incoming = vec![cve_core::Reference {
            url: "https://a".to_string(),
            category: cve_core::ReferenceCategory::Advisory,
            description: Some("updated".to_string()),
            audit: cve_core::AuditQuadruple::new("crawler", cve_core::clock::now()),
        }];
        merge_references(&mut existing, &incoming, "crawler");
        assert_eq!(existing.len(), 1);
        assert_eq!(existing[0].category, cve_core::ReferenceCategory::Advisory);
    }

    #[test]
    fn remerging_identical_collections_is_change_free() {
        let incoming = vec![cve_core::Reference {
            url: "https://a".to_string(),
            category: cve_core::ReferenceCategory::Nvd,
            description: None,
            audit: cve_core::AuditQuadruple::new("crawler", cve_core::clock::now()),
        }];
        let mut refs = Vec::new();
        merge_references(&mut refs, &incoming, "crawler");
        let first_pass = serde_json::to_value(&refs).unwrap();
        merge_references(&mut refs, &incoming, "crawler");
        let second_pass = serde_json::to_value(&refs).unwrap();

        assert_eq!(first_pass, second_pass);
        assert!(change_detector::detect_changes(
            &json!({"references": first_pass}),
            &json!({"references": second_pass}),
            &[],
        )
        .is_empty());
    }

    #[test]
    fn list_cache_key_distinguishes_every_filter_dimension() {
        let base = CveFilters { status: None, severity: None, search: None };
        let filtered = CveFilters {
            status: Some(CveState::Analyzing),
            severity: Some(Severity::High),
            search: Some("log4j".to_string()),
        };
        assert_ne!(list_cache_key(1, 20, &base), list_cache_key(2, 20, &base));
        assert_ne!(list_cache_key(1, 20, &base), list_cache_key(1, 20, &filtered));
        assert_eq!(
            list_cache_key(1, 20, &filtered),
            "page=1&limit=20&status=analyzing&severity=high&search=log4j"
        );
    }

    #[test]
    fn merge_snort_rules_replaces_body_on_matching_sid() {
        let mut existing = vec![cve_core::SnortRule {
            rule: "alert old".to_string(),
            rule_type: "custom".to_string(),
            sid: Some("1000".to_string()),
            description: None,
            audit: cve_core::AuditQuadruple::new("crawler", cve_core::clock::now()),
        }];
        let incoming = vec![cve_core::SnortRule {
            rule: "alert new".to_string(),
            rule_type: "custom".to_string(),
            sid: Some("1000".to_string()),
            description: None,
            audit: cve_core::AuditQuadruple::new("crawler", cve_core::clock::now()),
        }];
        merge_snort_rules(&mut existing, &incoming);
        assert_eq!(existing.len(), 1);
        assert_eq!(existing[0].rule, "alert new");
    }
}
