//! # Document Store Adapter
//!
//! MongoDB-backed persistence for CVE records and their collaborator
//! entities (users, refresh tokens, notifications, user activity, and the
//! crawler scheduling singleton). Connection pooling and index management
//! follow the same conventions as a tuned Postgres pool: set the driver's
//! options up front, create indexes once at startup, and convert every
//! driver error through `cve_core::Error`.

use crate::{config::MongoConfig, error::Result, types::*, ActivityFilter, Error};
use futures::stream::TryStreamExt;
use mongodb::{
    bson::{doc, Document},
    options::{ClientOptions, FindOptions, IndexOptions, UpdateOptions},
    Client, Collection, Database, IndexModel,
};
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

/// Owns the MongoDB client and exposes typed collections for every
/// persisted entity in the data model.
#[derive(Clone)]
pub struct CveStore {
    #[allow(dead_code)]
    client: Client,
    database: Database,
}

impl CveStore {
    pub async fn connect(config: &MongoConfig) -> Result<Self> {
        let mut client_options = ClientOptions::parse(&config.url)
            .await
            .map_err(|e| Error::internal(format!("Failed to parse MongoDB connection string: {e}")))?;

        client_options.max_pool_size = Some(config.max_pool_size);
        client_options.min_pool_size = Some(config.min_pool_size);
        client_options.max_idle_time = Some(Duration::from_secs(300));
        client_options.server_selection_timeout =
            Some(Duration::from_millis(config.server_selection_timeout_ms));
        client_options.connect_timeout = Some(Duration::from_secs(10));
        client_options.retry_writes = Some(true);
        client_options.retry_reads = Some(true);
        client_options.heartbeat_freq = Some(Duration::from_secs(10));

        let client = Client::with_options(client_options)
            .map_err(|e| Error::internal(format!("Failed to create MongoDB client: {e}")))?;
        let database = client.database(&config.database_name);

        let store = Self { client, database };
        store.ping().await?;
        store.ensure_indexes().await?;
        store.ensure_crawler_state().await?;

        info!(database = %config.database_name, "connected to MongoDB");
        Ok(store)
    }

    pub async fn ping(&self) -> Result<()> {
        self.database
            .run_command(doc! {"ping": 1})
            .await
            .map_err(Error::from)?;
        Ok(())
    }

    async fn ensure_indexes(&self) -> Result<()> {
        let cve_indexes = vec![
            IndexModel::builder()
                .keys(doc! {"cve_id": 1})
                .options(IndexOptions::builder().unique(true).build())
                .build(),
            IndexModel::builder().keys(doc! {"severity": 1}).build(),
            IndexModel::builder().keys(doc! {"status": 1}).build(),
            IndexModel::builder()
                .keys(doc! {"last_modified_at": -1})
                .build(),
            IndexModel::builder().keys(doc! {"created_at": -1}).build(),
            IndexModel::builder().keys(doc! {"assigned_to": 1}).build(),
            IndexModel::builder()
                .keys(doc! {"status": 1, "last_modified_at": -1})
                .build(),
            IndexModel::builder()
                .keys(doc! {"cve_id": "text", "title": "text", "description": "text"})
                .build(),
        ];
        self.cves()
            .create_indexes(cve_indexes)
            .await
            .map_err(Error::from)?;

        self.users()
            .create_index(
                IndexModel::builder()
                    .keys(doc! {"username": 1})
                    .options(IndexOptions::builder().unique(true).build())
                    .build(),
            )
            .await
            .map_err(Error::from)?;

        let refresh_token_indexes = vec![
            IndexModel::builder().keys(doc! {"token": 1}).build(),
            IndexModel::builder().keys(doc! {"user_id": 1}).build(),
            IndexModel::builder().keys(doc! {"expires_at": 1}).build(),
        ];
        self.refresh_tokens()
            .create_indexes(refresh_token_indexes)
            .await
            .map_err(Error::from)?;

        let notification_indexes = vec![
            IndexModel::builder()
                .keys(doc! {"recipient_id": 1, "created_at": -1})
                .build(),
            IndexModel::builder().keys(doc! {"recipient_id": 1}).build(),
            IndexModel::builder()
                .keys(doc! {"recipient_id": 1, "status": 1})
                .build(),
        ];
        self.notifications()
            .create_indexes(notification_indexes)
            .await
            .map_err(Error::from)?;

        let activity_indexes = vec![
            IndexModel::builder().keys(doc! {"timestamp": -1}).build(),
            IndexModel::builder()
                .keys(doc! {"username": 1, "timestamp": -1})
                .build(),
            IndexModel::builder()
                .keys(doc! {"target_type": 1, "target_id": 1, "timestamp": -1})
                .build(),
            IndexModel::builder()
                .keys(doc! {"target_type": 1, "action": 1, "timestamp": -1})
                .build(),
        ];
        self.user_activities()
            .create_indexes(activity_indexes)
            .await
            .map_err(Error::from)?;

        Ok(())
    }

    fn cves(&self) -> Collection<Cve> {
        self.database.collection("cves")
    }

    fn users(&self) -> Collection<User> {
        self.database.collection("users")
    }

    fn refresh_tokens(&self) -> Collection<RefreshToken> {
        self.database.collection("refresh_tokens")
    }

    fn notifications(&self) -> Collection<Notification> {
        self.database.collection("notifications")
    }

    fn user_activities(&self) -> Collection<UserActivity> {
        self.database.collection("user_activities")
    }

    fn system_config(&self) -> Collection<Document> {
        self.database.collection("system_config")
    }

    // ---- CVE operations --------------------------------------------------

    /// Looks up a CVE by its canonical id, matched case-insensitively per
    /// the data model's read-path rule.
    pub async fn find_cve(&self, cve_id: &str) -> Result<Option<Cve>> {
        let pattern = format!("^{}$", regex::escape(&Cve::canonical_id(cve_id)));
        let filter = doc! {"cve_id": {"$regex": pattern, "$options": "i"}};
        self.cves().find_one(filter).await.map_err(Error::from)
    }

    /// Upserts a CVE document by its canonical id. Callers (the upsert
    /// engine) are responsible for computing `ModificationHistory` before
    /// calling this — this method performs the raw replace. `_id` is
    /// stripped from the `$set` payload ($set on the immutable `_id` path
    /// is rejected by the server); the existing document keeps its id.
    pub async fn put_cve(&self, cve: &Cve) -> Result<()> {
        let mut fields = mongodb::bson::to_document(cve)
            .map_err(|e| Error::internal(format!("failed to serialize CVE: {e}")))?;
        fields.remove("_id");

        let filter = doc! {"cve_id": &cve.cve_id};
        let options = UpdateOptions::builder().upsert(true).build();
        self.cves()
            .update_one(filter, doc! {"$set": fields})
            .with_options(options)
            .await
            .map_err(Error::from)?;
        Ok(())
    }

    /// Paged list backing the CVE list endpoint: sorted by
    /// `last_modified_at desc, created_at desc`, with an optional
    /// case-insensitive search over `cve_id|title|description`.
    pub async fn list_cves_page(
        &self,
        state: Option<CveState>,
        severity: Option<Severity>,
        search: Option<&str>,
        limit: i64,
        skip: u64,
    ) -> Result<(u64, Vec<Cve>)> {
        let filter = Self::list_filter(state, severity, search)?;
        let total = self
            .cves()
            .count_documents(filter.clone())
            .await
            .map_err(Error::from)?;
        let items = self.list_cves_filter(filter, limit, skip).await?;
        Ok((total, items))
    }

    async fn list_cves_filter(&self, filter: Document, limit: i64, skip: u64) -> Result<Vec<Cve>> {
        let options = FindOptions::builder()
            .sort(doc! {"last_modified_at": -1, "created_at": -1})
            .limit(limit)
            .skip(skip)
            .build();

        let mut cursor = self
            .cves()
            .find(filter)
            .with_options(options)
            .await
            .map_err(Error::from)?;

        let mut results = Vec::new();
        while cursor.advance().await.map_err(Error::from)? {
            results.push(cursor.deserialize_current().map_err(|e| {
                Error::internal(format!("failed to deserialize CVE document: {e}"))
            })?);
        }
        Ok(results)
    }

    fn list_filter(
        state: Option<CveState>,
        severity: Option<Severity>,
        search: Option<&str>,
    ) -> Result<Document> {
        let mut filter = Document::new();
        if let Some(state) = state {
            filter.insert(
                "status",
                mongodb::bson::to_bson(&state).map_err(|e| Error::internal(e.to_string()))?,
            );
        }
        if let Some(severity) = severity {
            filter.insert(
                "severity",
                mongodb::bson::to_bson(&severity).map_err(|e| Error::internal(e.to_string()))?,
            );
        }
        if let Some(search) = search {
            let pattern = regex::escape(search);
            filter.insert(
                "$or",
                vec![
                    doc! {"cve_id": {"$regex": &pattern, "$options": "i"}},
                    doc! {"title": {"$regex": &pattern, "$options": "i"}},
                    doc! {"description": {"$regex": &pattern, "$options": "i"}},
                ],
            );
        }
        Ok(filter)
    }

    pub async fn delete_cve(&self, cve_id: &str) -> Result<bool> {
        let filter = doc! {"cve_id": Cve::canonical_id(cve_id)};
        let result = self.cves().delete_one(filter).await.map_err(Error::from)?;
        Ok(result.deleted_count > 0)
    }

    /// Applies a partial patch: `$set`s the changed fields (plus
    /// `last_modified_at`/`last_modified_by`) and appends one
    /// `ModificationHistoryEntry`, in a single atomic `update_one`.
    pub async fn patch_cve(
        &self,
        cve_id: &str,
        set_fields: Document,
        history_entry: &ModificationHistoryEntry,
    ) -> Result<()> {
        let history_bson = mongodb::bson::to_bson(history_entry)
            .map_err(|e| Error::internal(format!("failed to serialize history entry: {e}")))?;
        let filter = doc! {"cve_id": Cve::canonical_id(cve_id)};
        let update = doc! {
            "$set": set_fields,
            "$push": {"modification_history": history_bson},
        };
        self.cves()
            .update_one(filter, update)
            .await
            .map_err(Error::from)?;
        Ok(())
    }

    /// `$set`s fields without touching `modification_history` — used for the
    /// edit lock, which is concurrency-control metadata, not a user edit.
    pub async fn set_cve_fields(&self, cve_id: &str, set_fields: Document) -> Result<()> {
        let filter = doc! {"cve_id": Cve::canonical_id(cve_id)};
        let update = doc! {"$set": set_fields};
        self.cves()
            .update_one(filter, update)
            .await
            .map_err(Error::from)?;
        Ok(())
    }

    // ---- Embedded comment operations ----------------------------------------

    /// Appends a comment to the CVE's embedded list with an atomic `$push`.
    pub async fn push_cve_comment(&self, cve_id: &str, comment: &Comment) -> Result<()> {
        let comment_bson = mongodb::bson::to_bson(comment)
            .map_err(|e| Error::internal(format!("failed to serialize comment: {e}")))?;
        self.cves()
            .update_one(
                doc! {"cve_id": Cve::canonical_id(cve_id)},
                doc! {"$push": {"comments": comment_bson}},
            )
            .await
            .map_err(Error::from)?;
        Ok(())
    }

    /// Rewrites a single comment's content and mentions in place via the
    /// positional operator. Returns whether a matching comment existed.
    pub async fn update_cve_comment(
        &self,
        cve_id: &str,
        comment_id: &str,
        content: &str,
        mentions: &[String],
        at: chrono::DateTime<chrono::Utc>,
    ) -> Result<bool> {
        let result = self
            .cves()
            .update_one(
                doc! {"cve_id": Cve::canonical_id(cve_id), "comments.id": comment_id},
                doc! {"$set": {
                    "comments.$.content": content,
                    "comments.$.mentions": mentions,
                    "comments.$.last_modified_at": crate::clock::to_store_format(at),
                }},
            )
            .await
            .map_err(Error::from)?;
        Ok(result.matched_count > 0)
    }

    /// Soft delete: the comment stays in place (children keep their parent)
    /// with `is_deleted` flipped.
    pub async fn soft_delete_cve_comment(
        &self,
        cve_id: &str,
        comment_id: &str,
        at: chrono::DateTime<chrono::Utc>,
    ) -> Result<bool> {
        let result = self
            .cves()
            .update_one(
                doc! {"cve_id": Cve::canonical_id(cve_id), "comments.id": comment_id},
                doc! {"$set": {
                    "comments.$.is_deleted": true,
                    "comments.$.last_modified_at": crate::clock::to_store_format(at),
                }},
            )
            .await
            .map_err(Error::from)?;
        Ok(result.matched_count > 0)
    }

    /// Permanent removal via `$pull`. Restricted to administrators by the
    /// REST layer.
    pub async fn pull_cve_comment(&self, cve_id: &str, comment_id: &str) -> Result<bool> {
        let result = self
            .cves()
            .update_one(
                doc! {"cve_id": Cve::canonical_id(cve_id)},
                doc! {"$pull": {"comments": {"id": comment_id}}},
            )
            .await
            .map_err(Error::from)?;
        Ok(result.modified_count > 0)
    }

    /// Counts documents matching `(status, severity)`, used by `stats()` so
    /// tallies come from the database rather than an in-memory scan.
    pub async fn count_cves(
        &self,
        state: Option<CveState>,
        severity: Option<Severity>,
    ) -> Result<u64> {
        let filter = Self::list_filter(state, severity, None)?;
        self.cves()
            .count_documents(filter)
            .await
            .map_err(Error::from)
    }

    pub async fn count_cves_created_since(
        &self,
        since: chrono::DateTime<chrono::Utc>,
    ) -> Result<u64> {
        let filter = doc! {"created_at": {"$gte": crate::clock::to_store_format(since)}};
        self.cves()
            .count_documents(filter)
            .await
            .map_err(Error::from)
    }

    /// Unwinds `modification_history` across every CVE, newest first, for
    /// the `/update-history/recent` endpoint. `crawler_usernames`, when
    /// given, restricts results to entries authored by one of those
    /// usernames (a crawler's `source_name`); `username` is an exact match
    /// on a single author and takes precedence when both are supplied.
    pub async fn recent_modification_history(
        &self,
        since: chrono::DateTime<chrono::Utc>,
        crawler_usernames: Option<&[String]>,
        username: Option<&str>,
        limit: i64,
        skip: u64,
    ) -> Result<(u64, Vec<ModificationHistoryRecord>)> {
        let mut entry_match = doc! {
            "modification_history.modified_at": {"$gte": crate::clock::to_store_format(since)},
        };
        if let Some(username) = username {
            entry_match.insert("modification_history.username", username);
        } else if let Some(usernames) = crawler_usernames {
            entry_match.insert("modification_history.username", doc! {"$in": usernames});
        }

        let count_pipeline = vec![
            doc! {"$unwind": "$modification_history"},
            doc! {"$match": entry_match.clone()},
            doc! {"$count": "total"},
        ];
        let total = match self
            .cves()
            .aggregate(count_pipeline)
            .await
            .map_err(Error::from)?
            .try_next()
            .await
            .map_err(Error::from)?
        {
            Some(doc) => doc.get_i32("total").unwrap_or(0) as u64,
            None => 0,
        };

        let page_pipeline = vec![
            doc! {"$unwind": "$modification_history"},
            doc! {"$match": entry_match},
            doc! {"$sort": {"modification_history.modified_at": -1}},
            doc! {"$skip": skip as i64},
            doc! {"$limit": limit},
            doc! {"$project": {
                "_id": 0,
                "cve_id": 1,
                "username": "$modification_history.username",
                "modified_at": "$modification_history.modified_at",
                "changes": "$modification_history.changes",
            }},
        ];
        let mut cursor = self
            .cves()
            .aggregate(page_pipeline)
            .await
            .map_err(Error::from)?
            .with_type::<ModificationHistoryRecord>();

        let mut results = Vec::new();
        while let Some(record) = cursor.try_next().await.map_err(Error::from)? {
            results.push(record);
        }
        Ok((total, results))
    }

    /// Change-count totals grouped by author, changed field, and calendar
    /// day, over the same window as `recent_modification_history`.
    pub async fn modification_history_stats(
        &self,
        since: chrono::DateTime<chrono::Utc>,
    ) -> Result<ModificationHistoryStats> {
        let pipeline = vec![
            doc! {"$unwind": "$modification_history"},
            doc! {"$match": {
                "modification_history.modified_at": {"$gte": crate::clock::to_store_format(since)},
            }},
            doc! {"$unwind": "$modification_history.changes"},
            doc! {"$facet": {
                "by_user": [
                    {"$group": {"_id": "$modification_history.username", "count": {"$sum": 1}}},
                    {"$sort": {"count": -1}},
                ],
                "by_field": [
                    {"$group": {"_id": "$modification_history.changes.field", "count": {"$sum": 1}}},
                    {"$sort": {"count": -1}},
                ],
                "by_day": [
                    {"$group": {
                        "_id": {"$substrCP": ["$modification_history.modified_at", 0, 10]},
                        "count": {"$sum": 1},
                    }},
                    {"$sort": {"_id": 1}},
                ],
            }},
        ];

        let doc = self
            .cves()
            .aggregate(pipeline)
            .await
            .map_err(Error::from)?
            .try_next()
            .await
            .map_err(Error::from)?
            .unwrap_or_default();

        Ok(ModificationHistoryStats {
            by_user: Self::buckets_from_facet(&doc, "by_user"),
            by_field: Self::buckets_from_facet(&doc, "by_field"),
            by_day: Self::buckets_from_facet(&doc, "by_day"),
        })
    }

    fn buckets_from_facet(doc: &Document, facet: &str) -> Vec<CountBucket> {
        doc.get_array(facet)
            .map(|entries| {
                entries
                    .iter()
                    .filter_map(|entry| entry.as_document())
                    .map(|entry| CountBucket {
                        key: entry
                            .get_str("_id")
                            .map(str::to_string)
                            .unwrap_or_else(|_| "unknown".to_string()),
                        count: entry.get_i32("count").unwrap_or(0) as u64,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    // ---- Users & refresh tokens -------------------------------------------

    pub async fn find_user_by_username(&self, username: &str) -> Result<Option<User>> {
        self.users()
            .find_one(doc! {"username": username})
            .await
            .map_err(Error::from)
    }

    pub async fn insert_user(&self, user: &User) -> Result<()> {
        self.users().insert_one(user).await.map_err(Error::from)?;
        Ok(())
    }

    pub async fn touch_last_login(&self, username: &str) -> Result<()> {
        self.users()
            .update_one(
                doc! {"username": username},
                doc! {"$set": {"last_login": crate::clock::to_store_format(chrono::Utc::now())}},
            )
            .await
            .map_err(Error::from)?;
        Ok(())
    }

    pub async fn insert_refresh_token(&self, token: &RefreshToken) -> Result<()> {
        self.refresh_tokens()
            .insert_one(token)
            .await
            .map_err(Error::from)?;
        Ok(())
    }

    pub async fn find_refresh_token(&self, token: &str) -> Result<Option<RefreshToken>> {
        self.refresh_tokens()
            .find_one(doc! {"token": token})
            .await
            .map_err(Error::from)
    }

    /// Revocation is one-way: once set, `is_revoked` never flips back.
    pub async fn revoke_refresh_token(&self, token: &str) -> Result<()> {
        self.refresh_tokens()
            .update_one(doc! {"token": token}, doc! {"$set": {"is_revoked": true}})
            .await
            .map_err(Error::from)?;
        Ok(())
    }

    // ---- Notifications -----------------------------------------------------

    pub async fn insert_notification(&self, notification: &Notification) -> Result<()> {
        self.notifications()
            .insert_one(notification)
            .await
            .map_err(Error::from)?;
        Ok(())
    }

    /// Paged listing, newest first. `unread_only` narrows to `status=unread`.
    pub async fn list_notifications_for(
        &self,
        recipient_id: &str,
        unread_only: bool,
        limit: i64,
        skip: u64,
    ) -> Result<(u64, Vec<Notification>)> {
        let mut filter = doc! {"recipient_id": recipient_id};
        if unread_only {
            filter.insert("status", "unread");
        }

        let total = self
            .notifications()
            .count_documents(filter.clone())
            .await
            .map_err(Error::from)?;

        let options = FindOptions::builder()
            .sort(doc! {"created_at": -1})
            .skip(skip)
            .limit(limit)
            .build();

        let mut cursor = self
            .notifications()
            .find(filter)
            .with_options(options)
            .await
            .map_err(Error::from)?;

        let mut results = Vec::new();
        while cursor.advance().await.map_err(Error::from)? {
            results.push(cursor.deserialize_current().map_err(|e| {
                Error::internal(format!("failed to deserialize notification: {e}"))
            })?);
        }
        Ok((total, results))
    }

    pub async fn count_unread_notifications(&self, recipient_id: &str) -> Result<u64> {
        self.notifications()
            .count_documents(doc! {"recipient_id": recipient_id, "status": "unread"})
            .await
            .map_err(Error::from)
    }

    pub async fn mark_notification_delivered(&self, notification_id: Uuid) -> Result<()> {
        self.notifications()
            .update_one(
                doc! {"_id": notification_id.to_string()},
                doc! {"$set": {"delivered": true}},
            )
            .await
            .map_err(Error::from)?;
        Ok(())
    }

    /// Marks a single notification read, scoped to its recipient so a user
    /// can't flip another user's notification. Returns whether a document
    /// actually matched.
    pub async fn mark_notification_read(
        &self,
        notification_id: Uuid,
        recipient_id: &str,
        at: chrono::DateTime<chrono::Utc>,
    ) -> Result<bool> {
        let result = self
            .notifications()
            .update_one(
                doc! {"_id": notification_id.to_string(), "recipient_id": recipient_id},
                doc! {"$set": {
                    "status": "read",
                    "read_at": crate::clock::to_store_format(at),
                }},
            )
            .await
            .map_err(Error::from)?;
        Ok(result.matched_count > 0)
    }

    /// Marks every one of `notification_ids` owned by `recipient_id` read.
    /// Ids that don't belong to the recipient are silently skipped, not
    /// rejected, matching the single-mark-read ownership check.
    pub async fn mark_notifications_read(
        &self,
        notification_ids: &[Uuid],
        recipient_id: &str,
        at: chrono::DateTime<chrono::Utc>,
    ) -> Result<u64> {
        let result = self
            .notifications()
            .update_many(
                doc! {
                    "_id": {"$in": notification_ids.iter().map(Uuid::to_string).collect::<Vec<_>>()},
                    "recipient_id": recipient_id,
                },
                doc! {"$set": {
                    "status": "read",
                    "read_at": crate::clock::to_store_format(at),
                }},
            )
            .await
            .map_err(Error::from)?;
        Ok(result.modified_count)
    }

    pub async fn mark_all_notifications_read(
        &self,
        recipient_id: &str,
        at: chrono::DateTime<chrono::Utc>,
    ) -> Result<u64> {
        let result = self
            .notifications()
            .update_many(
                doc! {"recipient_id": recipient_id, "status": "unread"},
                doc! {"$set": {
                    "status": "read",
                    "read_at": crate::clock::to_store_format(at),
                }},
            )
            .await
            .map_err(Error::from)?;
        Ok(result.modified_count)
    }

    /// Deletes notifications older than `cutoff`, used by the optional
    /// 30-day retention sweep.
    pub async fn delete_notifications_older_than(
        &self,
        cutoff: chrono::DateTime<chrono::Utc>,
    ) -> Result<u64> {
        let result = self
            .notifications()
            .delete_many(doc! {"created_at": {"$lt": crate::clock::to_store_format(cutoff)}})
            .await
            .map_err(Error::from)?;
        Ok(result.deleted_count)
    }

    // ---- User activity log ---------------------------------------------------

    pub async fn append_activity(&self, activity: &UserActivity) -> Result<()> {
        self.user_activities()
            .insert_one(activity)
            .await
            .map_err(Error::from)?;
        Ok(())
    }

    /// Translates an [`ActivityFilter`] into a Mongo query: multi-valued
    /// fields OR via `$in`, everything else is an exact match, the time
    /// range is an inclusive `$gte`/`$lte` on `timestamp`.
    pub async fn list_activities(
        &self,
        filter: &ActivityFilter,
        limit: i64,
        skip: u64,
    ) -> Result<(u64, Vec<UserActivity>)> {
        let mut query = Document::new();

        if let Some(target_types) = &filter.target_types {
            if let [single] = target_types.as_slice() {
                query.insert(
                    "target_type",
                    mongodb::bson::to_bson(single)
                        .map_err(|e| Error::internal(format!("failed to serialize target_type: {e}")))?,
                );
            } else if !target_types.is_empty() {
                query.insert(
                    "target_type",
                    doc! {"$in": mongodb::bson::to_bson(target_types)
                        .map_err(|e| Error::internal(format!("failed to serialize target_types: {e}")))?},
                );
            }
        }

        if let Some(actions) = &filter.actions {
            if let [single] = actions.as_slice() {
                query.insert(
                    "action",
                    mongodb::bson::to_bson(single)
                        .map_err(|e| Error::internal(format!("failed to serialize action: {e}")))?,
                );
            } else if !actions.is_empty() {
                query.insert(
                    "action",
                    doc! {"$in": mongodb::bson::to_bson(actions)
                        .map_err(|e| Error::internal(format!("failed to serialize actions: {e}")))?},
                );
            }
        }

        if let Some(username) = &filter.username {
            query.insert("username", username);
        }
        if let Some(target_id) = &filter.target_id {
            query.insert("target_id", target_id);
        }

        if filter.start_time.is_some() || filter.end_time.is_some() {
            let mut range = Document::new();
            if let Some(start) = filter.start_time {
                range.insert("$gte", crate::clock::to_store_format(start));
            }
            if let Some(end) = filter.end_time {
                range.insert("$lte", crate::clock::to_store_format(end));
            }
            query.insert("timestamp", range);
        }

        let total = self
            .user_activities()
            .count_documents(query.clone())
            .await
            .map_err(Error::from)?;

        let options = FindOptions::builder()
            .sort(doc! {"timestamp": -1})
            .skip(skip)
            .limit(limit)
            .build();

        let mut cursor = self
            .user_activities()
            .find(query)
            .with_options(options)
            .await
            .map_err(Error::from)?;

        let mut results = Vec::new();
        while cursor.advance().await.map_err(Error::from)? {
            results.push(cursor.deserialize_current().map_err(|e| {
                Error::internal(format!("failed to deserialize activity: {e}"))
            })?);
        }
        Ok((total, results))
    }

    pub async fn delete_activities_older_than(
        &self,
        cutoff: chrono::DateTime<chrono::Utc>,
    ) -> Result<u64> {
        let result = self
            .user_activities()
            .delete_many(doc! {"timestamp": {"$lt": crate::clock::to_store_format(cutoff)}})
            .await
            .map_err(Error::from)?;
        Ok(result.deleted_count)
    }

    // ---- Crawler scheduling state --------------------------------------------

    /// Creates the `crawler_last_updates` singleton as an empty map if it
    /// doesn't exist yet, so the scheduler always finds a document to read
    /// on startup.
    pub async fn ensure_crawler_state(&self) -> Result<()> {
        self.system_config()
            .update_one(
                doc! {"_id": "crawler_last_updates"},
                doc! {"$setOnInsert": {"_id": "crawler_last_updates"}},
            )
            .upsert(true)
            .await
            .map_err(Error::from)?;
        Ok(())
    }

    /// Reads the `crawler_last_updates` key-value singleton used to decide
    /// whether a scheduled crawl is due.
    pub async fn get_crawler_last_update(&self, crawler_id: &str) -> Result<Option<chrono::DateTime<chrono::Utc>>> {
        let doc = self
            .system_config()
            .find_one(doc! {"_id": "crawler_last_updates"})
            .await
            .map_err(Error::from)?;

        Ok(doc
            .and_then(|d| d.get_document(crawler_id).ok().cloned())
            .and_then(|d| d.get_str("timestamp").ok().map(str::to_string))
            .and_then(|raw| {
                chrono::DateTime::parse_from_rfc3339(&raw)
                    .ok()
                    .map(|dt| dt.with_timezone(&chrono::Utc))
            }))
    }

    pub async fn set_crawler_last_update(
        &self,
        crawler_id: &str,
        at: chrono::DateTime<chrono::Utc>,
    ) -> Result<()> {
        let stamp = crate::clock::to_store_format(at);
        self.system_config()
            .update_one(
                doc! {"_id": "crawler_last_updates"},
                doc! {"$set": {format!("{crawler_id}.timestamp"): stamp}},
            )
            .upsert(true)
            .await
            .map_err(Error::from)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_id_used_as_regex_anchor() {
        let pattern = format!("^{}$", regex::escape(&Cve::canonical_id("cve-2024-1")));
        assert_eq!(pattern, "^CVE\\-2024\\-1$");
    }

    // Connection-level behavior (pooling, index creation, upsert semantics)
    // requires a live MongoDB instance.
}
