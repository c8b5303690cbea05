use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// Axum integration for RequestContext
#[cfg(feature = "axum")]
use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
    response::Json,
};

/// Lifecycle state of a CVE record as it moves through triage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CveState {
    New,
    Analyzing,
    ReleaseComplete,
    CannotAnalyze,
}

/// Normalized severity, tolerant of inconsistent upstream casing/spelling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
    Info,
    Unknown,
}

impl Severity {
    /// Maps a loosely-formatted upstream severity string onto the closed enum.
    pub fn from_upstream(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "critical" | "crit" => Severity::Critical,
            "high" | "severe" => Severity::High,
            "medium" | "moderate" | "med" => Severity::Medium,
            "low" | "minor" => Severity::Low,
            "info" | "information" => Severity::Info,
            _ => Severity::Unknown,
        }
    }
}

/// An edit lock held by a user while they work on a CVE record.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EditLock {
    pub is_locked: bool,
    pub locked_by: Option<String>,
    pub lock_timestamp: Option<DateTime<Utc>>,
    pub lock_expires_at: Option<DateTime<Utc>>,
}

impl EditLock {
    /// Default lease duration applied when a lock is acquired.
    pub const DEFAULT_LEASE_MINUTES: i64 = 30;

    pub fn acquire(username: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            is_locked: true,
            locked_by: Some(username.into()),
            lock_timestamp: Some(now),
            lock_expires_at: Some(now + chrono::Duration::minutes(Self::DEFAULT_LEASE_MINUTES)),
        }
    }

    /// A lock held by someone other than `username` and not yet expired
    /// blocks further edits.
    pub fn blocks(&self, username: &str, now: DateTime<Utc>) -> bool {
        if !self.is_locked {
            return false;
        }
        let expired = self.lock_expires_at.map(|exp| now >= exp).unwrap_or(false);
        if expired {
            return false;
        }
        self.locked_by.as_deref() != Some(username)
    }
}

/// Reference category attached to a CVE.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ReferenceCategory {
    Nvd,
    Exploit,
    Advisory,
    Other,
}

/// Audit quadruple shared by every embedded CVE sub-document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditQuadruple {
    pub created_at: DateTime<Utc>,
    pub created_by: String,
    pub last_modified_at: DateTime<Utc>,
    pub last_modified_by: String,
}

impl AuditQuadruple {
    pub fn new(username: impl Into<String>, now: DateTime<Utc>) -> Self {
        let username = username.into();
        Self {
            created_at: now,
            created_by: username.clone(),
            last_modified_at: now,
            last_modified_by: username,
        }
    }

    pub fn touch(&mut self, username: impl Into<String>, now: DateTime<Utc>) {
        self.last_modified_at = now;
        self.last_modified_by = username.into();
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reference {
    pub url: String,
    pub category: ReferenceCategory,
    pub description: Option<String>,
    #[serde(flatten)]
    pub audit: AuditQuadruple,
}

/// Source a proof-of-concept was harvested from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PocSource {
    Etc,
    Metasploit,
    #[serde(rename = "Nuclei-Templates")]
    NucleiTemplates,
    #[serde(rename = "Emerging-Threats")]
    EmergingThreats,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProofOfConcept {
    pub source: PocSource,
    pub url: String,
    pub description: Option<String>,
    #[serde(flatten)]
    pub audit: AuditQuadruple,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnortRule {
    pub rule: String,
    #[serde(rename = "type")]
    pub rule_type: String,
    pub sid: Option<String>,
    pub description: Option<String>,
    #[serde(flatten)]
    pub audit: AuditQuadruple,
}

/// A (possibly threaded) comment embedded in a CVE document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    pub id: String,
    pub content: String,
    pub created_by: String,
    pub parent_id: Option<String>,
    pub depth: u32,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub last_modified_at: DateTime<Utc>,
    /// Usernames mentioned in `content` via `@username`, precomputed on write.
    pub mentions: Vec<String>,
}

impl Comment {
    /// Hard cap on thread depth; enforced by the comment-creation handler.
    pub const MAX_DEPTH: u32 = 10;
}

/// One field-level change recorded inside a `ModificationHistory` entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeAction {
    Add,
    Edit,
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetailType {
    Simple,
    Detailed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeRecord {
    pub field: String,
    pub field_label: String,
    pub action: ChangeAction,
    pub detail_type: DetailType,
    pub before: Option<String>,
    pub after: Option<String>,
    pub summary: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModificationHistoryEntry {
    pub username: String,
    pub modified_at: DateTime<Utc>,
    pub changes: Vec<ChangeRecord>,
}

/// A single `modification_history` entry unwound out of its parent CVE, for
/// the `/update-history/recent` aggregation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModificationHistoryRecord {
    pub cve_id: String,
    pub username: String,
    pub modified_at: DateTime<Utc>,
    pub changes: Vec<ChangeRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CountBucket {
    pub key: String,
    pub count: u64,
}

/// `/update-history/stats` response: change counts grouped three ways over
/// the same windowed set of entries.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ModificationHistoryStats {
    pub by_user: Vec<CountBucket>,
    pub by_field: Vec<CountBucket>,
    pub by_day: Vec<CountBucket>,
}

/// The primary aggregate: a single CVE record with its embedded collections.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cve {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    /// Canonically upper-cased identifier, e.g. `CVE-2024-12345`.
    pub cve_id: String,
    pub title: String,
    pub description: String,
    /// Wire name is `status` (the REST surface and modification-history
    /// field labels both speak of a CVE's "status", never its "state").
    #[serde(rename = "status")]
    pub state: CveState,
    #[serde(rename = "assigned_to")]
    pub assignee: Option<String>,
    pub severity: Severity,
    pub created_at: DateTime<Utc>,
    pub last_modified_at: DateTime<Utc>,
    pub created_by: String,
    pub last_modified_by: String,
    /// Opaque change-detection shortcut computed by the originating crawler.
    pub nuclei_hash: Option<String>,
    pub notes: Option<String>,
    #[serde(default)]
    pub edit_lock: EditLock,
    #[serde(default)]
    pub references: Vec<Reference>,
    #[serde(default)]
    pub pocs: Vec<ProofOfConcept>,
    #[serde(default)]
    pub snort_rules: Vec<SnortRule>,
    #[serde(default)]
    pub comments: Vec<Comment>,
    #[serde(default)]
    pub modification_history: Vec<ModificationHistoryEntry>,
}

impl Cve {
    /// Canonicalizes a raw CVE identifier to upper case for storage and comparison.
    pub fn canonical_id(raw: &str) -> String {
        raw.trim().to_uppercase()
    }
}

/// Notification delivered to a user, persisted regardless of delivery state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    Mention,
    CveUpdate,
    Comment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationStatus {
    Unread,
    Read,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    pub recipient_id: String,
    pub sender_id: Option<String>,
    #[serde(rename = "type")]
    pub notification_type: NotificationType,
    pub content: String,
    pub cve_id: Option<String>,
    #[serde(default)]
    pub metadata: serde_json::Value,
    pub status: NotificationStatus,
    pub delivered: bool,
    pub created_at: DateTime<Utc>,
    pub read_at: Option<DateTime<Utc>>,
}

/// Action recorded in the append-only user activity log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityAction {
    Create,
    Update,
    Delete,
    Add,
    Assign,
    Login,
    Logout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityTargetType {
    Cve,
    Poc,
    SnortRule,
    Reference,
    Comment,
    User,
    System,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserActivity {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    pub username: String,
    pub timestamp: DateTime<Utc>,
    pub action: ActivityAction,
    pub target_type: ActivityTargetType,
    pub target_id: String,
    pub target_title: Option<String>,
    #[serde(default)]
    pub changes: Vec<ChangeRecord>,
}

/// A single live WebSocket connection tracked by the push fabric's session
/// registry. `session_id` is the client's logical session (may span
/// multiple physical connections/tabs); `sid` is this specific connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SocketSession {
    pub sid: String,
    pub session_id: String,
    pub username: String,
    pub connected_at: DateTime<Utc>,
}

/// Stage a crawl run is currently in, reported through the progress events
/// and recorded in the run outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrawlerStage {
    Preparing,
    Fetching,
    Processing,
    Saving,
    Completed,
    Error,
    PartialSuccess,
}

/// A persisted, revocable refresh token tied to a signed-in user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshToken {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    pub user_id: String,
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub is_revoked: bool,
    pub created_at: DateTime<Utc>,
}

/// A registered principal. Minimal by design — this platform has no
/// tenancy or role hierarchy, only an admin/non-admin split.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    pub username: String,
    pub email: String,
    pub hashed_password: String,
    pub full_name: Option<String>,
    pub is_admin: bool,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
}

/// Claims embedded in a signed access token. No tenant or role-list
/// concepts exist in this domain; authorization is a single `is_admin` bit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtClaims {
    pub sub: String, // username
    pub is_admin: bool,
    pub exp: i64,
    pub iat: i64,
    pub jti: String,
}

/// Request-scoped identity attached to authenticated handlers.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub user_id: Option<Uuid>,
    pub username: Option<String>,
    pub is_admin: bool,
    pub jti: Option<String>,
    pub request_id: String,
}

impl RequestContext {
    pub fn new() -> Self {
        Self {
            user_id: None,
            username: None,
            is_admin: false,
            jti: None,
            request_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    pub fn with_request_id(mut self, request_id: String) -> Self {
        self.request_id = request_id;
        self
    }

    pub fn with_user(mut self, user_id: Uuid, username: String, is_admin: bool) -> Self {
        self.user_id = Some(user_id);
        self.username = Some(username);
        self.is_admin = is_admin;
        self
    }

    pub fn with_jti(mut self, jti: String) -> Self {
        self.jti = Some(jti);
        self
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}

// Axum FromRequestParts implementation for RequestContext
#[cfg(feature = "axum")]
#[async_trait]
impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, Json<serde_json::Value>);

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<RequestContext>()
            .cloned()
            .ok_or_else(|| {
                (
                    StatusCode::UNAUTHORIZED,
                    Json(serde_json::json!({
                        "error": "Authentication required"
                    })),
                )
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_tolerates_upstream_casing() {
        assert_eq!(Severity::from_upstream("CRITICAL"), Severity::Critical);
        assert_eq!(Severity::from_upstream("Moderate"), Severity::Medium);
        assert_eq!(Severity::from_upstream("banana"), Severity::Unknown);
    }

    #[test]
    fn edit_lock_blocks_other_users_until_expiry() {
        let now = Utc::now();
        let lock = EditLock::acquire("alice", now);
        assert!(lock.blocks("bob", now));
        assert!(!lock.blocks("alice", now));
        assert!(!lock.blocks("bob", now + chrono::Duration::minutes(31)));
    }

    #[test]
    fn cve_id_is_canonicalized_upper_case() {
        assert_eq!(Cve::canonical_id(" cve-2024-1234 "), "CVE-2024-1234");
    }
}
