//! The fixed catalog of wire event names. Kept as `&'static str` constants
//! rather than an enum since the event name also doubles as the outbound
//! frame's `type` field and several inbound client frame discriminators —
//! a plain string keeps both directions symmetric.

pub const CONNECTED: &str = "connected";
pub const CONNECT_ACK: &str = "connect_ack";
pub const SESSION_INFO_ACK: &str = "session_info_ack";
pub const PONG: &str = "pong";
pub const ERROR: &str = "error";
pub const NOTIFICATION: &str = "notification";
pub const NOTIFICATION_READ: &str = "notification_read";
pub const ALL_NOTIFICATIONS_READ: &str = "all_notifications_read";
pub const CVE_CREATED: &str = "cve_created";
pub const CVE_UPDATED: &str = "cve_updated";
pub const CVE_DELETED: &str = "cve_deleted";
pub const COMMENT_ADDED: &str = "comment_added";
pub const COMMENT_UPDATED: &str = "comment_updated";
pub const COMMENT_DELETED: &str = "comment_deleted";
pub const COMMENT_COUNT_UPDATE: &str = "comment_count_update";
pub const SUBSCRIBE_CVE: &str = "subscribe_cve";
pub const UNSUBSCRIBE_CVE: &str = "unsubscribe_cve";
pub const SUBSCRIPTION_STATUS: &str = "subscription_status";
pub const CVE_SUBSCRIBERS_UPDATED: &str = "cve_subscribers_updated";
pub const CRAWLER_UPDATE_PROGRESS: &str = "crawler_update_progress";
pub const CACHE_INVALIDATED: &str = "cache_invalidated";
