pub mod activities;
pub mod comments;
pub mod crawlers;
pub mod cves;
pub mod notifications;
pub mod update_history;
