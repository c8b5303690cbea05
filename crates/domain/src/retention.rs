//! Retention sweep for the activity log and notifications: a periodic
//! maintenance task that wakes on a fixed interval, deletes what's past
//! the cutoff, and logs only when it actually did something.

use crate::activity::ActivityService;
use crate::notification::NotificationService;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Runs forever, sweeping both stores every `interval`. Intended to be
/// `tokio::spawn`ed once at startup.
pub async fn run_forever(
    activity: Arc<ActivityService>,
    notifications: Arc<NotificationService>,
    retention: chrono::Duration,
    interval: Duration,
) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;

        match activity.purge_older_than(retention).await {
            Ok(count) if count > 0 => info!(count, "purged old activity records"),
            Ok(_) => {}
            Err(e) => warn!(error = %e, "activity retention sweep failed"),
        }

        match notifications.purge_older_than(retention).await {
            Ok(count) if count > 0 => info!(count, "purged old notifications"),
            Ok(_) => {}
            Err(e) => warn!(error = %e, "notification retention sweep failed"),
        }
    }
}
