use cve_auth::AuthService;
use cve_core::metrics::MetricsService;
use cve_core::{CveStore, ResponseCache};
use cve_domain::crawler::CrawlerRegistry;
use cve_domain::{ActivityService, CommentService, CrawlerScheduler, CveService, NotificationService};
use cve_push::PushFabric;
use std::sync::Arc;

/// Shared application state handed to every handler. Built once at startup
/// in `main` and cloned (cheaply, every field is an `Arc` or already
/// internally shared) into each request.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<CveStore>,
    pub cache: Arc<ResponseCache>,
    pub push: PushFabric,
    pub cve_service: Arc<CveService>,
    pub comment_service: Arc<CommentService>,
    pub activity_service: Arc<ActivityService>,
    pub notification_service: Arc<NotificationService>,
    pub crawler_registry: Arc<CrawlerRegistry>,
    pub crawler_scheduler: Arc<CrawlerScheduler>,
    pub auth_service: Arc<AuthService>,
    pub metrics: Arc<MetricsService>,
}

impl AppState {
    /// Readiness probe: both backing stores must answer before the service
    /// reports itself ready to take traffic.
    pub async fn check_ready(&self) -> (bool, bool) {
        (self.store.ping().await.is_ok(), self.cache.ping().await.is_ok())
    }
}
