use crate::metrics::MetricsRegistry;
use prometheus::{HistogramVec, IntCounterVec, IntGaugeVec, Opts};

/// Authentication-specific metrics.
#[derive(Debug, Clone)]
pub struct AuthMetrics {
    pub login_attempts_total: IntCounterVec,
    pub login_success_total: IntCounterVec,
    pub login_failures_total: IntCounterVec,
    pub login_duration_seconds: HistogramVec,

    pub token_validations_total: IntCounterVec,
    pub token_validation_duration_seconds: HistogramVec,
    pub token_refresh_total: IntCounterVec,

    pub rate_limit_exceeded_total: IntCounterVec,
    pub invalid_token_attempts_total: IntCounterVec,
}

impl AuthMetrics {
    pub fn new(namespace: &str) -> Result<Self, prometheus::Error> {
        let login_attempts_total = IntCounterVec::new(
            Opts::new(
                format!("{}_login_attempts_total", namespace),
                "Total number of login attempts",
            ),
            &["status"],
        )?;

        let login_success_total = IntCounterVec::new(
            Opts::new(
                format!("{}_login_success_total", namespace),
                "Total number of successful logins",
            ),
            &[],
        )?;

        let login_failures_total = IntCounterVec::new(
            Opts::new(
                format!("{}_login_failures_total", namespace),
                "Total number of failed logins",
            ),
            &["reason"],
        )?;

        let login_duration_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new(
                format!("{}_login_duration_seconds", namespace),
                "Time spent processing login requests",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]),
            &[],
        )?;

        let token_validations_total = IntCounterVec::new(
            Opts::new(
                format!("{}_token_validations_total", namespace),
                "Total number of token validations",
            ),
            &["token_type", "status"],
        )?;

        let token_validation_duration_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new(
                format!("{}_token_validation_duration_seconds", namespace),
                "Time spent validating tokens",
            )
            .buckets(vec![0.0001, 0.0005, 0.001, 0.005, 0.01, 0.025, 0.05]),
            &["token_type"],
        )?;

        let token_refresh_total = IntCounterVec::new(
            Opts::new(
                format!("{}_token_refresh_total", namespace),
                "Total number of token refreshes",
            ),
            &["status"],
        )?;

        let rate_limit_exceeded_total = IntCounterVec::new(
            Opts::new(
                format!("{}_rate_limit_exceeded_total", namespace),
                "Total number of rate limit violations",
            ),
            &["endpoint"],
        )?;

        let invalid_token_attempts_total = IntCounterVec::new(
            Opts::new(
                format!("{}_invalid_token_attempts_total", namespace),
                "Total number of invalid token attempts",
            ),
            &["token_type"],
        )?;

        Ok(Self {
            login_attempts_total,
            login_success_total,
            login_failures_total,
            login_duration_seconds,
            token_validations_total,
            token_validation_duration_seconds,
            token_refresh_total,
            rate_limit_exceeded_total,
            invalid_token_attempts_total,
        })
    }

    pub fn register_all(&self, registry: &MetricsRegistry) -> Result<(), prometheus::Error> {
        registry.register(self.login_attempts_total.clone())?;
        registry.register(self.login_success_total.clone())?;
        registry.register(self.login_failures_total.clone())?;
        registry.register(self.login_duration_seconds.clone())?;
        registry.register(self.token_validations_total.clone())?;
        registry.register(self.token_validation_duration_seconds.clone())?;
        registry.register(self.token_refresh_total.clone())?;
        registry.register(self.rate_limit_exceeded_total.clone())?;
        registry.register(self.invalid_token_attempts_total.clone())?;

        Ok(())
    }
}

/// Crawler and push-fabric metrics.
#[derive(Debug, Clone)]
pub struct CrawlerMetrics {
    pub crawl_runs_total: IntCounterVec,
    pub crawl_duration_seconds: HistogramVec,
    pub crawl_items_updated_total: IntCounterVec,
    pub active_websocket_connections: IntGaugeVec,
    pub cve_subscriptions: IntGaugeVec,
}

impl CrawlerMetrics {
    pub fn new(namespace: &str) -> Result<Self, prometheus::Error> {
        let crawl_runs_total = IntCounterVec::new(
            Opts::new(
                format!("{}_crawl_runs_total", namespace),
                "Total number of crawler runs by source and outcome",
            ),
            &["source", "status"],
        )?;

        let crawl_duration_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new(
                format!("{}_crawl_duration_seconds", namespace),
                "Wall-clock time spent running a crawl",
            )
            .buckets(vec![1.0, 5.0, 15.0, 30.0, 60.0, 180.0, 300.0, 600.0]),
            &["source"],
        )?;

        let crawl_items_updated_total = IntCounterVec::new(
            Opts::new(
                format!("{}_crawl_items_updated_total", namespace),
                "Total number of CVE records added or changed by a crawl",
            ),
            &["source"],
        )?;

        let active_websocket_connections = IntGaugeVec::new(
            Opts::new(
                format!("{}_active_websocket_connections", namespace),
                "Currently connected WebSocket sessions",
            ),
            &[],
        )?;

        let cve_subscriptions = IntGaugeVec::new(
            Opts::new(
                format!("{}_cve_subscriptions", namespace),
                "Currently active per-CVE subscriptions",
            ),
            &[],
        )?;

        Ok(Self {
            crawl_runs_total,
            crawl_duration_seconds,
            crawl_items_updated_total,
            active_websocket_connections,
            cve_subscriptions,
        })
    }

    pub fn register_all(&self, registry: &MetricsRegistry) -> Result<(), prometheus::Error> {
        registry.register(self.crawl_runs_total.clone())?;
        registry.register(self.crawl_duration_seconds.clone())?;
        registry.register(self.crawl_items_updated_total.clone())?;
        registry.register(self.active_websocket_connections.clone())?;
        registry.register(self.cve_subscriptions.clone())?;

        Ok(())
    }
}
