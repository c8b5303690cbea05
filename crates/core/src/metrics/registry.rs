use crate::config::MetricsConfig;
use prometheus::{Encoder, Registry, TextEncoder};
use tracing::{info, warn};

/// Prometheus registry for the aggregator. Namespaced so every series the
/// platform exports shares one prefix; collector structs (`AuthMetrics`,
/// `CrawlerMetrics`) register themselves here at startup.
#[derive(Clone)]
pub struct MetricsRegistry {
    registry: Registry,
    config: MetricsConfig,
}

impl MetricsRegistry {
    pub fn new(config: MetricsConfig) -> Self {
        let registry = Registry::new_custom(Some(config.namespace.clone()), None)
            .unwrap_or_else(|e| {
                warn!(error = %e, "failed to create namespaced registry, using default");
                Registry::new()
            });
        Self { registry, config }
    }

    /// `prometheus::Registry` is internally synchronized; collectors can be
    /// registered from anywhere without extra locking.
    pub fn register<T>(&self, collector: T) -> Result<(), prometheus::Error>
    where
        T: prometheus::core::Collector + 'static,
    {
        self.registry.register(Box::new(collector))
    }

    /// Text-format exposition of everything registered so far.
    pub fn encode(&self) -> String {
        let mut buffer = Vec::new();
        if let Err(e) = TextEncoder::new().encode(&self.registry.gather(), &mut buffer) {
            warn!(error = %e, "failed to encode metrics");
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }
}

/// Backs the `/metrics` scrape endpoint.
pub struct MetricsService {
    registry: MetricsRegistry,
}

impl MetricsService {
    pub fn new(registry: MetricsRegistry) -> Self {
        if registry.is_enabled() {
            info!(path = %registry.config.path, "metrics endpoint enabled");
        }
        Self { registry }
    }

    /// Returns a placeholder body (rather than a 404) when metrics are
    /// disabled, so scrape configs don't need per-environment exceptions.
    pub fn get_metrics(&self) -> String {
        if !self.registry.is_enabled() {
            return "# Metrics disabled\n".to_string();
        }

        let mut body = format!(
            "# HELP cve_intel_info CVE Intelligence Aggregator build information\n# TYPE cve_intel_info gauge\ncve_intel_info{{version=\"{}\"}} 1\n",
            env!("CARGO_PKG_VERSION")
        );
        body.push_str(&self.registry.encode());
        body
    }
}
