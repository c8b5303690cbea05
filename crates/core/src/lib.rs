pub mod activity_filter;
pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod metrics;
pub mod security;
pub mod store;
pub mod types;
pub mod utils;

pub use activity_filter::{ActivityFilter, ActivityFilterBuilder};
pub use cache::{CacheKind, ResponseCache};
pub use config::{Config, CorsConfig};
pub use error::{Error, ErrorCode, ErrorContext, Result};
pub use metrics::{AuthMetrics, CrawlerMetrics, MetricsRegistry, MetricsService};
pub use store::CveStore;
pub use types::*;

#[cfg(test)]
mod tests;

// Re-export commonly used types from dependencies
pub use chrono::{DateTime, Utc};
pub use uuid::Uuid;
