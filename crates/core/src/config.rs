//! # Configuration Management System
//!
//! Hierarchical configuration loader for the CVE intelligence platform.
//! Values are loaded from multiple sources in order of precedence:
//!
//! 1. **Environment variables** (highest precedence)
//! 2. **Environment-specific TOML files** (e.g., `config/production.toml`)
//! 3. **Default TOML file** (`config/default.toml`) (lowest precedence)
//!
//! ## Usage
//!
//! ```rust
//! use cve_core::Config;
//!
//! let config = Config::load().expect("Failed to load configuration");
//! let mongo_url = &config.mongodb.url;
//! ```
//!
//! ## Environment Selection
//!
//! Selected via the `ENVIRONMENT` variable: `development` (default),
//! `testing`, or `production`.

use config::{ConfigError, Environment, File};
use serde::Deserialize;
use std::env;

/// Root configuration structure for the CVE aggregator.
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub mongodb: MongoConfig,
    pub redis: RedisConfig,
    pub jwt: JwtConfig,
    pub security: SecurityConfig,
    pub server: ServerConfig,
    pub rate_limit: RateLimitConfig,
    pub app: AppConfig,
    pub metrics: MetricsConfig,
    pub cors: CorsConfig,
    pub crawler: CrawlerConfig,
    pub websocket: WebSocketConfig,
}

/// MongoDB connection and database-naming configuration.
///
/// # Example Configuration
///
/// ```toml
/// [mongodb]
/// url = "mongodb://localhost:27017"
/// database_name = "cve_intel"
/// max_pool_size = 20
/// min_pool_size = 2
/// ```
#[derive(Debug, Deserialize, Clone)]
pub struct MongoConfig {
    /// MongoDB connection URI. Provided via `MONGODB_URL` in production.
    pub url: String,
    /// Logical database name. Provided via `DATABASE_NAME`.
    pub database_name: String,
    /// Maximum pool size for the driver's connection pool.
    pub max_pool_size: u32,
    /// Minimum pool size kept warm to absorb traffic bursts.
    pub min_pool_size: u32,
    /// Server selection timeout in milliseconds.
    pub server_selection_timeout_ms: u64,
}

/// Redis configuration used for the response/query cache and rate limiting.
#[derive(Debug, Deserialize, Clone)]
pub struct RedisConfig {
    pub url: String,
    pub max_connections: u32,
    /// Default TTL in seconds applied to cached CVE list/detail entries.
    pub default_ttl_seconds: u64,
}

/// JWT signing and expiry configuration.
///
/// # Example Configuration
///
/// ```toml
/// [jwt]
/// secret = "your-super-secret-jwt-signing-key-min-32-chars"
/// access_token_expiry = 1800
/// refresh_token_expiry = 604800
/// ```
#[derive(Debug, Deserialize, Clone)]
pub struct JwtConfig {
    /// Secret key used to sign access and refresh tokens. Must be at least
    /// 32 characters; provided via `SECRET_KEY` in production.
    pub secret: String,
    /// Access token lifetime in seconds.
    pub access_token_expiry: i64,
    /// Refresh token lifetime in seconds.
    pub refresh_token_expiry: i64,
}

/// Password hashing parameters.
#[derive(Debug, Deserialize, Clone)]
pub struct SecurityConfig {
    pub argon2_memory_cost: u32,
    pub argon2_time_cost: u32,
    pub argon2_parallelism: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub workers: usize,
    /// Directory backing locally-cloned crawler repositories and downloaded
    /// artifacts. Provided via `DATA_DIR`.
    pub data_dir: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RateLimitConfig {
    pub requests_per_minute: u32,
    pub burst_size: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub environment: String,
    pub log_level: String,
    /// IANA timezone used to render timestamps in API responses, e.g. `Asia/Seoul`.
    pub display_timezone: String,
    pub enable_registration: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub port: u16,
    pub path: String,
    pub namespace: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
    pub allowed_methods: Vec<String>,
    pub allowed_headers: Vec<String>,
    pub expose_headers: Vec<String>,
    pub max_age: Option<u64>,
    pub allow_credentials: bool,
}

/// Per-crawler upstream source overrides and scheduling toggles.
#[derive(Debug, Deserialize, Clone)]
pub struct CrawlerConfig {
    /// Git URL for the nuclei-template style crawler. Overridable via
    /// `TEMPLATE_REPO_URL`.
    pub template_repo_url: String,
    /// Git URL for the exploit-module crawler (e.g. Metasploit). Overridable
    /// via `EXPLOIT_MODULE_REPO_URL`.
    pub exploit_module_repo_url: String,
    /// HTTP(S) source for the standalone detection-rule feed. Overridable via
    /// `RULES_FEED_URL`.
    pub rules_feed_url: String,
    /// Clone/pull timeout for git-backed crawlers, in seconds.
    pub git_timeout_seconds: u64,
    /// Whether the cron scheduler is active. Disabled in tests.
    pub scheduler_enabled: bool,
}

/// WebSocket push fabric tuning.
#[derive(Debug, Deserialize, Clone)]
pub struct WebSocketConfig {
    pub ping_interval_seconds: u64,
    pub ping_timeout_seconds: u64,
    pub max_message_bytes: usize,
}

impl Config {
    /// Loads configuration from TOML files then environment variable
    /// overrides, validating the result before returning it.
    pub fn load() -> Result<Self, ConfigError> {
        let environment = env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

        let builder = config::Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", environment)).required(false))
            .add_source(Environment::with_prefix("").separator("_"));

        let config = builder.build()?;
        let mut loaded_config: Config = config.try_deserialize()?;
        loaded_config.apply_well_known_env_overrides();

        loaded_config.validate(&environment)?;

        Ok(loaded_config)
    }

    /// The deployment surface exposes a handful of flat variable names
    /// (`MONGODB_URL`, `SECRET_KEY`, …) that don't follow the generic
    /// `SECTION_FIELD` mapping, so they're applied explicitly on top of the
    /// layered sources.
    fn apply_well_known_env_overrides(&mut self) {
        if let Ok(url) = env::var("MONGODB_URL") {
            self.mongodb.url = url;
        }
        if let Ok(name) = env::var("DATABASE_NAME") {
            self.mongodb.database_name = name;
        }
        if let Ok(url) = env::var("REDIS_URL") {
            self.redis.url = url;
        }
        if let Ok(secret) = env::var("SECRET_KEY") {
            self.jwt.secret = secret;
        }
        if let Ok(dir) = env::var("DATA_DIR") {
            self.server.data_dir = dir;
        }
        if let Ok(level) = env::var("LOG_LEVEL") {
            self.app.log_level = level;
        }
        if let Ok(tz) = env::var("DISPLAY_TIMEZONE") {
            self.app.display_timezone = tz;
        }
        if let Ok(origins) = env::var("CORS_ALLOWED_ORIGINS") {
            self.cors.allowed_origins = origins
                .split(',')
                .map(|origin| origin.trim().to_string())
                .filter(|origin| !origin.is_empty())
                .collect();
        }
    }

    fn validate(&mut self, environment: &str) -> Result<(), ConfigError> {
        if self.jwt.secret.len() < 32 {
            return Err(ConfigError::Message(format!(
                "JWT secret must be at least 32 characters long (current: {})",
                self.jwt.secret.len()
            )));
        }

        if environment == "production" {
            self.validate_production_security()?;
        }

        if !self.mongodb.url.starts_with("mongodb://") && !self.mongodb.url.starts_with("mongodb+srv://") {
            return Err(ConfigError::Message(
                "MongoDB URL must start with 'mongodb://' or 'mongodb+srv://'".to_string(),
            ));
        }

        if !self.redis.url.starts_with("redis://") {
            return Err(ConfigError::Message(
                "Redis URL must be a Redis connection string starting with 'redis://'".to_string(),
            ));
        }

        if self.jwt.access_token_expiry <= 0 || self.jwt.access_token_expiry > 86400 {
            return Err(ConfigError::Message(
                "Access token expiry must be between 1 second and 24 hours".to_string(),
            ));
        }

        if self.jwt.refresh_token_expiry <= self.jwt.access_token_expiry {
            return Err(ConfigError::Message(
                "Refresh token expiry must be longer than access token expiry".to_string(),
            ));
        }

        Ok(())
    }

    fn validate_production_security(&self) -> Result<(), ConfigError> {
        let error_indicators = [
            "ERROR_", "INSECURE_DEFAULT", "CHANGE_THIS", "NOT_SET",
            "CHECK_ENVIRONMENT", "PLACEHOLDER",
        ];

        for indicator in &error_indicators {
            if self.jwt.secret.contains(indicator) {
                return Err(ConfigError::Message(format!(
                    "Production deployment detected insecure JWT secret. Set SECRET_KEY environment variable. Current value contains: {}",
                    indicator
                )));
            }
            if self.mongodb.url.contains(indicator) {
                return Err(ConfigError::Message(format!(
                    "Production deployment detected missing MongoDB configuration. Set MONGODB_URL environment variable. Current value contains: {}",
                    indicator
                )));
            }
            if self.redis.url.contains(indicator) {
                return Err(ConfigError::Message(format!(
                    "Production deployment detected missing Redis configuration. Set REDIS_URL environment variable. Current value contains: {}",
                    indicator
                )));
            }
        }

        if self.security.argon2_memory_cost < 65536 {
            return Err(ConfigError::Message(
                "Production deployment requires Argon2 memory cost of at least 65536 (64 MB)".to_string(),
            ));
        }

        if self.security.argon2_time_cost < 3 {
            return Err(ConfigError::Message(
                "Production deployment requires Argon2 time cost of at least 3".to_string(),
            ));
        }

        if self.app.enable_registration {
            return Err(ConfigError::Message(
                "Production deployment should not allow public registration. Set ENABLE_REGISTRATION=false".to_string(),
            ));
        }

        for origin in &self.cors.allowed_origins {
            for indicator in &error_indicators {
                if origin.contains(indicator) {
                    return Err(ConfigError::Message(format!(
                        "Production deployment detected missing CORS origin. Set CORS_ALLOWED_ORIGINS environment variable. Current value contains: {}",
                        indicator
                    )));
                }
            }

            if origin == "*" {
                return Err(ConfigError::Message(
                    "Production deployment must not use wildcard (*) CORS origins".to_string(),
                ));
            }
        }

        Ok(())
    }
}
