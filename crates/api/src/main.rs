//! # CVE Intelligence Aggregator API Server
//!
//! HTTP entry point for the aggregator: wires MongoDB, Redis, the JWT/push
//! fabrics, and every domain service into a single Axum router, then serves
//! it behind the same middleware stack (security headers, request ID,
//! tracing, compression, CORS) the platform has always used.
//!
//! ## Middleware Stack
//!
//! 1. **Security Headers** — HSTS, CSP, frame/sniff protections
//! 2. **Request ID** — correlation id stamped into span and response
//! 3. **Tracing** — structured request/response logging
//! 4. **Compression** — gzip/brotli response compression
//! 5. **CORS** — cross-origin policy from configuration
//! 6. **Authentication** — JWT bearer validation, applied per sub-router
//!
//! ## Usage
//!
//! ```bash
//! cargo run --bin cve-server
//! ```
//!
//! - **API**: http://localhost:3000/
//! - **Health**: http://localhost:3000/health
//! - **Docs**: http://localhost:3000/swagger-ui

use axum::{http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use cve_auth::{
    auth_middleware, auth_routes, AuthRepository, AuthService, AuthState,
};
use cve_core::metrics::{AuthMetrics, CrawlerMetrics, MetricsRegistry, MetricsService};
use cve_core::security::{hashing::PasswordHasher, jwt::JwtService};
use cve_core::{Config, CorsConfig, CveStore, ResponseCache};
use cve_domain::crawler::{CrawlerRegistry, ExploitModuleCrawler, RulesFileCrawler, TemplateRepoCrawler};
use cve_domain::{ActivityService, CommentService, CrawlerScheduler, CveService, NotificationService};
use cve_push::{ws_handler, PushFabric, PushState, SessionRegistry};
use std::{net::SocketAddr, sync::Arc};
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use axum::http::{HeaderName, HeaderValue, Method};
use tracing::{info, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

mod api_middleware;
mod handlers;
mod health;
mod state;

use crate::state::AppState;

/// Builds a CORS layer from configuration.
///
/// Production should never allow a wildcard origin; `Config::load`'s
/// `validate_production_security` already refuses to start with one, so
/// this function only has to translate the validated config into a layer.
fn build_cors_layer(cors_config: &CorsConfig) -> Result<CorsLayer, Box<dyn std::error::Error>> {
    let mut cors = CorsLayer::new();

    if cors_config.allowed_origins.contains(&"*".to_string()) {
        cors = cors.allow_origin(Any);
    } else {
        let origins: Result<Vec<HeaderValue>, _> =
            cors_config.allowed_origins.iter().map(|origin| origin.parse()).collect();
        cors = cors.allow_origin(origins?);
    }

    if cors_config.allowed_methods.contains(&"*".to_string()) {
        cors = cors.allow_methods(Any);
    } else {
        let methods: Result<Vec<Method>, _> =
            cors_config.allowed_methods.iter().map(|method| method.parse()).collect();
        cors = cors.allow_methods(methods?);
    }

    if cors_config.allowed_headers.contains(&"*".to_string()) {
        cors = cors.allow_headers(Any);
    } else {
        let headers: Result<Vec<HeaderName>, _> =
            cors_config.allowed_headers.iter().map(|header| header.parse()).collect();
        cors = cors.allow_headers(headers?);
    }

    if !cors_config.expose_headers.is_empty() {
        let expose_headers: Result<Vec<HeaderName>, _> =
            cors_config.expose_headers.iter().map(|header| header.parse()).collect();
        cors = cors.expose_headers(expose_headers?);
    }

    cors = cors.allow_credentials(cors_config.allow_credentials);

    if let Some(max_age) = cors_config.max_age {
        cors = cors.max_age(std::time::Duration::from_secs(max_age));
    }

    Ok(cors)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    info!("starting CVE intelligence aggregator");

    let config = Config::load()?;
    info!("configuration loaded");

    let store = Arc::new(CveStore::connect(&config.mongodb).await?);
    info!("connected to MongoDB");

    let cache = Arc::new(ResponseCache::connect(&config.redis.url).await?);
    info!("connected to Redis");

    let jwt_service = Arc::new(JwtService::new(&config.jwt)?);
    let password_hasher = Arc::new(PasswordHasher::new(&config.security)?);
    let session_registry = Arc::new(SessionRegistry::new());
    let push = PushFabric::new(session_registry.clone());

    let activity_service = Arc::new(ActivityService::new(store.clone()));
    let notification_service = Arc::new(NotificationService::new(store.clone(), push.clone()));
    let cve_service = Arc::new(CveService::new(
        store.clone(),
        cache.clone(),
        push.clone(),
        activity_service.clone(),
        notification_service.clone(),
    ));
    let comment_service = Arc::new(CommentService::new(
        store.clone(),
        cache.clone(),
        push.clone(),
        activity_service.clone(),
        notification_service.clone(),
    ));

    let crawler_registry = Arc::new(CrawlerRegistry::new(vec![
        Arc::new(TemplateRepoCrawler::new(
            config.crawler.template_repo_url.clone(),
            &config.server.data_dir,
        )),
        Arc::new(ExploitModuleCrawler::new(
            config.crawler.exploit_module_repo_url.clone(),
            &config.server.data_dir,
        )),
        Arc::new(RulesFileCrawler::new(config.crawler.rules_feed_url.clone(), config.server.data_dir.clone())),
    ]));
    let metrics_registry = MetricsRegistry::new(config.metrics.clone());
    let auth_metrics = Arc::new(AuthMetrics::new("auth")?);
    let crawler_metrics = Arc::new(CrawlerMetrics::new("crawler")?);
    auth_metrics.register_all(&metrics_registry)?;
    crawler_metrics.register_all(&metrics_registry)?;
    let metrics = Arc::new(MetricsService::new(metrics_registry));

    let crawler_scheduler = Arc::new(CrawlerScheduler::new(
        crawler_registry.clone(),
        store.clone(),
        cache.clone(),
        push.clone(),
        cve_service.clone(),
        crawler_metrics.clone(),
    )?);

    let auth_repository: Arc<dyn AuthRepository> = store.clone();
    let auth_service = Arc::new(AuthService::new(
        auth_repository,
        password_hasher,
        jwt_service.clone(),
        auth_metrics,
    ));

    if config.crawler.scheduler_enabled {
        let scheduler = crawler_scheduler.clone();
        tokio::spawn(async move { scheduler.run_forever().await });
        info!("crawler scheduler started");
    } else {
        info!("crawler scheduler disabled");
    }

    tokio::spawn(cve_domain::retention::run_forever(
        activity_service.clone(),
        notification_service.clone(),
        chrono::Duration::days(30),
        std::time::Duration::from_secs(3600),
    ));

    let app_state = AppState {
        store: store.clone(),
        cache: cache.clone(),
        push: push.clone(),
        cve_service,
        comment_service,
        activity_service,
        notification_service,
        crawler_registry,
        crawler_scheduler,
        auth_service: auth_service.clone(),
        metrics,
    };

    let push_state = PushState::new(session_registry, jwt_service.clone())
        .with_heartbeat_timeout(std::time::Duration::from_secs(
            config.websocket.ping_timeout_seconds,
        ))
        .with_metrics(crawler_metrics);
    let auth_state = AuthState { jwt_service };

    let app = create_app(app_state, auth_state, push_state, &config)?;

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    info!(%addr, "server listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

    info!("server shutdown complete");
    Ok(())
}

fn create_app(
    state: AppState,
    auth_state: AuthState,
    push_state: PushState,
    config: &Config,
) -> Result<Router, Box<dyn std::error::Error>> {
    #[derive(OpenApi)]
    #[openapi(
        paths(health::health_check, health::readiness_check),
        tags(
            (name = "health", description = "Liveness and readiness probes"),
            (name = "auth", description = "Registration, login, refresh, logout"),
            (name = "cves", description = "CVE upsert, lookup, and edit-lock"),
            (name = "crawlers", description = "Crawler scheduling and status"),
            (name = "notifications", description = "Mention and state-transition notifications"),
        )
    )]
    struct ApiDoc;

    let authenticated_routes: Router<()> = Router::new()
        .merge(handlers::cves::routes())
        .merge(handlers::comments::routes())
        .merge(handlers::activities::routes())
        .merge(handlers::crawlers::routes())
        .merge(handlers::notifications::routes())
        .merge(handlers::update_history::routes())
        .layer(axum::middleware::from_fn_with_state(auth_state.clone(), auth_middleware))
        .with_state(state.clone());

    let auth_router: Router<()> = auth_routes(auth_state).with_state(state.auth_service.clone());

    let websocket_router: Router<()> = Router::new().route("/ws", get(ws_handler)).with_state(push_state);

    let router = Router::new()
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check))
        .route("/metrics", get(health::metrics))
        .with_state(state.clone())
        .merge(authenticated_routes)
        .merge(auth_router)
        .merge(websocket_router)
        .merge(
            SwaggerUi::new("/swagger-ui")
                .url("/api-docs/openapi.json", ApiDoc::openapi())
                .url("/api-docs/auth.json", cve_auth::AuthApiDoc::openapi()),
        )
        .layer(
            ServiceBuilder::new()
                .layer(axum::middleware::from_fn(api_middleware::security_headers::security_headers_middleware))
                .layer(axum::middleware::from_fn(api_middleware::request_id::request_id_middleware))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                        .on_request(DefaultOnRequest::new().level(Level::INFO))
                        .on_response(DefaultOnResponse::new().level(Level::INFO)),
                )
                .layer(CompressionLayer::new())
                .layer(build_cors_layer(&config.cors)?),
        )
        .fallback(handler_404);

    Ok(router)
}

async fn handler_404() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, Json(serde_json::json!({"error": "Resource not found"})))
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cve_api=debug,cve_auth=debug,cve_core=debug,cve_domain=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received Ctrl+C signal"),
        _ = terminate => info!("received terminate signal"),
    }
}
