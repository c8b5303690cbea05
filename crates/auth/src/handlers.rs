use crate::{
    dto::{LoginRequest, LoginResponse, RefreshRequest, RegisterRequest, UserProfileResponse},
    middleware::{auth_middleware, AuthState},
    service::AuthService,
};
use axum::{
    extract::{Extension, State},
    middleware::from_fn_with_state,
    routing::{get, post},
    Json, Router,
};
use cve_core::{Error, ErrorCode, RequestContext};
use std::sync::Arc;

pub type SharedAuthService = Arc<AuthService>;

/// `/auth/signup`, `/auth/token`, and `/auth/refresh` are public; `/auth/me`
/// and `/auth/logout` are gated by their own `route_layer` rather than a
/// blanket middleware, since they're the only two endpoints in this router
/// that need a verified principal.
pub fn auth_routes(auth_state: AuthState) -> Router<SharedAuthService> {
    Router::new()
        .route("/auth/signup", post(signup))
        .route("/auth/token", post(token))
        .route("/auth/refresh", post(refresh))
        .route(
            "/auth/logout",
            post(logout).route_layer(from_fn_with_state(auth_state.clone(), auth_middleware)),
        )
        .route(
            "/auth/me",
            get(me).route_layer(from_fn_with_state(auth_state, auth_middleware)),
        )
}

async fn signup(
    State(service): State<SharedAuthService>,
    Json(request): Json<RegisterRequest>,
) -> cve_core::Result<Json<LoginResponse>> {
    Ok(Json(service.register(request).await?))
}

async fn token(
    State(service): State<SharedAuthService>,
    Json(request): Json<LoginRequest>,
) -> cve_core::Result<Json<LoginResponse>> {
    Ok(Json(service.login(request).await?))
}

async fn refresh(
    State(service): State<SharedAuthService>,
    Json(request): Json<RefreshRequest>,
) -> cve_core::Result<Json<LoginResponse>> {
    Ok(Json(service.refresh(&request.refresh_token).await?))
}

async fn logout(
    State(service): State<SharedAuthService>,
    Json(request): Json<RefreshRequest>,
) -> cve_core::Result<Json<serde_json::Value>> {
    service.logout(&request.refresh_token).await?;
    Ok(Json(serde_json::json!({"status": "logged_out"})))
}

async fn me(
    State(service): State<SharedAuthService>,
    Extension(ctx): Extension<RequestContext>,
) -> cve_core::Result<Json<UserProfileResponse>> {
    let username = ctx
        .username
        .as_deref()
        .ok_or_else(|| Error::new(ErrorCode::AuthenticationRequired, "Missing principal"))?;
    Ok(Json(service.current_user(username).await?))
}
