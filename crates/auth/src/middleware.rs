use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use cve_core::{security::JwtService, RequestContext};
use std::sync::Arc;
use tracing::warn;

#[derive(Clone)]
pub struct AuthState {
    pub jwt_service: Arc<JwtService>,
}

pub async fn auth_middleware(
    State(state): State<AuthState>,
    mut request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let Some(token) = extract_token(&request) else {
        return Ok(unauthorized_response("Missing authorization token"));
    };

    let claims = match state.jwt_service.verify_access_token(&token) {
        Ok(claims) => claims,
        Err(e) => {
            warn!(error = %e, "access token verification failed");
            return Ok(unauthorized_response("Invalid or expired token"));
        }
    };

    let context = RequestContext {
        username: Some(claims.sub),
        is_admin: claims.is_admin,
        ..RequestContext::new().with_jti(claims.jti.clone())
    };

    request.extensions_mut().insert(context);
    Ok(next.run(request).await)
}

/// Rejects the request unless the attached `RequestContext` has `is_admin`.
/// Used as a `from_fn` layer on admin-only routes (crawler triggers, CVE
/// mutation, user management).
pub async fn require_admin(request: Request, next: Next) -> Result<Response, StatusCode> {
    let is_admin = request
        .extensions()
        .get::<RequestContext>()
        .map(|ctx| ctx.is_admin)
        .unwrap_or(false);

    if !is_admin {
        return Ok(forbidden_response("Admin privileges required"));
    }

    Ok(next.run(request).await)
}

fn extract_token(request: &Request) -> Option<String> {
    request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::to_string)
}

fn unauthorized_response(message: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        [(axum::http::header::WWW_AUTHENTICATE, "Bearer")],
        Json(serde_json::json!({ "error": message })),
    )
        .into_response()
}

fn forbidden_response(message: &str) -> Response {
    (StatusCode::FORBIDDEN, Json(serde_json::json!({ "error": message }))).into_response()
}
