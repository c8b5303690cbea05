use crate::dto::{LoginRequest, LoginResponse, RegisterRequest, UserProfileResponse};
use crate::repository::AuthRepository;
use cve_core::security::hashing::PasswordHasher;
use cve_core::security::jwt::JwtService;
use cve_core::{ActivityAction, AuthMetrics, Error, ErrorCode, RefreshToken, Result, User};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;
use validator::Validate;

/// Owns the login/register/refresh lifecycle. Deliberately thin: this
/// platform has one role bit (`is_admin`) and no tenancy, so there is no
/// RBAC layer to coordinate here.
#[derive(Clone)]
pub struct AuthService {
    repository: Arc<dyn AuthRepository>,
    password_hasher: Arc<PasswordHasher>,
    jwt_service: Arc<JwtService>,
    metrics: Arc<AuthMetrics>,
}

impl AuthService {
    pub fn new(
        repository: Arc<dyn AuthRepository>,
        password_hasher: Arc<PasswordHasher>,
        jwt_service: Arc<JwtService>,
        metrics: Arc<AuthMetrics>,
    ) -> Self {
        Self {
            repository,
            password_hasher,
            jwt_service,
            metrics,
        }
    }

    /// Creates the account and immediately issues a token pair, same as
    /// `login` — signup is a one-step onboarding flow, not register-then-login.
    pub async fn register(&self, request: RegisterRequest) -> Result<LoginResponse> {
        request
            .validate()
            .map_err(|e| Error::validation(e.to_string()))?;
        cve_core::utils::validate_password(&request.password).map_err(Error::validation)?;

        if self
            .repository
            .find_user_by_username(&request.username)
            .await?
            .is_some()
        {
            return Err(Error::new(
                ErrorCode::ResourceAlreadyExists,
                "Username already taken",
            ));
        }

        let hashed_password = self.password_hasher.hash_password(&request.password)?;
        let user = User {
            id: Some(Uuid::new_v4()),
            username: request.username,
            email: request.email,
            hashed_password,
            full_name: Some(request.full_name),
            is_admin: false,
            is_active: true,
            created_at: chrono::Utc::now(),
            last_login: None,
        };

        self.repository.insert_user(&user).await?;
        info!(username = %user.username, "registered new user");

        let pair = self
            .jwt_service
            .generate_token_pair(&user.username, user.is_admin)?;
        self.persist_refresh_token(&user.username, &pair.refresh_token).await?;

        Ok(LoginResponse {
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
            token_type: "Bearer",
            user: profile_of(&user),
        })
    }

    pub async fn login(&self, request: LoginRequest) -> Result<LoginResponse> {
        let _timer = self
            .metrics
            .login_duration_seconds
            .with_label_values::<&str>(&[])
            .start_timer();

        request
            .validate()
            .map_err(|e| Error::validation(e.to_string()))?;

        let user = self
            .repository
            .find_user_by_username(&request.username)
            .await?
            .ok_or_else(|| {
                self.record_login_failure("unknown_user");
                Error::new(ErrorCode::AuthenticationFailed, "Invalid credentials")
            })?;

        if !user.is_active {
            self.record_login_failure("account_disabled");
            return Err(Error::new(
                ErrorCode::AuthenticationFailed,
                "Account is disabled",
            ));
        }

        if !self
            .password_hasher
            .verify_password(&request.password, &user.hashed_password)?
        {
            warn!(username = %user.username, "failed login attempt");
            self.record_login_failure("invalid_credentials");
            return Err(Error::new(ErrorCode::AuthenticationFailed, "Invalid credentials"));
        }

        let pair = self
            .jwt_service
            .generate_token_pair(&user.username, user.is_admin)?;
        self.persist_refresh_token(&user.username, &pair.refresh_token).await?;
        self.repository.record_login(&user.username).await?;

        self.metrics
            .login_attempts_total
            .with_label_values(&["success"])
            .inc();
        self.metrics.login_success_total.with_label_values::<&str>(&[]).inc();
        if let Err(e) = self
            .repository
            .record_activity(&user.username, ActivityAction::Login)
            .await
        {
            warn!(error = %e, username = %user.username, "failed to record login activity");
        }
        info!(username = %user.username, "login succeeded");

        Ok(LoginResponse {
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
            token_type: "Bearer",
            user: profile_of(&user),
        })
    }

    pub async fn current_user(&self, username: &str) -> Result<UserProfileResponse> {
        let user = self
            .repository
            .find_user_by_username(username)
            .await?
            .ok_or_else(|| Error::new(ErrorCode::ResourceNotFound, "User no longer exists"))?;
        Ok(profile_of(&user))
    }

    pub async fn refresh(&self, refresh_token: &str) -> Result<LoginResponse> {
        let stored = self
            .repository
            .find_refresh_token(refresh_token)
            .await?
            .ok_or_else(|| {
                self.record_refresh("unknown");
                Error::new(ErrorCode::TokenInvalid, "Unknown refresh token")
            })?;

        if stored.is_revoked {
            self.record_refresh("revoked");
            return Err(Error::new(
                ErrorCode::RefreshTokenRevoked,
                "Refresh token has been revoked",
            ));
        }
        if stored.expires_at < chrono::Utc::now() {
            self.record_refresh("expired");
            return Err(Error::new(ErrorCode::TokenExpired, "Refresh token expired"));
        }

        self.jwt_service.verify_refresh_token(refresh_token)?;

        let user = self
            .repository
            .find_user_by_username(&stored.user_id)
            .await?
            .ok_or_else(|| Error::new(ErrorCode::ResourceNotFound, "User no longer exists"))?;

        self.repository.revoke_refresh_token(refresh_token).await?;

        let pair = self
            .jwt_service
            .generate_token_pair(&user.username, user.is_admin)?;
        self.persist_refresh_token(&user.username, &pair.refresh_token).await?;
        self.record_refresh("success");

        Ok(LoginResponse {
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
            token_type: "Bearer",
            user: profile_of(&user),
        })
    }

    pub async fn logout(&self, refresh_token: &str) -> Result<()> {
        let stored = self.repository.find_refresh_token(refresh_token).await?;
        self.repository.revoke_refresh_token(refresh_token).await?;
        if let Some(stored) = stored {
            if let Err(e) = self
                .repository
                .record_activity(&stored.user_id, ActivityAction::Logout)
                .await
            {
                warn!(error = %e, "failed to record logout activity");
            }
        }
        Ok(())
    }

    fn record_login_failure(&self, reason: &str) {
        self.metrics
            .login_attempts_total
            .with_label_values(&["failure"])
            .inc();
        self.metrics
            .login_failures_total
            .with_label_values(&[reason])
            .inc();
    }

    fn record_refresh(&self, status: &str) {
        self.metrics
            .token_refresh_total
            .with_label_values(&[status])
            .inc();
    }

    async fn persist_refresh_token(&self, username: &str, token: &str) -> Result<()> {
        let claims = self.jwt_service.verify_refresh_token(token)?;
        let expires_at = chrono::DateTime::from_timestamp(claims.exp, 0)
            .unwrap_or_else(chrono::Utc::now);

        let refresh_token = RefreshToken {
            id: Some(Uuid::new_v4()),
            user_id: username.to_string(),
            token: token.to_string(),
            expires_at,
            is_revoked: false,
            created_at: chrono::Utc::now(),
        };
        self.repository.insert_refresh_token(&refresh_token).await
    }
}

fn profile_of(user: &User) -> UserProfileResponse {
    UserProfileResponse {
        id: user.id.unwrap_or_default().to_string(),
        username: user.username.clone(),
        email: user.email.clone(),
        full_name: user.full_name.clone().unwrap_or_default(),
        is_admin: user.is_admin,
    }
}
