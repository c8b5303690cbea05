//! Thin persistence seam over `cve_core::CveStore` for the principals this
//! crate owns (`User`, `RefreshToken`). Kept as its own trait, rather than
//! calling `CveStore` directly from the service layer, so the service can
//! be exercised against an in-memory double in tests.

use async_trait::async_trait;
use cve_core::{
    ActivityAction, ActivityTargetType, CveStore, Error, ErrorCode, RefreshToken, Result, User,
    UserActivity,
};

#[async_trait]
pub trait AuthRepository: Send + Sync {
    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>>;
    async fn insert_user(&self, user: &User) -> Result<()>;
    async fn record_login(&self, username: &str) -> Result<()>;
    async fn insert_refresh_token(&self, token: &RefreshToken) -> Result<()>;
    async fn find_refresh_token(&self, token: &str) -> Result<Option<RefreshToken>>;
    async fn revoke_refresh_token(&self, token: &str) -> Result<()>;
    /// Appends a login/logout record to the user activity log.
    async fn record_activity(&self, username: &str, action: ActivityAction) -> Result<()>;
}

#[async_trait]
impl AuthRepository for CveStore {
    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>> {
        CveStore::find_user_by_username(self, username).await
    }

    async fn insert_user(&self, user: &User) -> Result<()> {
        CveStore::insert_user(self, user).await.map_err(|e| {
            if e.code == ErrorCode::DatabaseConstraintViolation {
                Error::new(ErrorCode::ResourceAlreadyExists, "Username already taken")
            } else {
                e
            }
        })
    }

    async fn record_login(&self, username: &str) -> Result<()> {
        CveStore::touch_last_login(self, username).await
    }

    async fn insert_refresh_token(&self, token: &RefreshToken) -> Result<()> {
        CveStore::insert_refresh_token(self, token).await
    }

    async fn find_refresh_token(&self, token: &str) -> Result<Option<RefreshToken>> {
        CveStore::find_refresh_token(self, token).await
    }

    async fn revoke_refresh_token(&self, token: &str) -> Result<()> {
        CveStore::revoke_refresh_token(self, token).await
    }

    async fn record_activity(&self, username: &str, action: ActivityAction) -> Result<()> {
        let activity = UserActivity {
            id: None,
            username: username.to_string(),
            timestamp: chrono::Utc::now(),
            action,
            target_type: ActivityTargetType::User,
            target_id: username.to_string(),
            target_title: None,
            changes: Vec::new(),
        };
        self.append_activity(&activity).await
    }
}
