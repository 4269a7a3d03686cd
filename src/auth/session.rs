use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::password;
use crate::auth::token::{TokenCodec, TokenKind};
use crate::config::AuthConfig;
use crate::db::{AccountView, CredentialStore};
use crate::error::{AppError, AuthError};
use crate::Result;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SessionTokens {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginOutcome {
    pub user: AccountView,
    #[serde(flatten)]
    pub tokens: SessionTokens,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SessionPolicy {
    /// When set, a password change also clears the stored refresh token,
    /// ending every session at its next refresh.
    pub revoke_sessions_on_password_change: bool,
}

impl From<&AuthConfig> for SessionPolicy {
    fn from(auth: &AuthConfig) -> Self {
        Self {
            revoke_sessions_on_password_change: auth.revoke_sessions_on_password_change,
        }
    }
}

/// Login, logout, refresh rotation and password change.
///
/// This is the only writer of the stored refresh token, and keeps at most
/// one live refresh token per account: every login or refresh overwrites
/// the previous value, and a refresh only succeeds if it swaps out exactly
/// the token it was presented with.
pub struct SessionManager {
    store: Arc<dyn CredentialStore>,
    codec: Arc<TokenCodec>,
    policy: SessionPolicy,
}

impl SessionManager {
    pub fn new(store: Arc<dyn CredentialStore>, codec: Arc<TokenCodec>, policy: SessionPolicy) -> Self {
        Self { store, codec, policy }
    }

    fn issue_pair(&self, account_id: Uuid) -> Result<SessionTokens> {
        Ok(SessionTokens {
            access_token: self.codec.issue_access_token(account_id)?,
            refresh_token: self.codec.issue_refresh_token(account_id)?,
        })
    }

    /// Authenticates by username or email. Empty identifiers count as absent.
    pub async fn login(
        &self,
        username: Option<&str>,
        email: Option<&str>,
        password: &str,
    ) -> Result<LoginOutcome> {
        let username = username.map(|u| u.trim().to_lowercase()).unwrap_or_default();
        let email = email.map(|e| e.trim().to_string()).unwrap_or_default();
        if (username.is_empty() && email.is_empty()) || password.is_empty() {
            return Err(AppError::ValidationError("All fields are required".to_string()));
        }

        let account = self
            .store
            .find_by_username_or_email(&username, &email)
            .await?
            .ok_or_else(|| {
                AppError::NotFound("User not found with this email or username".to_string())
            })?;

        if !password::verify_in_background(account.password_hash.clone(), password.to_string()).await? {
            warn!(
                code = AuthError::InvalidCredential.code(),
                account_id = %account.id,
                "Login rejected"
            );
            return Err(AuthError::InvalidCredential.into());
        }

        let tokens = self.issue_pair(account.id)?;
        // Overwrites any previous value, which ends every other session.
        self.store.set_refresh_token(account.id, &tokens.refresh_token).await?;

        info!(account_id = %account.id, "Session started");
        Ok(LoginOutcome {
            user: account.view(),
            tokens,
        })
    }

    fn reject(&self, error: AuthError, account_id: Option<Uuid>, reason: &str) -> AppError {
        warn!(
            code = error.code(),
            account_id = ?account_id,
            reason,
            "Refresh rejected"
        );
        error.into()
    }

    /// Exchanges a refresh token for a new pair. Each refresh token works once.
    pub async fn refresh(&self, incoming: Option<&str>) -> Result<SessionTokens> {
        let token = match incoming {
            Some(token) if !token.is_empty() => token,
            _ => return Err(AuthError::Unauthenticated.into()),
        };

        let account_id = self
            .codec
            .verify(token, TokenKind::Refresh)
            .map_err(|e| self.reject(AuthError::InvalidRefreshToken, None, &e.to_string()))?;

        let account = self
            .store
            .find_by_id(account_id)
            .await?
            .ok_or_else(|| {
                self.reject(AuthError::InvalidRefreshToken, Some(account_id), "account no longer exists")
            })?;

        match account.refresh_token.as_deref() {
            None => {
                return Err(self.reject(
                    AuthError::InvalidRefreshToken,
                    Some(account_id),
                    "no session is active",
                ));
            }
            Some(stored) if stored != token => {
                return Err(self.reject(
                    AuthError::TokenReused,
                    Some(account_id),
                    "token does not match the stored value",
                ));
            }
            Some(_) => {}
        }

        let tokens = self.issue_pair(account_id)?;
        let swapped = self
            .store
            .update_refresh_token(account_id, token, &tokens.refresh_token)
            .await?;
        if !swapped {
            // Another rotation won the race. Never retry: that would let a
            // replayed token succeed.
            return Err(self.reject(
                AuthError::TokenReused,
                Some(account_id),
                "stored value changed during rotation",
            ));
        }

        info!(account_id = %account_id, "Session refreshed");
        Ok(tokens)
    }

    /// Idempotent.
    pub async fn logout(&self, account_id: Uuid) -> Result<()> {
        self.store.clear_refresh_token(account_id).await?;
        info!(account_id = %account_id, "Session ended");
        Ok(())
    }

    /// Replaces the password hash. Leaves the refresh token alone unless
    /// the policy says otherwise.
    pub async fn change_password(
        &self,
        account_id: Uuid,
        old_password: &str,
        new_password: &str,
    ) -> Result<()> {
        if old_password.is_empty() || new_password.is_empty() {
            return Err(AppError::ValidationError("All fields are required".to_string()));
        }

        let account = self
            .store
            .find_by_id(account_id)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

        if !password::verify_in_background(account.password_hash.clone(), old_password.to_string()).await? {
            warn!(
                code = AuthError::InvalidCredential.code(),
                account_id = %account_id,
                "Password change rejected"
            );
            return Err(AuthError::InvalidCredential.into());
        }

        let hash = password::hash_in_background(new_password.to_string()).await?;
        self.store.update_password_hash(account_id, &hash).await?;

        if self.policy.revoke_sessions_on_password_change {
            self.store.clear_refresh_token(account_id).await?;
            info!(account_id = %account_id, "Password changed, sessions revoked");
        } else {
            info!(account_id = %account_id, "Password changed");
        }
        Ok(())
    }
}
