use async_trait::async_trait;
use uuid::Uuid;

use crate::db::models::{Account, NewAccount};
use crate::Result;

/// Per-account authentication state.
///
/// Implementations must make [`update_refresh_token`](Self::update_refresh_token)
/// a single atomic compare-and-swap at the storage layer; several service
/// instances may call it concurrently for the same account.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Matches on either field. An empty string never matches.
    async fn find_by_username_or_email(&self, username: &str, email: &str) -> Result<Option<Account>>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Account>>;

    /// Fails with `Conflict` when the username or email is taken.
    async fn create(&self, account: NewAccount) -> Result<Account>;

    /// Unconditional overwrite, used at login.
    async fn set_refresh_token(&self, id: Uuid, token: &str) -> Result<()>;

    /// Sets `new` only if the stored value equals `expected_old`.
    /// Returns whether the swap happened.
    async fn update_refresh_token(&self, id: Uuid, expected_old: &str, new: &str) -> Result<bool>;

    /// Unsets the field. No-op when already unset.
    async fn clear_refresh_token(&self, id: Uuid) -> Result<()>;

    async fn update_password_hash(&self, id: Uuid, hash: &str) -> Result<()>;

    /// Fails with `Conflict` when the email belongs to another account.
    async fn update_details(&self, id: Uuid, full_name: &str, email: &str) -> Result<Option<Account>>;

    /// `None` leaves the corresponding reference unchanged.
    async fn update_images(
        &self,
        id: Uuid,
        avatar: Option<String>,
        cover_image: Option<String>,
    ) -> Result<Option<Account>>;
}
