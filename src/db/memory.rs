use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::db::models::{Account, NewAccount};
use crate::db::store::CredentialStore;
use crate::error::AppError;
use crate::Result;

/// In-process [`CredentialStore`] for development and tests.
///
/// The write lock makes each mutation atomic, so the refresh-token
/// compare-and-swap holds within one process only.
#[derive(Default)]
pub struct MemoryCredentialStore {
    accounts: RwLock<HashMap<Uuid, Account>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the stored refresh token, if any.
    pub async fn stored_refresh_token(&self, id: Uuid) -> Option<String> {
        self.accounts
            .read()
            .await
            .get(&id)
            .and_then(|account| account.refresh_token.clone())
    }

    pub async fn stored_password_hash(&self, id: Uuid) -> Option<String> {
        self.accounts
            .read()
            .await
            .get(&id)
            .map(|account| account.password_hash.clone())
    }
}

fn not_found() -> AppError {
    AppError::NotFound("User not found".to_string())
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn find_by_username_or_email(&self, username: &str, email: &str) -> Result<Option<Account>> {
        let accounts = self.accounts.read().await;
        Ok(accounts
            .values()
            .find(|a| {
                (!username.is_empty() && a.username == username)
                    || (!email.is_empty() && a.email == email)
            })
            .cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Account>> {
        Ok(self.accounts.read().await.get(&id).cloned())
    }

    async fn create(&self, account: NewAccount) -> Result<Account> {
        let mut accounts = self.accounts.write().await;
        let taken = accounts
            .values()
            .any(|a| a.username == account.username || a.email == account.email);
        if taken {
            return Err(AppError::Conflict(
                "User already exists with this email or username".to_string(),
            ));
        }

        let account = account.into_account();
        accounts.insert(account.id, account.clone());
        Ok(account)
    }

    async fn set_refresh_token(&self, id: Uuid, token: &str) -> Result<()> {
        let mut accounts = self.accounts.write().await;
        let account = accounts.get_mut(&id).ok_or_else(not_found)?;
        account.refresh_token = Some(token.to_string());
        account.updated_at = Utc::now();
        Ok(())
    }

    async fn update_refresh_token(&self, id: Uuid, expected_old: &str, new: &str) -> Result<bool> {
        let mut accounts = self.accounts.write().await;
        let Some(account) = accounts.get_mut(&id) else {
            return Ok(false);
        };
        if account.refresh_token.as_deref() != Some(expected_old) {
            return Ok(false);
        }
        account.refresh_token = Some(new.to_string());
        account.updated_at = Utc::now();
        Ok(true)
    }

    async fn clear_refresh_token(&self, id: Uuid) -> Result<()> {
        let mut accounts = self.accounts.write().await;
        if let Some(account) = accounts.get_mut(&id) {
            if account.refresh_token.take().is_some() {
                account.updated_at = Utc::now();
            }
        }
        Ok(())
    }

    async fn update_password_hash(&self, id: Uuid, hash: &str) -> Result<()> {
        let mut accounts = self.accounts.write().await;
        let account = accounts.get_mut(&id).ok_or_else(not_found)?;
        account.password_hash = hash.to_string();
        account.updated_at = Utc::now();
        Ok(())
    }

    async fn update_details(&self, id: Uuid, full_name: &str, email: &str) -> Result<Option<Account>> {
        let mut accounts = self.accounts.write().await;
        if accounts.values().any(|a| a.id != id && a.email == email) {
            return Err(AppError::Conflict("Email is already in use".to_string()));
        }
        Ok(accounts.get_mut(&id).map(|account| {
            account.full_name = full_name.to_string();
            account.email = email.to_string();
            account.updated_at = Utc::now();
            account.clone()
        }))
    }

    async fn update_images(
        &self,
        id: Uuid,
        avatar: Option<String>,
        cover_image: Option<String>,
    ) -> Result<Option<Account>> {
        let mut accounts = self.accounts.write().await;
        Ok(accounts.get_mut(&id).map(|account| {
            if let Some(avatar) = avatar {
                account.avatar = avatar;
            }
            if let Some(cover_image) = cover_image {
                account.cover_image = cover_image;
            }
            account.updated_at = Utc::now();
            account.clone()
        }))
    }
}
