use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::password;
use crate::db::{AccountView, CredentialStore, NewAccount};
use crate::error::AppError;
use crate::media::MediaUploader;
use crate::Result;

#[derive(Debug, Clone, Default)]
pub struct RegisterInput {
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub password: String,
    pub avatar: Option<PathBuf>,
    pub cover_image: Option<PathBuf>,
}

/// Registration and profile changes. Never touches session state.
pub struct AccountService {
    store: Arc<dyn CredentialStore>,
    media: Arc<dyn MediaUploader>,
}

impl AccountService {
    pub fn new(store: Arc<dyn CredentialStore>, media: Arc<dyn MediaUploader>) -> Self {
        Self { store, media }
    }

    pub async fn register(&self, input: RegisterInput) -> Result<AccountView> {
        let username = input.username.trim().to_lowercase();
        let email = input.email.trim().to_string();
        let full_name = input.full_name.trim().to_string();
        if username.is_empty() || email.is_empty() || full_name.is_empty() || input.password.trim().is_empty() {
            return Err(AppError::ValidationError("All fields are required".to_string()));
        }

        if self.store.find_by_username_or_email(&username, &email).await?.is_some() {
            return Err(AppError::Conflict(
                "User already exists with this email or username".to_string(),
            ));
        }

        let avatar_path = input
            .avatar
            .ok_or_else(|| AppError::ValidationError("Avatar image is required".to_string()))?;
        let avatar = self.media.upload(&avatar_path).await?;

        let cover_image = match input.cover_image {
            Some(path) => match self.media.upload(&path).await {
                Ok(uploaded) => uploaded.url,
                Err(e) => {
                    warn!(error = %e, "Cover image upload failed, continuing without it");
                    String::new()
                }
            },
            None => String::new(),
        };

        let password_hash = password::hash_in_background(input.password).await?;
        let account = self
            .store
            .create(NewAccount {
                username,
                email,
                full_name,
                avatar: avatar.url,
                cover_image,
                password_hash,
            })
            .await?;

        info!(account_id = %account.id, username = %account.username, "Account registered");
        Ok(account.view())
    }

    pub async fn update_details(&self, account_id: Uuid, full_name: &str, email: &str) -> Result<AccountView> {
        let full_name = full_name.trim();
        let email = email.trim();
        if full_name.is_empty() || email.is_empty() {
            return Err(AppError::ValidationError("All fields are required".to_string()));
        }

        let account = self
            .store
            .update_details(account_id, full_name, email)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

        info!(account_id = %account_id, "Account details updated");
        Ok(account.view())
    }

    /// Uploads whichever images are supplied. Fails only if every supplied
    /// upload fails; a partial failure keeps the old reference for that image.
    pub async fn update_images(
        &self,
        account_id: Uuid,
        avatar: Option<PathBuf>,
        cover_image: Option<PathBuf>,
    ) -> Result<AccountView> {
        if avatar.is_none() && cover_image.is_none() {
            return Err(AppError::ValidationError(
                "Please provide avatar or cover image to update".to_string(),
            ));
        }

        let mut first_error = None;
        let mut new_avatar = None;
        let mut new_cover = None;

        for (slot, path) in [(&mut new_avatar, avatar), (&mut new_cover, cover_image)] {
            let Some(path) = path else { continue };
            match self.media.upload(&path).await {
                Ok(uploaded) => *slot = Some(uploaded.url),
                Err(e) => {
                    warn!(account_id = %account_id, error = %e, "Profile image upload failed");
                    first_error.get_or_insert(e);
                }
            }
        }

        if new_avatar.is_none() && new_cover.is_none() {
            return Err(first_error.unwrap_or_else(|| {
                AppError::InternalError("no image was uploaded".to_string())
            }));
        }

        let account = self
            .store
            .update_images(account_id, new_avatar, new_cover)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

        info!(account_id = %account_id, "Profile images updated");
        Ok(account.view())
    }
}
