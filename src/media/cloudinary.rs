use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use sha2::{Digest, Sha256};
use std::path::Path;
use tracing::{error, info};
use url::Url;

use super::{MediaUploader, UploadedMedia};
use crate::config::MediaConfig;
use crate::error::{AppError, MediaError};
use crate::Result;

/// Signed image uploads to a Cloudinary-compatible host.
pub struct CloudinaryUploader {
    client: reqwest::Client,
    upload_url: Url,
    api_key: String,
    api_secret: String,
}

impl CloudinaryUploader {
    pub fn new(config: &MediaConfig) -> Result<Self> {
        let upload_url = Url::parse(&config.base_url)
            .and_then(|base| {
                base.join(&format!("/v1_1/{}/image/upload", config.cloud_name))
            })
            .map_err(|e| AppError::ConfigError(format!("invalid media base url: {e}")))?;

        Ok(Self {
            client: reqwest::Client::new(),
            upload_url,
            api_key: config.api_key.clone(),
            api_secret: config.api_secret.clone(),
        })
    }

    pub fn upload_url(&self) -> &Url {
        &self.upload_url
    }

    /// SHA-256 over the sorted signed parameters followed by the secret.
    fn sign(&self, timestamp: i64) -> String {
        let payload = format!("timestamp={}{}", timestamp, self.api_secret);
        format!("{:x}", Sha256::digest(payload.as_bytes()))
    }
}

#[async_trait]
impl MediaUploader for CloudinaryUploader {
    async fn upload(&self, local_path: &Path) -> Result<UploadedMedia> {
        let bytes = tokio::fs::read(local_path)
            .await
            .map_err(|e| MediaError::LocalFile(e.to_string()))?;
        let file_name = local_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());

        let timestamp = chrono::Utc::now().timestamp();
        let form = Form::new()
            .part("file", Part::bytes(bytes).file_name(file_name))
            .text("api_key", self.api_key.clone())
            .text("timestamp", timestamp.to_string())
            .text("signature_algorithm", "sha256")
            .text("signature", self.sign(timestamp));

        let res = self
            .client
            .post(self.upload_url.clone())
            .multipart(form)
            .send()
            .await?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            error!(status = status.as_u16(), "Media host rejected upload");
            return Err(MediaError::Rejected {
                status: status.as_u16(),
                body,
            }
            .into());
        }

        let uploaded: UploadedMedia = res
            .json()
            .await
            .map_err(|e| MediaError::InvalidResponse(e.to_string()))?;
        info!(url = %uploaded.url, "Media uploaded");
        Ok(uploaded)
    }
}
