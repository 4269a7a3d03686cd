//! Media host collaborator. The rest of the crate only ever sees the
//! returned URL string.

mod cloudinary;

use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;

use crate::Result;

pub use cloudinary::CloudinaryUploader;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UploadedMedia {
    pub url: String,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MediaUploader: Send + Sync {
    async fn upload(&self, local_path: &Path) -> Result<UploadedMedia>;
}
