//! Inventory image uploads.
//!
//! Uploads go straight from the client to the bucket through a presigned PUT
//! URL. The client then stores the returned public URL as the inventory's
//! `image_url`.

use crate::config::{Config, ImageBucketConfig};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

pub const MAX_IMAGE_BYTES: u64 = 10 * 1024 * 1024;
pub const UPLOAD_URL_TTL: Duration = Duration::from_secs(15 * 60);
const ALLOWED_CONTENT_TYPES: [&str; 5] = [
    "image/jpeg",
    "image/jpg",
    "image/png",
    "image/gif",
    "image/webp",
];
const KEY_PREFIX: &str = "inventories";

#[derive(Debug, thiserror::Error)]
pub enum ImageStoreError {
    #[error("Image storage is not configured")]
    NotConfigured,

    #[error("Presigning failed: {0}")]
    Presign(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PresignedUpload {
    pub upload_url: String,
    pub public_url: String,
    pub expires_at: DateTime<Utc>,
}

#[async_trait]
pub trait ImageStore: Send + Sync {
    async fn presign_upload(
        &self,
        key: &str,
        content_type: &str,
        expires_in: Duration,
    ) -> Result<PresignedUpload, ImageStoreError>;
}

/// Uses R2 when configured. Outside production a mock presigner stands in.
pub fn image_store_from_config(config: &Config) -> Arc<dyn ImageStore> {
    match config.image_bucket() {
        Some(bucket) => Arc::new(R2ImageStore::new(bucket.clone())),
        None => {
            tracing::warn!("CF_BUCKET not set, image uploads use a mock presigner");
            Arc::new(MockImageStore)
        }
    }
}

fn expiry(expires_in: Duration) -> DateTime<Utc> {
    Utc::now() + chrono::Duration::from_std(expires_in).unwrap_or(chrono::Duration::zero())
}

/// Cloudflare R2 through the OpenDAL S3 service.
pub struct R2ImageStore {
    config: ImageBucketConfig,
}

impl R2ImageStore {
    pub fn new(config: ImageBucketConfig) -> Self {
        Self { config }
    }

    fn operator(&self) -> Result<opendal::Operator, ImageStoreError> {
        let builder = opendal::services::S3::default()
            .bucket(&self.config.bucket)
            .region("auto")
            .access_key_id(&self.config.access_key_id)
            .secret_access_key(&self.config.secret_access_key)
            .endpoint(&format!(
                "https://{}.r2.cloudflarestorage.com",
                self.config.account_id
            ));

        opendal::Operator::new(builder)
            .map(|op| op.finish())
            .map_err(|e| ImageStoreError::Presign(e.to_string()))
    }
}

#[async_trait]
impl ImageStore for R2ImageStore {
    async fn presign_upload(
        &self,
        key: &str,
        content_type: &str,
        expires_in: Duration,
    ) -> Result<PresignedUpload, ImageStoreError> {
        let op = self.operator()?;
        let presigned = op
            .presign_write_with(key, expires_in)
            .content_type(content_type)
            .await
            .map_err(|e| ImageStoreError::Presign(e.to_string()))?;

        Ok(PresignedUpload {
            upload_url: presigned.uri().to_string(),
            public_url: format!("{}/{key}", self.config.public_base_url.trim_end_matches('/')),
            expires_at: expiry(expires_in),
        })
    }
}

pub struct MockImageStore;

#[async_trait]
impl ImageStore for MockImageStore {
    async fn presign_upload(
        &self,
        key: &str,
        _content_type: &str,
        expires_in: Duration,
    ) -> Result<PresignedUpload, ImageStoreError> {
        Ok(PresignedUpload {
            upload_url: format!("https://test.r2.example.com/{key}?mock=true"),
            public_url: format!("https://images.example.com/{key}"),
            expires_at: expiry(expires_in),
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ImageUploadRequest {
    pub filename: String,
    pub content_type: String,
    pub file_size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ImageValidationError {
    #[error("No file provided")]
    Empty,

    #[error("Only image files (JPEG, PNG, GIF, WebP) are allowed")]
    ContentType,

    #[error("File size must be less than 10MB")]
    TooLarge,
}

impl ImageUploadRequest {
    pub fn validate(&self) -> Result<(), ImageValidationError> {
        if self.file_size == 0 || self.filename.trim().is_empty() {
            return Err(ImageValidationError::Empty);
        }
        let content_type = self.content_type.to_lowercase();
        if !ALLOWED_CONTENT_TYPES.contains(&content_type.as_str()) {
            return Err(ImageValidationError::ContentType);
        }
        if self.file_size > MAX_IMAGE_BYTES {
            return Err(ImageValidationError::TooLarge);
        }
        Ok(())
    }

    /// `inventories/{uuid}_{stem}` with the stem reduced to URL-safe characters.
    pub fn storage_key(&self, id: Uuid) -> String {
        let stem = match self.filename.rsplit_once('.') {
            Some((stem, _)) if !stem.is_empty() => stem,
            _ => self.filename.as_str(),
        };
        let sanitized: String = stem
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        format!("{KEY_PREFIX}/{id}_{sanitized}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(filename: &str, content_type: &str, file_size: u64) -> ImageUploadRequest {
        ImageUploadRequest {
            filename: filename.into(),
            content_type: content_type.into(),
            file_size,
        }
    }

    #[test]
    fn validation_rules() {
        assert!(request("a.png", "image/png", 10).validate().is_ok());
        assert!(request("a.JPG", "IMAGE/JPEG", MAX_IMAGE_BYTES).validate().is_ok());
        assert_eq!(
            request("a.pdf", "application/pdf", 10).validate(),
            Err(ImageValidationError::ContentType)
        );
        assert_eq!(
            request("a.png", "image/png", MAX_IMAGE_BYTES + 1).validate(),
            Err(ImageValidationError::TooLarge)
        );
        assert_eq!(
            request("a.png", "image/png", 0).validate(),
            Err(ImageValidationError::Empty)
        );
    }

    #[test]
    fn storage_key_drops_extension_and_sanitizes() {
        let id = Uuid::nil();
        assert_eq!(
            request("my photo (1).tar.png", "image/png", 1).storage_key(id),
            format!("inventories/{id}_my_photo__1__tar")
        );
        assert_eq!(
            request(".hidden", "image/png", 1).storage_key(id),
            format!("inventories/{id}__hidden")
        );
    }

    #[tokio::test]
    async fn mock_store_builds_urls() {
        let upload = MockImageStore
            .presign_upload("inventories/x", "image/png", UPLOAD_URL_TTL)
            .await
            .unwrap();
        assert!(upload.upload_url.contains("inventories/x"));
        assert_eq!(upload.public_url, "https://images.example.com/inventories/x");
        assert!(upload.expires_at > Utc::now());
    }
}
