//! Object storage boundary for post and profile images.
//!
//! The engine uploads bytes under a path it chooses and stores the returned
//! URL verbatim as `imageUrl` / `profileImageUrl`.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use tracing::{debug, info};

use rankbait_shared::MemberId;

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};

#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Upload `data` under `path` and return a durable URL.
    async fn upload(&self, path: &str, data: Bytes, content_type: &str) -> Result<String>;
}

/// Storage path of a post image: `posts/<author>/<unique>`.
pub fn post_image_path(author: &MemberId) -> String {
    format!("posts/{}/{}", author, uuid::Uuid::new_v4())
}

/// Storage path of a profile image: `profile_images/<member>/<unique>`.
pub fn profile_image_path(member: &MemberId) -> String {
    format!("profile_images/{}/{}", member, uuid::Uuid::new_v4())
}

// ---------------------------------------------------------------------------
// Cloudinary
// ---------------------------------------------------------------------------

const CLOUDINARY_API: &str = "https://api.cloudinary.com/v1_1";

#[derive(Debug, Deserialize)]
struct UploadResponse {
    secure_url: Option<String>,
}

/// Unsigned uploads to Cloudinary through an upload preset.
#[derive(Debug, Clone)]
pub struct CloudinaryStorage {
    http: reqwest::Client,
    cloud_name: String,
    upload_preset: String,
}

impl CloudinaryStorage {
    pub fn new(cloud_name: impl Into<String>, upload_preset: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            cloud_name: cloud_name.into(),
            upload_preset: upload_preset.into(),
        }
    }

    /// Build from configuration; `None` when uploads are not configured.
    pub fn from_config(config: &ClientConfig) -> Option<Self> {
        config.uploads_enabled().then(|| {
            Self::new(
                config.cloudinary_cloud_name.clone(),
                config.cloudinary_upload_preset.clone(),
            )
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/{}/image/upload", CLOUDINARY_API, self.cloud_name)
    }
}

/// Split `a/b/c` into folder `a/b` and public id `c`.
fn split_path(path: &str) -> (Option<&str>, &str) {
    match path.trim_matches('/').rsplit_once('/') {
        Some((folder, id)) => (Some(folder), id),
        None => (None, path.trim_matches('/')),
    }
}

#[async_trait]
impl ObjectStorage for CloudinaryStorage {
    async fn upload(&self, path: &str, data: Bytes, content_type: &str) -> Result<String> {
        if data.is_empty() {
            return Err(ClientError::Upload("empty image".to_string()));
        }

        let (folder, public_id) = split_path(path);
        let size = data.len();
        let file = Part::stream(data)
            .file_name(public_id.to_string())
            .mime_str(content_type)?;

        let mut form = Form::new()
            .part("file", file)
            .text("upload_preset", self.upload_preset.clone())
            .text("public_id", public_id.to_string());
        if let Some(folder) = folder {
            form = form.text("folder", folder.to_string());
        }

        debug!(path, size, "Uploading image");

        let response = self
            .http
            .post(self.endpoint())
            .multipart(form)
            .send()
            .await?
            .error_for_status()?
            .json::<UploadResponse>()
            .await?;

        let url = response
            .secure_url
            .ok_or_else(|| ClientError::Upload("no URL returned".to_string()))?;

        info!(path, url = %url, "Image uploaded");
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_path() {
        assert_eq!(split_path("posts/u1/p1"), (Some("posts/u1"), "p1"));
        assert_eq!(split_path("/single/"), (None, "single"));
    }

    #[test]
    fn test_image_paths() {
        let author = MemberId::new("u1");
        assert!(post_image_path(&author).starts_with("posts/u1/"));
        assert_ne!(post_image_path(&author), post_image_path(&author));
        assert!(profile_image_path(&author).starts_with("profile_images/u1/"));
    }

    #[test]
    fn test_from_config_requires_credentials() {
        assert!(CloudinaryStorage::from_config(&ClientConfig::default()).is_none());

        let config = ClientConfig {
            cloudinary_cloud_name: "demo".to_string(),
            cloudinary_upload_preset: "preset".to_string(),
            ..ClientConfig::default()
        };
        let storage = CloudinaryStorage::from_config(&config).unwrap();
        assert_eq!(
            storage.endpoint(),
            "https://api.cloudinary.com/v1_1/demo/image/upload"
        );
    }

    #[tokio::test]
    async fn test_empty_upload_rejected() {
        let storage = CloudinaryStorage::new("demo", "preset");
        let err = storage
            .upload("posts/u/p", Bytes::new(), "image/jpeg")
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Upload(_)));
    }
}
