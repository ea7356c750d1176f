//! Object storage for uploaded and generated images.
//!
//! References handed out look like `/storage/user-uploads/{object}` and are
//! served back by the HTTP layer from the same directory.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tracing::{debug, info};
use uuid::Uuid;

pub const USER_UPLOAD_BUCKET: &str = "user-uploads";
pub const PUBLIC_PREFIX: &str = "/storage";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Delete failed: {0}")]
    DeleteFailed(String),

    #[error("Invalid storage reference: {0}")]
    InvalidKey(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

#[async_trait]
pub trait ImageStorage: Send + Sync {
    /// Stores the bytes and returns a retrievable reference.
    async fn put(&self, data: Bytes, mime_type: &str) -> StorageResult<String>;

    /// Removes the object behind a reference. Deleting a missing object succeeds.
    async fn delete(&self, reference: &str) -> StorageResult<()>;
}

/// Filesystem-backed bucket under `{root}/user-uploads`.
#[derive(Clone)]
pub struct LocalImageStorage {
    root: PathBuf,
}

fn extension_for(mime_type: &str) -> String {
    let ext: String = mime_type
        .split('/')
        .nth(1)
        .unwrap_or_default()
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric())
        .collect();
    if ext.is_empty() { "bin".to_string() } else { ext.to_lowercase() }
}

impl LocalImageStorage {
    pub async fn new(root: impl Into<PathBuf>) -> StorageResult<Self> {
        let root = root.into();
        let bucket = root.join(USER_UPLOAD_BUCKET);
        fs::create_dir_all(&bucket).await.map_err(|e| {
            StorageError::ConfigError(format!(
                "Failed to create storage directory {}: {}",
                bucket.display(),
                e
            ))
        })?;
        Ok(Self { root })
    }

    /// Directory to serve under [`PUBLIC_PREFIX`].
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_name(mime_type: &str) -> String {
        format!(
            "{}-{}.{}",
            Utc::now().timestamp_millis(),
            Uuid::new_v4(),
            extension_for(mime_type)
        )
    }

    fn object_path(&self, reference: &str) -> StorageResult<PathBuf> {
        let bucket_prefix = format!("{}/{}/", PUBLIC_PREFIX, USER_UPLOAD_BUCKET);
        let name = reference.strip_prefix(bucket_prefix.as_str()).unwrap_or(reference);
        if name.is_empty() || name.contains("..") || name.contains('/') || name.contains('\\') {
            return Err(StorageError::InvalidKey(reference.to_string()));
        }
        Ok(self.root.join(USER_UPLOAD_BUCKET).join(name))
    }
}

#[async_trait]
impl ImageStorage for LocalImageStorage {
    async fn put(&self, data: Bytes, mime_type: &str) -> StorageResult<String> {
        let name = Self::object_name(mime_type);
        let path = self.root.join(USER_UPLOAD_BUCKET).join(&name);
        let start = std::time::Instant::now();

        fs::write(&path, &data).await.map_err(|e| {
            StorageError::UploadFailed(format!("Failed to write file {}: {}", path.display(), e))
        })?;

        info!(
            path = %path.display(),
            size_bytes = data.len(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local storage upload successful"
        );

        Ok(format!("{}/{}/{}", PUBLIC_PREFIX, USER_UPLOAD_BUCKET, name))
    }

    async fn delete(&self, reference: &str) -> StorageResult<()> {
        let path = self.object_path(reference)?;
        match fs::remove_file(&path).await {
            Ok(()) => {
                info!(path = %path.display(), "Local storage delete successful");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "Object already absent");
                Ok(())
            }
            Err(e) => Err(StorageError::DeleteFailed(format!(
                "Failed to delete file {}: {}",
                path.display(),
                e
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_comes_from_mime_subtype() {
        assert_eq!(extension_for("image/JPEG"), "jpeg");
        assert_eq!(extension_for("image/svg+xml"), "svg");
        assert_eq!(extension_for("garbage"), "bin");
    }

    #[tokio::test]
    async fn put_then_delete_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalImageStorage::new(dir.path()).await.unwrap();

        let reference = storage.put(Bytes::from_static(b"png bytes"), "image/png").await.unwrap();
        assert!(reference.starts_with("/storage/user-uploads/"));
        assert!(reference.ends_with(".png"));

        let name = reference.rsplit('/').next().unwrap();
        let on_disk = dir.path().join(USER_UPLOAD_BUCKET).join(name);
        assert_eq!(std::fs::read(&on_disk).unwrap(), b"png bytes");

        storage.delete(&reference).await.unwrap();
        assert!(!on_disk.exists());
        // second delete is a no-op
        storage.delete(&reference).await.unwrap();
    }

    #[tokio::test]
    async fn references_are_unique() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalImageStorage::new(dir.path()).await.unwrap();
        let a = storage.put(Bytes::from_static(b"a"), "image/png").await.unwrap();
        let b = storage.put(Bytes::from_static(b"a"), "image/png").await.unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn delete_rejects_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalImageStorage::new(dir.path()).await.unwrap();
        for bad in ["../secret", "/storage/user-uploads/../../etc/passwd", "nested/name.png", ""] {
            assert!(matches!(storage.delete(bad).await, Err(StorageError::InvalidKey(_))), "{bad}");
        }
    }
}
