//! Object storage
//!
//! Buckets of immutable blobs addressed by key. The local implementation
//! keeps each bucket as a directory under the configured storage path and
//! resolves public URLs against the configured base URL.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::fs;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::StorageConfig;

/// Bucket holding profile pictures
pub const AVATARS_BUCKET: &str = "avatars";

/// Bucket holding images attached to posts
pub const POST_IMAGES_BUCKET: &str = "post-images";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Invalid file type: {0}")]
    InvalidType(String),

    #[error("File too large: {size} bytes (maximum {max} bytes)")]
    TooLarge { size: u64, max: u64 },

    #[error("Invalid object key: {0}")]
    InvalidKey(String),

    #[error("Object already exists: {bucket}/{key}")]
    AlreadyExists { bucket: String, key: String },

    #[error("Object not found: {bucket}/{key}")]
    NotFound { bucket: String, key: String },

    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Blob store capability
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `data` under `bucket/key`; existing keys are never overwritten
    async fn upload(
        &self,
        bucket: &str,
        key: &str,
        data: &[u8],
        content_type: &str,
    ) -> Result<String, StorageError>;

    /// Publicly reachable URL of an object
    fn public_url(&self, bucket: &str, key: &str) -> String;

    async fn download(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StorageError>;

    async fn remove(&self, bucket: &str, key: &str) -> Result<(), StorageError>;
}

/// Filesystem-backed object store
pub struct LocalObjectStore {
    config: StorageConfig,
}

impl LocalObjectStore {
    pub fn new(config: StorageConfig) -> Self {
        Self { config }
    }

    /// Create a boxed store for use with dependency injection
    pub fn boxed(config: StorageConfig) -> Arc<dyn ObjectStore> {
        Arc::new(Self::new(config))
    }

    fn object_path(&self, bucket: &str, key: &str) -> Result<PathBuf, StorageError> {
        if !is_safe_segment(bucket) {
            return Err(StorageError::InvalidKey(bucket.to_string()));
        }
        if !is_safe_segment(key) {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        Ok(self.config.path.join(bucket).join(key))
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn upload(
        &self,
        bucket: &str,
        key: &str,
        data: &[u8],
        content_type: &str,
    ) -> Result<String, StorageError> {
        if !self.config.is_type_allowed(content_type) {
            return Err(StorageError::InvalidType(content_type.to_string()));
        }

        let size = data.len() as u64;
        if size > self.config.max_file_size {
            return Err(StorageError::TooLarge {
                size,
                max: self.config.max_file_size,
            });
        }

        let path = self.object_path(bucket, key)?;
        ensure_dir(path.parent().unwrap_or(&self.config.path)).await?;

        // create_new makes the existence check and the write one step
        let file = match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(StorageError::AlreadyExists {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                });
            }
            Err(e) => return Err(e.into()),
        };

        fill_new_file(file, &path, data).await?;

        info!("Stored {}/{} ({} bytes, {})", bucket, key, size, content_type);
        Ok(key.to_string())
    }

    fn public_url(&self, bucket: &str, key: &str) -> String {
        format!(
            "{}/storage/v1/object/public/{}/{}",
            self.config.public_url.trim_end_matches('/'),
            urlencoding::encode(bucket),
            urlencoding::encode(key)
        )
    }

    async fn download(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.object_path(bucket, key)?;
        match fs::read(&path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StorageError::NotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    async fn remove(&self, bucket: &str, key: &str) -> Result<(), StorageError> {
        let path = self.object_path(bucket, key)?;
        match fs::remove_file(&path).await {
            Ok(()) => {
                debug!("Removed {}/{}", bucket, key);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StorageError::NotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }
}

/// Fresh object key `<uuid>.<ext>` for a file of the given type
///
/// The extension comes from the original file name when it has a usable
/// one, else from the content type.
pub fn object_key(file_name: &str, content_type: &str) -> String {
    let from_name = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty() && e.len() < 10 && e.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(str::to_lowercase);

    let ext = from_name.unwrap_or_else(|| StorageConfig::get_extension(content_type).to_string());
    format!("{}.{}", Uuid::new_v4(), ext)
}

/// A single path component: no separators, no dot-only names
fn is_safe_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment != "."
        && segment != ".."
        && !segment.contains(['/', '\\', '\0'])
}

/// Write `data` into the file just created at `path`
///
/// A failed write removes the file so the key stays free.
async fn fill_new_file<W>(mut file: W, path: &Path, data: &[u8]) -> Result<(), StorageError>
where
    W: AsyncWrite + Unpin,
{
    let written = async {
        file.write_all(data).await?;
        file.flush().await
    }
    .await;

    if let Err(err) = written {
        drop(file);
        if let Err(cleanup) = fs::remove_file(path).await {
            warn!("Failed to remove partial object {}: {}", path.display(), cleanup);
        }
        return Err(err.into());
    }
    Ok(())
}

async fn ensure_dir(path: &Path) -> Result<(), StorageError> {
    if !path.exists() {
        fs::create_dir_all(path).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> LocalObjectStore {
        LocalObjectStore::new(StorageConfig {
            path: dir.path().to_path_buf(),
            public_url: "http://localhost:54321/".to_string(),
            max_file_size: 16,
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn test_upload_and_download() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        let key = store
            .upload(AVATARS_BUCKET, "a.png", b"png-bytes", "image/png")
            .await
            .unwrap();
        assert_eq!(key, "a.png");

        let data = store.download(AVATARS_BUCKET, "a.png").await.unwrap();
        assert_eq!(data, b"png-bytes");
    }

    #[tokio::test]
    async fn test_upload_rejects_existing_key() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        store.upload(AVATARS_BUCKET, "a.png", b"one", "image/png").await.unwrap();
        let err = store
            .upload(AVATARS_BUCKET, "a.png", b"two", "image/png")
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::AlreadyExists { .. }));

        // The first upload is left untouched
        assert_eq!(store.download(AVATARS_BUCKET, "a.png").await.unwrap(), b"one");
    }

    /// Writer that fails like a full disk
    struct FullDisk;

    impl AsyncWrite for FullDisk {
        fn poll_write(self: Pin<&mut Self>, _: &mut Context<'_>, _: &[u8]) -> Poll<io::Result<usize>> {
            Poll::Ready(Err(io::Error::new(io::ErrorKind::Other, "no space left on device")))
        }

        fn poll_flush(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn test_failed_write_leaves_no_partial_object() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let path = dir.path().join(AVATARS_BUCKET).join("a.png");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"").unwrap();

        let err = fill_new_file(FullDisk, &path, b"png-bytes").await.unwrap_err();
        assert!(matches!(err, StorageError::Io(_)));
        assert!(!path.exists());

        // The key can be used again
        store.upload(AVATARS_BUCKET, "a.png", b"png", "image/png").await.unwrap();
        assert_eq!(store.download(AVATARS_BUCKET, "a.png").await.unwrap(), b"png");
    }

    #[tokio::test]
    async fn test_upload_validation() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        let err = store
            .upload(AVATARS_BUCKET, "a.txt", b"text", "text/plain")
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::InvalidType(_)));

        let err = store
            .upload(AVATARS_BUCKET, "big.png", &[0u8; 17], "image/png")
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::TooLarge { size: 17, max: 16 }));

        let err = store
            .upload(AVATARS_BUCKET, "../escape.png", b"x", "image/png")
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::InvalidKey(_)));
    }

    #[tokio::test]
    async fn test_remove() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        store.upload(POST_IMAGES_BUCKET, "p.jpg", b"jpg", "image/jpeg").await.unwrap();
        store.remove(POST_IMAGES_BUCKET, "p.jpg").await.unwrap();

        assert!(matches!(
            store.download(POST_IMAGES_BUCKET, "p.jpg").await,
            Err(StorageError::NotFound { .. })
        ));
        assert!(matches!(
            store.remove(POST_IMAGES_BUCKET, "p.jpg").await,
            Err(StorageError::NotFound { .. })
        ));
    }

    #[test]
    fn test_public_url() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        assert_eq!(
            store.public_url(AVATARS_BUCKET, "my pic.png"),
            "http://localhost:54321/storage/v1/object/public/avatars/my%20pic.png"
        );
    }

    #[test]
    fn test_object_key_extension() {
        let key = object_key("Photo.JPG", "image/jpeg");
        assert!(key.ends_with(".jpg"));
        assert_eq!(key.len(), 36 + 4);

        assert!(object_key("no-extension", "image/webp").ends_with(".webp"));
        assert!(object_key("weird.p/g", "image/png").ends_with(".png"));
        assert_ne!(object_key("a.png", "image/png"), object_key("a.png", "image/png"));
    }
}
