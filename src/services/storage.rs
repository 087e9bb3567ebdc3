use sha2::{Digest, Sha256};
use std::path::PathBuf;
use tracing::debug;

use crate::config::StorageConfig;
use crate::error::{AppError, AppResult};

/// Content-addressed files under the media directory.
///
/// A file's name is the SHA-256 of its bytes, so writing the same document
/// twice yields the same URL and leaves a single file on disk.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root: PathBuf,
    public_url: String,
}

impl LocalStorage {
    pub fn new(root: impl Into<PathBuf>, public_url: impl Into<String>) -> Self {
        Self { root: root.into(), public_url: public_url.into().trim_end_matches('/').to_string() }
    }

    pub fn from_config(config: &StorageConfig) -> Self {
        Self::new(&config.media_dir, &config.public_url)
    }

    pub fn root(&self) -> &PathBuf {
        &self.root
    }

    /// Writes `bytes` below `folder` and returns the public URL.
    pub async fn save(&self, folder: &str, extension: &str, bytes: &[u8]) -> AppResult<String> {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        let name = format!("{:x}.{extension}", hasher.finalize());

        let dir = self.root.join(folder);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| AppError::Document(format!("cannot create {}: {e}", dir.display())))?;

        let path = dir.join(&name);
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| AppError::Document(format!("cannot write {}: {e}", path.display())))?;

        debug!(path = %path.display(), size = bytes.len(), "stored file");
        Ok(format!("{}/{folder}/{name}", self.public_url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn identical_content_maps_to_one_file() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path(), "/static/media/");

        let first = storage.save("tickets", "pdf", b"%PDF-1.4 same").await.unwrap();
        let second = storage.save("tickets", "pdf", b"%PDF-1.4 same").await.unwrap();
        let other = storage.save("tickets", "pdf", b"%PDF-1.4 different").await.unwrap();

        assert_eq!(first, second);
        assert_ne!(first, other);
        assert!(first.starts_with("/static/media/tickets/"));
        assert!(first.ends_with(".pdf"));
        assert_eq!(std::fs::read_dir(dir.path().join("tickets")).unwrap().count(), 2);
    }
}
