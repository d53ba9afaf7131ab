use super::{object_key, StorageService};
use crate::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Writes uploads below a root directory served by the host under `url_prefix`.
pub struct LocalStorage {
    root: PathBuf,
    url_prefix: String,
}

impl LocalStorage {
    pub fn new(root: impl Into<PathBuf>, url_prefix: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            url_prefix: url_prefix.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl StorageService for LocalStorage {
    async fn save_file(
        &self,
        data: &[u8],
        path_hint: &str,
        unique_id: &str,
        extension: &str,
    ) -> Result<String> {
        let key = object_key(path_hint, unique_id, extension)?;
        let path = self.root.join(&key);

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, data).await?;
        debug!("Saved {} bytes to {}", data.len(), path.display());

        Ok(format!("{}/{}", self.url_prefix, key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_save_file_writes_under_hint() {
        let dir = TempDir::new().unwrap();
        let storage = LocalStorage::new(dir.path(), "/user/images/");

        let url = storage
            .save_file(b"pixels", "Seraphina", "1234", "webp")
            .await
            .unwrap();

        assert_eq!(url, "/user/images/Seraphina/1234.webp");
        let written = std::fs::read(dir.path().join("Seraphina").join("1234.webp")).unwrap();
        assert_eq!(written, b"pixels");
    }

    #[tokio::test]
    async fn test_save_file_without_hint() {
        let dir = TempDir::new().unwrap();
        let storage = LocalStorage::new(dir.path(), "/files");

        let url = storage.save_file(b"notes", "", "n1", "txt").await.unwrap();

        assert_eq!(url, "/files/n1.txt");
        assert!(dir.path().join("n1.txt").exists());
    }

    #[tokio::test]
    async fn test_save_file_rejects_traversal() {
        let dir = TempDir::new().unwrap();
        let storage = LocalStorage::new(dir.path(), "/files");

        let result = storage.save_file(b"x", "..", "n1", "txt").await;
        assert!(matches!(result, Err(crate::Error::Storage(_))));
    }
}
