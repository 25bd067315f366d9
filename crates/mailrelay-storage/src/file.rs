//! File storage abstraction

use async_trait::async_trait;
use mailrelay_common::config::AuditConfig;
use mailrelay_common::{Error, Result};
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

/// Key/value blob store used for audit copies
#[async_trait]
pub trait FileStorage: Send + Sync {
    /// Store a blob under a relative key and return the key
    async fn store(&self, key: &str, data: &[u8]) -> Result<String>;

    /// Read a blob
    async fn read(&self, key: &str) -> Result<Vec<u8>>;

    /// Check if a blob exists
    async fn exists(&self, key: &str) -> Result<bool>;
}

/// Local filesystem storage
pub struct LocalStorage {
    base_path: PathBuf,
}

impl LocalStorage {
    /// Create a new local storage instance from config
    pub fn new(config: &AuditConfig) -> Result<Self> {
        Self::from_path(&config.path)
    }

    /// Create a new local storage instance rooted at `path`
    pub fn from_path(path: &Path) -> Result<Self> {
        std::fs::create_dir_all(path)
            .map_err(|e| Error::Storage(format!("Failed to create storage directory: {}", e)))?;

        info!(path = %path.display(), "Initialized local audit storage");

        Ok(Self {
            base_path: path.to_path_buf(),
        })
    }

    /// Resolve a key below the base path; only plain relative components are accepted
    fn full_path(&self, key: &str) -> Result<PathBuf> {
        if key.is_empty() {
            return Err(Error::Storage("Empty storage key".to_string()));
        }

        let relative = Path::new(key);
        for component in relative.components() {
            match component {
                Component::Normal(_) => {}
                Component::ParentDir => {
                    return Err(Error::Storage(
                        "Path traversal detected: '..' is not allowed".to_string(),
                    ))
                }
                _ => {
                    return Err(Error::Storage(
                        "Only plain relative keys are allowed".to_string(),
                    ))
                }
            }
        }

        Ok(self.base_path.join(relative))
    }
}

#[async_trait]
impl FileStorage for LocalStorage {
    async fn store(&self, key: &str, data: &[u8]) -> Result<String> {
        let full_path = self.full_path(key)?;

        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::Storage(format!("Failed to create directory: {}", e)))?;
        }

        let mut file = fs::File::create(&full_path)
            .await
            .map_err(|e| Error::Storage(format!("Failed to create file: {}", e)))?;

        file.write_all(data)
            .await
            .map_err(|e| Error::Storage(format!("Failed to write file: {}", e)))?;
        file.flush()
            .await
            .map_err(|e| Error::Storage(format!("Failed to flush file: {}", e)))?;

        debug!(key = %key, size = data.len(), "Stored blob");

        Ok(key.to_string())
    }

    async fn read(&self, key: &str) -> Result<Vec<u8>> {
        let full_path = self.full_path(key)?;

        fs::read(&full_path)
            .await
            .map_err(|e| Error::Storage(format!("Failed to read file: {}", e)))
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let full_path = self.full_path(key)?;
        Ok(fs::try_exists(&full_path).await.unwrap_or(false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn storage(temp_dir: &TempDir) -> LocalStorage {
        let config = AuditConfig {
            enabled: true,
            path: temp_dir.path().to_path_buf(),
        };
        LocalStorage::new(&config).unwrap()
    }

    #[tokio::test]
    async fn test_local_storage() {
        let temp_dir = TempDir::new().unwrap();
        let storage = storage(&temp_dir);

        let data = br#"{"from":"ext@user.foo"}"#;
        let key = storage.store("2024-01/02/record.json", data).await.unwrap();
        assert_eq!(key, "2024-01/02/record.json");

        assert!(storage.exists("2024-01/02/record.json").await.unwrap());
        assert!(!storage.exists("missing.json").await.unwrap());

        let read_back = storage.read("2024-01/02/record.json").await.unwrap();
        assert_eq!(read_back, data);
    }

    #[tokio::test]
    async fn test_path_traversal_prevention() {
        let temp_dir = TempDir::new().unwrap();
        let storage = storage(&temp_dir);

        assert!(storage.store("../../../etc/passwd", b"evil").await.is_err());
        assert!(storage.read("a/../../outside").await.is_err());
        assert!(storage.exists("../outside").await.is_err());

        assert!(storage.store("/etc/passwd", b"evil").await.is_err());
        assert!(storage.store("", b"empty").await.is_err());

        assert!(storage.store("safe/path/file.json", b"ok").await.is_ok());
    }
}
