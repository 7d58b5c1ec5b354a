//! Credential persistence contract and the bundled implementations.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::debug;

use oneindex_common::{Error, Result};

use super::auth::{Credential, CredentialUpdate};

/// Where the current credential lives.
///
/// The token manager reads the whole credential and only ever writes back
/// the fields produced by a token exchange.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Load the current credential.
    async fn read(&self) -> Result<Credential>;

    /// Persist the result of a successful token exchange.
    async fn write(&self, update: &CredentialUpdate) -> Result<()>;
}

/// In-memory store, mainly for tests and embedding.
pub struct MemoryCredentialStore {
    credential: RwLock<Credential>,
}

impl MemoryCredentialStore {
    pub fn new(credential: Credential) -> Self {
        Self {
            credential: RwLock::new(credential),
        }
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn read(&self) -> Result<Credential> {
        Ok(self.credential.read().await.clone())
    }

    async fn write(&self, update: &CredentialUpdate) -> Result<()> {
        self.credential.write().await.apply(update);
        Ok(())
    }
}

/// Credential kept as a JSON document on disk.
pub struct FileCredentialStore {
    path: PathBuf,
    /// Serializes read-modify-write cycles within this process.
    lock: RwLock<()>,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: RwLock::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write a complete credential, creating parent directories.
    pub async fn save(&self, credential: &Credential) -> Result<()> {
        let _guard = self.lock.write().await;
        self.save_unlocked(credential).await
    }

    async fn load_unlocked(&self) -> Result<Credential> {
        let data = tokio::fs::read(&self.path).await?;
        serde_json::from_slice(&data).map_err(|e| {
            Error::Serialization(format!(
                "Invalid credential file {}: {}",
                self.path.display(),
                e
            ))
        })
    }

    async fn save_unlocked(&self, credential: &Credential) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let json = serde_json::to_vec_pretty(credential)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;

        debug!(path = %self.path.display(), "Credential saved");
        Ok(())
    }
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
    async fn read(&self) -> Result<Credential> {
        let _guard = self.lock.read().await;
        self.load_unlocked().await
    }

    async fn write(&self, update: &CredentialUpdate) -> Result<()> {
        let _guard = self.lock.write().await;
        let mut credential = self.load_unlocked().await?;
        credential.apply(update);
        self.save_unlocked(&credential).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tempfile::TempDir;

    fn credential() -> Credential {
        let mut cred = Credential::new("id", "secret", "refresh-1", "http://localhost/cb");
        cred.site_id = Some("site-1".to_string());
        cred
    }

    fn update(refresh_token: Option<&str>) -> CredentialUpdate {
        CredentialUpdate {
            access_token: "access-2".to_string(),
            refresh_token: refresh_token.map(String::from),
            expires_at: 12_345,
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_memory_store_write() {
        let store = MemoryCredentialStore::new(credential());
        store.write(&update(Some("refresh-2"))).await.unwrap();

        let cred = store.read().await.unwrap();
        assert_eq!(cred.access_token.as_deref(), Some("access-2"));
        assert_eq!(cred.refresh_token, "refresh-2");
        assert_eq!(cred.expires_at, 12_345);
    }

    #[tokio::test]
    async fn test_file_store_roundtrip() {
        let temp = TempDir::new().unwrap();
        let store = FileCredentialStore::new(temp.path().join("nested/credentials.json"));

        store.save(&credential()).await.unwrap();
        let cred = store.read().await.unwrap();

        assert_eq!(cred.client_id, "id");
        assert_eq!(cred.site_id.as_deref(), Some("site-1"));
        assert!(cred.access_token.is_none());
    }

    #[tokio::test]
    async fn test_file_store_write_merges() {
        let temp = TempDir::new().unwrap();
        let store = FileCredentialStore::new(temp.path().join("credentials.json"));
        store.save(&credential()).await.unwrap();

        store.write(&update(None)).await.unwrap();
        let cred = store.read().await.unwrap();

        assert_eq!(cred.access_token.as_deref(), Some("access-2"));
        assert_eq!(cred.refresh_token, "refresh-1");
        assert_eq!(cred.client_secret, "secret");
        assert_eq!(cred.site_id.as_deref(), Some("site-1"));
        assert!(cred.updated_at.is_some());
    }

    #[tokio::test]
    async fn test_file_store_missing_file() {
        let temp = TempDir::new().unwrap();
        let store = FileCredentialStore::new(temp.path().join("absent.json"));

        assert!(matches!(store.read().await, Err(Error::Io(_))));
    }

    #[tokio::test]
    async fn test_file_store_malformed_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("credentials.json");
        tokio::fs::write(&path, b"not json").await.unwrap();

        let store = FileCredentialStore::new(path);
        assert!(matches!(store.read().await, Err(Error::Serialization(_))));
    }
}
