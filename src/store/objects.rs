use std::collections::HashMap;
use std::path::{Path, PathBuf};

use log::debug;
use parking_lot::RwLock;

use crate::error::StorageError;
use crate::model::generate_id;
use crate::store::traits::ObjectStore;

/// Object key `<uuid>/<file name>`. Directory components of the suggested
/// name are dropped.
pub fn object_key(suggested_name: &str) -> String {
    let file_name = Path::new(suggested_name)
        .file_name()
        .and_then(|name| name.to_str())
        .filter(|name| !name.is_empty())
        .unwrap_or("artifact");
    format!("{}/{}", generate_id(), file_name)
}

fn join_url(base: &str, key: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), key)
}

/// Writes artifacts below a directory that is served at `public_base_url`
#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    root: PathBuf,
    public_base_url: String,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>, public_base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            public_base_url: public_base_url.into(),
        }
    }
}

#[async_trait::async_trait]
impl ObjectStore for LocalObjectStore {
    async fn store(&self, bytes: Vec<u8>, suggested_name: &str) -> Result<String, StorageError> {
        let key = object_key(suggested_name);
        let path = self.root.join(&key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, &bytes).await?;
        debug!("Stored {} bytes at {}", bytes.len(), path.display());
        Ok(join_url(&self.public_base_url, &key))
    }
}

/// Keeps artifacts in memory; used by tests
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    public_base_url: String,
    objects: RwLock<HashMap<String, Vec<u8>>>,
    unavailable: RwLock<Option<String>>,
}

impl MemoryObjectStore {
    pub fn new(public_base_url: impl Into<String>) -> Self {
        Self {
            public_base_url: public_base_url.into(),
            ..Self::default()
        }
    }

    pub fn set_unavailable(&self, reason: Option<String>) {
        *self.unavailable.write() = reason;
    }

    /// Bytes stored under the given public URL
    pub fn get(&self, url: &str) -> Option<Vec<u8>> {
        let key = url
            .strip_prefix(self.public_base_url.trim_end_matches('/'))?
            .trim_start_matches('/');
        self.objects.read().get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait::async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn store(&self, bytes: Vec<u8>, suggested_name: &str) -> Result<String, StorageError> {
        if let Some(reason) = self.unavailable.read().clone() {
            return Err(StorageError::Unavailable(reason));
        }
        let key = object_key(suggested_name);
        let url = join_url(&self.public_base_url, &key);
        self.objects.write().insert(key, bytes);
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_key_is_unique_and_strips_directories() {
        let a = object_key("../../etc/mix.wav");
        let b = object_key("mix.wav");
        assert!(a.ends_with("/mix.wav"));
        assert!(!a.contains(".."));
        assert_ne!(a, b);
        assert!(object_key("").ends_with("/artifact"));
    }

    #[tokio::test]
    async fn test_memory_store_round_trips_bytes() {
        let store = MemoryObjectStore::new("https://store/");
        let url = store.store(b"RIFF".to_vec(), "take1.wav").await.unwrap();

        assert!(url.starts_with("https://store/"));
        assert!(url.ends_with("/take1.wav"));
        assert_eq!(store.get(&url), Some(b"RIFF".to_vec()));
    }

    #[tokio::test]
    async fn test_memory_store_outage() {
        let store = MemoryObjectStore::new("https://store");
        store.set_unavailable(Some("bucket offline".to_string()));
        let err = store.store(vec![1], "a.wav").await.unwrap_err();
        assert_eq!(err, StorageError::Unavailable("bucket offline".to_string()));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_local_store_writes_under_root() {
        let root = std::env::temp_dir().join(format!("prodhub-objects-{}", generate_id()));
        let store = LocalObjectStore::new(&root, "http://localhost:8080/files");
        let url = store.store(b"data".to_vec(), "beat.flp").await.unwrap();

        let key = url.strip_prefix("http://localhost:8080/files/").unwrap();
        let written = tokio::fs::read(root.join(key)).await.unwrap();
        assert_eq!(written, b"data");

        tokio::fs::remove_dir_all(&root).await.unwrap();
    }
}
