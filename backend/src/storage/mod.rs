pub mod s3_service;

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Object not found: {0}")]
    NotFound(String),
    #[error("Invalid object key: {0}")]
    InvalidKey(String),
    #[error("File too large: {0} bytes")]
    FileTooLarge(usize),
    #[error("S3 error: {0}")]
    S3(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Blob storage with get/put semantics. `put` overwrites.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError>;
    async fn put(&self, key: &str, data: Vec<u8>) -> Result<(), StorageError>;
}

/// In-process object store, used for local runs and tests.
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.objects.read().await.keys().cloned().collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        self.objects
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    async fn put(&self, key: &str, data: Vec<u8>) -> Result<(), StorageError> {
        self.objects.write().await.insert(key.to_string(), data);
        Ok(())
    }
}

/// Object keys become local file names, so they must be a single plain path segment.
pub fn validate_key(key: &str) -> Result<(), StorageError> {
    let invalid = key.is_empty()
        || key == "."
        || key == ".."
        || key.contains('/')
        || key.contains('\\')
        || key.contains('\0');
    if invalid {
        return Err(StorageError::InvalidKey(key.to_string()));
    }
    Ok(())
}

/// Fetches `key` into `dir/key`, creating `dir` if needed.
pub async fn download_to(store: &dyn ObjectStore, key: &str, dir: &Path) -> Result<PathBuf, StorageError> {
    validate_key(key)?;
    let data = store.get(key).await?;
    tokio::fs::create_dir_all(dir).await?;
    let path = dir.join(key);
    tokio::fs::write(&path, &data).await?;
    log::info!("Downloaded '{}' ({} bytes) to {}", key, data.len(), path.display());
    Ok(path)
}

/// Uploads a local file under `key`.
pub async fn upload_from(store: &dyn ObjectStore, path: &Path, key: &str) -> Result<(), StorageError> {
    validate_key(key)?;
    let data = tokio::fs::read(path).await?;
    let size = data.len();
    store.put(key, data).await?;
    log::info!("Uploaded {} as '{}' ({} bytes)", path.display(), key, size);
    Ok(())
}
