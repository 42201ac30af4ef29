//! Offline manifest persistence
//!
//! The manifest (`offline_config.json`) records which artifacts have been
//! materialized in the cache and when it was last written. It is not kept in
//! sync with the filesystem; `verify` checks it explicitly.

use crate::error::CacheError;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;

// ============================================================================
// Trait Definitions
// ============================================================================

/// Trait for storage backend operations
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Save content to a file path atomically
    async fn save(&self, path: &Path, content: &str) -> Result<()>;

    /// Load content from a file path
    /// Returns None if file doesn't exist
    async fn load(&self, path: &Path) -> Result<Option<String>>;

    /// Check if a file exists
    fn exists(&self, path: &Path) -> bool;
}

// ============================================================================
// Production Implementation
// ============================================================================

/// Production storage backend using tokio::fs
pub struct FileSystemStorage;

impl FileSystemStorage {
    pub fn new() -> Self {
        Self
    }
}

impl Default for FileSystemStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StorageBackend for FileSystemStorage {
    async fn save(&self, path: &Path, content: &str) -> Result<()> {
        // Atomic write: write to temp file in the same directory, then rename
        let temp_file = path.with_extension("tmp");

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create manifest directory: {:?}", parent))?;
        }

        let mut file = fs::File::create(&temp_file)
            .await
            .context("Failed to create temp manifest file")?;
        file.write_all(content.as_bytes())
            .await
            .context("Failed to write manifest file")?;
        file.sync_all()
            .await
            .context("Failed to sync manifest file")?;

        fs::rename(&temp_file, path)
            .await
            .context("Failed to rename temp manifest file")?;

        Ok(())
    }

    async fn load(&self, path: &Path) -> Result<Option<String>> {
        if !self.exists(path) {
            return Ok(None);
        }

        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read manifest file: {:?}", path))?;

        Ok(Some(content))
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }
}

// ============================================================================
// Manifest
// ============================================================================

/// Persisted record of cached artifacts
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    /// Artifact ids in insertion order, without duplicates
    #[serde(default)]
    pub downloaded_models: Vec<String>,

    /// Last write time in epoch seconds
    #[serde(default)]
    pub download_timestamp: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offline_mode: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<PathBuf>,
}

impl Manifest {
    pub fn contains(&self, model_id: &str) -> bool {
        self.downloaded_models.iter().any(|m| m == model_id)
    }

    /// Append a model id if absent. Returns true if it was added.
    pub fn insert(&mut self, model_id: &str) -> bool {
        if self.contains(model_id) {
            return false;
        }
        self.downloaded_models.push(model_id.to_string());
        true
    }

    pub fn clear_models(&mut self) {
        self.downloaded_models.clear();
    }

    /// Last write time, if the manifest has ever been saved
    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.download_timestamp
            .and_then(|secs| DateTime::from_timestamp_millis((secs * 1000.0).round() as i64))
    }

    fn touch(&mut self) {
        self.download_timestamp = Some(Utc::now().timestamp_millis() as f64 / 1000.0);
    }
}

// ============================================================================
// Manifest Store with Dependency Injection
// ============================================================================

/// Reads and writes the manifest file
pub struct ManifestStore {
    path: PathBuf,
    storage: Arc<dyn StorageBackend>,
}

impl ManifestStore {
    /// Create a new manifest store with custom storage backend
    pub fn new_with_storage(path: PathBuf, storage: Arc<dyn StorageBackend>) -> Self {
        Self { path, storage }
    }

    /// Create a new manifest store with default filesystem storage
    pub fn new(path: PathBuf) -> Self {
        Self::new_with_storage(path, Arc::new(FileSystemStorage::new()))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.storage.exists(&self.path)
    }

    /// Load the manifest, or an empty one if the file doesn't exist
    /// FAILS HARD if the file is corrupted - user must fix or delete
    pub async fn load(&self) -> Result<Manifest> {
        let Some(content) = self.storage.load(&self.path).await? else {
            tracing::debug!(path = ?self.path, "No manifest found, starting empty");
            return Ok(Manifest::default());
        };

        let manifest: Manifest = serde_json::from_str(&content).map_err(|e| {
            CacheError::Manifest(format!(
                "failed to parse {:?}: {}. File may be corrupted. \
                Please delete or fix the file manually.",
                self.path, e
            ))
        })?;

        tracing::debug!(
            path = ?self.path,
            models = manifest.downloaded_models.len(),
            "Manifest loaded"
        );

        Ok(manifest)
    }

    /// Stamp the manifest with the current time and write it atomically
    pub async fn save(&self, manifest: &mut Manifest) -> Result<()> {
        manifest.touch();

        let content = serde_json::to_string_pretty(manifest)
            .map_err(|e| CacheError::Manifest(format!("failed to serialize: {}", e)))?;

        self.storage.save(&self.path, &content).await?;

        tracing::debug!(
            path = ?self.path,
            models = manifest.downloaded_models.len(),
            "Manifest saved"
        );

        Ok(())
    }
}

// ============================================================================
// Mock Implementation for Testing
// ============================================================================

#[cfg(test)]
pub mod mocks {
    use super::*;
    use std::collections::HashMap;
    use tokio::sync::RwLock;

    /// Mock storage backend for testing
    pub struct MockStorage {
        files: Arc<RwLock<HashMap<PathBuf, String>>>,
        save_error: Arc<RwLock<Option<String>>>,
        load_error: Arc<RwLock<Option<String>>>,
    }

    impl Default for MockStorage {
        fn default() -> Self {
            Self::new()
        }
    }

    impl MockStorage {
        pub fn new() -> Self {
            Self {
                files: Arc::new(RwLock::new(HashMap::new())),
                save_error: Arc::new(RwLock::new(None)),
                load_error: Arc::new(RwLock::new(None)),
            }
        }

        pub async fn get_file(&self, path: &Path) -> Option<String> {
            self.files.read().await.get(path).cloned()
        }

        pub async fn file_count(&self) -> usize {
            self.files.read().await.len()
        }

        /// Set an error to return on next save
        pub async fn set_save_error(&self, error: String) {
            *self.save_error.write().await = Some(error);
        }

        /// Set an error to return on next load
        pub async fn set_load_error(&self, error: String) {
            *self.load_error.write().await = Some(error);
        }

        /// Verify atomic write behavior (temp file not left behind)
        pub async fn has_temp_file(&self, base_path: &Path) -> bool {
            let temp_path = base_path.with_extension("tmp");
            self.files.read().await.contains_key(&temp_path)
        }
    }

    #[async_trait]
    impl StorageBackend for MockStorage {
        async fn save(&self, path: &Path, content: &str) -> Result<()> {
            if let Some(error) = self.save_error.write().await.take() {
                return Err(anyhow::anyhow!(error));
            }

            // Simulate atomic write
            let temp_path = path.with_extension("tmp");
            let mut files = self.files.write().await;
            files.insert(temp_path.clone(), content.to_string());
            files.remove(&temp_path);
            files.insert(path.to_path_buf(), content.to_string());

            Ok(())
        }

        async fn load(&self, path: &Path) -> Result<Option<String>> {
            if let Some(error) = self.load_error.write().await.take() {
                return Err(anyhow::anyhow!(error));
            }

            Ok(self.files.read().await.get(path).cloned())
        }

        fn exists(&self, path: &Path) -> bool {
            self.files
                .try_read()
                .map(|files| files.contains_key(path))
                .unwrap_or(false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mocks::MockStorage;
    use super::*;

    fn mock_store(path: &str) -> (ManifestStore, Arc<MockStorage>) {
        let storage = Arc::new(MockStorage::new());
        let store = ManifestStore::new_with_storage(PathBuf::from(path), storage.clone());
        (store, storage)
    }

    #[test]
    fn test_insert_keeps_order_without_duplicates() {
        let mut manifest = Manifest::default();
        assert!(manifest.insert("b/model"));
        assert!(manifest.insert("a/model"));
        assert!(!manifest.insert("b/model"));
        assert_eq!(manifest.downloaded_models, vec!["b/model", "a/model"]);
        assert!(manifest.contains("a/model"));
        assert!(!manifest.contains("c/model"));
    }

    #[test]
    fn test_last_updated() {
        let mut manifest = Manifest::default();
        assert!(manifest.last_updated().is_none());

        manifest.download_timestamp = Some(1_700_000_000.5);
        let updated = manifest.last_updated().unwrap();
        assert_eq!(updated.timestamp(), 1_700_000_000);
        assert_eq!(updated.timestamp_subsec_millis(), 500);
    }

    #[tokio::test]
    async fn test_load_nonexistent_file() {
        let (store, _storage) = mock_store("/cache/offline_config.json");
        let manifest = store.load().await.unwrap();
        assert!(manifest.downloaded_models.is_empty());
        assert!(manifest.download_timestamp.is_none());
        assert!(!store.exists());
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let (store, storage) = mock_store("/cache/offline_config.json");

        let mut manifest = Manifest::default();
        manifest.insert("BAAI/bge-m3");
        manifest.insert("thenlper/gte-small");
        store.save(&mut manifest).await.unwrap();

        assert_eq!(storage.file_count().await, 1);
        assert!(manifest.download_timestamp.is_some());

        let loaded = store.load().await.unwrap();
        assert_eq!(loaded, manifest);
    }

    #[tokio::test]
    async fn test_json_format() {
        let (store, storage) = mock_store("/cache/offline_config.json");

        let mut manifest = Manifest {
            offline_mode: Some(true),
            ..Default::default()
        };
        manifest.insert("BAAI/bge-small-zh-v1.5");
        store.save(&mut manifest).await.unwrap();

        let content = storage.get_file(store.path()).await.unwrap();
        assert!(content.contains("\"downloaded_models\""));
        assert!(content.contains("\"download_timestamp\""));
        assert!(content.contains("\"offline_mode\": true"));
        assert!(!content.contains("cache_dir"));
    }

    #[tokio::test]
    async fn test_reads_manifest_written_elsewhere() {
        let (store, storage) = mock_store("/cache/offline_config.json");
        storage
            .save(
                store.path(),
                r#"{
  "offline_mode": true,
  "cache_dir": "/data/cache",
  "downloaded_models": ["BAAI/bge-m3"],
  "download_timestamp": 1712345678.123456,
  "extra_field": 42
}"#,
            )
            .await
            .unwrap();

        let manifest = store.load().await.unwrap();
        assert_eq!(manifest.downloaded_models, vec!["BAAI/bge-m3"]);
        assert_eq!(manifest.cache_dir, Some(PathBuf::from("/data/cache")));
        assert!(manifest.last_updated().is_some());
    }

    #[tokio::test]
    async fn test_null_timestamp() {
        let (store, storage) = mock_store("/cache/offline_config.json");
        storage
            .save(
                store.path(),
                r#"{"downloaded_models": [], "download_timestamp": null}"#,
            )
            .await
            .unwrap();

        let manifest = store.load().await.unwrap();
        assert!(manifest.download_timestamp.is_none());
    }

    #[tokio::test]
    async fn test_corrupted_manifest_fails() {
        let (store, storage) = mock_store("/cache/offline_config.json");
        storage
            .save(store.path(), "this is not valid JSON {{{}}")
            .await
            .unwrap();

        let err = store.load().await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CacheError>(),
            Some(CacheError::Manifest(_))
        ));
        assert!(err.to_string().contains("offline_config.json"));
    }

    #[tokio::test]
    async fn test_save_error_handling() {
        let (store, storage) = mock_store("/cache/offline_config.json");
        storage.set_save_error("Disk full".to_string()).await;

        let mut manifest = Manifest::default();
        assert!(store.save(&mut manifest).await.is_err());
    }

    #[tokio::test]
    async fn test_load_error_handling() {
        let (store, storage) = mock_store("/cache/offline_config.json");
        storage
            .set_load_error("Permission denied".to_string())
            .await;

        assert!(store.load().await.is_err());
    }

    #[tokio::test]
    async fn test_atomic_write_no_temp_files() {
        let (store, storage) = mock_store("/cache/offline_config.json");
        let mut manifest = Manifest::default();
        store.save(&mut manifest).await.unwrap();

        assert!(!storage.has_temp_file(store.path()).await);
    }

    #[tokio::test]
    async fn test_filesystem_storage_round_trip() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("offline_config.json");
        let store = ManifestStore::new(path.clone());

        let mut manifest = Manifest::default();
        manifest.insert("intfloat/e5-small-v2");
        store.save(&mut manifest).await.unwrap();

        assert!(path.exists());
        assert!(!path.with_extension("tmp").exists());

        let loaded = store.load().await.unwrap();
        assert_eq!(loaded.downloaded_models, vec!["intfloat/e5-small-v2"]);
    }

    #[tokio::test]
    async fn test_filesystem_storage_creates_missing_directory() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("gone/nested/offline_config.json");
        let store = ManifestStore::new(path.clone());
        assert!(!store.exists());

        let mut manifest = Manifest::default();
        store.save(&mut manifest).await.unwrap();

        assert!(store.exists());
        assert!(store.load().await.unwrap().download_timestamp.is_some());
    }
}
