//! I/O managers for different storage backends
//!
//! Every path handed to an [`IOManager`] is relative to the manager's root and
//! uses `/` as separator. The empty path `""` addresses the root itself.

use crate::error::{Result, VsrError};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use zarrs::filesystem::{FilesystemStore, FilesystemStoreCreateError};
use zarrs::storage::store::MemoryStore;
use zarrs::storage::{
    ListableStorageTraits, ReadableStorageTraits, ReadableWritableListableStorage, StoreKey,
    StorePrefix, WritableStorageTraits,
};

/// Storage backend types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    /// Local file system
    FileSystem,
    /// Process-local memory, used for tests and scratch containers
    Memory,
}

impl StorageBackend {
    /// Parse storage backend from URL scheme
    pub fn from_url(url: &str) -> Result<Self> {
        if let Some(scheme_end) = url.find("://") {
            let scheme = &url[..scheme_end];
            match scheme {
                "file" => Ok(StorageBackend::FileSystem),
                "memory" => Ok(StorageBackend::Memory),
                _ => Err(VsrError::InvalidUrl(format!("Unknown scheme: {}", scheme))),
            }
        } else {
            // Assume file system if no scheme
            Ok(StorageBackend::FileSystem)
        }
    }
}

/// Trait for I/O operations against a container root
#[async_trait]
pub trait IOManager: Send + Sync {
    /// Read data from a path
    async fn read(&self, path: &str) -> Result<Bytes>;

    /// Write data to a path, replacing any previous content
    async fn write(&self, path: &str, data: &[u8]) -> Result<()>;

    /// Write data to a path that must not exist yet
    async fn write_new(&self, path: &str, data: &[u8]) -> Result<()>;

    /// Check if a path exists (file or directory)
    async fn exists(&self, path: &str) -> Result<bool>;

    /// Check if a path is a directory
    async fn is_dir(&self, path: &str) -> Result<bool>;

    /// Create a directory (and its parents); fails if it already exists
    async fn create_dir(&self, path: &str) -> Result<()>;

    /// Delete a directory and everything below it
    async fn delete_dir(&self, path: &str) -> Result<()>;

    /// List the names of the immediate children of a directory
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;

    /// Synchronous `zarrs` store over the same root, used for chunked arrays
    fn zarr_store(&self) -> Result<ReadableWritableListableStorage>;

    /// Get the backend type
    fn backend(&self) -> StorageBackend;
}

/// Join two relative storage paths
pub fn join_path(base: &str, name: &str) -> String {
    match (base.is_empty(), name.is_empty()) {
        (true, _) => name.to_string(),
        (_, true) => base.to_string(),
        _ => format!("{}/{}", base.trim_end_matches('/'), name),
    }
}

/// Read and deserialize a JSON document
pub async fn read_json<T: DeserializeOwned>(io: &dyn IOManager, path: &str) -> Result<T> {
    let bytes = io.read(path).await?;
    serde_json::from_slice(&bytes)
        .map_err(|e| VsrError::Metadata(format!("Failed to parse {}: {}", path, e)))
}

/// Serialize and write a JSON document (pretty-printed)
pub async fn write_json<T: Serialize + ?Sized>(
    io: &dyn IOManager,
    path: &str,
    value: &T,
) -> Result<()> {
    let json = serde_json::to_vec_pretty(value)?;
    io.write(path, &json).await
}

/// File system I/O manager
pub struct FileSystemIOManager {
    base_path: PathBuf,
}

impl FileSystemIOManager {
    /// Create a new file system I/O manager
    pub fn new(base_path: impl AsRef<Path>) -> Self {
        Self {
            base_path: base_path.as_ref().to_path_buf(),
        }
    }

    /// Root directory of this manager
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Get the full path for a relative path
    fn full_path(&self, path: &str) -> PathBuf {
        if path.is_empty() {
            self.base_path.clone()
        } else {
            self.base_path.join(path)
        }
    }
}

#[async_trait]
impl IOManager for FileSystemIOManager {
    async fn read(&self, path: &str) -> Result<Bytes> {
        let full_path = self.full_path(path);
        let data = fs::read(&full_path)
            .await
            .map_err(|e| VsrError::from_io(e, full_path.display()))?;
        Ok(Bytes::from(data))
    }

    async fn write(&self, path: &str, data: &[u8]) -> Result<()> {
        let full_path = self.full_path(path);

        // Create parent directories if they don't exist
        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).await.map_err(VsrError::Io)?;
        }

        let mut file = fs::File::create(&full_path).await.map_err(VsrError::Io)?;
        file.write_all(data).await.map_err(VsrError::Io)?;
        file.flush().await.map_err(VsrError::Io)?;
        Ok(())
    }

    async fn write_new(&self, path: &str, data: &[u8]) -> Result<()> {
        let full_path = self.full_path(path);

        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).await.map_err(VsrError::Io)?;
        }

        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&full_path)
            .await
            .map_err(|e| VsrError::from_io(e, full_path.display()))?;
        file.write_all(data).await.map_err(VsrError::Io)?;
        file.flush().await.map_err(VsrError::Io)?;
        Ok(())
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        let full_path = self.full_path(path);
        Ok(fs::try_exists(&full_path).await.unwrap_or(false))
    }

    async fn is_dir(&self, path: &str) -> Result<bool> {
        let full_path = self.full_path(path);
        match fs::metadata(&full_path).await {
            Ok(metadata) => Ok(metadata.is_dir()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(VsrError::Io(e)),
        }
    }

    async fn create_dir(&self, path: &str) -> Result<()> {
        let full_path = self.full_path(path);
        if fs::try_exists(&full_path).await.unwrap_or(false) {
            return Err(VsrError::AlreadyExists(full_path.display().to_string()));
        }
        fs::create_dir_all(&full_path)
            .await
            .map_err(|e| VsrError::from_io(e, full_path.display()))
    }

    async fn delete_dir(&self, path: &str) -> Result<()> {
        let full_path = self.full_path(path);
        fs::remove_dir_all(&full_path)
            .await
            .map_err(|e| VsrError::from_io(e, full_path.display()))
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let full_path = self.full_path(prefix);
        let mut entries = Vec::new();

        if full_path.is_dir() {
            let mut read_dir = fs::read_dir(&full_path).await.map_err(VsrError::Io)?;

            while let Some(entry) = read_dir.next_entry().await.map_err(VsrError::Io)? {
                if let Some(name) = entry.file_name().to_str() {
                    entries.push(name.to_string());
                }
            }
        }

        entries.sort();
        Ok(entries)
    }

    fn zarr_store(&self) -> Result<ReadableWritableListableStorage> {
        let store = FilesystemStore::new(&self.base_path).map_err(|e| match e {
            FilesystemStoreCreateError::IOError(err) => VsrError::from_io(err, self.base_path.display()),
            other => VsrError::InvalidFormat(other.to_string()),
        })?;
        let store: ReadableWritableListableStorage = Arc::new(store);
        Ok(store)
    }

    fn backend(&self) -> StorageBackend {
        StorageBackend::FileSystem
    }
}

/// In-memory I/O manager
///
/// Files live in a `zarrs` [`MemoryStore`] that is shared with the arrays
/// opened through [`IOManager::zarr_store`]. Directories are implied by the
/// keys below them; empty directories are tracked explicitly so that
/// `create_dir` behaves like the file system.
pub struct MemoryIOManager {
    store: Arc<MemoryStore>,
    dirs: RwLock<BTreeSet<String>>,
}

impl MemoryIOManager {
    /// Create an empty in-memory store. The root directory does not exist
    /// until it is created.
    pub fn new() -> Self {
        Self {
            store: Arc::new(MemoryStore::new()),
            dirs: RwLock::new(BTreeSet::new()),
        }
    }

    fn normalize(path: &str) -> String {
        path.trim_matches('/').to_string()
    }

    fn key(path: &str) -> Result<StoreKey> {
        StoreKey::new(path).map_err(|e| VsrError::InvalidFormat(e.to_string()))
    }

    fn prefix(path: &str) -> Result<StorePrefix> {
        if path.is_empty() {
            Ok(StorePrefix::root())
        } else {
            StorePrefix::new(format!("{}/", path)).map_err(|e| VsrError::InvalidFormat(e.to_string()))
        }
    }

    fn is_file(&self, path: &str) -> Result<bool> {
        if path.is_empty() {
            return Ok(false);
        }
        Ok(self.store.get(&Self::key(path)?)?.is_some())
    }

    fn dir_exists(&self, path: &str) -> Result<bool> {
        if self.dirs.read().contains(path) {
            return Ok(true);
        }
        let prefix = Self::prefix(path)?;
        let marked = self
            .dirs
            .read()
            .iter()
            .any(|dir| dir.starts_with(prefix.as_str()) && dir.len() > prefix.as_str().len());
        Ok(marked || !self.store.list_prefix(&prefix)?.is_empty())
    }
}

impl Default for MemoryIOManager {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IOManager for MemoryIOManager {
    async fn read(&self, path: &str) -> Result<Bytes> {
        let path = Self::normalize(path);
        self.store
            .get(&Self::key(&path)?)?
            .ok_or(VsrError::NotFound(path))
    }

    async fn write(&self, path: &str, data: &[u8]) -> Result<()> {
        let path = Self::normalize(path);
        self.store
            .set(&Self::key(&path)?, Bytes::copy_from_slice(data))?;
        Ok(())
    }

    async fn write_new(&self, path: &str, data: &[u8]) -> Result<()> {
        let path = Self::normalize(path);
        let key = Self::key(&path)?;
        // Serializes create-only writes against each other
        let _guard = self.dirs.write();
        if self.store.get(&key)?.is_some() {
            return Err(VsrError::AlreadyExists(path));
        }
        self.store.set(&key, Bytes::copy_from_slice(data))?;
        Ok(())
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        let path = Self::normalize(path);
        Ok(self.is_file(&path)? || self.dir_exists(&path)?)
    }

    async fn is_dir(&self, path: &str) -> Result<bool> {
        let path = Self::normalize(path);
        Ok(!self.is_file(&path)? && self.dir_exists(&path)?)
    }

    async fn create_dir(&self, path: &str) -> Result<()> {
        let path = Self::normalize(path);
        if self.is_file(&path)? || self.dir_exists(&path)? {
            return Err(VsrError::AlreadyExists(path));
        }
        self.dirs.write().insert(path);
        Ok(())
    }

    async fn delete_dir(&self, path: &str) -> Result<()> {
        let path = Self::normalize(path);
        if !self.dir_exists(&path)? {
            return Err(VsrError::NotFound(path));
        }
        let prefix = Self::prefix(&path)?;
        self.store.erase_prefix(&prefix)?;
        self.dirs
            .write()
            .retain(|dir| dir != &path && !dir.starts_with(prefix.as_str()));
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let path = Self::normalize(prefix);
        let prefix = Self::prefix(&path)?;
        let keys = self.store.list_prefix(&prefix)?;
        let dirs = self.dirs.read();

        let mut entries = BTreeSet::new();
        let names = keys.iter().map(StoreKey::as_str).chain(dirs.iter().map(String::as_str));
        for key in names {
            if let Some(rest) = key.strip_prefix(prefix.as_str()) {
                if let Some(name) = rest.split('/').next().filter(|n| !n.is_empty()) {
                    entries.insert(name.to_string());
                }
            }
        }

        Ok(entries.into_iter().collect())
    }

    fn zarr_store(&self) -> Result<ReadableWritableListableStorage> {
        let store: ReadableWritableListableStorage = self.store.clone();
        Ok(store)
    }

    fn backend(&self) -> StorageBackend {
        StorageBackend::Memory
    }
}

/// Parse URL and create appropriate I/O manager
///
/// Plain paths and `file://` URLs map to the local file system; `memory://`
/// yields a fresh, empty in-memory store.
pub fn create_io_manager(url: &str) -> Result<Arc<dyn IOManager>> {
    match StorageBackend::from_url(url)? {
        StorageBackend::FileSystem => Ok(Arc::new(FileSystemIOManager::new(url_path(url)))),
        StorageBackend::Memory => Ok(Arc::new(MemoryIOManager::new())),
    }
}

/// Part of a storage URL after its scheme
pub fn url_path(url: &str) -> &str {
    url.find("://").map_or(url, |end| &url[end + 3..])
}
