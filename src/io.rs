//! I/O managers for pyramid stores

use crate::error::{Result, StorageError};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// Storage backend types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    /// Local file system
    FileSystem,
    /// Process-local memory
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
                _ => Err(StorageError::InvalidUrl(format!(
                    "Unknown scheme: {}",
                    scheme
                ))),
            }
        } else {
            // Assume file system if no scheme
            Ok(StorageBackend::FileSystem)
        }
    }
}

/// Trait for object I/O against a store
#[async_trait]
pub trait IOManager: Send + Sync {
    /// Read data from a path
    async fn read(&self, path: &str) -> Result<Bytes>;

    /// Write data to a path
    async fn write(&self, path: &str, data: &[u8]) -> Result<()>;

    /// Check if a path exists
    async fn exists(&self, path: &str) -> Result<bool>;

    /// Delete data at a path
    async fn delete(&self, path: &str) -> Result<()>;

    /// List the immediate children of a prefix, sorted
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;

    /// Delete every object in the store
    async fn clear(&self) -> Result<()>;
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

    /// Get the full path for a relative path
    fn full_path(&self, path: &str) -> PathBuf {
        self.base_path.join(path)
    }
}

#[async_trait]
impl IOManager for FileSystemIOManager {
    async fn read(&self, path: &str) -> Result<Bytes> {
        let full_path = self.full_path(path);
        match fs::read(&full_path).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(path.to_string()))
            }
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    async fn write(&self, path: &str, data: &[u8]) -> Result<()> {
        let full_path = self.full_path(path);

        // Create parent directories if they don't exist
        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut file = fs::File::create(&full_path).await?;
        file.write_all(data).await?;
        file.flush().await?;
        Ok(())
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        Ok(fs::try_exists(self.full_path(path)).await?)
    }

    async fn delete(&self, path: &str) -> Result<()> {
        fs::remove_file(self.full_path(path)).await?;
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let full_path = self.full_path(prefix);
        let mut entries = Vec::new();

        if full_path.is_dir() {
            let mut read_dir = fs::read_dir(&full_path).await?;

            while let Some(entry) = read_dir.next_entry().await? {
                if let Some(name) = entry.file_name().to_str() {
                    entries.push(name.to_string());
                }
            }
        }

        entries.sort();
        Ok(entries)
    }

    async fn clear(&self) -> Result<()> {
        let mut read_dir = match fs::read_dir(&self.base_path).await {
            Ok(read_dir) => read_dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(StorageError::Io(e)),
        };

        while let Some(entry) = read_dir.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                fs::remove_dir_all(entry.path()).await?;
            } else {
                fs::remove_file(entry.path()).await?;
            }
        }
        Ok(())
    }
}

/// In-memory I/O manager. Clones share the same objects.
#[derive(Clone, Default)]
pub struct MemoryIOManager {
    objects: Arc<RwLock<BTreeMap<String, Bytes>>>,
}

impl MemoryIOManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored objects
    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }
}

#[async_trait]
impl IOManager for MemoryIOManager {
    async fn read(&self, path: &str) -> Result<Bytes> {
        self.objects
            .read()
            .get(path)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(path.to_string()))
    }

    async fn write(&self, path: &str, data: &[u8]) -> Result<()> {
        self.objects
            .write()
            .insert(path.to_string(), Bytes::copy_from_slice(data));
        Ok(())
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        Ok(self.objects.read().contains_key(path))
    }

    async fn delete(&self, path: &str) -> Result<()> {
        self.objects
            .write()
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| StorageError::NotFound(path.to_string()))
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        // Immediate children of `prefix`, like a directory listing
        let dir = if prefix.is_empty() || prefix.ends_with('/') {
            prefix.to_string()
        } else {
            format!("{}/", prefix)
        };
        let mut names: Vec<String> = self
            .objects
            .read()
            .keys()
            .filter_map(|k| k.strip_prefix(dir.as_str()))
            .map(|rest| rest.split('/').next().unwrap_or(rest).to_string())
            .collect();
        names.sort();
        names.dedup();
        Ok(names)
    }

    async fn clear(&self) -> Result<()> {
        self.objects.write().clear();
        Ok(())
    }
}

/// Parse URL and create appropriate I/O manager.
///
/// `memory://` creates a fresh, empty store; share a [`MemoryIOManager`]
/// directly when a writer and reader must see the same objects.
pub fn create_io_manager(url: &str) -> Result<Arc<dyn IOManager>> {
    match StorageBackend::from_url(url)? {
        StorageBackend::FileSystem => {
            // Extract path from file:// URL or use as-is
            let path = url.strip_prefix("file://").unwrap_or(url);
            Ok(Arc::new(FileSystemIOManager::new(path)))
        }
        StorageBackend::Memory => Ok(Arc::new(MemoryIOManager::new())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_file_system_io() {
        let temp_dir = TempDir::new().unwrap();
        let io = FileSystemIOManager::new(temp_dir.path());

        let data = b"cell payload";
        io.write("t00000/s00/0/cells/0/0/0", data).await.unwrap();

        let read_data = io.read("t00000/s00/0/cells/0/0/0").await.unwrap();
        assert_eq!(&read_data[..], data);

        assert!(io.exists("t00000/s00/0/cells/0/0/0").await.unwrap());
        assert!(!io.exists("numSetups").await.unwrap());
        assert!(matches!(
            io.read("numSetups").await,
            Err(StorageError::NotFound(_))
        ));

        assert_eq!(io.list("t00000/s00").await.unwrap(), vec!["0".to_string()]);

        io.delete("t00000/s00/0/cells/0/0/0").await.unwrap();
        assert!(!io.exists("t00000/s00/0/cells/0/0/0").await.unwrap());

        io.write("numSetups", b"1").await.unwrap();
        io.clear().await.unwrap();
        assert!(io.list("").await.unwrap().is_empty());
        assert!(temp_dir.path().exists());
    }

    #[tokio::test]
    async fn test_clear_missing_directory() {
        let temp_dir = TempDir::new().unwrap();
        let io = FileSystemIOManager::new(temp_dir.path().join("not-yet-created"));
        io.clear().await.unwrap();
        assert!(io.list("").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_memory_io_shared_between_clones() {
        let io = MemoryIOManager::new();
        let other = io.clone();
        io.write("s00/resolutions", b"[[1.0,1.0,1.0]]").await.unwrap();
        io.write("s00/subdivisions", b"[[4,4,4]]").await.unwrap();
        io.write("numSetups", b"1").await.unwrap();

        assert_eq!(other.len(), 3);
        assert_eq!(
            other.list("s00").await.unwrap(),
            vec!["resolutions".to_string(), "subdivisions".to_string()]
        );
        assert_eq!(other.list("").await.unwrap(), vec!["numSetups", "s00"]);
        other.delete("numSetups").await.unwrap();
        assert!(!io.exists("numSetups").await.unwrap());

        other.clear().await.unwrap();
        assert!(io.is_empty());
    }

    #[test]
    fn test_backend_from_url() {
        assert_eq!(
            StorageBackend::from_url("file:///data/pyramid").unwrap(),
            StorageBackend::FileSystem
        );
        assert_eq!(
            StorageBackend::from_url("/data/pyramid").unwrap(),
            StorageBackend::FileSystem
        );
        assert_eq!(
            StorageBackend::from_url("memory://scratch").unwrap(),
            StorageBackend::Memory
        );
        assert!(StorageBackend::from_url("s3://bucket/pyramid").is_err());
    }
}
