use crate::backend::{Backend, ObjectInfo};
use crate::lock::LockFile;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use envi_core::{Error, Result};
use std::path::{Path, PathBuf};
use tokio::fs;

/// Stores objects as files beneath a base directory. Writes go through a
/// [`LockFile`], so a replaced object is swapped in with a single rename.
pub struct LocalBackend {
    base_path: PathBuf,
}

impl LocalBackend {
    pub fn new<P: AsRef<Path>>(base_path: P) -> Self {
        Self {
            base_path: base_path.as_ref().to_path_buf(),
        }
    }

    fn full_path(&self, path: &str) -> Result<PathBuf> {
        if path.split('/').any(|segment| segment == "..") || path.starts_with('/') {
            return Err(Error::Backend(format!("Invalid object path: {}", path)));
        }
        Ok(self.base_path.join(path))
    }
}

#[async_trait]
impl Backend for LocalBackend {
    async fn init(&self) -> Result<()> {
        fs::create_dir_all(&self.base_path).await?;
        Ok(())
    }

    async fn read(&self, path: &str) -> Result<Bytes> {
        let full_path = self.full_path(path)?;
        let data = fs::read(&full_path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => Error::ObjectNotFound {
                path: path.to_string(),
            },
            _ => Error::Backend(format!("Failed to read {}: {}", path, e)),
        })?;
        Ok(Bytes::from(data))
    }

    async fn write(&self, path: &str, data: Bytes) -> Result<()> {
        let full_path = self.full_path(path)?;
        let mut lock = LockFile::hold(&full_path).await?;
        lock.write(&data).await?;
        lock.commit().await
    }

    async fn stat(&self, path: &str) -> Result<ObjectInfo> {
        let full_path = self.full_path(path)?;
        let metadata = fs::metadata(&full_path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => Error::ObjectNotFound {
                path: path.to_string(),
            },
            _ => Error::Backend(format!("Failed to stat {}: {}", path, e)),
        })?;

        let modified = metadata
            .modified()
            .map_err(|e| Error::Backend(format!("Failed to get modified time: {}", e)))?;

        let modified_dt: DateTime<Utc> = modified.into();

        Ok(ObjectInfo {
            path: path.to_string(),
            size: metadata.len(),
            modified: modified_dt,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn write_read_replace() {
        let dir = tempfile::tempdir().unwrap();
        let backend = LocalBackend::new(dir.path());
        backend.init().await.unwrap();

        backend.write("archives/a/b.enc", Bytes::from_static(b"one")).await.unwrap();
        backend.write("archives/a/b.enc", Bytes::from_static(b"two")).await.unwrap();

        assert_eq!(backend.read("archives/a/b.enc").await.unwrap(), Bytes::from_static(b"two"));
        assert_eq!(backend.stat("archives/a/b.enc").await.unwrap().size, 3);
        assert!(!dir.path().join("archives/a/b.enc.lock").exists());
    }

    #[tokio::test]
    async fn missing_object_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let backend = LocalBackend::new(dir.path());
        let err = backend.read("archives/none.enc").await.unwrap_err();
        assert!(err.is_not_found());
        assert!(backend.stat("archives/none.enc").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn escaping_paths_are_refused() {
        let dir = tempfile::tempdir().unwrap();
        let backend = LocalBackend::new(dir.path());
        assert!(backend.read("../outside").await.is_err());
        assert!(backend.write("/abs", Bytes::new()).await.is_err());
    }
}
