//! Scoped write lock on a destination file.
//!
//! Holding the lock creates `<dest>.lock` exclusively; data is written there
//! and only becomes visible at `<dest>` when [`LockFile::commit`] renames it
//! into place. Dropping an uncommitted lock removes the lock file, so the
//! previous contents of `<dest>` are never disturbed by a failed write.

use envi_core::{Error, Result};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

#[derive(Debug)]
pub struct LockFile {
    target: PathBuf,
    lock_path: PathBuf,
    file: Option<File>,
}

impl LockFile {
    /// Acquires the lock for `target`.
    ///
    /// # Errors
    ///
    /// Returns `Error::LockConflict` if another writer holds it.
    pub async fn hold<P: AsRef<Path>>(target: P) -> Result<Self> {
        let target = target.as_ref().to_path_buf();
        let lock_path = lock_path_for(&target);

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await?;
        }

        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&lock_path)
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::AlreadyExists => Error::LockConflict {
                    path: lock_path.clone(),
                },
                _ => Error::Io(e),
            })?;

        debug!(lock = %lock_path.display(), "acquired lock");
        Ok(Self {
            target,
            lock_path,
            file: Some(file),
        })
    }

    pub async fn write(&mut self, data: &[u8]) -> Result<()> {
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| Error::Backend("lock already released".to_string()))?;
        file.write_all(data).await?;
        Ok(())
    }

    /// Flushes the written data and atomically replaces the target with it.
    pub async fn commit(mut self) -> Result<()> {
        let mut file = self
            .file
            .take()
            .ok_or_else(|| Error::Backend("lock already released".to_string()))?;
        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        if let Err(e) = fs::rename(&self.lock_path, &self.target).await {
            let _ = fs::remove_file(&self.lock_path).await;
            return Err(e.into());
        }

        debug!(target = %self.target.display(), "committed lock");
        Ok(())
    }

    /// Releases the lock without touching the target.
    pub async fn rollback(mut self) -> Result<()> {
        self.file.take();
        fs::remove_file(&self.lock_path).await?;
        Ok(())
    }

    pub fn target(&self) -> &Path {
        &self.target
    }
}

impl Drop for LockFile {
    fn drop(&mut self) {
        if self.file.take().is_some() {
            if let Err(e) = std::fs::remove_file(&self.lock_path) {
                warn!(lock = %self.lock_path.display(), error = %e, "failed to remove abandoned lock");
            } else {
                debug!(lock = %self.lock_path.display(), "rolled back lock");
            }
        }
    }
}

fn lock_path_for(target: &Path) -> PathBuf {
    let mut name = target
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| OsString::from("object"));
    name.push(".lock");
    target.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn commit_replaces_target() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("repo.enc");
        std::fs::write(&target, b"old").unwrap();

        let mut lock = LockFile::hold(&target).await.unwrap();
        lock.write(b"new").await.unwrap();
        assert_eq!(std::fs::read(&target).unwrap(), b"old");
        lock.commit().await.unwrap();

        assert_eq!(std::fs::read(&target).unwrap(), b"new");
        assert!(!dir.path().join("repo.enc.lock").exists());
    }

    #[tokio::test]
    async fn second_holder_conflicts() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("repo.enc");

        let _first = LockFile::hold(&target).await.unwrap();
        let err = LockFile::hold(&target).await.unwrap_err();
        assert!(matches!(err, Error::LockConflict { .. }));
    }

    #[tokio::test]
    async fn abandoned_lock_leaves_target_intact() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("repo.enc");
        std::fs::write(&target, b"old").unwrap();

        {
            let mut lock = LockFile::hold(&target).await.unwrap();
            lock.write(b"partial").await.unwrap();
        }

        assert_eq!(std::fs::read(&target).unwrap(), b"old");
        assert!(!dir.path().join("repo.enc.lock").exists());
        LockFile::hold(&target).await.unwrap().rollback().await.unwrap();
    }
}
