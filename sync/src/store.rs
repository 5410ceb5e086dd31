use crate::locator::RepositoryLocator;
use bytes::Bytes;
use envi_backends::{retry_with_backoff, Backend, ObjectInfo, RetryConfig};
use envi_core::{Error, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Holds the current encrypted archive of each repository.
///
/// Writes to one repository are serialized by a per-repository mutex and,
/// across processes, by the backend's lock file. Different repositories
/// never wait on each other.
pub struct ArchiveStore {
    backend: Arc<dyn Backend>,
    locks: Mutex<HashMap<RepositoryLocator, Arc<Mutex<()>>>>,
    retry: RetryConfig,
}

impl ArchiveStore {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self {
            backend,
            locks: Mutex::new(HashMap::new()),
            retry: RetryConfig::contention(),
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    async fn lock_for(&self, locator: &RepositoryLocator) -> Arc<Mutex<()>> {
        self.locks
            .lock()
            .await
            .entry(locator.clone())
            .or_default()
            .clone()
    }

    /// Drops the map entry once nobody else holds or waits on it.
    async fn release(&self, locator: &RepositoryLocator, lock: Arc<Mutex<()>>) {
        let mut locks = self.locks.lock().await;
        drop(lock);
        if locks
            .get(locator)
            .is_some_and(|held| Arc::strong_count(held) == 1)
        {
            locks.remove(locator);
        }
    }

    /// Replaces the stored archive for `locator`.
    pub async fn put(&self, locator: &RepositoryLocator, archive: Bytes) -> Result<()> {
        let lock = self.lock_for(locator).await;
        let result = {
            let _guard = lock.lock().await;
            self.write_archive(locator, &archive).await
        };
        self.release(locator, lock).await;
        result?;

        info!(repository = %locator, bytes = archive.len(), "stored archive");
        Ok(())
    }

    async fn write_archive(&self, locator: &RepositoryLocator, archive: &Bytes) -> Result<()> {
        let path = locator.archive_path();
        let path = path.as_str();
        let backend = &self.backend;
        retry_with_backoff(&self.retry, "store archive", || {
            let archive = archive.clone();
            async move { backend.write(path, archive).await }
        })
        .await
    }

    /// Returns the last archive stored for `locator`.
    ///
    /// # Errors
    ///
    /// `Error::ArchiveNotFound` if nothing has been pushed yet.
    pub async fn get(&self, locator: &RepositoryLocator) -> Result<Bytes> {
        match self.backend.read(&locator.archive_path()).await {
            Ok(data) => {
                debug!(repository = %locator, bytes = data.len(), "loaded archive");
                Ok(data)
            }
            Err(e) if e.is_not_found() => Err(Error::ArchiveNotFound {
                repository: locator.to_string(),
            }),
            Err(e) => Err(e),
        }
    }

    /// Size and time of the last push, or `None` before the first one.
    pub async fn info(&self, locator: &RepositoryLocator) -> Result<Option<ObjectInfo>> {
        match self.backend.stat(&locator.archive_path()).await {
            Ok(info) => Ok(Some(info)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }
}
