use async_trait::async_trait;
use bytes::Bytes;
use envi_core::Result;

/// Opaque blob storage addressed by slash-separated keys.
///
/// `write` must replace an existing object atomically: a concurrent `read`
/// observes either the old or the new bytes, never a mix.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn init(&self) -> Result<()>;

    /// Returns `Error::ObjectNotFound` when nothing is stored at `path`.
    async fn read(&self, path: &str) -> Result<Bytes>;

    async fn write(&self, path: &str, data: Bytes) -> Result<()>;

    /// Size and last write time. `Error::ObjectNotFound` when absent.
    async fn stat(&self, path: &str) -> Result<ObjectInfo>;
}

#[derive(Debug, Clone)]
pub struct ObjectInfo {
    pub path: String,
    pub size: u64,
    pub modified: chrono::DateTime<chrono::Utc>,
}
