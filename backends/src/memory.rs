use crate::backend::{Backend, ObjectInfo};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use envi_core::{Error, Result};
use std::collections::BTreeMap;
use tokio::sync::RwLock;

/// In-process object store. Each write swaps the whole value under the map
/// lock, which gives the same all-or-nothing replace as the local backend.
#[derive(Default)]
pub struct MemoryBackend {
    objects: RwLock<BTreeMap<String, (Bytes, DateTime<Utc>)>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn init(&self) -> Result<()> {
        Ok(())
    }

    async fn read(&self, path: &str) -> Result<Bytes> {
        self.objects
            .read()
            .await
            .get(path)
            .map(|(data, _)| data.clone())
            .ok_or_else(|| Error::ObjectNotFound {
                path: path.to_string(),
            })
    }

    async fn write(&self, path: &str, data: Bytes) -> Result<()> {
        self.objects
            .write()
            .await
            .insert(path.to_string(), (data, Utc::now()));
        Ok(())
    }

    async fn stat(&self, path: &str) -> Result<ObjectInfo> {
        let objects = self.objects.read().await;
        let (data, modified) = objects.get(path).ok_or_else(|| Error::ObjectNotFound {
            path: path.to_string(),
        })?;

        Ok(ObjectInfo {
            path: path.to_string(),
            size: data.len() as u64,
            modified: *modified,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn write_replaces_and_stat_tracks_size() {
        let backend = MemoryBackend::new();
        backend.write("archives/alice/web.enc", Bytes::from_static(b"1")).await.unwrap();
        backend.write("archives/alice/web.enc", Bytes::from_static(b"22")).await.unwrap();

        assert_eq!(
            backend.read("archives/alice/web.enc").await.unwrap(),
            Bytes::from_static(b"22")
        );
        let info = backend.stat("archives/alice/web.enc").await.unwrap();
        assert_eq!(info.size, 2);
        assert_eq!(info.path, "archives/alice/web.enc");
    }

    #[tokio::test]
    async fn missing_is_not_found() {
        let backend = MemoryBackend::new();
        assert!(backend.read("nope").await.unwrap_err().is_not_found());
        assert!(backend.stat("nope").await.unwrap_err().is_not_found());
    }
}
