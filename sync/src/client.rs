use crate::access::Credentials;
use crate::locator::RepositoryLocator;
use crate::server::SyncServer;
use async_trait::async_trait;
use bytes::Bytes;
use envi_core::{Error, KdfParams, Result, Secret, Snapshot, SnapshotConfig};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// Carries opaque archive bytes to and from the remote store.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Creates or replaces the archive for `locator`.
    async fn upload(
        &self,
        credentials: &Credentials,
        locator: &RepositoryLocator,
        archive: Bytes,
    ) -> Result<()>;

    async fn download(&self, credentials: &Credentials, locator: &RepositoryLocator) -> Result<Bytes>;
}

/// Calls a [`SyncServer`] in the same process.
#[derive(Clone)]
pub struct LocalTransport {
    server: Arc<SyncServer>,
}

impl LocalTransport {
    pub fn new(server: Arc<SyncServer>) -> Self {
        Self { server }
    }
}

#[async_trait]
impl Transport for LocalTransport {
    async fn upload(
        &self,
        credentials: &Credentials,
        locator: &RepositoryLocator,
        archive: Bytes,
    ) -> Result<()> {
        self.server.push(credentials, locator, archive).await
    }

    async fn download(&self, credentials: &Credentials, locator: &RepositoryLocator) -> Result<Bytes> {
        self.server.pull(credentials, locator).await
    }
}

/// Everything a push or pull needs, passed explicitly.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Snapshot root, conventionally `.envi` inside the working tree.
    pub root: PathBuf,
    pub locator: RepositoryLocator,
    pub credentials: Credentials,
    pub kdf_params: KdfParams,
}

impl SyncConfig {
    pub fn new<P: Into<PathBuf>>(
        root: P,
        locator: RepositoryLocator,
        credential: impl Into<String>,
        secret: Secret,
    ) -> Self {
        Self {
            root: root.into(),
            locator,
            credentials: Credentials::new(credential, secret),
            kdf_params: KdfParams::default(),
        }
    }

    pub fn with_kdf_params(mut self, params: KdfParams) -> Self {
        self.kdf_params = params;
        self
    }
}

pub struct SyncClient<T: Transport> {
    transport: T,
    config: SyncConfig,
}

impl<T: Transport> SyncClient<T> {
    pub fn new(transport: T, config: SyncConfig) -> Self {
        Self { transport, config }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Uploads an already encrypted archive.
    pub async fn push_archive(&self, archive: Bytes) -> Result<()> {
        self.transport
            .upload(&self.config.credentials, &self.config.locator, archive)
            .await
    }

    /// Downloads the current encrypted archive.
    pub async fn pull_archive(&self) -> Result<Bytes> {
        self.transport
            .download(&self.config.credentials, &self.config.locator)
            .await
    }

    /// Packs and encrypts the snapshot root, then uploads it.
    pub async fn push(&self) -> Result<Snapshot> {
        let snapshot_config =
            SnapshotConfig::new(&self.config.root).with_kdf_params(self.config.kdf_params);
        let secret = self.config.credentials.secret.clone();

        let (ciphertext, snapshot) = tokio::task::spawn_blocking(move || {
            envi_core::pack_and_encrypt(&snapshot_config, &secret)
        })
        .await
        .map_err(|e| Error::Backend(format!("pack task failed: {}", e)))??;

        self.push_archive(Bytes::from(ciphertext)).await?;
        info!(repository = %self.config.locator, summary = %snapshot.summary(), "pushed");
        Ok(snapshot)
    }

    /// Downloads, decrypts and unpacks the current archive into `destination`.
    pub async fn pull(&self, destination: &Path) -> Result<Snapshot> {
        let archive = self.pull_archive().await?;
        let secret = self.config.credentials.secret.clone();
        let destination = destination.to_path_buf();

        let snapshot = tokio::task::spawn_blocking(move || {
            envi_core::decrypt_and_unpack(&archive, &secret, &destination)
        })
        .await
        .map_err(|e| Error::Backend(format!("unpack task failed: {}", e)))??;

        info!(repository = %self.config.locator, summary = %snapshot.summary(), "pulled");
        Ok(snapshot)
    }
}
