use crate::access::{AccessControl, Credentials};
use crate::locator::RepositoryLocator;
use crate::registry::{RepositoryRecord, RepositoryRegistry};
use crate::store::ArchiveStore;
use crate::IdentityProvider;
use bytes::Bytes;
use envi_backends::{Backend, ObjectInfo};
use envi_core::{Error, KdfParams, Result, Secret};
use std::sync::Arc;
use tracing::info;

/// A repository the caller can reach, with the state of its archive.
#[derive(Debug, Clone)]
pub struct RepositorySummary {
    pub record: RepositoryRecord,
    /// `None` until the first push.
    pub archive: Option<ObjectInfo>,
}

/// Remote side of push and pull: checks access, then reads or replaces the
/// repository's archive.
pub struct SyncServer {
    access: AccessControl,
    store: ArchiveStore,
    secret_params: KdfParams,
}

impl SyncServer {
    pub fn new(
        identity: Arc<dyn IdentityProvider>,
        registry: Arc<dyn RepositoryRegistry>,
        backend: Arc<dyn Backend>,
    ) -> Self {
        Self {
            access: AccessControl::new(identity, registry),
            store: ArchiveStore::new(backend),
            secret_params: KdfParams::default(),
        }
    }

    /// Cost parameters used when hashing newly issued repository secrets.
    pub fn with_secret_params(mut self, params: KdfParams) -> Self {
        self.secret_params = params;
        self
    }

    pub fn store(&self) -> &ArchiveStore {
        &self.store
    }

    /// Writes the archive only after the caller is authorized. A failed
    /// write leaves the previous archive in place.
    pub async fn push(
        &self,
        credentials: &Credentials,
        locator: &RepositoryLocator,
        archive: Bytes,
    ) -> Result<()> {
        let grant = self.access.authorize(credentials, locator).await?;
        self.store.put(locator, archive).await?;
        info!(repository = %locator, user = %grant.user, "push accepted");
        Ok(())
    }

    pub async fn pull(&self, credentials: &Credentials, locator: &RepositoryLocator) -> Result<Bytes> {
        let grant = self.access.authorize(credentials, locator).await?;
        let archive = self.store.get(locator).await?;
        info!(repository = %locator, user = %grant.user, "pull served");
        Ok(archive)
    }

    /// Registers `<caller>/<name>` and returns its record together with the
    /// plaintext secret. The secret is not retrievable afterwards.
    pub async fn create_repository(
        &self,
        credential: &str,
        name: &str,
    ) -> Result<(RepositoryRecord, Secret)> {
        let user = self.access.authenticate(credential).await?;
        let locator = RepositoryLocator::new(&user, name)?;
        self.access.ensure_not_registered(&locator).await?;

        let secret = Secret::generate();
        let record = RepositoryRecord::new(locator, &secret, &self.secret_params)?;
        self.access.registry().insert(record.clone()).await?;

        info!(repository = %record.locator, "created repository");
        Ok((record, secret))
    }

    pub async fn list_repositories(&self, credential: &str) -> Result<Vec<RepositorySummary>> {
        let user = self.access.authenticate(credential).await?;
        let records = self.access.registry().list_for(&user).await?;

        let mut summaries = Vec::with_capacity(records.len());
        for record in records {
            let archive = self.store.info(&record.locator).await?;
            summaries.push(RepositorySummary { record, archive });
        }
        Ok(summaries)
    }

    /// Grants `contributor` push/pull access. Owner only.
    pub async fn share(
        &self,
        credential: &str,
        locator: &RepositoryLocator,
        contributor: &str,
    ) -> Result<RepositoryRecord> {
        self.owned_record(credential, locator).await?;
        crate::locator::validate_segment(contributor, contributor)?;
        let record = self
            .access
            .registry()
            .add_contributor(locator, contributor)
            .await?;

        info!(repository = %locator, contributor, "shared repository");
        Ok(record)
    }

    /// Withdraws a contributor's access. Owner only.
    pub async fn revoke(
        &self,
        credential: &str,
        locator: &RepositoryLocator,
        contributor: &str,
    ) -> Result<RepositoryRecord> {
        self.owned_record(credential, locator).await?;
        let record = self
            .access
            .registry()
            .remove_contributor(locator, contributor)
            .await?;

        info!(repository = %locator, contributor, "revoked access");
        Ok(record)
    }

    async fn owned_record(
        &self,
        credential: &str,
        locator: &RepositoryLocator,
    ) -> Result<RepositoryRecord> {
        let user = self.access.authenticate(credential).await?;
        let record = self.access.ensure_repository_exists(locator).await?;
        if !record.is_owner(&user) {
            return Err(Error::Unauthorized {
                repository: locator.to_string(),
                user,
            });
        }
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::TokenIdentity;
    use crate::registry::BackendRegistry;
    use envi_backends::MemoryBackend;

    fn light() -> KdfParams {
        KdfParams {
            memory: 1024,
            iterations: 1,
            parallelism: 1,
        }
    }

    async fn server() -> (SyncServer, String, String) {
        let identity = Arc::new(TokenIdentity::new());
        let alice = identity.issue("alice").await;
        let bob = identity.issue("bob").await;

        let backend: Arc<dyn Backend> = Arc::new(MemoryBackend::new());
        let registry = Arc::new(BackendRegistry::new(backend.clone()));
        let server = SyncServer::new(identity, registry, backend).with_secret_params(light());
        (server, alice, bob)
    }

    #[tokio::test]
    async fn push_then_pull_returns_same_bytes() {
        let (server, alice, _) = server().await;
        let (record, secret) = server.create_repository(&alice, "web").await.unwrap();
        assert_eq!(record.locator.to_string(), "alice/web");

        let creds = Credentials::new(alice, secret);
        let err = server.pull(&creds, &record.locator).await.unwrap_err();
        assert!(matches!(err, Error::ArchiveNotFound { .. }));

        server
            .push(&creds, &record.locator, Bytes::from_static(b"ciphertext"))
            .await
            .unwrap();
        assert_eq!(
            server.pull(&creds, &record.locator).await.unwrap(),
            Bytes::from_static(b"ciphertext")
        );
    }

    #[tokio::test]
    async fn unauthorized_push_does_not_write() {
        let (server, alice, bob) = server().await;
        let (record, secret) = server.create_repository(&alice, "web").await.unwrap();

        let err = server
            .push(&Credentials::new(bob, secret), &record.locator, Bytes::from_static(b"x"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Unauthorized { .. }));
        assert!(server.store().info(&record.locator).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn unknown_token_is_unauthenticated() {
        let (server, _, _) = server().await;
        let err = server.create_repository("forged", "web").await.unwrap_err();
        assert!(matches!(err, Error::Unauthenticated));
    }

    #[tokio::test]
    async fn duplicate_repository_is_rejected() {
        let (server, alice, _) = server().await;
        server.create_repository(&alice, "web").await.unwrap();
        let err = server.create_repository(&alice, "web").await.unwrap_err();
        assert!(matches!(err, Error::RepositoryExists { .. }));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_shares_keep_every_contributor() {
        let (server, alice, _) = server().await;
        let server = Arc::new(server);
        let (record, _) = server.create_repository(&alice, "web").await.unwrap();

        for round in 0..5 {
            let tasks: Vec<_> = (0..8)
                .map(|i| {
                    let server = server.clone();
                    let alice = alice.clone();
                    let locator = record.locator.clone();
                    tokio::spawn(async move {
                        server
                            .share(&alice, &locator, &format!("user{round}-{i}"))
                            .await
                    })
                })
                .collect();
            for task in tasks {
                task.await.unwrap().unwrap();
            }
        }

        let stored = server
            .access
            .registry()
            .find(&record.locator)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.contributors.len(), 40);
    }

    #[tokio::test]
    async fn share_and_revoke_contributor() {
        let (server, alice, bob) = server().await;
        let (record, secret) = server.create_repository(&alice, "web").await.unwrap();
        let bob_creds = Credentials::new(bob.clone(), secret.clone());

        server.share(&alice, &record.locator, "bob").await.unwrap();
        server
            .push(&bob_creds, &record.locator, Bytes::from_static(b"from bob"))
            .await
            .unwrap();
        let listed = server.list_repositories(&bob).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].archive.as_ref().unwrap().size, 8);

        let err = server.share(&bob, &record.locator, "mallory").await.unwrap_err();
        assert!(matches!(err, Error::Unauthorized { .. }));

        server.revoke(&alice, &record.locator, "bob").await.unwrap();
        let err = server.pull(&bob_creds, &record.locator).await.unwrap_err();
        assert!(matches!(err, Error::Unauthorized { .. }));
    }
}
