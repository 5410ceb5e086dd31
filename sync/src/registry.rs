use crate::locator::RepositoryLocator;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use envi_backends::Backend;
use envi_core::{Error, KdfParams, Result, Secret};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

pub type UserId = String;

const REGISTRY_PATH: &str = "registry.json";

/// A repository as recorded by the registry. Only a hash of the secret is
/// kept; the plaintext is handed out once at creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryRecord {
    pub locator: RepositoryLocator,
    pub owner: UserId,
    pub secret_hash: String,
    pub contributors: BTreeSet<UserId>,
    pub created_at: DateTime<Utc>,
}

impl RepositoryRecord {
    pub fn new(locator: RepositoryLocator, secret: &Secret, params: &KdfParams) -> Result<Self> {
        Ok(Self {
            owner: locator.owner().to_string(),
            secret_hash: hash_secret(secret, params)?,
            contributors: BTreeSet::new(),
            created_at: Utc::now(),
            locator,
        })
    }

    pub fn is_owner(&self, user: &str) -> bool {
        self.owner == user
    }

    /// Owner or contributor.
    pub fn permits(&self, user: &str) -> bool {
        self.is_owner(user) || self.contributors.contains(user)
    }

    pub fn verify_secret(&self, secret: &Secret) -> bool {
        use argon2::{password_hash::PasswordHash, Argon2, PasswordVerifier};

        match PasswordHash::new(&self.secret_hash) {
            Ok(hash) => Argon2::default()
                .verify_password(secret.expose().as_bytes(), &hash)
                .is_ok(),
            Err(_) => false,
        }
    }
}

fn hash_secret(secret: &Secret, params: &KdfParams) -> Result<String> {
    use argon2::password_hash::{rand_core::OsRng, SaltString};
    use argon2::{Argon2, PasswordHasher};

    let argon2 = Argon2::new(
        argon2::Algorithm::Argon2id,
        argon2::Version::V0x13,
        argon2::Params::new(params.memory, params.iterations, params.parallelism, None)
            .map_err(|e| Error::Encryption(e.to_string()))?,
    );
    let salt = SaltString::generate(&mut OsRng);

    argon2
        .hash_password(secret.expose().as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| Error::Encryption(e.to_string()))
}

/// Lookup and persistence of repository records.
#[async_trait]
pub trait RepositoryRegistry: Send + Sync {
    async fn find(&self, locator: &RepositoryLocator) -> Result<Option<RepositoryRecord>>;

    /// Fails with `Error::RepositoryExists` if the locator is taken.
    async fn insert(&self, record: RepositoryRecord) -> Result<()>;

    /// Adds `user` to the contributors of the stored record and returns the
    /// record as written. Fails with `Error::RepositoryNotFound` if the
    /// locator is unknown.
    async fn add_contributor(
        &self,
        locator: &RepositoryLocator,
        user: &str,
    ) -> Result<RepositoryRecord>;

    /// Removes `user` from the contributors of the stored record.
    async fn remove_contributor(
        &self,
        locator: &RepositoryLocator,
        user: &str,
    ) -> Result<RepositoryRecord>;

    /// Repositories the user owns or contributes to.
    async fn list_for(&self, user: &str) -> Result<Vec<RepositoryRecord>>;
}

/// Registry persisted as a single JSON document through a [`Backend`].
pub struct BackendRegistry {
    backend: Arc<dyn Backend>,
    write_lock: Mutex<()>,
}

impl BackendRegistry {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self {
            backend,
            write_lock: Mutex::new(()),
        }
    }

    async fn load(&self) -> Result<BTreeMap<RepositoryLocator, RepositoryRecord>> {
        match self.backend.read(REGISTRY_PATH).await {
            Ok(data) => {
                let records: Vec<RepositoryRecord> = serde_json::from_slice(&data)?;
                Ok(records.into_iter().map(|r| (r.locator.clone(), r)).collect())
            }
            Err(e) if e.is_not_found() => Ok(BTreeMap::new()),
            Err(e) => Err(e),
        }
    }

    async fn save(&self, records: &BTreeMap<RepositoryLocator, RepositoryRecord>) -> Result<()> {
        let list: Vec<&RepositoryRecord> = records.values().collect();
        let data = serde_json::to_vec_pretty(&list)?;
        self.backend.write(REGISTRY_PATH, Bytes::from(data)).await
    }

    /// Re-reads the stored record and applies `change` to it under the write
    /// lock, so concurrent membership edits never overwrite each other.
    async fn modify<F>(&self, locator: &RepositoryLocator, change: F) -> Result<RepositoryRecord>
    where
        F: FnOnce(&mut RepositoryRecord) + Send,
    {
        let _guard = self.write_lock.lock().await;
        let mut records = self.load().await?;
        let record = records
            .get_mut(locator)
            .ok_or_else(|| Error::RepositoryNotFound {
                name: locator.to_string(),
            })?;

        change(record);
        let updated = record.clone();
        self.save(&records).await?;

        debug!(repository = %locator, contributors = updated.contributors.len(), "updated repository record");
        Ok(updated)
    }
}

#[async_trait]
impl RepositoryRegistry for BackendRegistry {
    async fn find(&self, locator: &RepositoryLocator) -> Result<Option<RepositoryRecord>> {
        Ok(self.load().await?.remove(locator))
    }

    async fn insert(&self, record: RepositoryRecord) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut records = self.load().await?;
        if records.contains_key(&record.locator) {
            return Err(Error::RepositoryExists {
                name: record.locator.to_string(),
            });
        }

        info!(repository = %record.locator, "registered repository");
        records.insert(record.locator.clone(), record);
        self.save(&records).await
    }

    async fn add_contributor(
        &self,
        locator: &RepositoryLocator,
        user: &str,
    ) -> Result<RepositoryRecord> {
        self.modify(locator, |record| {
            record.contributors.insert(user.to_string());
        })
        .await
    }

    async fn remove_contributor(
        &self,
        locator: &RepositoryLocator,
        user: &str,
    ) -> Result<RepositoryRecord> {
        self.modify(locator, |record| {
            record.contributors.remove(user);
        })
        .await
    }

    async fn list_for(&self, user: &str) -> Result<Vec<RepositoryRecord>> {
        Ok(self
            .load()
            .await?
            .into_values()
            .filter(|record| record.permits(user))
            .collect())
    }
}
