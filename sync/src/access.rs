//! Identity and authorization seams.
//!
//! Three checks are kept separate so each has one failure shape:
//! the repository exists, the caller may use it, and (on creation only)
//! the locator is not already registered.

use crate::locator::{validate_segment, RepositoryLocator};
use crate::registry::{RepositoryRecord, RepositoryRegistry, UserId};
use async_trait::async_trait;
use envi_core::{Error, Result, Secret};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// What a caller presents on push and pull.
#[derive(Debug, Clone)]
pub struct Credentials {
    /// Session token or user name, depending on the identity provider.
    pub credential: String,
    pub secret: Secret,
}

impl Credentials {
    pub fn new(credential: impl Into<String>, secret: Secret) -> Self {
        Self {
            credential: credential.into(),
            secret,
        }
    }
}

/// Resolves a caller credential to a user.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Fails with `Error::Unauthenticated` when the credential is not valid.
    async fn authenticate(&self, credential: &str) -> Result<UserId>;
}

/// Random session tokens issued after login.
#[derive(Default)]
pub struct TokenIdentity {
    tokens: RwLock<HashMap<String, UserId>>,
}

impl TokenIdentity {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn issue(&self, user: &str) -> String {
        let token = Secret::generate().expose().to_string();
        self.tokens
            .write()
            .await
            .insert(token.clone(), user.to_string());
        debug!(user, "issued session token");
        token
    }

    pub async fn revoke(&self, token: &str) {
        self.tokens.write().await.remove(token);
    }
}

#[async_trait]
impl IdentityProvider for TokenIdentity {
    async fn authenticate(&self, credential: &str) -> Result<UserId> {
        self.tokens
            .read()
            .await
            .get(credential)
            .cloned()
            .ok_or(Error::Unauthenticated)
    }
}

/// Single-user local mode: the credential is taken as the user name.
pub struct TrustedLocalIdentity;

#[async_trait]
impl IdentityProvider for TrustedLocalIdentity {
    async fn authenticate(&self, credential: &str) -> Result<UserId> {
        validate_segment(credential, credential).map_err(|_| Error::Unauthenticated)?;
        Ok(credential.to_string())
    }
}

/// A caller that passed every check for a repository.
#[derive(Debug, Clone)]
pub struct Grant {
    pub user: UserId,
    pub record: RepositoryRecord,
}

pub struct AccessControl {
    identity: Arc<dyn IdentityProvider>,
    registry: Arc<dyn RepositoryRegistry>,
}

impl AccessControl {
    pub fn new(identity: Arc<dyn IdentityProvider>, registry: Arc<dyn RepositoryRegistry>) -> Self {
        Self { identity, registry }
    }

    pub fn registry(&self) -> &Arc<dyn RepositoryRegistry> {
        &self.registry
    }

    pub async fn authenticate(&self, credential: &str) -> Result<UserId> {
        self.identity.authenticate(credential).await
    }

    pub async fn ensure_repository_exists(
        &self,
        locator: &RepositoryLocator,
    ) -> Result<RepositoryRecord> {
        self.registry
            .find(locator)
            .await?
            .ok_or_else(|| Error::RepositoryNotFound {
                name: locator.to_string(),
            })
    }

    pub async fn ensure_not_registered(&self, locator: &RepositoryLocator) -> Result<()> {
        match self.registry.find(locator).await? {
            Some(_) => Err(Error::RepositoryExists {
                name: locator.to_string(),
            }),
            None => Ok(()),
        }
    }

    /// Owner or contributor, holding the repository secret.
    pub fn ensure_caller_authorized(
        record: &RepositoryRecord,
        user: &str,
        secret: &Secret,
    ) -> Result<()> {
        if !record.permits(user) {
            warn!(repository = %record.locator, user, "access refused");
            return Err(Error::Unauthorized {
                repository: record.locator.to_string(),
                user: user.to_string(),
            });
        }
        if !record.verify_secret(secret) {
            warn!(repository = %record.locator, user, "secret mismatch");
            return Err(Error::InvalidSecret);
        }
        Ok(())
    }

    /// Runs all three push/pull checks in order.
    pub async fn authorize(
        &self,
        credentials: &Credentials,
        locator: &RepositoryLocator,
    ) -> Result<Grant> {
        let user = self.authenticate(&credentials.credential).await?;
        let record = self.ensure_repository_exists(locator).await?;
        Self::ensure_caller_authorized(&record, &user, &credentials.secret)?;
        Ok(Grant { user, record })
    }
}
