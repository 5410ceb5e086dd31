//! Push and pull of encrypted snapshots against an access-controlled store.

pub mod access;
pub mod client;
pub mod locator;
pub mod registry;
pub mod server;
pub mod store;

pub use access::{AccessControl, Credentials, IdentityProvider, TokenIdentity, TrustedLocalIdentity};
pub use client::{LocalTransport, SyncClient, SyncConfig, Transport};
pub use locator::RepositoryLocator;
pub use registry::{BackendRegistry, RepositoryRecord, RepositoryRegistry, UserId};
pub use server::{RepositorySummary, SyncServer};
pub use store::ArchiveStore;
