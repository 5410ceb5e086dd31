use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid path {path:?}: {reason}")]
    InvalidPath { path: String, reason: &'static str },

    #[error("Failed to read {}: {source}", path.display())]
    UnreadableFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Snapshot root not found at {}", path.display())]
    SnapshotRootMissing { path: PathBuf },

    #[error("Secret must not be empty")]
    EmptySecret,

    #[error("Invalid repository locator {locator:?}: {reason}")]
    InvalidLocator { locator: String, reason: &'static str },

    #[error("Encryption error: {0}")]
    Encryption(String),

    #[error("Integrity check failed: {0}")]
    Integrity(String),

    #[error("Archive corrupted: {0}")]
    CorruptArchive(String),

    #[error("Lock already held: {}", path.display())]
    LockConflict { path: PathBuf },

    #[error("No archive stored for repository {repository}")]
    ArchiveNotFound { repository: String },

    #[error("Object not found: {path}")]
    ObjectNotFound { path: String },

    #[error("Unauthenticated")]
    Unauthenticated,

    #[error("User {user} may not access repository {repository}")]
    Unauthorized { repository: String, user: String },

    #[error("Invalid repository secret")]
    InvalidSecret,

    #[error("Repository not found: {name}")]
    RepositoryNotFound { name: String },

    #[error("Repository already exists: {name}")]
    RepositoryExists { name: String },

    #[error("Backend error: {0}")]
    Backend(String),
}

/// Coarse failure classes callers map onto user-visible behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad local input: paths, unreadable files, empty secrets.
    Input,
    /// Wrong secret, tampered ciphertext, corrupt archive.
    Integrity,
    /// A lock is held; the operation may be retried.
    Contention,
    /// Nothing stored yet, or the addressed object does not exist.
    NotFound,
    /// Authentication or authorization refused.
    Access,
    /// Storage or serialization failure.
    Storage,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidPath { .. }
            | Error::UnreadableFile { .. }
            | Error::SnapshotRootMissing { .. }
            | Error::EmptySecret
            | Error::InvalidLocator { .. } => ErrorKind::Input,
            Error::Integrity(_) | Error::CorruptArchive(_) => ErrorKind::Integrity,
            Error::LockConflict { .. } => ErrorKind::Contention,
            Error::ArchiveNotFound { .. }
            | Error::ObjectNotFound { .. }
            | Error::RepositoryNotFound { .. } => ErrorKind::NotFound,
            Error::Unauthenticated
            | Error::Unauthorized { .. }
            | Error::InvalidSecret
            | Error::RepositoryExists { .. } => ErrorKind::Access,
            Error::Io(_) | Error::Serialization(_) | Error::Encryption(_) | Error::Backend(_) => {
                ErrorKind::Storage
            }
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }
}

pub type Result<T> = std::result::Result<T, Error>;
