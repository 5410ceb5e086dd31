pub mod archive;
pub mod crypto;
pub mod entry;
pub mod error;
pub mod snapshot;
pub mod tree;
pub mod types;

pub use crypto::Secret;
pub use entry::Entry;
pub use error::{Error, ErrorKind, Result};
pub use snapshot::{decrypt_and_unpack, pack_and_encrypt, Snapshot};
pub use tree::{Node, Tree, TreeBuilder, TreeDiff};
pub use types::*;
