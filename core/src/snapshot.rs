use crate::archive::SnapshotArchive;
use crate::crypto::{self, Secret};
use crate::tree::Tree;
use crate::{ObjectId, Result, SnapshotConfig};
use std::path::Path;
use tracing::info;

/// The outcome of packing or unpacking a snapshot.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub tree: Tree,
    pub file_count: usize,
    pub total_size: u64,
}

impl Snapshot {
    fn from_tree(tree: Tree) -> Self {
        let entries = tree.entries();
        let file_count = entries.len();
        let total_size = entries.iter().map(|e| e.size() as u64).sum();
        Self {
            tree,
            file_count,
            total_size,
        }
    }

    pub fn root_id(&self) -> ObjectId {
        self.tree.id()
    }

    pub fn summary(&self) -> String {
        format!(
            "{} - {} files, {} bytes",
            self.root_id().short_string(),
            self.file_count,
            self.total_size
        )
    }
}

/// Captures the tree rooted at `root` without encrypting it.
pub fn capture(root: &Path) -> Result<Snapshot> {
    let (_, tree) = SnapshotArchive::capture(root)?;
    Ok(Snapshot::from_tree(tree))
}

/// Walks, packs and encrypts the snapshot root. Returns the ciphertext and
/// the snapshot it encodes.
pub fn pack_and_encrypt(config: &SnapshotConfig, secret: &Secret) -> Result<(Vec<u8>, Snapshot)> {
    let (archive, tree) = SnapshotArchive::capture(&config.root)?;
    let plaintext = archive.to_bytes()?;
    let ciphertext = crypto::encrypt(&plaintext, secret, &config.kdf_params)?;

    let snapshot = Snapshot::from_tree(tree);
    info!(
        tree = %snapshot.root_id().short_string(),
        files = snapshot.file_count,
        bytes = ciphertext.len(),
        "packed and encrypted snapshot"
    );
    Ok((ciphertext, snapshot))
}

/// Decrypts and validates `ciphertext`, then writes its files beneath
/// `destination`. Nothing is written unless the whole archive checks out.
pub fn decrypt_and_unpack(ciphertext: &[u8], secret: &Secret, destination: &Path) -> Result<Snapshot> {
    let plaintext = crypto::decrypt(ciphertext, secret)?;
    let (archive, tree) = SnapshotArchive::from_bytes(&plaintext)?;
    archive.unpack_into(destination)?;

    let snapshot = Snapshot::from_tree(tree);
    info!(
        tree = %snapshot.root_id().short_string(),
        files = snapshot.file_count,
        destination = %destination.display(),
        "unpacked snapshot"
    );
    Ok(snapshot)
}
