use crate::entry::{mode_of, validate_name};
use crate::tree::Tree;
use crate::{Entry, Error, Mode, ObjectId, Result};
use bincode::Options;
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use std::path::{Component, Path};
use tracing::{debug, info};
use walkdir::WalkDir;

pub const ARCHIVE_FORMAT_VERSION: u32 = 1;

/// Largest decoded archive accepted, in bytes.
pub const MAX_ARCHIVE_BYTES: u64 = 256 * 1024 * 1024;

fn codec() -> impl bincode::Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .with_limit(MAX_ARCHIVE_BYTES)
}

/// One file captured by a directory walk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub path: String,
    pub mode: Mode,
    pub data: Vec<u8>,
}

impl Record {
    pub fn into_entry(self) -> Result<Entry> {
        Entry::new(self.path, self.mode, self.data)
    }
}

/// An ordered, self-describing capture of a directory.
///
/// Records appear in walk order (sorted by file name at every level) and
/// no timestamps are stored, so packing the same directory twice yields
/// identical bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotArchive {
    pub format_version: u32,
    pub root_id: ObjectId,
    pub records: Vec<Record>,
}

impl SnapshotArchive {
    /// Walks `root` and captures every regular file beneath it.
    ///
    /// Any unreadable file aborts the walk with its path attached; nothing is
    /// returned in that case.
    pub fn capture(root: &Path) -> Result<(Self, Tree)> {
        if !root.is_dir() {
            return Err(Error::SnapshotRootMissing {
                path: root.to_path_buf(),
            });
        }

        let mut records = Vec::new();
        for item in WalkDir::new(root).follow_links(false).sort_by_file_name() {
            let item = item.map_err(|e| {
                let path = e.path().unwrap_or(root).to_path_buf();
                let source = e
                    .into_io_error()
                    .unwrap_or_else(|| std::io::Error::other("filesystem loop"));
                Error::UnreadableFile { path, source }
            })?;

            let file_type = item.file_type();
            if file_type.is_dir() {
                continue;
            }
            if !file_type.is_file() {
                debug!(path = %item.path().display(), "skipping non-regular file");
                continue;
            }

            let relative = relative_name(root, item.path())?;
            let unreadable = |source| Error::UnreadableFile {
                path: item.path().to_path_buf(),
                source,
            };
            let metadata = item.metadata().map_err(|e| {
                unreadable(
                    e.into_io_error()
                        .unwrap_or_else(|| std::io::Error::other("metadata unavailable")),
                )
            })?;
            let data = std::fs::read(item.path()).map_err(unreadable)?;

            debug!(path = %relative, bytes = data.len(), "captured file");
            records.push(Record {
                path: relative,
                mode: mode_of(&metadata),
                data,
            });
        }

        let tree = build_tree(&records)?;
        info!(
            root = %root.display(),
            files = records.len(),
            tree = %tree.id().short_string(),
            "captured snapshot"
        );

        Ok((
            Self {
                format_version: ARCHIVE_FORMAT_VERSION,
                root_id: tree.id(),
                records,
            },
            tree,
        ))
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let encoded = codec()
            .serialize(self)
            .map_err(|e| Error::CorruptArchive(format!("cannot encode archive: {e}")))?;
        let mut encoder =
            flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(&encoded)?;
        Ok(encoder.finish()?)
    }

    /// Decodes and validates an archive. Every record path is checked and
    /// the recorded root identifier must match the rebuilt tree.
    pub fn from_bytes(bytes: &[u8]) -> Result<(Self, Tree)> {
        let mut decoder = flate2::read::ZlibDecoder::new(bytes).take(MAX_ARCHIVE_BYTES + 1);
        let mut encoded = Vec::new();
        decoder
            .read_to_end(&mut encoded)
            .map_err(|e| Error::CorruptArchive(format!("decompression failed: {e}")))?;
        if encoded.len() as u64 > MAX_ARCHIVE_BYTES {
            return Err(Error::CorruptArchive(format!(
                "archive exceeds {MAX_ARCHIVE_BYTES} bytes when decompressed"
            )));
        }

        let archive: SnapshotArchive = codec()
            .deserialize(&encoded)
            .map_err(|e| Error::CorruptArchive(format!("malformed archive: {e}")))?;

        if archive.format_version != ARCHIVE_FORMAT_VERSION {
            return Err(Error::CorruptArchive(format!(
                "unsupported archive version {}",
                archive.format_version
            )));
        }

        let tree = build_tree(&archive.records).map_err(|e| match e {
            Error::InvalidPath { path, reason } => {
                Error::CorruptArchive(format!("record {path:?}: {reason}"))
            }
            other => other,
        })?;
        if tree.id() != archive.root_id {
            return Err(Error::CorruptArchive(format!(
                "root identifier mismatch: recorded {}, rebuilt {}",
                archive.root_id.short_string(),
                tree.id().short_string()
            )));
        }

        Ok((archive, tree))
    }

    /// Writes every record beneath `destination`, restoring permissions.
    pub fn unpack_into(&self, destination: &Path) -> Result<()> {
        for record in &self.records {
            validate_name(&record.path)?;
        }

        std::fs::create_dir_all(destination)?;
        for record in &self.records {
            let target = destination.join(&record.path);
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&target, &record.data)?;

            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                let permissions = std::fs::Permissions::from_mode(record.mode.permissions());
                std::fs::set_permissions(&target, permissions)?;
            }

            debug!(path = %record.path, bytes = record.data.len(), "restored file");
        }

        Ok(())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

fn build_tree(records: &[Record]) -> Result<Tree> {
    let entries = records
        .iter()
        .map(|r| Entry::new(r.path.clone(), r.mode, r.data.clone()))
        .collect::<Result<Vec<_>>>()?;
    Ok(Tree::build(entries))
}

fn relative_name(root: &Path, path: &Path) -> Result<String> {
    let relative = path.strip_prefix(root).map_err(|_| Error::InvalidPath {
        path: path.display().to_string(),
        reason: "outside snapshot root",
    })?;

    let mut segments = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(segment) => {
                let segment = segment.to_str().ok_or_else(|| Error::InvalidPath {
                    path: relative.display().to_string(),
                    reason: "not valid UTF-8",
                })?;
                segments.push(segment);
            }
            _ => {
                return Err(Error::InvalidPath {
                    path: relative.display().to_string(),
                    reason: "unexpected path component",
                })
            }
        }
    }

    let name = segments.join("/");
    validate_name(&name)?;
    Ok(name)
}
