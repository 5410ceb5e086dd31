use crate::{Error, Mode, ObjectId, Result};
use std::fmt;
use std::path::Path;

/// A single file in the object graph: its path relative to the snapshot
/// root, its mode, and the identifier of its content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    name: String,
    mode: Mode,
    id: ObjectId,
    data: Vec<u8>,
}

impl Entry {
    /// Builds an entry from a slash-separated relative path and raw bytes.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidPath` for empty, absolute or traversing paths.
    pub fn new(name: impl Into<String>, mode: Mode, data: Vec<u8>) -> Result<Self> {
        let name = name.into();
        validate_name(&name)?;
        if mode.is_tree() {
            return Err(Error::InvalidPath {
                path: name,
                reason: "directories cannot be entries",
            });
        }

        Ok(Self {
            id: ObjectId::from_data(&data),
            name,
            mode,
            data,
        })
    }

    /// Reads `root/name` from disk, inferring the mode from its permission bits.
    pub fn from_file(root: &Path, name: &str) -> Result<Self> {
        validate_name(name)?;
        let path = root.join(name);
        let data = std::fs::read(&path).map_err(|source| Error::UnreadableFile {
            path: path.clone(),
            source,
        })?;
        let metadata = std::fs::metadata(&path).map_err(|source| Error::UnreadableFile {
            path: path.clone(),
            source,
        })?;

        Self::new(name, mode_of(&metadata), data)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Last path segment; the key this entry is stored under in its parent.
    pub fn base_name(&self) -> &str {
        self.name.rsplit('/').next().unwrap_or(&self.name)
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }
}

impl fmt::Display for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.mode, self.name, self.id)
    }
}

#[cfg(unix)]
pub(crate) fn mode_of(metadata: &std::fs::Metadata) -> Mode {
    use std::os::unix::fs::PermissionsExt;
    Mode::from_permissions(metadata.permissions().mode())
}

#[cfg(not(unix))]
pub(crate) fn mode_of(_metadata: &std::fs::Metadata) -> Mode {
    Mode::File
}

/// Checks that `name` is a well-formed relative path that stays inside the
/// snapshot root.
pub fn validate_name(name: &str) -> Result<()> {
    let reject = |reason| {
        Err(Error::InvalidPath {
            path: name.to_string(),
            reason,
        })
    };

    if name.is_empty() {
        return reject("empty path");
    }
    if name.starts_with('/') {
        return reject("absolute path");
    }
    if name.contains('\\') {
        return reject("backslash in path");
    }
    if name.contains('\0') {
        return reject("NUL byte in path");
    }

    for segment in name.split('/') {
        match segment {
            "" => return reject("empty path segment"),
            "." | ".." => return reject("path traversal segment"),
            _ => {}
        }
    }

    Ok(())
}
