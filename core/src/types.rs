use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Content identifier of an object: the BLAKE3 hash of its canonical bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectId(blake3::Hash);

impl ObjectId {
    pub fn new(hash: blake3::Hash) -> Self {
        Self(hash)
    }

    pub fn from_data(data: &[u8]) -> Self {
        Self(blake3::hash(data))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        self.0.as_bytes()
    }

    pub fn to_hex(&self) -> String {
        self.0.to_hex().to_string()
    }

    pub fn short_string(&self) -> String {
        self.to_hex().chars().take(8).collect()
    }
}

impl From<blake3::Hash> for ObjectId {
    fn from(hash: blake3::Hash) -> Self {
        Self(hash)
    }
}

impl FromStr for ObjectId {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s)?;
        if bytes.len() != 32 {
            return Err(hex::FromHexError::InvalidStringLength);
        }
        let mut array = [0u8; 32];
        array.copy_from_slice(&bytes);
        Ok(Self(blake3::Hash::from(array)))
    }
}

impl Serialize for ObjectId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ObjectId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        ObjectId::from_str(&s).map_err(serde::de::Error::custom)
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Permission/type tag of a node in the object graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Mode {
    File,
    Executable,
    Tree,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::File => "100644",
            Mode::Executable => "100755",
            Mode::Tree => "40000",
        }
    }

    /// Infers a leaf mode from Unix permission bits.
    pub fn from_permissions(permissions: u32) -> Self {
        if permissions & 0o111 != 0 {
            Mode::Executable
        } else {
            Mode::File
        }
    }

    pub fn permissions(&self) -> u32 {
        match self {
            Mode::File => 0o644,
            Mode::Executable | Mode::Tree => 0o755,
        }
    }

    pub fn is_tree(&self) -> bool {
        matches!(self, Mode::Tree)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Argon2id cost parameters used to stretch a repository secret into a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    /// Memory cost in KiB.
    pub memory: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            memory: argon2::Params::DEFAULT_M_COST,
            iterations: argon2::Params::DEFAULT_T_COST,
            parallelism: argon2::Params::DEFAULT_P_COST,
        }
    }
}

/// Explicit configuration for snapshotting a working directory.
#[derive(Debug, Clone)]
pub struct SnapshotConfig {
    /// Directory whose contents form the snapshot.
    pub root: std::path::PathBuf,
    pub kdf_params: KdfParams,
}

impl SnapshotConfig {
    pub fn new<P: Into<std::path::PathBuf>>(root: P) -> Self {
        Self {
            root: root.into(),
            kdf_params: KdfParams::default(),
        }
    }

    pub fn with_kdf_params(mut self, params: KdfParams) -> Self {
        self.kdf_params = params;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_id_hex_roundtrip() {
        let id = ObjectId::from_data(b"A=1");
        let parsed: ObjectId = id.to_hex().parse().unwrap();
        assert_eq!(id, parsed);
        assert_eq!(id.short_string().len(), 8);
    }

    #[test]
    fn object_id_rejects_wrong_length() {
        assert!("abcd".parse::<ObjectId>().is_err());
    }

    #[test]
    fn mode_inference_from_permissions() {
        assert_eq!(Mode::from_permissions(0o644), Mode::File);
        assert_eq!(Mode::from_permissions(0o755), Mode::Executable);
        assert_eq!(Mode::from_permissions(0o700), Mode::Executable);
        assert_eq!(Mode::Tree.as_str(), "40000");
    }
}
