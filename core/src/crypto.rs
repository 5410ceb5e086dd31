use crate::{Error, KdfParams, Result};
use argon2::Argon2;
use chacha20poly1305::{
    aead::{Aead, AeadCore, KeyInit, OsRng, Payload},
    ChaCha20Poly1305, Key, Nonce,
};
use rand::RngCore;
use std::fmt;

const MAGIC: &[u8; 4] = b"ENVI";
const ENVELOPE_VERSION: u8 = 1;
const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;
const HEADER_LEN: usize = MAGIC.len() + 1 + 12 + SALT_LEN;
/// Upper bounds on the KDF cost an envelope header may request.
const MAX_KDF_MEMORY: u32 = 1 << 20;
const MAX_KDF_ITERATIONS: u32 = 64;
const MAX_KDF_PARALLELISM: u32 = 16;

fn check_kdf_limits(params: &KdfParams) -> std::result::Result<(), String> {
    if params.memory > MAX_KDF_MEMORY {
        return Err(format!("KDF memory {} KiB exceeds limit", params.memory));
    }
    if params.iterations > MAX_KDF_ITERATIONS {
        return Err(format!("KDF iterations {} exceed limit", params.iterations));
    }
    if params.parallelism > MAX_KDF_PARALLELISM {
        return Err(format!("KDF parallelism {} exceeds limit", params.parallelism));
    }
    Ok(())
}

/// Repository secret. Used both to authorize pushes and pulls and as the
/// input to key derivation.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(secret: impl Into<String>) -> Result<Self> {
        let secret = secret.into();
        if secret.is_empty() {
            return Err(Error::EmptySecret);
        }
        Ok(Self(secret))
    }

    /// 32 random bytes, hex encoded.
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        OsRng.fill_bytes(&mut bytes);
        Self(hex::encode(bytes))
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(..)")
    }
}

/// 256-bit key stretched from a secret.
pub struct ArchiveKey {
    key: [u8; 32],
}

impl ArchiveKey {
    pub fn derive(secret: &Secret, salt: &[u8], params: &KdfParams) -> Result<Self> {
        let argon2 = Argon2::new(
            argon2::Algorithm::Argon2id,
            argon2::Version::V0x13,
            argon2::Params::new(params.memory, params.iterations, params.parallelism, Some(32))
                .map_err(|e| Error::Encryption(e.to_string()))?,
        );

        let mut key = [0u8; 32];
        argon2
            .hash_password_into(secret.expose().as_bytes(), salt, &mut key)
            .map_err(|e| Error::Encryption(e.to_string()))?;
        Ok(Self { key })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.key
    }
}

pub struct Encryptor {
    cipher: ChaCha20Poly1305,
}

impl Encryptor {
    pub fn new(key: &[u8]) -> Result<Self> {
        if key.len() != 32 {
            return Err(Error::Encryption("Key must be 32 bytes".to_string()));
        }

        let key = Key::from_slice(key);
        let cipher = ChaCha20Poly1305::new(key);
        Ok(Self { cipher })
    }

    /// Encrypts under a fresh random nonce; output is `nonce || ciphertext`.
    pub fn encrypt(&self, plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
        let nonce = ChaCha20Poly1305::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, Payload { msg: plaintext, aad })
            .map_err(|e| Error::Encryption(e.to_string()))?;

        let mut result = nonce.to_vec();
        result.extend_from_slice(&ciphertext);
        Ok(result)
    }

    pub fn decrypt(&self, ciphertext: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
        if ciphertext.len() < NONCE_LEN {
            return Err(Error::Integrity("ciphertext too short".to_string()));
        }

        let (nonce_bytes, encrypted) = ciphertext.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);

        self.cipher
            .decrypt(nonce, Payload { msg: encrypted, aad })
            .map_err(|_| Error::Integrity("authentication failed".to_string()))
    }
}

/// Seals `plaintext` under a key derived from `secret`.
///
/// Layout: magic, version, KDF params, salt, then `nonce || ciphertext`.
/// The header is authenticated as associated data.
pub fn encrypt(plaintext: &[u8], secret: &Secret, params: &KdfParams) -> Result<Vec<u8>> {
    check_kdf_limits(params).map_err(Error::Encryption)?;

    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);

    let mut header = Vec::with_capacity(HEADER_LEN);
    header.extend_from_slice(MAGIC);
    header.push(ENVELOPE_VERSION);
    header.extend_from_slice(&params.memory.to_le_bytes());
    header.extend_from_slice(&params.iterations.to_le_bytes());
    header.extend_from_slice(&params.parallelism.to_le_bytes());
    header.extend_from_slice(&salt);

    let key = ArchiveKey::derive(secret, &salt, params)?;
    let sealed = Encryptor::new(key.as_bytes())?.encrypt(plaintext, &header)?;

    let mut out = header;
    out.extend_from_slice(&sealed);
    Ok(out)
}

/// Opens an envelope produced by [`encrypt`]. A wrong secret or any
/// modification yields `Error::Integrity`.
pub fn decrypt(ciphertext: &[u8], secret: &Secret) -> Result<Vec<u8>> {
    if ciphertext.len() < HEADER_LEN + NONCE_LEN {
        return Err(Error::Integrity("envelope truncated".to_string()));
    }

    let (header, sealed) = ciphertext.split_at(HEADER_LEN);
    if &header[..MAGIC.len()] != MAGIC {
        return Err(Error::Integrity("not an envi archive".to_string()));
    }
    if header[MAGIC.len()] != ENVELOPE_VERSION {
        return Err(Error::Integrity(format!(
            "unsupported envelope version {}",
            header[MAGIC.len()]
        )));
    }

    let word = |at: usize| {
        let mut bytes = [0u8; 4];
        bytes.copy_from_slice(&header[at..at + 4]);
        u32::from_le_bytes(bytes)
    };
    let params = KdfParams {
        memory: word(5),
        iterations: word(9),
        parallelism: word(13),
    };
    check_kdf_limits(&params).map_err(Error::Integrity)?;
    let salt = &header[17..];

    let key = ArchiveKey::derive(secret, salt, &params)
        .map_err(|e| Error::Integrity(format!("unusable key parameters: {e}")))?;
    Encryptor::new(key.as_bytes())?.decrypt(sealed, header)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn light() -> KdfParams {
        KdfParams {
            memory: 1024,
            iterations: 1,
            parallelism: 1,
        }
    }

    #[test]
    fn test_encryption_roundtrip() {
        let secret = Secret::new("correct horse").unwrap();

        for size in [1usize, 8, 17, 4096, 300 * 1024] {
            let plaintext: Vec<u8> = (0..size).map(|i| (i % 251) as u8).collect();
            let ciphertext = encrypt(&plaintext, &secret, &light()).unwrap();
            assert_eq!(decrypt(&ciphertext, &secret).unwrap(), plaintext, "size {size}");
        }
    }

    #[test]
    fn excessive_header_costs_are_rejected_before_derivation() {
        let secret = Secret::new("s").unwrap();
        let sealed = encrypt(b"data", &secret, &light()).unwrap();

        // memory, iterations, parallelism
        for offset in [5usize, 9, 13] {
            let mut crafted = sealed.clone();
            crafted[offset..offset + 4].copy_from_slice(&u32::MAX.to_le_bytes());
            let err = decrypt(&crafted, &secret).unwrap_err();
            assert!(
                matches!(&err, Error::Integrity(msg) if msg.contains("exceed")),
                "offset {offset}: {err}"
            );
        }

        let greedy = KdfParams {
            iterations: MAX_KDF_ITERATIONS + 1,
            ..light()
        };
        assert!(matches!(
            encrypt(b"data", &secret, &greedy),
            Err(Error::Encryption(_))
        ));
    }

    #[test]
    fn each_encryption_uses_fresh_nonce_and_salt() {
        let secret = Secret::new("s").unwrap();
        let a = encrypt(b"same", &secret, &light()).unwrap();
        let b = encrypt(b"same", &secret, &light()).unwrap();
        assert_ne!(a, b);
        assert_ne!(a[17..HEADER_LEN], b[17..HEADER_LEN]);
    }

    #[test]
    fn wrong_secret_is_integrity_error() {
        let ciphertext = encrypt(b"data", &Secret::new("one").unwrap(), &light()).unwrap();
        let err = decrypt(&ciphertext, &Secret::new("two").unwrap()).unwrap_err();
        assert!(matches!(err, Error::Integrity(_)));
    }

    #[test]
    fn tampering_is_detected() {
        let secret = Secret::new("s").unwrap();
        let mut ciphertext = encrypt(b"data", &secret, &light()).unwrap();
        let last = ciphertext.len() - 1;
        ciphertext[last] ^= 0x01;
        assert!(matches!(decrypt(&ciphertext, &secret), Err(Error::Integrity(_))));

        let mut header_tampered = encrypt(b"data", &secret, &light()).unwrap();
        header_tampered[20] ^= 0x01;
        assert!(matches!(decrypt(&header_tampered, &secret), Err(Error::Integrity(_))));
    }

    #[test]
    fn truncated_envelope_is_rejected() {
        let secret = Secret::new("s").unwrap();
        assert!(matches!(decrypt(b"ENVI", &secret), Err(Error::Integrity(_))));
    }

    #[test]
    fn empty_secret_is_rejected() {
        assert!(matches!(Secret::new(""), Err(Error::EmptySecret)));
        assert_eq!(Secret::generate().expose().len(), 64);
        assert_eq!(format!("{:?}", Secret::new("hidden").unwrap()), "Secret(..)");
    }
}
