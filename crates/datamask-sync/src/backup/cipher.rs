//! AES-256-GCM envelope for backup files.
//!
//! Layout: `DMBK` magic (4) | version (1) | nonce (12) | ciphertext | tag (16).
//! The magic and version are bound to the ciphertext as associated data.

use std::fmt;

use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM, NONCE_LEN};
use ring::rand::{SecureRandom, SystemRandom};
use secrecy::{ExposeSecret, SecretBox, SecretString};

use crate::error::{Result, SyncError};

/// File magic.
pub const MAGIC: &[u8; 4] = b"DMBK";

/// Current envelope version.
pub const VERSION: u8 = 1;

const HEADER_LEN: usize = MAGIC.len() + 1;
const TAG_LEN: usize = 16;
const KEY_LEN: usize = 32;

/// Encrypts and decrypts backup scripts with one key.
pub struct BackupCipher {
    key: LessSafeKey,
    rng: SystemRandom,
}

impl fmt::Debug for BackupCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackupCipher")
            .field("algorithm", &"AES-256-GCM")
            .finish()
    }
}

impl BackupCipher {
    /// Build from a hex-encoded 32-byte key.
    ///
    /// A malformed key is a configuration error.
    pub fn from_hex(secret: &SecretString) -> Result<Self> {
        let bytes = SecretBox::new(Box::new(
            hex::decode(secret.expose_secret().trim())
                .map_err(|e| SyncError::Config(format!("backup key is not valid hex: {}", e)))?,
        ));
        if bytes.expose_secret().len() != KEY_LEN {
            return Err(SyncError::Config(format!(
                "backup key must be {} bytes ({} hex characters), got {} bytes",
                KEY_LEN,
                KEY_LEN * 2,
                bytes.expose_secret().len()
            )));
        }
        let unbound = UnboundKey::new(&AES_256_GCM, bytes.expose_secret())
            .map_err(|_| SyncError::Config("backup key rejected by cipher".into()))?;
        Ok(Self {
            key: LessSafeKey::new(unbound),
            rng: SystemRandom::new(),
        })
    }

    /// Encrypt a plaintext into the envelope format.
    pub fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        self.rng
            .fill(&mut nonce_bytes)
            .map_err(|_| SyncError::Config("system random source unavailable".into()))?;

        let mut output = Vec::with_capacity(HEADER_LEN + NONCE_LEN + plaintext.len() + TAG_LEN);
        output.extend_from_slice(MAGIC);
        output.push(VERSION);
        output.extend_from_slice(&nonce_bytes);
        output.extend_from_slice(plaintext);

        let (header, body) = output.split_at_mut(HEADER_LEN + NONCE_LEN);
        let tag = self
            .key
            .seal_in_place_separate_tag(
                Nonce::assume_unique_for_key(nonce_bytes),
                Aad::from(&header[..HEADER_LEN]),
                body,
            )
            .map_err(|_| SyncError::Config("backup encryption failed".into()))?;
        output.extend_from_slice(tag.as_ref());
        Ok(output)
    }

    /// Decrypt an envelope.
    ///
    /// Bad magic, unknown version, truncation, tampering and a wrong key all
    /// fail with [`SyncError::Decryption`].
    pub fn open(&self, data: &[u8]) -> Result<Vec<u8>> {
        if data.len() < HEADER_LEN + NONCE_LEN + TAG_LEN {
            return Err(SyncError::Decryption("file is truncated".into()));
        }
        if &data[..MAGIC.len()] != MAGIC {
            return Err(SyncError::Decryption("not a datamask backup file".into()));
        }
        let version = data[MAGIC.len()];
        if version != VERSION {
            return Err(SyncError::Decryption(format!(
                "unsupported backup version {}",
                version
            )));
        }

        let mut nonce_bytes = [0u8; NONCE_LEN];
        nonce_bytes.copy_from_slice(&data[HEADER_LEN..HEADER_LEN + NONCE_LEN]);
        let mut buffer = data[HEADER_LEN + NONCE_LEN..].to_vec();

        let plaintext = self
            .key
            .open_in_place(
                Nonce::assume_unique_for_key(nonce_bytes),
                Aad::from(&data[..HEADER_LEN]),
                &mut buffer,
            )
            .map_err(|_| {
                SyncError::Decryption("authentication failed (wrong key or corrupted file)".into())
            })?;
        Ok(plaintext.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY_A: &str = "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f";
    const KEY_B: &str = "ff0102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f";

    fn cipher(hex_key: &str) -> BackupCipher {
        BackupCipher::from_hex(&SecretString::from(hex_key.to_string())).unwrap()
    }

    #[test]
    fn test_seal_open() {
        let c = cipher(KEY_A);
        let sealed = c.seal(b"BEGIN;\nCOMMIT;\n").unwrap();
        assert_eq!(&sealed[..4], MAGIC);
        assert_eq!(sealed[4], VERSION);
        assert_eq!(c.open(&sealed).unwrap(), b"BEGIN;\nCOMMIT;\n");
    }

    #[test]
    fn test_nonce_is_random() {
        let c = cipher(KEY_A);
        assert_ne!(c.seal(b"x").unwrap(), c.seal(b"x").unwrap());
    }

    #[test]
    fn test_wrong_key() {
        let sealed = cipher(KEY_A).seal(b"secret").unwrap();
        let err = cipher(KEY_B).open(&sealed).unwrap_err();
        assert!(matches!(err, SyncError::Decryption(_)));
    }

    #[test]
    fn test_tampered_and_truncated() {
        let c = cipher(KEY_A);
        let mut sealed = c.seal(b"secret data").unwrap();
        assert!(matches!(
            c.open(&sealed[..10]).unwrap_err(),
            SyncError::Decryption(_)
        ));
        let last = sealed.len() - 1;
        sealed[last] ^= 0x01;
        assert!(matches!(c.open(&sealed).unwrap_err(), SyncError::Decryption(_)));
    }

    #[test]
    fn test_bad_header() {
        let c = cipher(KEY_A);
        let mut sealed = c.seal(b"secret").unwrap();
        sealed[4] = 9;
        let err = c.open(&sealed).unwrap_err();
        assert!(err.to_string().contains("unsupported backup version"));
        sealed[0] = b'X';
        assert!(c.open(&sealed).unwrap_err().to_string().contains("not a datamask"));
    }

    #[test]
    fn test_invalid_keys_are_config_errors() {
        for bad in ["zz", "0011", ""] {
            let err = BackupCipher::from_hex(&SecretString::from(bad.to_string())).unwrap_err();
            assert!(matches!(err, SyncError::Config(_)), "key {:?}", bad);
        }
    }
}
