//! Token encryption at rest.
//!
//! A `TokenVault` derives a ChaCha20-Poly1305 key from a passphrase with
//! Argon2id. Each sealed token is `hex(nonce || ciphertext)`.

use argon2::Argon2;
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use rand::RngCore;
use thiserror::Error;

/// Salt length in bytes. Argon2 requires at least 8.
pub const SALT_LEN: usize = 16;

const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;

#[derive(Error, Debug)]
pub enum VaultError {
    #[error("Key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("Salt must be 16 bytes, got {0}")]
    InvalidSalt(usize),

    #[error("Encryption failed")]
    Encrypt,

    #[error("Decryption failed - wrong passphrase or corrupted token")]
    Decrypt,

    #[error("Sealed token is malformed: {0}")]
    Malformed(String),
}

#[derive(Clone)]
pub struct TokenVault {
    cipher: ChaCha20Poly1305,
    salt: [u8; SALT_LEN],
}

impl TokenVault {
    /// Derive a vault from `passphrase` and an existing salt.
    pub fn derive(passphrase: &str, salt: &[u8]) -> Result<Self, VaultError> {
        let salt: [u8; SALT_LEN] = salt
            .try_into()
            .map_err(|_| VaultError::InvalidSalt(salt.len()))?;

        let mut key = [0u8; KEY_LEN];
        Argon2::default()
            .hash_password_into(passphrase.as_bytes(), &salt, &mut key)
            .map_err(|e| VaultError::KeyDerivation(e.to_string()))?;

        Ok(Self {
            cipher: ChaCha20Poly1305::new(Key::from_slice(&key)),
            salt,
        })
    }

    /// Derive a vault with a freshly generated random salt.
    pub fn generate(passphrase: &str) -> Result<Self, VaultError> {
        let mut salt = [0u8; SALT_LEN];
        rand::thread_rng().fill_bytes(&mut salt);
        Self::derive(passphrase, &salt)
    }

    pub fn salt(&self) -> &[u8] {
        &self.salt
    }

    pub fn seal(&self, token: &str) -> Result<String, VaultError> {
        let mut nonce = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce);

        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce), token.as_bytes())
            .map_err(|_| VaultError::Encrypt)?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&ciphertext);
        Ok(hex::encode(sealed))
    }

    pub fn open(&self, sealed: &str) -> Result<String, VaultError> {
        let bytes = hex::decode(sealed).map_err(|e| VaultError::Malformed(e.to_string()))?;
        if bytes.len() <= NONCE_LEN {
            return Err(VaultError::Malformed(format!(
                "expected more than {} bytes, got {}",
                NONCE_LEN,
                bytes.len()
            )));
        }

        let (nonce, ciphertext) = bytes.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| VaultError::Decrypt)?;

        String::from_utf8(plaintext).map_err(|e| VaultError::Malformed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seal_and_open() {
        let vault = TokenVault::generate("correct horse").unwrap();
        let sealed = vault.seal("vk1.a.token").unwrap();
        assert_ne!(sealed, "vk1.a.token");
        assert_eq!(vault.open(&sealed).unwrap(), "vk1.a.token");
    }

    #[test]
    fn test_same_salt_derives_same_key() {
        let first = TokenVault::generate("passphrase").unwrap();
        let second = TokenVault::derive("passphrase", first.salt()).unwrap();
        let sealed = first.seal("abc").unwrap();
        assert_eq!(second.open(&sealed).unwrap(), "abc");
    }

    #[test]
    fn test_wrong_passphrase_fails() {
        let vault = TokenVault::generate("right").unwrap();
        let other = TokenVault::derive("wrong", vault.salt()).unwrap();
        let sealed = vault.seal("abc").unwrap();
        assert!(matches!(other.open(&sealed), Err(VaultError::Decrypt)));
    }

    #[test]
    fn test_malformed_input() {
        let vault = TokenVault::generate("p").unwrap();
        assert!(matches!(vault.open("zz"), Err(VaultError::Malformed(_))));
        assert!(matches!(vault.open("00ff"), Err(VaultError::Malformed(_))));
        assert!(matches!(
            TokenVault::derive("p", &[1, 2, 3]),
            Err(VaultError::InvalidSalt(3))
        ));
    }
}
