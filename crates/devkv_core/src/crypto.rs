//! Encryption at rest for store logs.
//!
//! Each encrypted store derives its own AES-256-GCM key with HKDF-SHA256
//! from the manager secret and a random salt kept in the store metadata.
//! Sealed data is laid out as `nonce (12 bytes) || ciphertext || tag (16 bytes)`.

use crate::error::{KvError, KvResult};
use aes_gcm::{
    aead::{generic_array::GenericArray, Aead, KeyInit, Payload},
    Aes256Gcm, Nonce,
};
use hkdf::Hkdf;
use rand::RngCore;
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Size of the AES-256 key in bytes.
pub const KEY_SIZE: usize = 32;
/// Size of the GCM nonce in bytes.
pub const NONCE_SIZE: usize = 12;
/// Size of the GCM authentication tag in bytes.
pub const TAG_SIZE: usize = 16;
/// Size of the per-store salt in bytes.
pub const SALT_SIZE: usize = 16;

const KEY_INFO: &[u8] = b"devkv-store-key-v1";

/// Store encryption key. Zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct EncryptionKey {
    bytes: [u8; KEY_SIZE],
}

impl EncryptionKey {
    /// Generates a random key.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_SIZE];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self { bytes }
    }

    /// Derives the key of one store from `secret` and the store's `salt`.
    ///
    /// `secret` should already carry high entropy; HKDF does not stretch
    /// weak passwords.
    ///
    /// # Errors
    ///
    /// Fails only if HKDF rejects the output length.
    pub fn derive(secret: &[u8], salt: &[u8]) -> KvResult<Self> {
        let hk = Hkdf::<Sha256>::new(Some(salt), secret);
        let mut bytes = [0u8; KEY_SIZE];
        hk.expand(KEY_INFO, &mut bytes)
            .map_err(|_| KvError::crypto("HKDF expand failed"))?;
        Ok(Self { bytes })
    }

    /// Returns the raw key bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl std::fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Generates a random salt for a new store.
#[must_use]
pub fn random_salt() -> Vec<u8> {
    let mut salt = vec![0u8; SALT_SIZE];
    rand::thread_rng().fill_bytes(&mut salt);
    salt
}

/// Generates a random manager secret.
#[must_use]
pub fn random_secret() -> Vec<u8> {
    let mut secret = vec![0u8; KEY_SIZE];
    rand::thread_rng().fill_bytes(&mut secret);
    secret
}

/// Seals and opens byte strings with AES-256-GCM.
pub struct CryptoManager {
    cipher: Aes256Gcm,
}

impl std::fmt::Debug for CryptoManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CryptoManager").finish_non_exhaustive()
    }
}

impl CryptoManager {
    /// Creates a manager for `key`.
    #[must_use]
    pub fn new(key: &EncryptionKey) -> Self {
        let cipher = Aes256Gcm::new(GenericArray::from_slice(key.as_bytes()));
        Self { cipher }
    }

    /// Encrypts `plaintext`, authenticating `aad` alongside it.
    ///
    /// # Errors
    ///
    /// Returns [`KvError::Crypto`] if the cipher fails.
    pub fn seal(&self, plaintext: &[u8], aad: &[u8]) -> KvResult<Vec<u8>> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(
                nonce,
                Payload {
                    msg: plaintext,
                    aad,
                },
            )
            .map_err(|_| KvError::crypto("encryption failed"))?;

        let mut sealed = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend(ciphertext);
        Ok(sealed)
    }

    /// Decrypts data produced by [`seal`](Self::seal) with the same `aad`.
    ///
    /// # Errors
    ///
    /// Returns [`KvError::Crypto`] on a wrong key, wrong `aad` or tampered data.
    pub fn open(&self, sealed: &[u8], aad: &[u8]) -> KvResult<Vec<u8>> {
        if sealed.len() < NONCE_SIZE + TAG_SIZE {
            return Err(KvError::crypto("ciphertext too short"));
        }
        let (nonce, ciphertext) = sealed.split_at(NONCE_SIZE);
        self.cipher
            .decrypt(
                Nonce::from_slice(nonce),
                Payload {
                    msg: ciphertext,
                    aad,
                },
            )
            .map_err(|_| KvError::crypto("decryption failed: wrong key or tampered data"))
    }
}
