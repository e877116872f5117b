//! ChaCha20-Poly1305 payload encryption.
//!
//! At-rest framing is `nonce || ciphertext || tag`. The nonce is random per
//! call, so sealing the same plaintext twice under one key never yields the
//! same bytes.

use crate::error::{CryptoError, CryptoResult};
use crate::key::AccessKey;
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};

/// Nonce size in bytes (96 bits).
pub const NONCE_SIZE: usize = 12;

/// Poly1305 authentication tag size in bytes.
pub const TAG_SIZE: usize = 16;

/// A sealed payload together with the nonce needed to open it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedData {
    pub nonce: [u8; NONCE_SIZE],
    /// Ciphertext with the Poly1305 tag appended.
    pub ciphertext: Vec<u8>,
}

impl EncryptedData {
    /// Serializes to the at-rest framing.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(NONCE_SIZE + self.ciphertext.len());
        out.extend_from_slice(&self.nonce);
        out.extend_from_slice(&self.ciphertext);
        out
    }

    /// Parses the at-rest framing.
    ///
    /// Anything too short to hold a nonce and a tag cannot be authentic and
    /// is reported as a decryption failure.
    pub fn from_bytes(bytes: &[u8]) -> CryptoResult<Self> {
        if bytes.len() < NONCE_SIZE + TAG_SIZE {
            return Err(CryptoError::Decryption(format!(
                "payload truncated ({} bytes)",
                bytes.len()
            )));
        }
        let (nonce_bytes, ciphertext) = bytes.split_at(NONCE_SIZE);
        let mut nonce = [0u8; NONCE_SIZE];
        nonce.copy_from_slice(nonce_bytes);
        Ok(Self {
            nonce,
            ciphertext: ciphertext.to_vec(),
        })
    }
}

fn cipher_for(key: &AccessKey) -> ChaCha20Poly1305 {
    ChaCha20Poly1305::new(Key::from_slice(key.as_bytes()))
}

/// Encrypts `plaintext` under `key` with a fresh random nonce.
pub fn encrypt(key: &AccessKey, plaintext: &[u8]) -> CryptoResult<EncryptedData> {
    let mut nonce = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce);

    let ciphertext = cipher_for(key)
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|e| CryptoError::Encryption(e.to_string()))?;

    Ok(EncryptedData { nonce, ciphertext })
}

/// Decrypts and authenticates `data` under `key`.
pub fn decrypt(key: &AccessKey, data: &EncryptedData) -> CryptoResult<Vec<u8>> {
    cipher_for(key)
        .decrypt(Nonce::from_slice(&data.nonce), data.ciphertext.as_ref())
        .map_err(|_| CryptoError::Decryption("wrong key or tampered data".to_string()))
}

/// Encrypts and frames in one step.
pub fn seal(key: &AccessKey, plaintext: &[u8]) -> CryptoResult<Vec<u8>> {
    Ok(encrypt(key, plaintext)?.to_bytes())
}

/// Parses the framing and decrypts in one step.
pub fn open(key: &AccessKey, sealed: &[u8]) -> CryptoResult<Vec<u8>> {
    decrypt(key, &EncryptedData::from_bytes(sealed)?)
}
