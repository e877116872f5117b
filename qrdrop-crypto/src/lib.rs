//! Encryption layer for QRDrop.
//!
//! Provides the two primitives the exchange protocol is built on:
//! - Random access keys and opaque file identifiers
//! - ChaCha20-Poly1305 authenticated encryption of file payloads
//!
//! # Architecture
//!
//! Every stored file gets its own freshly generated 256-bit access key.
//! The key is handed to the uploader exactly once (inside the exchange
//! token) and is the only thing needed to read or delete the file.
//!
//! Ciphertext is self-describing: the random nonce is prepended to the
//! sealed payload, so the key is the only out-of-band input to decryption.
//! A wrong key, a flipped bit or a truncated payload all fail the Poly1305
//! tag check and surface as [`CryptoError::Decryption`].

mod cipher;
mod error;
mod key;

pub use cipher::{decrypt, encrypt, open, seal, EncryptedData, NONCE_SIZE, TAG_SIZE};
pub use error::{CryptoError, CryptoResult};
pub use key::{
    generate_access_key, generate_file_id, is_valid_file_id, AccessKey, KEY_HEX_LEN, KEY_SIZE,
    MAX_FILE_ID_LEN,
};
