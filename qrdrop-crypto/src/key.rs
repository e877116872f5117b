//! Access keys and file identifiers.

use crate::error::{CryptoError, CryptoResult};
use rand::rngs::OsRng;
use rand::RngCore;
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Access key size in bytes (256 bits).
pub const KEY_SIZE: usize = 32;

/// Length of an access key in its printable hex form.
pub const KEY_HEX_LEN: usize = KEY_SIZE * 2;

/// Longest file id accepted on lookup.
pub const MAX_FILE_ID_LEN: usize = 128;

/// Symmetric key bound to a single stored file.
///
/// Doubles as the ChaCha20-Poly1305 key for that file's payload. The bytes
/// are wiped when the key is dropped.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct AccessKey([u8; KEY_SIZE]);

impl AccessKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }

    /// Lowercase hex, the form carried in tokens and stored in the index.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parses the printable form produced by [`AccessKey::to_hex`].
    ///
    /// Surrounding whitespace is ignored; upper-case hex is accepted.
    pub fn from_hex(s: &str) -> CryptoResult<Self> {
        let s = s.trim();
        if s.len() != KEY_HEX_LEN {
            return Err(CryptoError::InvalidKeyLength {
                expected: KEY_SIZE,
                actual: s.len() / 2,
            });
        }
        let mut bytes = [0u8; KEY_SIZE];
        hex::decode_to_slice(s, &mut bytes)
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        Ok(Self(bytes))
    }

    /// Constant-time equality. Always inspects every byte.
    pub fn ct_eq(&self, other: &AccessKey) -> bool {
        let mut diff = 0u8;
        for (a, b) in self.0.iter().zip(other.0.iter()) {
            diff |= a ^ b;
        }
        diff == 0
    }
}

impl PartialEq for AccessKey {
    fn eq(&self, other: &Self) -> bool {
        self.ct_eq(other)
    }
}

impl Eq for AccessKey {}

impl fmt::Debug for AccessKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessKey(<redacted>)")
    }
}

/// Generates a new random access key from the OS CSPRNG.
pub fn generate_access_key() -> AccessKey {
    let mut bytes = [0u8; KEY_SIZE];
    OsRng.fill_bytes(&mut bytes);
    AccessKey(bytes)
}

/// Generates an opaque file identifier.
///
/// A random UUIDv4 in its 32-character simple form: 122 bits of entropy and
/// no creation-order information.
pub fn generate_file_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Whether `id` is acceptable as a file identifier on lookup.
///
/// Ids name payload files on disk, so anything outside `[A-Za-z0-9_-]` is
/// rejected before it reaches the filesystem.
pub fn is_valid_file_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= MAX_FILE_ID_LEN
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_roundtrip() {
        let key = generate_access_key();
        let hex = key.to_hex();
        assert_eq!(hex.len(), KEY_HEX_LEN);
        assert_eq!(AccessKey::from_hex(&hex).unwrap(), key);
    }

    #[test]
    fn from_hex_accepts_uppercase_and_whitespace() {
        let key = generate_access_key();
        let hex = format!("  {}\n", key.to_hex().to_uppercase());
        assert_eq!(AccessKey::from_hex(&hex).unwrap(), key);
    }

    #[test]
    fn from_hex_rejects_wrong_length() {
        let err = AccessKey::from_hex("abcd").unwrap_err();
        assert!(matches!(err, CryptoError::InvalidKeyLength { .. }));
    }

    #[test]
    fn from_hex_rejects_non_hex() {
        let bad = "z".repeat(KEY_HEX_LEN);
        assert!(matches!(
            AccessKey::from_hex(&bad),
            Err(CryptoError::InvalidKey(_))
        ));
    }

    #[test]
    fn debug_is_redacted() {
        let key = generate_access_key();
        let shown = format!("{key:?}");
        assert!(!shown.contains(&key.to_hex()));
        assert!(shown.contains("redacted"));
    }

    #[test]
    fn ct_eq_detects_single_byte_difference() {
        let a = AccessKey::from_bytes([7u8; KEY_SIZE]);
        let mut other = [7u8; KEY_SIZE];
        other[KEY_SIZE - 1] = 8;
        let b = AccessKey::from_bytes(other);
        assert!(a.ct_eq(&a.clone()));
        assert!(!a.ct_eq(&b));
    }

    #[test]
    fn file_id_shape() {
        let id = generate_file_id();
        assert_eq!(id.len(), 32);
        assert!(is_valid_file_id(&id));
    }

    #[test]
    fn file_id_validation() {
        assert!(is_valid_file_id("file_1712345678901_k3j9x2abc"));
        assert!(is_valid_file_id("a-b_C9"));
        assert!(!is_valid_file_id(""));
        assert!(!is_valid_file_id("../etc/passwd"));
        assert!(!is_valid_file_id("a/b"));
        assert!(!is_valid_file_id("bad id"));
        assert!(!is_valid_file_id(&"x".repeat(MAX_FILE_ID_LEN + 1)));
    }
}
