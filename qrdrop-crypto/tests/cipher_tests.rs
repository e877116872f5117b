use proptest::prelude::*;
use qrdrop_crypto::{
    decrypt, encrypt, generate_access_key, generate_file_id, open, seal, AccessKey, CryptoError,
    EncryptedData, NONCE_SIZE, TAG_SIZE,
};
use std::collections::HashSet;

#[test]
fn seal_open_roundtrip() {
    let key = generate_access_key();
    let sealed = seal(&key, b"helloworld").unwrap();
    assert_eq!(sealed.len(), NONCE_SIZE + 10 + TAG_SIZE);
    assert_eq!(open(&key, &sealed).unwrap(), b"helloworld");
}

#[test]
fn empty_payload_roundtrip() {
    let key = generate_access_key();
    let sealed = seal(&key, b"").unwrap();
    assert_eq!(sealed.len(), NONCE_SIZE + TAG_SIZE);
    assert!(open(&key, &sealed).unwrap().is_empty());
}

#[test]
fn same_plaintext_encrypts_differently() {
    let key = generate_access_key();
    let a = encrypt(&key, b"identical").unwrap();
    let b = encrypt(&key, b"identical").unwrap();
    assert_ne!(a.nonce, b.nonce);
    assert_ne!(a.ciphertext, b.ciphertext);
}

#[test]
fn wrong_key_fails_to_decrypt() {
    let k1 = generate_access_key();
    let k2 = generate_access_key();
    let sealed = seal(&k1, b"secret payload").unwrap();
    assert!(matches!(open(&k2, &sealed), Err(CryptoError::Decryption(_))));
}

#[test]
fn tampered_ciphertext_fails() {
    let key = generate_access_key();
    let mut data = encrypt(&key, b"secret payload").unwrap();
    if let Some(byte) = data.ciphertext.first_mut() {
        *byte ^= 0xFF;
    }
    assert!(matches!(decrypt(&key, &data), Err(CryptoError::Decryption(_))));
}

#[test]
fn tampered_nonce_fails() {
    let key = generate_access_key();
    let mut sealed = seal(&key, b"secret payload").unwrap();
    sealed[0] ^= 0x01;
    assert!(open(&key, &sealed).is_err());
}

#[test]
fn truncated_payload_fails() {
    let key = generate_access_key();
    let sealed = seal(&key, b"secret payload").unwrap();

    // Dropping the tail corrupts the tag.
    assert!(open(&key, &sealed[..sealed.len() - 1]).is_err());
    // Shorter than nonce + tag cannot even be framed.
    assert!(matches!(
        EncryptedData::from_bytes(&sealed[..NONCE_SIZE + TAG_SIZE - 1]),
        Err(CryptoError::Decryption(_))
    ));
    assert!(open(&key, &[]).is_err());
}

#[test]
fn encrypted_data_serde_roundtrip() {
    let key = generate_access_key();
    let data = encrypt(&key, b"json framed").unwrap();
    let json = serde_json::to_string(&data).unwrap();
    let back: EncryptedData = serde_json::from_str(&json).unwrap();
    assert_eq!(decrypt(&key, &back).unwrap(), b"json framed");
}

#[test]
fn key_from_hex_decrypts() {
    let key = generate_access_key();
    let sealed = seal(&key, b"via hex").unwrap();
    let parsed = AccessKey::from_hex(&key.to_hex()).unwrap();
    assert_eq!(open(&parsed, &sealed).unwrap(), b"via hex");
}

#[test]
fn ten_thousand_ids_are_distinct() {
    let ids: HashSet<String> = (0..10_000).map(|_| generate_file_id()).collect();
    assert_eq!(ids.len(), 10_000);
}

#[test]
fn ids_are_distinct_across_threads() {
    let handles: Vec<_> = (0..8)
        .map(|_| std::thread::spawn(|| (0..1_000).map(|_| generate_file_id()).collect::<Vec<_>>()))
        .collect();
    let mut all = HashSet::new();
    for h in handles {
        for id in h.join().unwrap() {
            assert!(all.insert(id));
        }
    }
    assert_eq!(all.len(), 8_000);
}

#[test]
fn generated_keys_differ() {
    let keys: HashSet<String> = (0..1_000).map(|_| generate_access_key().to_hex()).collect();
    assert_eq!(keys.len(), 1_000);
}

proptest! {
    #[test]
    fn roundtrip_any_payload(payload in proptest::collection::vec(any::<u8>(), 0..4096)) {
        let key = generate_access_key();
        let sealed = seal(&key, &payload).unwrap();
        prop_assert_eq!(open(&key, &sealed).unwrap(), payload);
    }

    #[test]
    fn other_key_never_opens(payload in proptest::collection::vec(any::<u8>(), 0..512)) {
        let k1 = generate_access_key();
        let k2 = generate_access_key();
        let sealed = seal(&k1, &payload).unwrap();
        prop_assert!(open(&k2, &sealed).is_err());
    }
}
