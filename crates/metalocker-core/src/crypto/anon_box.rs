//! Anonymous-sender sealed boxes (spec.md §4.1), the equivalent of
//! libsodium's `crypto_box_seal`/`crypto_box_seal_open`.
//!
//! A locker participant publishes only an Ed25519 verification key. To hand
//! that participant a secret (the locker's root private key, a recovery
//! share), the sender converts the recipient's Ed25519 key to its X25519
//! counterpart and seals against it with an ephemeral, discarded sender key.
//! The recipient needs only their long-term Ed25519 signing key to open it.
use crate::errors::{Error, Result};
use crypto_box::{PublicKey, SecretKey};
use curve25519_dalek::edwards::CompressedEdwardsY;
use ed25519_dalek::{hazmat::ExpandedSecretKey, SigningKey, VerifyingKey};
use rand_core::OsRng;

/// Converts an Ed25519 verification key to its X25519 (Montgomery) form.
pub fn verifying_key_to_x25519(vk: &VerifyingKey) -> Result<PublicKey> {
    let compressed = CompressedEdwardsY(*vk.as_bytes());
    let point = compressed
        .decompress()
        .ok_or_else(|| Error::invalid("verification key is not a valid Edwards point"))?;
    Ok(PublicKey::from(point.to_montgomery().to_bytes()))
}

/// Converts an Ed25519 signing key to its X25519 secret scalar.
pub fn signing_key_to_x25519(sk: &SigningKey) -> SecretKey {
    let expanded = ExpandedSecretKey::from(sk);
    SecretKey::from(expanded.scalar.to_bytes())
}

/// Seals `plaintext` so that only the holder of `recipient`'s signing key can
/// open it. The sender's own key is ephemeral and never reused.
pub fn seal(recipient: &VerifyingKey, plaintext: &[u8]) -> Result<Vec<u8>> {
    let recipient_pk = verifying_key_to_x25519(recipient)?;
    crypto_box::seal(&mut OsRng, &recipient_pk, plaintext)
        .map_err(|e| Error::integrity(format!("anon_box seal failed: {e}")))
}

/// Opens a box produced by [`seal`]. Returns [`Error::Integrity`] on any
/// malformed or tampered input; this never panics on attacker-controlled
/// bytes.
pub fn open(recipient: &SigningKey, sealed: &[u8]) -> Result<Vec<u8>> {
    let recipient_sk = signing_key_to_x25519(recipient);
    let recipient_pk = PublicKey::from(&recipient_sk);
    crypto_box::seal_open(&recipient_sk, &recipient_pk, sealed)
        .map_err(|e| Error::integrity(format!("anon_box open failed: {e}")))
}

#[test]
fn test_seal_open_roundtrip() {
    use rand_core::OsRng as TestRng;
    let signing_key = SigningKey::generate(&mut TestRng);
    let verifying_key = signing_key.verifying_key();

    let plaintext = b"root private key bytes";
    let sealed = seal(&verifying_key, plaintext).unwrap();
    let opened = open(&signing_key, &sealed).unwrap();
    assert_eq!(opened, plaintext);
}

#[test]
fn test_open_rejects_garbage() {
    use rand_core::OsRng as TestRng;
    let signing_key = SigningKey::generate(&mut TestRng);
    assert!(open(&signing_key, b"not a sealed box").is_err());
}

#[test]
fn test_open_rejects_wrong_recipient() {
    use rand_core::OsRng as TestRng;
    let a = SigningKey::generate(&mut TestRng);
    let b = SigningKey::generate(&mut TestRng);

    let sealed = seal(&a.verifying_key(), b"secret").unwrap();
    assert!(open(&b, &sealed).is_err());
}
