//! AES-256-GCM envelope encryption (spec.md §4.1).
//!
//! Ciphertexts produced by [`AesKey::seal`] are `nonce || aes_gcm_ciphertext`,
//! where the nonce is 12 random bytes generated fresh per call. Reusing a
//! nonce with the same key breaks confidentiality of both messages, so there
//! is no variant of `seal` that accepts a caller-supplied nonce.
use crate::errors::{Error, Result};
use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Key, Nonce,
};
use rand_core::{OsRng, RngCore};
use zeroize::{Zeroize, ZeroizeOnDrop};

pub const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;

/// A raw 256-bit AES key. Zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct AesKey([u8; KEY_LEN]);

impl AesKey {
    /// Generates a fresh random key.
    pub fn generate() -> Self {
        let mut b = [0u8; KEY_LEN];
        OsRng.fill_bytes(&mut b);
        AesKey(b)
    }

    /// Derives a key deterministically from secret material, via the tagged
    /// hash. Used to turn a password or a shared secret into an AES key
    /// without storing the key itself.
    pub fn derive(tag: &str, secret: impl AsRef<[u8]>) -> Self {
        AesKey(crate::hash::tagged(tag, secret))
    }

    pub fn from_bytes(raw: &[u8]) -> Result<Self> {
        if raw.len() != KEY_LEN {
            return Err(Error::invalid(format!(
                "AES key must be {KEY_LEN} bytes, got {}",
                raw.len()
            )));
        }
        let mut b = [0u8; KEY_LEN];
        b.copy_from_slice(raw);
        Ok(AesKey(b))
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }

    /// Encrypts `plaintext`, authenticating `aad` alongside it. Returns
    /// `nonce || ciphertext`.
    pub fn seal(&self, plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.0));
        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ct = cipher
            .encrypt(
                nonce,
                aes_gcm::aead::Payload {
                    msg: plaintext,
                    aad,
                },
            )
            .map_err(|e| Error::integrity(format!("AES-GCM encryption failed: {e}")))?;

        let mut out = Vec::with_capacity(NONCE_LEN + ct.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&ct);
        Ok(out)
    }

    /// Decrypts a blob produced by [`AesKey::seal`], verifying `aad`.
    pub fn open(&self, sealed: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
        if sealed.len() < NONCE_LEN {
            return Err(Error::invalid("ciphertext shorter than nonce"));
        }
        let (nonce_bytes, ct) = sealed.split_at(NONCE_LEN);
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.0));
        let nonce = Nonce::from_slice(nonce_bytes);

        cipher
            .decrypt(nonce, aes_gcm::aead::Payload { msg: ct, aad })
            .map_err(|_| Error::integrity("AES-GCM decryption failed: wrong key or tampered ciphertext"))
    }
}

#[test]
fn test_seal_open_roundtrip() {
    let key = AesKey::generate();
    let plaintext = b"the quick brown fox";
    let sealed = key.seal(plaintext, b"context").unwrap();
    let opened = key.open(&sealed, b"context").unwrap();
    assert_eq!(opened, plaintext);
}

#[test]
fn test_open_rejects_wrong_aad() {
    let key = AesKey::generate();
    let sealed = key.seal(b"payload", b"aad-a").unwrap();
    assert!(key.open(&sealed, b"aad-b").is_err());
}

#[test]
fn test_open_rejects_wrong_key() {
    let key_a = AesKey::generate();
    let key_b = AesKey::generate();
    let sealed = key_a.seal(b"payload", b"").unwrap();
    assert!(key_b.open(&sealed, b"").is_err());
}

#[test]
fn test_derive_is_deterministic() {
    let a = AesKey::derive("tag", b"secret");
    let b = AesKey::derive("tag", b"secret");
    assert_eq!(a.as_bytes(), b.as_bytes());
}

#[test]
fn test_seal_nonce_is_fresh_each_call() {
    let key = AesKey::generate();
    let a = key.seal(b"same plaintext", b"").unwrap();
    let b = key.seal(b"same plaintext", b"").unwrap();
    assert_ne!(a, b);
}
