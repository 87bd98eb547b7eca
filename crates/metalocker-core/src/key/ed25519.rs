//! Ed25519 identity keys (spec.md §4.3): DID signing/verification keys and
//! storage-access token keys.
use crate::errors::{Error, Result};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand_core::OsRng;

pub const PRIVATE_KEY_LEN: usize = 32;
pub const PUBLIC_KEY_LEN: usize = 32;
pub const SIGNATURE_LEN: usize = 64;

/// An Ed25519 private key. `SigningKey` already zeroizes its seed on drop
/// (the `zeroize` feature of `ed25519-dalek`).
#[derive(Clone)]
pub struct PrivateKey(SigningKey);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PublicKey(VerifyingKey);

impl PrivateKey {
    pub fn generate() -> Self {
        PrivateKey(SigningKey::generate(&mut OsRng))
    }

    /// Builds a signing key from a 32-byte seed, as used when deriving a
    /// DID's `SignKey` from locker or account seed material.
    pub fn from_seed(seed: &[u8; PRIVATE_KEY_LEN]) -> Self {
        PrivateKey(SigningKey::from_bytes(seed))
    }

    pub fn from_bytes(raw: &[u8]) -> Result<Self> {
        let seed: [u8; PRIVATE_KEY_LEN] = raw
            .try_into()
            .map_err(|_| Error::invalid(format!("Ed25519 private key must be {PRIVATE_KEY_LEN} bytes")))?;
        Ok(Self::from_seed(&seed))
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey(self.0.verifying_key())
    }

    pub fn sign(&self, message: &[u8]) -> [u8; SIGNATURE_LEN] {
        self.0.sign(message).to_bytes()
    }

    pub fn to_bytes(&self) -> [u8; PRIVATE_KEY_LEN] {
        self.0.to_bytes()
    }

    pub(crate) fn inner(&self) -> &SigningKey {
        &self.0
    }
}

impl PublicKey {
    pub fn from_bytes(raw: &[u8]) -> Result<Self> {
        let arr: [u8; PUBLIC_KEY_LEN] = raw
            .try_into()
            .map_err(|_| Error::invalid(format!("Ed25519 public key must be {PUBLIC_KEY_LEN} bytes")))?;
        let vk = VerifyingKey::from_bytes(&arr)
            .map_err(|e| Error::invalid(format!("invalid Ed25519 public key: {e}")))?;
        Ok(PublicKey(vk))
    }

    pub fn verify(&self, message: &[u8], signature: &[u8]) -> Result<()> {
        let sig_bytes: [u8; SIGNATURE_LEN] = signature
            .try_into()
            .map_err(|_| Error::invalid(format!("Ed25519 signature must be {SIGNATURE_LEN} bytes")))?;
        let sig = Signature::from_bytes(&sig_bytes);
        self.0
            .verify(message, &sig)
            .map_err(|_| Error::integrity("Ed25519 signature verification failed"))
    }

    pub fn to_bytes(&self) -> [u8; PUBLIC_KEY_LEN] {
        self.0.to_bytes()
    }

    pub(crate) fn inner(&self) -> &VerifyingKey {
        &self.0
    }
}

impl std::fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ed25519::PrivateKey").field("public_key", &self.public_key()).finish()
    }
}

#[test]
fn test_sign_verify_roundtrip() {
    let sk = PrivateKey::generate();
    let pk = sk.public_key();
    let sig = sk.sign(b"hello locker");
    pk.verify(b"hello locker", &sig).unwrap();
}

#[test]
fn test_verify_rejects_tampered_message() {
    let sk = PrivateKey::generate();
    let pk = sk.public_key();
    let sig = sk.sign(b"hello locker");
    assert!(pk.verify(b"goodbye locker", &sig).is_err());
}

#[test]
fn test_from_seed_is_deterministic() {
    let seed = [42u8; PRIVATE_KEY_LEN];
    let a = PrivateKey::from_seed(&seed);
    let b = PrivateKey::from_seed(&seed);
    assert_eq!(a.to_bytes(), b.to_bytes());
    assert_eq!(a.public_key(), b.public_key());
}
