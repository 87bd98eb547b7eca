//! secp256k1 private keys used to sign sealed ledger records.
use crate::{
    errors::{Error, Result},
    key::secp256k1::{public_key::Key as PublicKey, signature::Sig},
};
use k256::{ecdsa::SigningKey, SecretKey};
use rand_core::OsRng;
use zeroize::ZeroizeOnDrop;

/// The size (in bytes) of a secp256k1 scalar.
pub const LEN: usize = 32;

/// Wraps `k256::SecretKey`, which already zeroizes on drop.
#[derive(Clone, ZeroizeOnDrop)]
pub struct Key(#[zeroize(skip)] SecretKey, #[zeroize(skip)] SigningKey);

impl Key {
    /// Generates a private key from random bytes.
    pub fn generate() -> Self {
        let sk = SecretKey::random(&mut OsRng);
        let signing_key = SigningKey::from(sk.clone());
        Key(sk, signing_key)
    }

    /// Loads the private key from the raw scalar bytes.
    pub fn from_bytes(raw: &[u8]) -> Result<Self> {
        if raw.len() != LEN {
            return Err(Error::invalid(format!(
                "secp256k1 private key must be {LEN} bytes, got {}",
                raw.len()
            )));
        }
        let sk = SecretKey::from_slice(raw)
            .map_err(|e| Error::invalid(format!("invalid secp256k1 scalar: {e}")))?;
        let signing_key = SigningKey::from(sk.clone());
        Ok(Key(sk, signing_key))
    }

    pub fn to_bytes(&self) -> [u8; LEN] {
        let b = self.0.to_bytes();
        let mut bb = [0u8; LEN];
        bb.copy_from_slice(&b);
        bb
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey::from(self.0.public_key())
    }

    /// Signs `digest` (expected to already be a 32-byte hash of the record
    /// bytes) and returns a DER-encoded ECDSA signature.
    pub fn sign_digest(&self, digest: &[u8]) -> Result<Sig> {
        use k256::ecdsa::{signature::hazmat::PrehashSigner, Signature};
        if digest.len() != 32 {
            return Err(Error::invalid(format!(
                "sign_digest takes a 32-byte prehash, got {}-byte",
                digest.len()
            )));
        }
        let sig: Signature = self
            .1
            .sign_prehash(digest)
            .map_err(|e| Error::integrity(format!("ECDSA signing failed: {e}")))?;
        Ok(Sig(sig.to_der().as_bytes().to_vec()))
    }
}

impl std::fmt::Debug for Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("secp256k1::Key").field("public_key", &self.public_key()).finish()
    }
}

#[test]
fn test_sign_verify_roundtrip() {
    let key = Key::generate();
    let digest = crate::hash::tagged("record", b"some record bytes");
    let sig = key.sign_digest(&digest).unwrap();
    key.public_key().verify_digest(&digest, &sig).unwrap();
}

#[test]
fn test_from_bytes_rejects_wrong_length() {
    assert!(Key::from_bytes(&[0u8; 16]).is_err());
}
