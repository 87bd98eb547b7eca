//! DER-encoded ECDSA signatures, the form sealed ledger records carry
//! (spec.md §4.5).
use crate::errors::{Error, Result};
use k256::ecdsa::Signature as K256Signature;

#[derive(Clone, PartialEq, Eq)]
pub struct Sig(pub(crate) Vec<u8>);

impl Sig {
    pub fn from_der_bytes(b: &[u8]) -> Self {
        Sig(b.to_vec())
    }

    pub fn to_der_bytes(&self) -> &[u8] {
        &self.0
    }

    pub(crate) fn to_k256(&self) -> Result<K256Signature> {
        K256Signature::from_der(&self.0)
            .map_err(|e| Error::invalid(format!("malformed DER ECDSA signature: {e}")))
    }
}

impl std::fmt::Debug for Sig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("secp256k1::signature::Sig").field(&hex::encode(&self.0)).finish()
    }
}

#[test]
fn test_der_roundtrip() {
    let key = super::private_key::Key::generate();
    let digest = crate::hash::tagged("sig test", b"message bytes");
    let sig = key.sign_digest(&digest).unwrap();
    let reloaded = Sig::from_der_bytes(sig.to_der_bytes());
    key.public_key().verify_digest(&digest, &reloaded).unwrap();
}

#[test]
fn test_from_der_bytes_rejects_garbage() {
    let sig = Sig::from_der_bytes(b"not a DER signature");
    assert!(sig.to_k256().is_err());
}
