//! secp256k1 public keys, used as routing keys in sealed ledger records.
use crate::{
    errors::{Error, Result},
    key::secp256k1::signature::Sig,
};
use k256::{
    ecdsa::{signature::hazmat::PrehashVerifier, VerifyingKey},
    elliptic_curve::sec1::ToEncodedPoint,
    PublicKey as K256PublicKey,
};

#[derive(Clone, PartialEq, Eq)]
pub struct Key(K256PublicKey);

impl Key {
    /// SEC1-compressed encoding, the form stored in a record's routing key
    /// field.
    pub fn to_compressed_bytes(&self) -> Vec<u8> {
        self.0.as_affine().to_encoded_point(true).as_bytes().to_vec()
    }

    pub fn from_bytes(raw: &[u8]) -> Result<Self> {
        let pk = K256PublicKey::from_sec1_bytes(raw)
            .map_err(|e| Error::invalid(format!("invalid secp256k1 public key: {e}")))?;
        Ok(Key(pk))
    }

    /// Verifies a DER-encoded ECDSA signature over a 32-byte prehashed
    /// digest.
    pub fn verify_digest(&self, digest: &[u8], sig: &Sig) -> Result<()> {
        let verifying_key = VerifyingKey::from(&self.0);
        let signature = sig.to_k256()?;
        verifying_key
            .verify_prehash(digest, &signature)
            .map_err(|_| Error::integrity("ECDSA signature verification failed"))
    }
}

impl From<K256PublicKey> for Key {
    fn from(pk: K256PublicKey) -> Self {
        Key(pk)
    }
}

impl std::fmt::Debug for Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("secp256k1::public_key::Key")
            .field(&hex::encode(self.to_compressed_bytes()))
            .finish()
    }
}

#[test]
fn test_roundtrip_compressed_bytes() {
    let sk = super::private_key::Key::generate();
    let pk = sk.public_key();
    let bytes = pk.to_compressed_bytes();
    assert_eq!(bytes.len(), 33);
    let reloaded = Key::from_bytes(&bytes).unwrap();
    assert_eq!(reloaded, pk);
}
