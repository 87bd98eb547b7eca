use crate::{
    errors::{Error, Result},
    formatting,
    key::ed25519,
};

const SEED_LEN: usize = 32;
const ID_PREFIX_LEN: usize = 16;

/// A self-issued decentralized identifier (spec.md §4.3).
///
/// `sign_key` is `None` on a neutered copy: the same DID, able to verify but
/// not sign, safe to hand to a counterparty or embed in a DID document.
/// Dropping it drops the underlying `SigningKey`, which zeroizes its seed.
#[derive(Clone)]
pub struct Did {
    method: String,
    ver_key: ed25519::PublicKey,
    sign_key: Option<ed25519::PrivateKey>,
}

impl Did {
    /// Generates a DID from an optional seed. Seeds shorter than 32 bytes
    /// are left-padded with ASCII `'0'` to reach the Ed25519 seed size;
    /// longer seeds are truncated. An empty seed draws fresh OS randomness
    /// instead of padding to an all-`'0'` seed.
    pub fn generate(method: &str, seed: &[u8]) -> Self {
        let sign_key = if seed.is_empty() {
            ed25519::PrivateKey::generate()
        } else {
            ed25519::PrivateKey::from_seed(&pad_seed(seed))
        };
        let ver_key = sign_key.public_key();
        Did {
            method: method.to_string(),
            ver_key,
            sign_key: Some(sign_key),
        }
    }

    /// Rebuilds a DID from its published parts, with no signing capability.
    pub fn from_ver_key(method: &str, ver_key_base58: &str) -> Result<Self> {
        let raw = formatting::decode_base58(ver_key_base58)
            .map_err(|e| Error::invalid(format!("bad VerKey base58: {e}")))?;
        let ver_key = ed25519::PublicKey::from_bytes(&raw)?;
        Ok(Did {
            method: method.to_string(),
            ver_key,
            sign_key: None,
        })
    }

    /// Rebuilds a full DID (capable of signing) from seed-derived key
    /// material, verifying that `sign_key` indeed derives `ver_key`.
    pub fn from_keys(method: &str, sign_key: ed25519::PrivateKey, ver_key: ed25519::PublicKey) -> Result<Self> {
        if sign_key.public_key() != ver_key {
            return Err(Error::integrity("SignKey does not derive the given VerKey"));
        }
        Ok(Did {
            method: method.to_string(),
            ver_key,
            sign_key: Some(sign_key),
        })
    }

    /// `did:<method>:` + base58 of the first 16 bytes of the verification
    /// key.
    pub fn id(&self) -> String {
        let prefix = &self.ver_key.to_bytes()[..ID_PREFIX_LEN];
        format!("did:{}:{}", self.method, formatting::encode_base58(prefix))
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn ver_key_base58(&self) -> String {
        formatting::encode_base58(&self.ver_key.to_bytes())
    }

    pub fn sign_key_base58(&self) -> Option<String> {
        self.sign_key.as_ref().map(|sk| {
            let mut b = sk.to_bytes().to_vec();
            b.extend_from_slice(&self.ver_key.to_bytes());
            formatting::encode_base58(&b)
        })
    }

    pub fn ver_key(&self) -> &ed25519::PublicKey {
        &self.ver_key
    }

    pub fn can_sign(&self) -> bool {
        self.sign_key.is_some()
    }

    /// Exposes the raw signing key for algorithms that need to pass it to a
    /// generic signer (e.g. [`crate::jsonld::merkle_sign`]), rather than
    /// going through [`Self::sign`]'s fixed message shape.
    pub fn sign_key_for_proof(&self) -> Option<&ed25519::PrivateKey> {
        self.sign_key.as_ref()
    }

    pub fn sign(&self, message: &[u8]) -> Result<[u8; ed25519::SIGNATURE_LEN]> {
        self.sign_key
            .as_ref()
            .map(|sk| sk.sign(message))
            .ok_or_else(|| Error::unauthorised("DID has no signing key (neutered copy)"))
    }

    pub fn verify(&self, message: &[u8], signature: &[u8]) -> Result<()> {
        self.ver_key.verify(message, signature)
    }

    /// Returns a copy with the signing key dropped.
    pub fn neuter(&self) -> Self {
        Did {
            method: self.method.clone(),
            ver_key: self.ver_key,
            sign_key: None,
        }
    }
}

impl std::fmt::Debug for Did {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Did")
            .field("id", &self.id())
            .field("can_sign", &self.can_sign())
            .finish()
    }
}

fn pad_seed(seed: &[u8]) -> [u8; SEED_LEN] {
    let mut out = [b'0'; SEED_LEN];
    if seed.len() >= SEED_LEN {
        out.copy_from_slice(&seed[..SEED_LEN]);
    } else {
        out[SEED_LEN - seed.len()..].copy_from_slice(seed);
    }
    out
}

#[test]
fn test_s1_did_from_seed_steward1() {
    let did = Did::generate("piprate", b"Steward1");
    assert_eq!(did.id(), "did:piprate:Th7MpTaRZVRYnPiabds81Y");
    assert_eq!(
        did.ver_key_base58(),
        "FYmoFw55GeQH7SRFa37dkx1d2dZ3zUF8ckg7wmL7ofN4"
    );
    assert_eq!(
        did.sign_key_base58().unwrap(),
        "xt19s1sp2UZCGhy9rNyb1FtxdKiDGZZPQ1RLsDSvcomTyZh1EFYHaUoo19qKunQEhkTSzGztovCC3QXma1foGRr"
    );
}

#[test]
fn test_neuter_drops_sign_key_but_keeps_id() {
    let did = Did::generate("piprate", b"some seed");
    let neutered = did.neuter();
    assert!(!neutered.can_sign());
    assert_eq!(did.id(), neutered.id());
    assert!(neutered.sign(b"anything").is_err());
}

#[test]
fn test_sign_verify_roundtrip() {
    let did = Did::generate("piprate", b"another seed");
    let sig = did.sign(b"hello").unwrap();
    did.verify(b"hello", &sig).unwrap();
}

#[test]
fn test_from_keys_rejects_mismatched_pair() {
    let a = Did::generate("piprate", b"seed a");
    let b = Did::generate("piprate", b"seed b");
    let sign_key = a.sign_key.clone().unwrap();
    assert!(Did::from_keys("piprate", sign_key, *b.ver_key()).is_err());
}

#[test]
fn test_empty_seed_draws_os_randomness() {
    let a = Did::generate("piprate", b"");
    let b = Did::generate("piprate", b"");
    assert_ne!(a.id(), b.id());
}
