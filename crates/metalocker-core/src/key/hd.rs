//! BIP-32 hierarchical-deterministic keys over secp256k1 (spec.md §4.1).
//!
//! A locker generates one HD root per participant from random seed material;
//! each property the locker carries derives its own non-hardened child key
//! from that root, so compromising one property's key never exposes the
//! root or any sibling property's key.
use crate::errors::{Error, Result};
use bip32::{ChildNumber, DerivationPath, ExtendedPrivateKey, ExtendedPublicKey, Prefix};
use k256::Secp256k1;
use rand_core::{OsRng, RngCore};
use std::str::FromStr;
use zeroize::{Zeroize, ZeroizeOnDrop};

pub const SEED_LEN: usize = 32;

/// An HD root or derived private key. Zeroized on drop.
#[derive(Clone, ZeroizeOnDrop)]
pub struct HdPrivateKey(#[zeroize(skip)] ExtendedPrivateKey<k256::SecretKey>);

/// An HD public key, derivable from a private key without the private
/// material, or received from a counterparty over an untrusted channel.
#[derive(Clone, Debug)]
pub struct HdPublicKey(ExtendedPublicKey<k256::PublicKey>);

impl HdPrivateKey {
    /// Generates a new HD root from fresh random seed bytes.
    pub fn generate() -> Result<Self> {
        let mut seed = [0u8; SEED_LEN];
        OsRng.fill_bytes(&mut seed);
        let key = Self::from_seed(&seed);
        seed.zeroize();
        key
    }

    /// Derives an HD root deterministically from the given seed.
    pub fn from_seed(seed: &[u8]) -> Result<Self> {
        let xprv = ExtendedPrivateKey::<k256::SecretKey>::new(seed)
            .map_err(|e| Error::invalid(format!("invalid BIP-32 seed: {e}")))?;
        Ok(HdPrivateKey(xprv))
    }

    /// Derives a non-hardened child at `index`. Non-hardened derivation lets
    /// a counterparty compute the matching child public key from the parent
    /// public key alone, without ever seeing the parent private key.
    pub fn derive_child(&self, index: u32) -> Result<Self> {
        let child_number = ChildNumber::new(index, false)
            .map_err(|e| Error::invalid(format!("invalid child index {index}: {e}")))?;
        let child = self
            .0
            .derive_child(child_number)
            .map_err(|e| Error::invalid(format!("BIP-32 child derivation failed: {e}")))?;
        Ok(HdPrivateKey(child))
    }

    /// Derives a non-hardened descendant at an arbitrary depth, e.g. `m/0/3`.
    pub fn derive_path(&self, path: &str) -> Result<Self> {
        let path = DerivationPath::from_str(path)
            .map_err(|e| Error::invalid(format!("invalid derivation path {path:?}: {e}")))?;
        let mut key = self.clone();
        for child_number in path.as_ref() {
            key = key.derive_child(child_number.index())?;
        }
        Ok(key)
    }

    pub fn public_key(&self) -> HdPublicKey {
        HdPublicKey(self.0.public_key())
    }

    /// Raw 32-byte secp256k1 scalar, for signing or further key schedules.
    pub fn to_scalar_bytes(&self) -> [u8; 32] {
        let bytes = self.0.private_key().to_bytes();
        let mut out = [0u8; 32];
        out.copy_from_slice(bytes.as_slice());
        out
    }

    pub fn signing_key(&self) -> k256::ecdsa::SigningKey {
        k256::ecdsa::SigningKey::from(self.0.private_key().clone())
    }

    pub fn to_extended_priv_string(&self) -> String {
        self.0.to_string(Prefix::XPRV).to_string()
    }

    /// Parses an `xprv...` string, the form a locker hands a participant
    /// after decrypting [`crate::locker::LockerParticipant`]'s
    /// `root_private_key_enc`.
    pub fn from_extended_priv_string(s: &str) -> Result<Self> {
        let xprv = ExtendedPrivateKey::<k256::SecretKey>::from_str(s)
            .map_err(|e| Error::invalid(format!("invalid xprv string: {e}")))?;
        Ok(HdPrivateKey(xprv))
    }
}

impl HdPublicKey {
    pub fn derive_child(&self, index: u32) -> Result<Self> {
        let child_number = ChildNumber::new(index, false)
            .map_err(|e| Error::invalid(format!("invalid child index {index}: {e}")))?;
        let child = self
            .0
            .derive_child(child_number)
            .map_err(|e| Error::invalid(format!("BIP-32 public child derivation failed: {e}")))?;
        Ok(HdPublicKey(child))
    }

    pub fn verifying_key(&self) -> k256::ecdsa::VerifyingKey {
        k256::ecdsa::VerifyingKey::from(self.0.public_key())
    }

    /// SEC1-compressed routing key, the form used in locker participant
    /// records.
    pub fn to_compressed_bytes(&self) -> Vec<u8> {
        use k256::elliptic_curve::sec1::ToEncodedPoint;
        self.0
            .public_key()
            .as_affine()
            .to_encoded_point(true)
            .as_bytes()
            .to_vec()
    }

    pub fn to_extended_pub_string(&self) -> String {
        self.0.to_string(Prefix::XPUB)
    }

    /// Parses an `xpub...` string, the form a non-self locker participant
    /// publishes.
    pub fn from_extended_pub_string(s: &str) -> Result<Self> {
        let xpub = ExtendedPublicKey::<k256::PublicKey>::from_str(s)
            .map_err(|e| Error::invalid(format!("invalid xpub string: {e}")))?;
        Ok(HdPublicKey(xpub))
    }
}

impl std::fmt::Debug for HdPrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HdPrivateKey").field("public_key", &self.public_key()).finish()
    }
}

#[test]
fn test_from_seed_is_deterministic() {
    let seed = [7u8; SEED_LEN];
    let a = HdPrivateKey::from_seed(&seed).unwrap();
    let b = HdPrivateKey::from_seed(&seed).unwrap();
    assert_eq!(a.to_scalar_bytes(), b.to_scalar_bytes());
}

#[test]
fn test_non_hardened_child_matches_public_derivation() {
    let seed = [3u8; SEED_LEN];
    let root = HdPrivateKey::from_seed(&seed).unwrap();

    let child_priv = root.derive_child(5).unwrap();
    let child_pub_via_priv = child_priv.public_key();

    let root_pub = root.public_key();
    let child_pub_via_pub = root_pub.derive_child(5).unwrap();

    assert_eq!(
        child_pub_via_priv.to_compressed_bytes(),
        child_pub_via_pub.to_compressed_bytes()
    );
}

#[test]
fn test_different_index_different_child() {
    let seed = [9u8; SEED_LEN];
    let root = HdPrivateKey::from_seed(&seed).unwrap();
    let a = root.derive_child(0).unwrap();
    let b = root.derive_child(1).unwrap();
    assert_ne!(a.to_scalar_bytes(), b.to_scalar_bytes());
}

#[test]
fn test_extended_string_roundtrip() {
    let seed = [13u8; SEED_LEN];
    let root = HdPrivateKey::from_seed(&seed).unwrap();
    let s = root.to_extended_priv_string();
    let reloaded = HdPrivateKey::from_extended_priv_string(&s).unwrap();
    assert_eq!(root.to_scalar_bytes(), reloaded.to_scalar_bytes());

    let pub_s = root.public_key().to_extended_pub_string();
    let reloaded_pub = HdPublicKey::from_extended_pub_string(&pub_s).unwrap();
    assert_eq!(
        reloaded_pub.to_compressed_bytes(),
        root.public_key().to_compressed_bytes()
    );
}

#[test]
fn test_derive_path() {
    let seed = [11u8; SEED_LEN];
    let root = HdPrivateKey::from_seed(&seed).unwrap();
    let via_path = root.derive_path("m/0/3").unwrap();
    let via_steps = root.derive_child(0).unwrap().derive_child(3).unwrap();
    assert_eq!(via_path.to_scalar_bytes(), via_steps.to_scalar_bytes());
}
