//! Content addressing: digital asset IDs and Merkle-ID self-naming
//! (spec.md §4.2).
use crate::{
    errors::{Error, Result},
    formatting, hash,
};

/// Builds a digital asset ID: `"did:<method>:" + base58(Hash(tag, fp))`,
/// where the tag is the very prefix being constructed. Any future asset
/// issued under a different method therefore lives in a disjoint hash
/// domain from assets issued under `"did"`.
pub fn build_digital_asset_id(fingerprint: impl AsRef<[u8]>, method: &str) -> String {
    let prefix = format!("did:{method}:");
    let digest = hash::tagged(&prefix, fingerprint);
    format!("{prefix}{}", formatting::encode_base58(&digest))
}

/// Recomputes an asset ID from `data` using the method embedded in `id`, and
/// compares. The method is the second colon-delimited segment; `id` must
/// split into exactly three parts and the first must be `"did"`.
pub fn verify_digital_asset_id(id: &str, data: impl AsRef<[u8]>) -> Result<bool> {
    let parts: Vec<&str> = id.split(':').collect();
    if parts.len() != 3 || parts[0] != "did" {
        return Err(Error::invalid(format!("not a valid digital asset ID: {id:?}")));
    }
    let method = parts[1];
    let recomputed = build_digital_asset_id(data, method);
    Ok(recomputed == id)
}

/// Extracts the method name from a `did:<method>:...` identifier.
pub fn extract_method(id: &str) -> Result<&str> {
    let parts: Vec<&str> = id.split(':').collect();
    if parts.len() != 3 || parts[0] != "did" {
        return Err(Error::invalid(format!("not a valid DID: {id:?}")));
    }
    Ok(parts[1])
}

/// The sentinel ID a document carries while its Merkle hash is computed;
/// replaced by the computed ID afterward.
pub const MERKLE_ROOT_SENTINEL: &str = "_:merkle_root_2016";

/// Self-names a document by hashing its normalized byte form and prefixing
/// the result. `normalized` must already have `id` set to
/// [`MERKLE_ROOT_SENTINEL`] and (for signed documents) the proof attached,
/// per `SignableDocument.MerkleSetID`.
pub fn merkle_set_id(prefix: &str, normalized: impl AsRef<[u8]>) -> String {
    let digest = hash::sha256(normalized);
    format!("{prefix}{}", formatting::encode_base58(&digest))
}

#[test]
fn test_build_and_verify_digital_asset_id() {
    let id = build_digital_asset_id(b"fingerprint bytes", "piprate");
    assert!(id.starts_with("did:piprate:"));
    assert!(verify_digital_asset_id(&id, b"fingerprint bytes").unwrap());
    assert!(!verify_digital_asset_id(&id, b"different bytes").unwrap());
}

#[test]
fn test_verify_rejects_malformed_id() {
    assert!(verify_digital_asset_id("not-a-did", b"x").is_err());
    assert!(verify_digital_asset_id("did:piprate:extra:segment", b"x").is_err());
    assert!(verify_digital_asset_id("notdid:piprate:abc", b"x").is_err());
}

#[test]
fn test_different_methods_are_disjoint_hash_domains() {
    let a = build_digital_asset_id(b"same fingerprint", "piprate");
    let b = build_digital_asset_id(b"same fingerprint", "other");
    assert_ne!(a, b);
}

#[test]
fn test_extract_method() {
    let id = build_digital_asset_id(b"fp", "piprate");
    assert_eq!(extract_method(&id).unwrap(), "piprate");
}

#[test]
fn test_merkle_set_id_is_deterministic() {
    let a = merkle_set_id("mr:", b"normalized bytes");
    let b = merkle_set_id("mr:", b"normalized bytes");
    assert_eq!(a, b);
    let c = merkle_set_id("mr:", b"different bytes");
    assert_ne!(a, c);
}
