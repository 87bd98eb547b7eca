//! Hashing utilities.
//!
//! All domain hashing in this crate goes through [`tagged`], which segregates
//! hash domains by tag (spec.md §4.1) instead of hashing raw concatenations.
use hmac::{Hmac, Mac};
use sha2::Sha512_256;

#[cfg(not(windows))]
use ring::digest::{digest, SHA256};

#[cfg(not(windows))]
pub const SHA256_OUTPUT_LEN: usize = ring::digest::SHA256_OUTPUT_LEN;

#[cfg(windows)]
pub const SHA256_OUTPUT_LEN: usize = 32;

pub const TAGGED_OUTPUT_LEN: usize = 32;

/// Returns the SHA256 digest of the given data.
#[cfg(not(windows))]
pub fn sha256(d: impl AsRef<[u8]>) -> Vec<u8> {
    digest(&SHA256, d.as_ref()).as_ref().into()
}

#[cfg(windows)]
pub fn sha256(d: impl AsRef<[u8]>) -> Vec<u8> {
    use sha2::{Digest, Sha256};
    Sha256::digest(d.as_ref()).to_vec()
}

/// Tagged hash: `HMAC-SHA512/256(key = tag, msg = data)`, the native 32-byte
/// output. Every hash use in this crate is tagged so that, e.g., a "shared
/// secret" digest and a "commitment" digest over the same bytes never
/// collide (spec.md §4.1). Tag constants live next to their call sites
/// (e.g. `locker::SHARED_SECRET_TAG`, `account::PASSWORD_HASH_TAG`).
pub fn tagged(tag: &str, data: impl AsRef<[u8]>) -> [u8; TAGGED_OUTPUT_LEN] {
    // HMAC accepts keys of any length; no pre-hashing of the tag is needed.
    let mut mac = Hmac::<Sha512_256>::new_from_slice(tag.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(data.as_ref());
    let out = mac.finalize().into_bytes();
    let mut b = [0u8; TAGGED_OUTPUT_LEN];
    b.copy_from_slice(&out);
    b
}

/// RUST_LOG=debug cargo test --package metalocker-core --lib -- hash::test_sha256 --exact --show-output
#[test]
fn test_sha256() {
    let d = sha256(b"");
    assert_eq!(
        hex::encode(d),
        "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
    );
}

#[test]
fn test_tagged_is_domain_separated() {
    let a = tagged("tag-a", b"same bytes");
    let b = tagged("tag-b", b"same bytes");
    assert_ne!(a, b);

    // deterministic
    let a2 = tagged("tag-a", b"same bytes");
    assert_eq!(a, a2);
}

#[test]
fn test_tagged_output_len() {
    let out = tagged("any tag", b"any data");
    assert_eq!(out.len(), TAGGED_OUTPUT_LEN);
}
