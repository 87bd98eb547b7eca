//! Base58 and hex encodings used to render identifiers and keys.
//!
//! Identifiers in this crate (spec.md §4.2) are plain base58 over a digest,
//! with no checksum suffix: the digest itself is the integrity check, so a
//! second one would be redundant. Checksummed hex stays around for
//! diagnostics, where eyeballing a typo matters more than density.
use std::io::{self, Error, ErrorKind};

use base64::Engine;
use crate::hash;
use bs58::Alphabet;

const CHECKSUM_LENGTH: usize = 4;

/// Standard (not URL-safe) base64, the encoding every base64 field in
/// spec.md §3 uses (shared secrets, commitments, AEAD ciphertexts).
pub fn encode_base64(d: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(d)
}

pub fn decode_base64(s: &str) -> io::Result<Vec<u8>> {
    base64::engine::general_purpose::STANDARD
        .decode(s)
        .map_err(|e| Error::new(ErrorKind::InvalidInput, format!("failed to decode base64 ({e})")))
}

/// A `#[serde(with = "...")]` adapter for a raw `Vec<u8>` field serialized
/// as base64, e.g. a record's `HeadBody`.
pub mod serde_base64 {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&super::encode_base64(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        super::decode_base64(&s).map_err(serde::de::Error::custom)
    }

    pub mod option {
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S>(bytes: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            match bytes {
                Some(b) => serializer.serialize_some(&super::super::encode_base64(b)),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error>
        where
            D: Deserializer<'de>,
        {
            let s: Option<String> = Option::deserialize(deserializer)?;
            match s {
                Some(s) => super::super::decode_base64(&s)
                    .map(Some)
                    .map_err(serde::de::Error::custom),
                None => Ok(None),
            }
        }
    }
}

/// Plain base58 encoding, no checksum.
pub fn encode_base58(d: &[u8]) -> String {
    bs58::encode(d).with_alphabet(Alphabet::DEFAULT).into_string()
}

/// Plain base58 decoding, no checksum.
pub fn decode_base58(s: &str) -> io::Result<Vec<u8>> {
    bs58::decode(s)
        .with_alphabet(Alphabet::DEFAULT)
        .into_vec()
        .map_err(|err| Error::new(ErrorKind::InvalidInput, format!("failed to decode base58 ({err})")))
}

#[test]
fn test_base58_roundtrip() {
    let d: Vec<u8> = vec![0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 255];
    let encoded = encode_base58(&d);
    let decoded = decode_base58(&encoded).unwrap();
    assert_eq!(d, decoded);
}

#[test]
fn test_base58_empty() {
    let d: Vec<u8> = Vec::new();
    let encoded = encode_base58(&d);
    assert_eq!(encoded, "");
    let decoded = decode_base58(&encoded).unwrap();
    assert_eq!(d, decoded);
}

/// Appends a 4-byte SHA-256 checksum suffix, then hex-encodes.
pub fn encode_hex_with_checksum(d: &[u8]) -> String {
    let checksum = hash::sha256(d);
    let checksum_length = checksum.len();
    let checksum = &checksum[checksum_length - CHECKSUM_LENGTH..];

    let mut checked = d.to_vec();
    checked.extend_from_slice(checksum);

    hex::encode(&checked)
}

/// Inverse of [`encode_hex_with_checksum`].
pub fn decode_hex_with_checksum(d: &[u8]) -> io::Result<Vec<u8>> {
    let decoded = hex::decode(d)
        .map_err(|e| Error::new(ErrorKind::InvalidInput, format!("failed to decode hex ({e})")))?;
    let decoded_length = decoded.len();
    if decoded_length < CHECKSUM_LENGTH {
        return Err(Error::new(ErrorKind::InvalidInput, "input too short for checksum"));
    }

    let checksum = &decoded[decoded_length - CHECKSUM_LENGTH..];
    let orig = &decoded[..decoded_length - CHECKSUM_LENGTH];

    let orig_checksum = hash::sha256(orig);
    let orig_checksum_length = orig_checksum.len();
    let orig_checksum = &orig_checksum[orig_checksum_length - CHECKSUM_LENGTH..];
    if checksum != orig_checksum {
        return Err(Error::new(
            ErrorKind::InvalidInput,
            format!("invalid checksum {checksum:?} != {orig_checksum:?}"),
        ));
    }

    Ok(orig.to_vec())
}

#[test]
fn test_encode_hex_with_checksum() {
    let d: Vec<u8> = vec![0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 255];
    let hashed = encode_hex_with_checksum(&d);
    assert_eq!(hashed, "00010203040506070809ff4482539c");
    let decoded = decode_hex_with_checksum(hashed.as_bytes()).unwrap();
    assert_eq!(d, decoded);
}

#[test]
fn test_decode_hex_with_checksum_rejects_corruption() {
    let d: Vec<u8> = vec![1, 2, 3];
    let mut hashed = encode_hex_with_checksum(&d).into_bytes();
    let last = hashed.len() - 1;
    hashed[last] = if hashed[last] == b'0' { b'1' } else { b'0' };
    assert!(decode_hex_with_checksum(&hashed).is_err());
}
