//! The generic "Merkle-sign a JSON-LD document" algorithm (spec.md §4.2),
//! shared by [`crate::identity::DidDocument`] and [`crate::impression::Impression`].
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    errors::{Error, Result},
    formatting, hash,
    ids::MERKLE_ROOT_SENTINEL,
    jsonld::normalize,
    key::ed25519,
};

/// An `Ed25519Signature2018`-shaped proof section.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Proof {
    #[serde(rename = "type")]
    pub proof_type: String,
    pub creator: String,
    pub created: DateTime<Utc>,
    #[serde(rename = "signatureValue")]
    pub signature_value: String,
}

impl Proof {
    pub fn new(creator: impl Into<String>, created: DateTime<Utc>, signature_value: String) -> Self {
        Proof {
            proof_type: "Ed25519Signature2018".to_string(),
            creator: creator.into(),
            created,
            signature_value,
        }
    }
}

/// Runs the Merkle self-naming + signing algorithm. `render(id, proof)`
/// must produce the document's full JSON value for the given `id` (always
/// [`MERKLE_ROOT_SENTINEL`] while signing) and optional proof section.
///
/// Returns the final content-derived ID and the proof that was embedded to
/// produce it.
pub fn merkle_sign<F>(id_prefix: &str, creator: &str, signer: &ed25519::PrivateKey, created: DateTime<Utc>, render: F) -> (String, Proof)
where
    F: Fn(&str, Option<&Proof>) -> serde_json::Value,
{
    let unsigned = render(MERKLE_ROOT_SENTINEL, None);
    let normalized_unsigned = normalize(&unsigned);
    let signature = signer.sign(&normalized_unsigned);
    let proof = Proof::new(creator, created, formatting::encode_base58(&signature));

    let signed = render(MERKLE_ROOT_SENTINEL, Some(&proof));
    let normalized_signed = normalize(&signed);
    let digest = hash::sha256(&normalized_signed);
    let id = format!("{id_prefix}{}", formatting::encode_base58(&digest));

    (id, proof)
}

/// Reverses [`merkle_sign`]: recomputes the ID from `proof` and the
/// rendered document, and checks the embedded signature, in that order so
/// a tampered proof is caught before a mismatched ID obscures the cause.
pub fn merkle_verify<F>(id: &str, id_prefix: &str, proof: &Proof, verifier: &ed25519::PublicKey, render: F) -> Result<()>
where
    F: Fn(&str, Option<&Proof>) -> serde_json::Value,
{
    let unsigned = render(MERKLE_ROOT_SENTINEL, None);
    let normalized_unsigned = normalize(&unsigned);
    let signature = formatting::decode_base58(&proof.signature_value)
        .map_err(|e| Error::invalid(format!("bad proof signatureValue base58: {e}")))?;
    verifier.verify(&normalized_unsigned, &signature)?;

    let signed = render(MERKLE_ROOT_SENTINEL, Some(proof));
    let normalized_signed = normalize(&signed);
    let digest = hash::sha256(&normalized_signed);
    let expected_id = format!("{id_prefix}{}", formatting::encode_base58(&digest));

    if expected_id != id {
        return Err(Error::integrity(format!(
            "Merkle ID mismatch: expected {expected_id}, got {id}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(id: &str, proof: Option<&Proof>, body: &str) -> serde_json::Value {
        serde_json::json!({
            "id": id,
            "body": body,
            "proof": proof,
        })
    }

    #[test]
    fn test_merkle_sign_verify_roundtrip() {
        let signer = ed25519::PrivateKey::generate();
        let verifier = signer.public_key();
        let created = Utc::now();

        let (id, proof) = merkle_sign("did:piprate:", "did:piprate:creator", &signer, created, |i, p| {
            render(i, p, "hello")
        });

        merkle_verify(&id, "did:piprate:", &proof, &verifier, |i, p| render(i, p, "hello")).unwrap();
    }

    #[test]
    fn test_merkle_verify_rejects_tampered_body() {
        let signer = ed25519::PrivateKey::generate();
        let verifier = signer.public_key();
        let created = Utc::now();

        let (id, proof) = merkle_sign("did:piprate:", "did:piprate:creator", &signer, created, |i, p| {
            render(i, p, "hello")
        });

        let res = merkle_verify(&id, "did:piprate:", &proof, &verifier, |i, p| render(i, p, "tampered"));
        assert!(res.is_err());
    }

    #[test]
    fn test_merkle_verify_rejects_wrong_verifier() {
        let signer = ed25519::PrivateKey::generate();
        let other = ed25519::PrivateKey::generate().public_key();
        let created = Utc::now();

        let (id, proof) = merkle_sign("did:piprate:", "did:piprate:creator", &signer, created, |i, p| {
            render(i, p, "hello")
        });

        assert!(merkle_verify(&id, "did:piprate:", &proof, &other, |i, p| render(i, p, "hello")).is_err());
    }
}
