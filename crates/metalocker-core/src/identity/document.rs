//! DID documents (spec.md §3, §4.3): the JSON-LD envelope a DID publishes
//! its verification key and service endpoints under, Merkle-signed so the
//! document's own `id` commits to its content and proof.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    errors::Result,
    ids::MERKLE_ROOT_SENTINEL,
    jsonld::{self, Proof},
    key::ed25519,
};

pub const DID_CONTEXT: &str = "https://w3id.org/did/v1";
const KEY_TYPE: &str = "Ed25519VerificationKey2018";

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct PublicKeyEntry {
    pub id: String,
    #[serde(rename = "type")]
    pub key_type: String,
    pub controller: String,
    #[serde(rename = "publicKeyBase58")]
    pub public_key_base58: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServiceEndpoint {
    pub id: String,
    #[serde(rename = "type")]
    pub service_type: String,
    #[serde(rename = "serviceEndpoint")]
    pub service_endpoint: String,
}

/// Kept for API symmetry with [`crate::jsonld::Proof`]; DID documents carry
/// exactly the same proof shape as impressions.
pub type ProofSection = Proof;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DidDocument {
    #[serde(rename = "@context")]
    pub context: String,
    pub id: String,
    #[serde(rename = "publicKey")]
    pub public_key: Vec<PublicKeyEntry>,
    #[serde(rename = "service", skip_serializing_if = "Vec::is_empty", default)]
    pub service: Vec<ServiceEndpoint>,
    pub created: DateTime<Utc>,
    pub proof: Proof,
}

impl DidDocument {
    /// Builds and Merkle-signs a DID document for `did`, whose key material
    /// also signs the document (the DID authenticates its own publication).
    pub fn create(did: &super::Did, service: Vec<ServiceEndpoint>, created: DateTime<Utc>) -> Result<Self> {
        let signer = did
            .sign_key_for_proof()
            .ok_or_else(|| crate::errors::Error::unauthorised("DID has no signing key to create a document with"))?;
        let public_key = vec![PublicKeyEntry {
            id: format!("{}#keys-1", did.id()),
            key_type: KEY_TYPE.to_string(),
            controller: did.id(),
            public_key_base58: did.ver_key_base58(),
        }];

        let render = |id: &str, proof: Option<&Proof>| {
            serde_json::json!({
                "@context": DID_CONTEXT,
                "id": id,
                "publicKey": public_key,
                "service": service,
                "created": created,
                "proof": proof,
            })
        };

        let (id, proof) = jsonld::merkle_sign(&did_id_prefix(&did.id()), &did.id(), signer, created, render);

        Ok(DidDocument {
            context: DID_CONTEXT.to_string(),
            id,
            public_key,
            service,
            created,
            proof,
        })
    }

    fn render(&self, id: &str, proof: Option<&Proof>) -> serde_json::Value {
        serde_json::json!({
            "@context": self.context,
            "id": id,
            "publicKey": self.public_key,
            "service": self.service,
            "created": self.created,
            "proof": proof,
        })
    }

    /// Verifies the proof and recomputes the Merkle ID. `verifier` is the
    /// key that should have produced [`Self::proof`]; callers extract it
    /// from [`Self::public_key`] (see [`extract_indy_style_did`]) rather
    /// than trusting a caller-supplied key blindly.
    pub fn verify(&self, verifier: &ed25519::PublicKey) -> Result<()> {
        let prefix = did_id_prefix(&self.proof.creator);
        jsonld::merkle_verify(&self.id, &prefix, &self.proof, verifier, |id, proof| self.render(id, proof))
    }
}

fn did_id_prefix(did_id: &str) -> String {
    // DID documents are named under the same method as the DID they
    // describe: "did:<method>:" is everything up to and including the
    // second colon.
    match did_id.splitn(3, ':').collect::<Vec<_>>().as_slice() {
        [a, b, _] => format!("{a}:{b}:"),
        _ => format!("{did_id}:"),
    }
}

/// Finds the first `Ed25519VerificationKey2018` entry with a non-empty
/// `publicKeyBase58` and returns the neutered DID it describes (spec.md
/// §4.3 `ExtractIndyStyleDID`).
pub fn extract_indy_style_did(doc: &DidDocument, method: &str) -> Result<super::Did> {
    let entry = doc
        .public_key
        .iter()
        .find(|k| k.key_type == KEY_TYPE && !k.public_key_base58.is_empty())
        .ok_or_else(|| crate::errors::Error::not_found(crate::errors::NotFoundKind::Did, &doc.id))?;
    super::Did::from_ver_key(method, &entry.public_key_base58)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Did;

    #[test]
    fn test_create_and_verify_roundtrip() {
        let did = Did::generate("piprate", b"doc seed");
        let created = Utc::now();
        let doc = DidDocument::create(&did, vec![], created).unwrap();
        doc.verify(did.ver_key()).unwrap();
    }

    #[test]
    fn test_verify_rejects_tampered_service() {
        let did = Did::generate("piprate", b"doc seed 2");
        let created = Utc::now();
        let mut doc = DidDocument::create(&did, vec![], created).unwrap();
        doc.service.push(ServiceEndpoint {
            id: "x".to_string(),
            service_type: "x".to_string(),
            service_endpoint: "http://evil".to_string(),
        });
        assert!(doc.verify(did.ver_key()).is_err());
    }

    #[test]
    fn test_extract_indy_style_did_finds_neutered_did() {
        let did = Did::generate("piprate", b"indy seed");
        let created = Utc::now();
        let doc = DidDocument::create(&did, vec![], created).unwrap();
        let extracted = extract_indy_style_did(&doc, "piprate").unwrap();
        assert_eq!(extracted.id(), did.id());
        assert!(!extracted.can_sign());
    }

    #[test]
    fn test_sentinel_unused_after_signing() {
        let did = Did::generate("piprate", b"sentinel seed");
        let created = Utc::now();
        let doc = DidDocument::create(&did, vec![], created).unwrap();
        assert_ne!(doc.id, MERKLE_ROOT_SENTINEL);
    }
}
