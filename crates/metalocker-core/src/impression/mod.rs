//! Dataset impressions: self-naming signed metadata (spec.md §3, §4.6).
//!
//! An impression names itself from its own (normalized, signed) content via
//! the Merkle scheme in [`crate::jsonld::proof`], the same algorithm DID
//! documents use. Its `specialization_of` field, when present, is the
//! stable key ([`Impression::variant_id`]) shared by every revision of one
//! dataset.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    errors::Result,
    jsonld::{self, Proof},
    key::ed25519,
};

pub const DEFAULT_IMPRESSION_TYPES: &[&str] = &["Impression", "Entity", "Bundle"];

/// A pointer to the resource carrying the impression's own metadata blob
/// (as opposed to the dataset's data resources).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct MetaResourceRef {
    pub id: String,
    pub asset: String,
}

/// A free-form PROV-O graph, attached to a [`crate::lease::Lease`]
/// alongside (not instead of) the impression's own summary provenance
/// fields.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Provenance {
    pub graph: serde_json::Value,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Impression {
    #[serde(rename = "@context")]
    pub context: String,
    pub id: String,
    #[serde(rename = "type")]
    pub types: Vec<String>,
    pub asset: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prov_graph: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub was_attributed_to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated_at_time: Option<DateTime<Utc>>,

    pub meta_resource: MetaResourceRef,

    #[serde(default)]
    pub revision_number: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub was_revision_of: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub specialization_of: Option<String>,

    pub proof: Proof,
}

struct UnsignedImpression {
    context: String,
    types: Vec<String>,
    asset: String,
    prov_graph: Option<serde_json::Value>,
    was_attributed_to: Option<String>,
    generated_at_time: Option<DateTime<Utc>>,
    meta_resource: MetaResourceRef,
    revision_number: u64,
    was_revision_of: Option<String>,
    specialization_of: Option<String>,
}

impl UnsignedImpression {
    fn render(&self, id: &str, proof: Option<&Proof>) -> serde_json::Value {
        serde_json::json!({
            "@context": self.context,
            "id": id,
            "type": self.types,
            "asset": self.asset,
            "provGraph": self.prov_graph,
            "wasAttributedTo": self.was_attributed_to,
            "generatedAtTime": self.generated_at_time,
            "metaResource": self.meta_resource,
            "revisionNumber": self.revision_number,
            "wasRevisionOf": self.was_revision_of,
            "specializationOf": self.specialization_of,
            "proof": proof,
        })
    }
}

/// Everything the builder gathers before Merkle-signing an impression.
pub struct NewImpression {
    pub asset: String,
    pub meta_resource: MetaResourceRef,
    pub prov_graph: Option<serde_json::Value>,
    pub was_attributed_to: Option<String>,
    pub generated_at_time: Option<DateTime<Utc>>,
    pub revision_number: u64,
    pub was_revision_of: Option<String>,
    pub specialization_of: Option<String>,
}

impl NewImpression {
    /// A blank impression for `asset`/`meta_resource`, with no revision
    /// history and the default type vector (spec.md §4.6
    /// `NewBlankImpression`).
    pub fn blank(asset: impl Into<String>, meta_resource: MetaResourceRef) -> Self {
        NewImpression {
            asset: asset.into(),
            meta_resource,
            prov_graph: None,
            was_attributed_to: None,
            generated_at_time: None,
            revision_number: 0,
            was_revision_of: None,
            specialization_of: None,
        }
    }
}

impl Impression {
    /// Merkle-signs a new impression under `id_prefix` (the dataset's DID
    /// method prefix, e.g. `"did:piprate:"`).
    pub fn create(id_prefix: &str, new: NewImpression, signer: &ed25519::PrivateKey, creator: &str, created: DateTime<Utc>) -> Self {
        let unsigned = UnsignedImpression {
            context: jsonld::METALOCKER_CONTEXT_URL.to_string(),
            types: DEFAULT_IMPRESSION_TYPES.iter().map(|s| s.to_string()).collect(),
            asset: new.asset,
            prov_graph: new.prov_graph,
            was_attributed_to: new.was_attributed_to,
            generated_at_time: new.generated_at_time,
            meta_resource: new.meta_resource,
            revision_number: new.revision_number,
            was_revision_of: new.was_revision_of,
            specialization_of: new.specialization_of,
        };

        let (id, proof) = jsonld::merkle_sign(id_prefix, creator, signer, created, |i, p| unsigned.render(i, p));

        Impression {
            context: unsigned.context,
            id,
            types: unsigned.types,
            asset: unsigned.asset,
            prov_graph: unsigned.prov_graph,
            was_attributed_to: unsigned.was_attributed_to,
            generated_at_time: unsigned.generated_at_time,
            meta_resource: unsigned.meta_resource,
            revision_number: unsigned.revision_number,
            was_revision_of: unsigned.was_revision_of,
            specialization_of: unsigned.specialization_of,
            proof,
        }
    }

    fn render(&self, id: &str, proof: Option<&Proof>) -> serde_json::Value {
        UnsignedImpression {
            context: self.context.clone(),
            types: self.types.clone(),
            asset: self.asset.clone(),
            prov_graph: self.prov_graph.clone(),
            was_attributed_to: self.was_attributed_to.clone(),
            generated_at_time: self.generated_at_time,
            meta_resource: self.meta_resource.clone(),
            revision_number: self.revision_number,
            was_revision_of: self.was_revision_of.clone(),
            specialization_of: self.specialization_of.clone(),
        }
        .render(id, proof)
    }

    pub fn verify(&self, id_prefix: &str, verifier: &ed25519::PublicKey) -> Result<()> {
        jsonld::merkle_verify(&self.id, id_prefix, &self.proof, verifier, |id, proof| self.render(id, proof))
    }

    /// `1` when unset: an impression with no recorded revision number is
    /// implicitly the first revision (spec.md §4.6).
    pub fn revision(&self) -> u64 {
        if self.revision_number == 0 {
            1
        } else {
            self.revision_number
        }
    }

    /// The stable key shared by every revision of this dataset.
    pub fn variant_id(&self) -> &str {
        self.specialization_of.as_deref().unwrap_or(&self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_and_verify_roundtrip() {
        let signer = ed25519::PrivateKey::generate();
        let meta = MetaResourceRef {
            id: "res-1".to_string(),
            asset: "did:piprate:asset1".to_string(),
        };
        let new = NewImpression::blank("did:piprate:asset1", meta);
        let impression = Impression::create("did:piprate:", new, &signer, "did:piprate:creator", Utc::now());
        impression.verify("did:piprate:", &signer.public_key()).unwrap();
    }

    #[test]
    fn test_revision_defaults_to_one() {
        let signer = ed25519::PrivateKey::generate();
        let meta = MetaResourceRef {
            id: "res-1".to_string(),
            asset: "did:piprate:asset1".to_string(),
        };
        let new = NewImpression::blank("did:piprate:asset1", meta);
        let impression = Impression::create("did:piprate:", new, &signer, "did:piprate:creator", Utc::now());
        assert_eq!(impression.revision(), 1);
    }

    #[test]
    fn test_variant_id_falls_back_to_own_id() {
        let signer = ed25519::PrivateKey::generate();
        let meta = MetaResourceRef {
            id: "res-1".to_string(),
            asset: "did:piprate:asset1".to_string(),
        };
        let mut new = NewImpression::blank("did:piprate:asset1", meta.clone());
        new.specialization_of = Some("did:piprate:variant-root".to_string());
        let impression = Impression::create("did:piprate:", new, &signer, "did:piprate:creator", Utc::now());
        assert_eq!(impression.variant_id(), "did:piprate:variant-root");

        let new2 = NewImpression::blank("did:piprate:asset1", meta);
        let impression2 = Impression::create("did:piprate:", new2, &signer, "did:piprate:creator", Utc::now());
        assert_eq!(impression2.variant_id(), impression2.id);
    }

    #[test]
    fn test_verify_rejects_tampered_asset() {
        let signer = ed25519::PrivateKey::generate();
        let meta = MetaResourceRef {
            id: "res-1".to_string(),
            asset: "did:piprate:asset1".to_string(),
        };
        let new = NewImpression::blank("did:piprate:asset1", meta);
        let mut impression = Impression::create("did:piprate:", new, &signer, "did:piprate:creator", Utc::now());
        impression.asset = "did:piprate:different-asset".to_string();
        assert!(impression.verify("did:piprate:", &signer.public_key()).is_err());
    }
}
