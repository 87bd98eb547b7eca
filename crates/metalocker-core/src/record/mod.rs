//! Sealed ledger records (spec.md §3, §4.5): the only thing that ever
//! reaches the ledger. A record carries no lease content itself, only a
//! routing key, three commitments, and a signature over all of it.
use serde::{Deserialize, Serialize};

use crate::{
    errors::{Error, Result},
    formatting, hash,
    key::secp256k1::{private_key::Key as PrivateKey, public_key::Key as PublicKey, signature::Sig},
};

const SEAL_TAG: &str = "ledger record construction";
const MAX_KEY_INDEX: u32 = 1 << 31;

const AUTH_COMMITMENT_TAG: u8 = 1;
const REQUESTING_COMMITMENT_TAG: u8 = 2;
const IMPRESSION_COMMITMENT_TAG: u8 = 3;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationType {
    Lease,
    LeaseRevocation,
    AssetHead,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    #[default]
    Pending,
    Published,
    Revoked,
    Failed,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Record {
    #[serde(default)]
    pub id: String,
    pub routing_key: String,
    pub key_index: u32,
    pub operation: OperationType,
    pub operation_address: String,
    #[serde(default)]
    pub flags: u32,

    pub authorising_commitment: String,
    pub requesting_commitment: String,
    pub impression_commitment: String,

    #[serde(default)]
    pub data_assets: Vec<String>,

    #[serde(default)]
    pub head_id: Option<String>,
    #[serde(default, with = "formatting::serde_base64::option")]
    pub head_body: Option<Vec<u8>>,
    #[serde(default)]
    pub subject_record: Option<String>,
    #[serde(default)]
    pub revocation_proof: Vec<String>,

    #[serde(default)]
    pub signature: String,
    #[serde(default)]
    pub status: RecordStatus,
}

impl Record {
    /// Builds the canonical byte body the signature (and final ID) are
    /// computed over (spec.md §4.5 step 1).
    ///
    /// Field order and encoding here follow spec.md §4.5 step 1 literally:
    /// `base58(RoutingKey), LE32(KeyIndex), bytes(OperationAddress), [LE32(Flags)
    /// iff Flags>0], base64(AuthorisingCommitment), tag, base64(RequestingCommitment),
    /// tag, base64(ImpressionCommitment), tag, 0x00, base58(dataAsset)*,
    /// base58(SubjectRecord)?, base64(revocationProof)*, base64(HeadID)?, HeadBody?`.
    /// That much is unambiguous. The three commitment byte tags
    /// (`AUTH_COMMITMENT_TAG`/`REQUESTING_COMMITMENT_TAG`/`IMPRESSION_COMMITMENT_TAG`
    /// = 1/2/3 below) are not given a concrete value anywhere in spec.md — only
    /// that each commitment is followed by "a byte tag" — so 1/2/3 in field order
    /// is this crate's choice, not a recovered constant.
    ///
    /// spec.md §8 S3 pins exact `ID`/`Signature` outputs for a specific xprv and
    /// "the record body shown in §3", but §3 is the abstract Data Model table
    /// (entity/field descriptions), not a concrete record with literal field
    /// values — there is no routing key, key index, operation address, or
    /// commitment bytes anywhere in spec.md to drive `seal()` with and reproduce
    /// those literals. `examples/original_source/_INDEX.md` confirms zero
    /// original-source files were kept for this package, so there's no ground
    /// truth to recover the missing preimage from either. A pure from-scratch
    /// reimplementation of this xprv's key derivation, secp256k1 signing, and
    /// this body layout against an empty/all-zero record hypothesis does not
    /// reproduce the S3 `ID`/`Signature`, confirming the gap is in the missing
    /// preimage (or an undisclosed tag-byte choice) rather than in the signing
    /// primitives. See DESIGN.md for the open-question record; the exact literal
    /// vector belongs in `test_seal_matches_s3_vector` below once the preimage is
    /// known.
    fn body(&self) -> Result<Vec<u8>> {
        let mut body = Vec::new();

        body.extend(formatting::decode_base58(&self.routing_key).map_err(|e| Error::invalid(e.to_string()))?);
        body.extend(self.key_index.to_le_bytes());
        body.extend(self.operation_address.as_bytes());
        if self.flags > 0 {
            body.extend(self.flags.to_le_bytes());
        }

        body.extend(formatting::decode_base64(&self.authorising_commitment).map_err(|e| Error::invalid(e.to_string()))?);
        body.push(AUTH_COMMITMENT_TAG);
        body.extend(formatting::decode_base64(&self.requesting_commitment).map_err(|e| Error::invalid(e.to_string()))?);
        body.push(REQUESTING_COMMITMENT_TAG);
        body.extend(formatting::decode_base64(&self.impression_commitment).map_err(|e| Error::invalid(e.to_string()))?);
        body.push(IMPRESSION_COMMITMENT_TAG);
        body.push(0u8);

        for asset in &self.data_assets {
            body.extend(formatting::decode_base58(asset).map_err(|e| Error::invalid(e.to_string()))?);
        }

        if let Some(subject) = &self.subject_record {
            body.extend(formatting::decode_base58(subject).map_err(|e| Error::invalid(e.to_string()))?);
        }

        for proof in &self.revocation_proof {
            body.extend(formatting::decode_base64(proof).map_err(|e| Error::invalid(e.to_string()))?);
        }

        if let Some(head_id) = &self.head_id {
            body.extend(formatting::decode_base64(head_id).map_err(|e| Error::invalid(e.to_string()))?);
        }

        if let Some(head_body) = &self.head_body {
            body.extend(head_body);
        }

        Ok(body)
    }

    /// Validates record shape per spec.md §4.5: a known operation type, and
    /// `AssetHead`-specific invariants.
    pub fn validate_shape(&self) -> Result<()> {
        if self.key_index >= MAX_KEY_INDEX {
            return Err(Error::invalid(format!(
                "key_index {} is not a valid non-hardened BIP-32 index",
                self.key_index
            )));
        }
        if self.operation == OperationType::AssetHead {
            if self.head_id.is_none() || self.head_body.is_none() {
                return Err(Error::invalid("AssetHead record requires HeadID and HeadBody"));
            }
            if self.subject_record.is_some() && self.revocation_proof.len() != 1 {
                return Err(Error::invalid(
                    "AssetHead record with SubjectRecord requires exactly one RevocationProof entry",
                ));
            }
        }
        Ok(())
    }

    /// Seals the record: computes its signature and content-derived ID
    /// (spec.md §4.5 steps 2-4). Returns the sealed record; `self` is left
    /// untouched on error.
    pub fn seal(mut self, priv_key: &PrivateKey) -> Result<Self> {
        self.validate_shape()?;

        let body = self.body()?;
        let h = hash::tagged(SEAL_TAG, &body);
        let sig = priv_key.sign_digest(&h)?;
        self.signature = formatting::encode_base58(sig.to_der_bytes());

        let mut with_sig = body;
        with_sig.extend(sig.to_der_bytes());
        let h2 = hash::tagged(SEAL_TAG, &with_sig);
        self.id = formatting::encode_base58(&h2);

        Ok(self)
    }

    /// Verifies the record's signature and content-derived ID against
    /// `pub_key`, the counterparty's HD child public key at `key_index`
    /// (spec.md §4.5, testable property 1).
    pub fn verify(&self, pub_key: &PublicKey) -> Result<()> {
        self.validate_shape()?;

        let sig_der = formatting::decode_base58(&self.signature).map_err(|e| Error::invalid(e.to_string()))?;
        let sig = Sig::from_der_bytes(&sig_der);

        let body = self.body()?;
        let h = hash::tagged(SEAL_TAG, &body);
        pub_key.verify_digest(&h, &sig)?;

        let mut with_sig = body;
        with_sig.extend(sig_der);
        let h2 = hash::tagged(SEAL_TAG, &with_sig);
        let expected_id = formatting::encode_base58(&h2);

        if expected_id != self.id {
            return Err(Error::integrity(format!(
                "record ID mismatch: expected {expected_id}, got {}",
                self.id
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_record() -> Record {
        Record {
            id: String::new(),
            routing_key: formatting::encode_base58(&[1u8; 33]),
            key_index: 42,
            operation: OperationType::Lease,
            operation_address: "offchain-address-1".to_string(),
            flags: 0,
            authorising_commitment: formatting::encode_base64(&[2u8; 32]),
            requesting_commitment: formatting::encode_base64(&[3u8; 32]),
            impression_commitment: formatting::encode_base64(&[4u8; 32]),
            data_assets: vec![formatting::encode_base58(b"asset-one")],
            head_id: None,
            head_body: None,
            subject_record: None,
            revocation_proof: vec![],
            signature: String::new(),
            status: RecordStatus::Pending,
        }
    }

    #[test]
    fn test_seal_verify_roundtrip() {
        let priv_key = PrivateKey::generate();
        let pub_key = priv_key.public_key();
        let sealed = base_record().seal(&priv_key).unwrap();
        sealed.verify(&pub_key).unwrap();
    }

    #[test]
    fn test_mutating_a_field_breaks_verification() {
        let priv_key = PrivateKey::generate();
        let pub_key = priv_key.public_key();
        let mut sealed = base_record().seal(&priv_key).unwrap();
        sealed.operation_address = "tampered-address".to_string();
        assert!(sealed.verify(&pub_key).is_err());
    }

    #[test]
    fn test_wrong_public_key_fails_verification() {
        let priv_key = PrivateKey::generate();
        let other_pub_key = PrivateKey::generate().public_key();
        let sealed = base_record().seal(&priv_key).unwrap();
        assert!(sealed.verify(&other_pub_key).is_err());
    }

    #[test]
    fn test_flags_change_the_sealed_id() {
        let priv_key = PrivateKey::generate();
        let mut with_flags = base_record();
        with_flags.flags = 1;
        let sealed_no_flags = base_record().seal(&priv_key).unwrap();
        let sealed_with_flags = with_flags.seal(&priv_key).unwrap();
        assert_ne!(sealed_no_flags.id, sealed_with_flags.id);
    }

    #[test]
    fn test_key_index_must_be_non_hardened() {
        let priv_key = PrivateKey::generate();
        let mut r = base_record();
        r.key_index = MAX_KEY_INDEX;
        assert!(r.seal(&priv_key).is_err());
    }

    #[test]
    fn test_asset_head_requires_head_fields() {
        let priv_key = PrivateKey::generate();
        let mut r = base_record();
        r.operation = OperationType::AssetHead;
        assert!(r.seal(&priv_key).is_err());

        r.head_id = Some(formatting::encode_base64(b"head"));
        r.head_body = Some(b"head body".to_vec());
        assert!(r.seal(&priv_key).is_ok());
    }

    #[test]
    fn test_asset_head_with_subject_requires_exactly_one_revocation_proof() {
        let priv_key = PrivateKey::generate();
        let mut r = base_record();
        r.operation = OperationType::AssetHead;
        r.head_id = Some(formatting::encode_base64(b"head"));
        r.head_body = Some(b"head body".to_vec());
        r.subject_record = Some(formatting::encode_base58(b"subject"));
        assert!(r.clone().seal(&priv_key).is_err());

        r.revocation_proof = vec![formatting::encode_base64(b"proof")];
        assert!(r.seal(&priv_key).is_ok());
    }

    /// spec.md §8 S3 literal vector. Ignored: the record field values S3 was
    /// computed from aren't recoverable from spec.md (see the doc comment on
    /// `body()`), so this can't be filled in with a real record yet. Kept as
    /// the exact target so whoever recovers the preimage has a one-line test
    /// to complete.
    #[test]
    #[ignore = "S3's concrete record body isn't recoverable from spec.md; see body()'s doc comment"]
    fn test_seal_matches_s3_vector() {
        const XPRV: &str = "xprv9u3yvfDwuqTbFNWRupD1QXsfh8Toh8NuKGrX5P8pu8CWJ2w915spiQFZS4SThkHWwV5yu1wJMsmrhYPEytb5bZZ4Mdut9txywRTa5c1TAzC";
        const _EXPECTED_ID: &str = "5a2WLDE9WfArGkayJ18qy5iK4TBr6onUDUCioiyQyYyY";
        const _EXPECTED_SIGNATURE: &str = "AN1rKvt7GdPDDakTqstPMuj1cFRUXfLskr566MwshaDxzhyxfDLr66zmPtrmizN99nbqhJTrSkyAdg2swjLwr5Tzx9Kf12N1X";
        const _EXPECTED_ID_WITH_FLAGS_1: &str = "Azo4T2Y11hKyY6ZaBEP3sk5EZQmaS1GS9vXpDDLunwfy";
        let _ = XPRV;
        unimplemented!("fill in the §3 record body once its field values are recovered");
    }
}
