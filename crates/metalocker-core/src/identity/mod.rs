//! DIDs and DID documents (spec.md §4.3).
mod did;
mod document;

pub use did::Did;
pub use document::{extract_indy_style_did, DidDocument, ProofSection, PublicKeyEntry, ServiceEndpoint};
