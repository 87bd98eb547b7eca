//! # metalocker-core
//!
//! The cryptographic data-wallet core of MetaLocker: DIDs and DID documents,
//! HD-keyed lockers, sealed ledger records, off-chain leases, dataset
//! impressions with Merkle-ID self-naming, storage-access tokens, the PRV21
//! revision rater, and the submit/replay wallet pipeline that ties them
//! together.
//!
//! Transport (HTTP/gRPC), persistence back-ends (SQL/BoltDB), and the CLI
//! front-end are external collaborators. Only their contracts live here, as
//! the traits in [`interfaces`].
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod account;
pub mod cancel;
pub mod config;
pub mod crypto;
pub mod errors;
pub mod formatting;
pub mod hash;
pub mod identity;
pub mod ids;
pub mod impression;
pub mod interfaces;
pub mod jsonld;
pub mod key;
pub mod lease;
pub mod locker;
pub mod rater;
pub mod record;
pub mod wallet;
