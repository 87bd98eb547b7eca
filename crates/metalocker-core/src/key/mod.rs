//! Key types used throughout the data wallet.
//!
//! `secp256k1` signs sealed ledger records; `hd` derives per-property keys
//! from a locker participant's root; `ed25519` signs DIDs and storage-access
//! tokens.
pub mod ed25519;
pub mod hd;
pub mod secp256k1;
