//! secp256k1 keys and DER ECDSA signatures for sealed ledger records.
pub mod private_key;
pub mod public_key;
pub mod signature;
