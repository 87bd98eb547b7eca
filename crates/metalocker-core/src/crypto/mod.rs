//! Symmetric and asymmetric primitives layered on top of [`crate::hash`].
//!
//! `aead` carries the AES-256-GCM envelope used for account and locker
//! secrets; `anon_box` carries the anonymous-sender box used to hand a
//! locker's root private key to a participant who only publishes an Ed25519
//! verification key.
pub mod aead;
pub mod anon_box;
