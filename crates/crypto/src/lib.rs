//! Ed25519 signing and SHA-256 hashing for the PBFT kernel, backed by
//! `dcrypt`.
//!
//! Panics are disallowed in non-test code: a cryptographic operation that
//! cannot complete must return an error, never abort the replica process.
#![cfg_attr(
    not(test),
    deny(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::panic,
        clippy::indexing_slicing
    )
)]

pub mod error;
pub mod hash;
pub mod sign;
pub mod verifier;

pub use error::CryptoError;
pub use sign::Ed25519KeyPair;
pub use verifier::ReplicaVerifier;
