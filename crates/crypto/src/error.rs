//! Local error type for the `pbft-crypto` crate.

use pbft_types::error::ErrorCode;

#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("invalid key: {0}")]
    InvalidKey(String),
    #[error("invalid signature encoding: {0}")]
    InvalidSignature(String),
    #[error("signing operation failed: {0}")]
    SignFailed(String),
    #[error("replica {0} has no registered public key")]
    UnknownSigner(u64),
}

impl ErrorCode for CryptoError {
    fn code(&self) -> &'static str {
        match self {
            CryptoError::InvalidKey(_) => "crypto_invalid_key",
            CryptoError::InvalidSignature(_) => "crypto_invalid_signature",
            CryptoError::SignFailed(_) => "crypto_sign_failed",
            CryptoError::UnknownSigner(_) => "crypto_unknown_signer",
        }
    }
}
