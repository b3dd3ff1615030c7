//! SHA-256 hashing via `dcrypt`.

use crate::error::CryptoError;
use dcrypt::algorithms::hash::sha2::Sha256 as DcryptSha256;
use dcrypt::algorithms::hash::HashFunction as DcryptHashFunction;
use dcrypt::algorithms::ByteSerializable;

/// Hashes `data` with SHA-256, returning the fixed-size digest that every
/// wire type and hash-chain link in the kernel uses.
pub fn sha256(data: &[u8]) -> Result<[u8; 32], CryptoError> {
    let digest = DcryptSha256::digest(data)
        .map_err(dcrypt::Error::from)
        .map_err(|e| CryptoError::SignFailed(format!("hash failed: {e:?}")))?;
    let bytes = digest.to_bytes();
    bytes
        .as_slice()
        .try_into()
        .map_err(|_| CryptoError::SignFailed("unexpected digest length".into()))
}
