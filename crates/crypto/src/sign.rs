//! Ed25519 key material, wrapping `dcrypt::sign::eddsa`.

use crate::error::CryptoError;
use dcrypt::sign::eddsa;
use rand::rngs::OsRng;

/// An Ed25519 key pair for this replica's own signing identity.
#[derive(Clone)]
pub struct Ed25519KeyPair {
    public_key: eddsa::Ed25519PublicKey,
    secret_key: eddsa::Ed25519SecretKey,
}

impl Ed25519KeyPair {
    /// Generates a fresh key pair. Used by test fixtures and key-provisioning
    /// tooling; production replicas load a key from `private_key_path`
    /// (spec.md §6) via [`Ed25519KeyPair::from_seed_bytes`].
    pub fn generate() -> Result<Self, CryptoError> {
        let mut rng = OsRng;
        let (public_key, secret_key) = eddsa::Ed25519::keypair(&mut rng)
            .map_err(|e| CryptoError::InvalidKey(format!("keypair generation failed: {e:?}")))?;
        Ok(Self {
            public_key,
            secret_key,
        })
    }

    /// Reconstructs a key pair from a 32-byte seed, as loaded from the
    /// replica's private key file.
    pub fn from_seed_bytes(seed: &[u8]) -> Result<Self, CryptoError> {
        if seed.len() != 32 {
            return Err(CryptoError::InvalidKey(format!(
                "expected 32-byte seed, got {}",
                seed.len()
            )));
        }
        let mut buf = [0u8; 32];
        buf.copy_from_slice(seed);
        let secret_key = eddsa::Ed25519SecretKey::from_seed(&buf)
            .map_err(|e| CryptoError::InvalidKey(format!("invalid seed: {e:?}")))?;
        let public_key = secret_key
            .public_key()
            .map_err(|e| CryptoError::InvalidKey(format!("failed to derive public key: {e:?}")))?;
        Ok(Self {
            public_key,
            secret_key,
        })
    }

    pub fn sign(&self, message: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let sig = eddsa::Ed25519::sign(message, &self.secret_key)
            .map_err(|e| CryptoError::SignFailed(format!("{e:?}")))?;
        Ok(sig.to_bytes().to_vec())
    }

    pub fn public_key_bytes(&self) -> Vec<u8> {
        self.public_key.to_bytes().to_vec()
    }
}

/// Verifies a signature against a raw Ed25519 public key, without caring
/// which replica it belongs to — replica attribution lives one layer up in
/// [`crate::verifier::ReplicaVerifier`].
pub fn verify(public_key_bytes: &[u8], message: &[u8], sig_bytes: &[u8]) -> bool {
    let Ok(public_key) = eddsa::Ed25519PublicKey::from_bytes(public_key_bytes) else {
        return false;
    };
    let Ok(sig) = eddsa::Ed25519Signature::from_bytes(sig_bytes) else {
        return false;
    };
    eddsa::Ed25519::verify(message, &sig, &public_key).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_and_verify_roundtrip() {
        let kp = Ed25519KeyPair::generate().expect("generate");
        let sig = kp.sign(b"payload").expect("sign");
        assert!(verify(&kp.public_key_bytes(), b"payload", &sig));
    }

    #[test]
    fn tampered_message_fails_verification() {
        let kp = Ed25519KeyPair::generate().expect("generate");
        let sig = kp.sign(b"payload").expect("sign");
        assert!(!verify(&kp.public_key_bytes(), b"tampered", &sig));
    }

    #[test]
    fn seed_roundtrip_produces_same_identity() {
        let kp = Ed25519KeyPair::generate().expect("generate");
        // dcrypt's Ed25519SecretKey doesn't expose its seed directly here,
        // so this exercises from_seed_bytes against a generated 32-byte
        // buffer rather than kp's own seed.
        let seed = [7u8; 32];
        let a = Ed25519KeyPair::from_seed_bytes(&seed).expect("from seed");
        let b = Ed25519KeyPair::from_seed_bytes(&seed).expect("from seed");
        assert_eq!(a.public_key_bytes(), b.public_key_bytes());
        let _ = kp;
    }
}
