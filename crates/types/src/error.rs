//! Error kinds shared across crate boundaries, plus the [`ErrorCode`] trait
//! that gives every error a stable label for metrics (spec.md §7).

/// Implemented by every error enum in the workspace so metrics sinks can tag
/// failures with a stable string instead of a `Display`-formatted message
/// (which may carry request-specific data and is unstable across versions).
pub trait ErrorCode {
    fn code(&self) -> &'static str;
}

/// Transient transport failures — the caller may retry, possibly against a
/// different peer (spec.md §4.1).
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("send timed out")]
    Timeout,
    #[error("connection lost")]
    ConnectionLost,
    #[error("failed to serialise outbound message")]
    Serialise,
    #[error("message exceeds maximum frame size ({0} bytes)")]
    TooLarge(usize),
}

impl ErrorCode for SendError {
    fn code(&self) -> &'static str {
        match self {
            SendError::Timeout => "send_timeout",
            SendError::ConnectionLost => "send_connection_lost",
            SendError::Serialise => "send_serialise",
            SendError::TooLarge(_) => "send_too_large",
        }
    }
}

/// Message-validation failures: the message was received intact but fails
/// some structural or cryptographic check, so it is dropped rather than
/// processed (spec.md §7).
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("signature verification failed for replica {0}")]
    BadSignature(u64),
    #[error("sender {0} is not a member of the replica set")]
    UnknownSender(u64),
    #[error("view {got} does not match current view {expected}")]
    ViewMismatch { got: u64, expected: u64 },
    #[error("hash of data does not match claimed digest")]
    HashMismatch,
    #[error("malformed message: {0}")]
    Malformed(String),
}

impl ErrorCode for ValidationError {
    fn code(&self) -> &'static str {
        match self {
            ValidationError::BadSignature(_) => "validation_bad_signature",
            ValidationError::UnknownSender(_) => "validation_unknown_sender",
            ValidationError::ViewMismatch { .. } => "validation_view_mismatch",
            ValidationError::HashMismatch => "validation_hash_mismatch",
            ValidationError::Malformed(_) => "validation_malformed",
        }
    }
}

/// Storage-layer failures from whatever [`pbft-api`](../pbft_api)'s
/// `KvStore` trait is backed by.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("key not found")]
    NotFound,
    #[error("underlying store error: {0}")]
    Backend(String),
    #[error("snapshot is stale")]
    StaleSnapshot,
}

impl ErrorCode for StorageError {
    fn code(&self) -> &'static str {
        match self {
            StorageError::NotFound => "storage_not_found",
            StorageError::Backend(_) => "storage_backend",
            StorageError::StaleSnapshot => "storage_stale_snapshot",
        }
    }
}

/// Top-level error surfaced by the consensus engine's public entry points,
/// folding in the more granular error kinds above plus the admission and
/// protocol-violation failures that are specific to ordering (spec.md §7).
#[derive(Debug, thiserror::Error)]
pub enum ConsensusError {
    #[error(transparent)]
    Send(#[from] SendError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    /// The sequence manager's water mark rejected admission of a new
    /// request (spec.md §5's `SeqExhausted`).
    #[error("sequence admission exhausted: next {next} exceeds in-flight window ({max_in_flight})")]
    SeqExhausted { next: u64, max_in_flight: u64 },
    /// A message violates protocol invariants in a way that indicates
    /// Byzantine behaviour rather than a transient or validation failure —
    /// e.g. two conflicting PRE_PREPAREs for the same (view, seq).
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),
    /// Unrecoverable: the replica cannot continue operating and should
    /// shut down rather than attempt to proceed in a possibly-inconsistent
    /// state.
    #[error("fatal: {0}")]
    Fatal(String),
}

impl ErrorCode for ConsensusError {
    fn code(&self) -> &'static str {
        match self {
            ConsensusError::Send(e) => e.code(),
            ConsensusError::Validation(e) => e.code(),
            ConsensusError::Storage(e) => e.code(),
            ConsensusError::SeqExhausted { .. } => "consensus_seq_exhausted",
            ConsensusError::ProtocolViolation(_) => "consensus_protocol_violation",
            ConsensusError::Fatal(_) => "consensus_fatal",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_are_stable_labels() {
        assert_eq!(SendError::Timeout.code(), "send_timeout");
        assert_eq!(
            ValidationError::HashMismatch.code(),
            "validation_hash_mismatch"
        );
        assert_eq!(StorageError::NotFound.code(), "storage_not_found");
    }

    #[test]
    fn consensus_error_wraps_and_forwards_code() {
        let e: ConsensusError = SendError::ConnectionLost.into();
        assert_eq!(e.code(), "send_connection_lost");
    }

    #[test]
    fn seq_exhausted_carries_context() {
        let e = ConsensusError::SeqExhausted {
            next: 200,
            max_in_flight: 128,
        };
        assert_eq!(e.code(), "consensus_seq_exhausted");
    }
}
