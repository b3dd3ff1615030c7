//! Core wire and data model types for the PBFT replicated state-machine kernel.
//!
//! This crate has no dependency on any other crate in the workspace: every
//! component (transport, crypto, consensus, storage, client) builds on the
//! types defined here, so the surface is kept small and stable.

pub mod codec;
pub mod error;
pub mod message;
pub mod replica;

pub mod prelude {
    pub use crate::codec::{from_bytes_canonical, to_bytes_canonical};
    pub use crate::error::{ConsensusError, ErrorCode, SendError, StorageError, ValidationError};
    pub use crate::message::{
        BatchClientRequest, BatchClientResponse, Envelope, HashType, MessageType, Request,
        Signature, SubRequest,
    };
    pub use crate::replica::{ReplicaConfig, ReplicaId, ReplicaInfo};
}
