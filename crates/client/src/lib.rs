//! Client-facing batching and response matching.
//!
//! Every component here runs on the replica a client is directly connected
//! to (the "proxy" in spec.md's terminology) — it is the half of the
//! protocol that never touches the collector pool, only `NEW_TXNS`
//! submission and `RESPONSE` delivery.

pub mod response_manager;

pub use response_manager::{ResponseManager, SubmitError, SubmittedRequest};
