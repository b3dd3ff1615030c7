//! The state-machine execution capability. `pbft-consensus` drives this
//! trait once a batch commits; what actually runs (a KV store mutator, a
//! WASM VM, a test double) is entirely up to the implementation.

use async_trait::async_trait;
use pbft_types::message::BatchClientRequest;

/// The result of executing one committed batch.
#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    /// One output per sub-request, in request order, fed to the response
    /// manager for client delivery.
    pub outputs: Vec<Vec<u8>>,
    /// Digest of the resulting state, folded into the next checkpoint's
    /// hash chain.
    pub state_hash: [u8; 32],
}

/// Applies committed batches to application state.
///
/// Modeled as a capability trait rather than a concrete type (spec.md §9)
/// so the consensus core has no notion of what the state machine actually
/// is — a property it needs to stay reusable across deployments.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Executes a committed batch at sequence `seq`. Must be deterministic:
    /// every correct replica executing the same `(seq, batch)` produces the
    /// same [`ExecutionOutcome`].
    async fn execute_batch(&self, seq: u64, batch: &BatchClientRequest) -> ExecutionOutcome;

    /// Whether clients expect an individual reply for this batch, or
    /// whether it is fire-and-forget (e.g. an internal system batch).
    fn needs_response(&self, batch: &BatchClientRequest) -> bool;

    /// Whether this executor tolerates out-of-order execution (batches
    /// applied in an order other than commit sequence) because its state
    /// transitions commute. The sequence manager only permits concurrent
    /// execution of in-flight batches when this returns `true`.
    fn is_out_of_order(&self) -> bool {
        false
    }
}
