//! Signed, length-prefixed TCP transport for a fixed, statically configured
//! replica set.
//!
//! There is no peer discovery or gossip here — every replica's address is
//! known up front from the JSON replica config (spec.md §6), so this stays
//! a plain dial-and-frame transport rather than a general P2P stack.

pub mod broadcaster;
pub mod framing;
pub mod listener;
pub mod peer;
pub mod transport;

pub use broadcaster::ReplicaBroadcaster;
pub use peer::PeerHandle;
pub use transport::Transport;
