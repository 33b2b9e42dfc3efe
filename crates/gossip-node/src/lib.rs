//! gossip-node library: Exposes the runtime for the binary and for tests.
//!
//! The runtime speaks line-delimited JSON over any byte streams, so
//! integration tests can drive a whole cluster through in-memory pipes.

pub mod envelope;
pub mod runtime;

// Re-export key types for convenience
pub use envelope::{Envelope, InitBody, Payload};
pub use runtime::{NodeIo, NodeRuntime};
