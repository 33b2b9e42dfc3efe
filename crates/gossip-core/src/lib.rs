//! gossip-core: Gossip broadcast engine for a message-passing cluster.
//!
//! This crate provides:
//! - A grow-only `ValueStore` with idempotent insert and snapshot reads
//! - A `Topology` holder for this node's neighbor list
//! - A `GossipSender` that retries each (value, destination) pair until acked
//! - A `BroadcastHandler` reacting to broadcast/read/topology/gossip bodies
//! - The `Transport` trait the engine needs from whatever moves messages

pub mod backoff;
pub mod handler;
pub mod message;
pub mod node_id;
pub mod sender;
pub mod store;
pub mod topology;
pub mod transport;
pub mod value;

#[cfg(test)]
mod mock;

pub use backoff::{Backoff, BackoffConfig};
pub use handler::{BroadcastHandler, HandlerError};
pub use message::{Body, ErrorCode};
pub use node_id::NodeId;
pub use sender::{DeliveryMode, DeliveryOutcome, GossipConfig, GossipSender};
pub use store::ValueStore;
pub use topology::Topology;
pub use transport::{Transport, TransportError};
pub use value::{Value, ValueError};
