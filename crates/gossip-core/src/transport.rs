//! Transport trait for node-to-node messaging.
//!
//! The engine never touches sockets or pipes. Whatever hosts it (the
//! stdin/stdout runtime in `gossip-node`, or a mock in tests) provides
//! fire-and-forget sends and request/await-reply calls.

use crate::{Body, NodeId};
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Timed out after {0:?} waiting for reply")]
    Timeout(Duration),

    #[error("Transport closed")]
    Closed,

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Unexpected reply: {0}")]
    UnexpectedReply(String),
}

pub type Result<T> = std::result::Result<T, TransportError>;

#[async_trait]
pub trait Transport: Send + Sync {
    /// Our own node ID
    fn node_id(&self) -> &NodeId;

    /// Send a body without waiting for any reply
    async fn send(&self, dest: &NodeId, body: Body) -> Result<()>;

    /// Send a request and wait up to `timeout` for its reply
    async fn call(&self, dest: &NodeId, body: Body, timeout: Duration) -> Result<Body>;
}
