//! Broadcast protocol handler.
//!
//! Node state is just the value store and the topology. Each inbound body
//! maps to one reply:
//!
//! | Inbound     | Effect                                           | Reply          |
//! |-------------|--------------------------------------------------|----------------|
//! | `broadcast` | insert, fan out to current neighbors             | `broadcast_ok` |
//! | `read`      | snapshot the store                               | `read_ok`      |
//! | `topology`  | replace neighbors with our entry                 | `topology_ok`  |
//! | `gossip`    | if new: insert and fan out; duplicates only ack  | `gossip_ok`    |
//!
//! Re-gossiping only new values means traffic for a value stops once every
//! node has it.

use crate::{Body, ErrorCode, GossipConfig, GossipSender, Topology, Transport, Value, ValueStore};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HandlerError {
    #[error("Malformed request: {0}")]
    Malformed(String),

    #[error("Unsupported message type: {0}")]
    NotSupported(String),
}

impl HandlerError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Malformed(_) => ErrorCode::MalformedRequest,
            Self::NotSupported(_) => ErrorCode::NotSupported,
        }
    }

    /// The `error` body to send back to the requester.
    pub fn to_body(&self) -> Body {
        Body::error(self.code(), self.to_string())
    }
}

pub struct BroadcastHandler {
    store: Arc<ValueStore>,
    topology: Arc<Topology>,
    sender: GossipSender,
}

impl BroadcastHandler {
    /// Create a handler for the node the transport speaks for.
    pub fn new(transport: Arc<dyn Transport>, config: GossipConfig) -> Self {
        let topology = Arc::new(Topology::new(transport.node_id().clone()));
        let sender = GossipSender::new(transport, topology.clone(), config);
        Self {
            store: Arc::new(ValueStore::new()),
            topology,
            sender,
        }
    }

    pub fn store(&self) -> &ValueStore {
        &self.store
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn sender(&self) -> &GossipSender {
        &self.sender
    }

    /// Handle one request body and produce its reply.
    ///
    /// Never blocks on the network: fan-out runs on spawned tasks, so this
    /// must be called from within a Tokio runtime.
    pub fn handle(&self, body: Body) -> Result<Body, HandlerError> {
        match body {
            Body::Broadcast { message } => {
                self.on_broadcast(message);
                Ok(Body::BroadcastOk)
            }
            Body::Read => Ok(Body::ReadOk {
                messages: self.store.snapshot_sorted(),
            }),
            Body::Topology { topology } => {
                self.topology.apply_topology(&topology);
                Ok(Body::TopologyOk)
            }
            Body::Gossip { value } => {
                self.on_gossip(value);
                Ok(Body::GossipOk)
            }
            other => {
                warn!("Received {} as a request, not supported", other.type_name());
                Err(HandlerError::NotSupported(other.type_name().to_string()))
            }
        }
    }

    /// Decode a raw JSON body and handle it, turning failures into error replies.
    pub fn handle_json(&self, body: serde_json::Value) -> Body {
        match Body::from_json(body).and_then(|body| self.handle(body)) {
            Ok(reply) => reply,
            Err(e) => {
                debug!("Rejecting request: {}", e);
                e.to_body()
            }
        }
    }

    fn on_broadcast(&self, value: Value) {
        if self.store.insert(value) {
            info!("Broadcast {} accepted ({} values known)", value, self.store.len());
        } else {
            debug!("Broadcast {} already known, fanning out again", value);
        }
        self.sender.fan_out(value);
    }

    fn on_gossip(&self, value: Value) {
        // insert() is the check: two concurrent gossips of one value fan out once
        if self.store.insert(value) {
            debug!("Gossip {} is new, propagating", value);
            self.sender.fan_out(value);
        } else {
            debug!("Gossip {} already known", value);
        }
    }

    /// Stop all in-flight deliveries.
    pub async fn shutdown(&self) {
        self.sender.shutdown().await;
    }
}
