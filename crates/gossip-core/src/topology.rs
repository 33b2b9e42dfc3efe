//! This node's neighbor list.
//!
//! Replaced wholesale on every topology message. Readers get an
//! `Arc<[NodeId]>` so one fan-out always walks a single consistent list,
//! even if an update lands halfway through it.

use crate::NodeId;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::{debug, warn};

pub struct Topology {
    /// Our own ID, never kept as a neighbor
    node_id: NodeId,
    neighbors: RwLock<Arc<[NodeId]>>,
}

impl Topology {
    /// Create an empty topology for `node_id`.
    pub fn new(node_id: NodeId) -> Self {
        Self {
            node_id,
            neighbors: RwLock::new(Arc::from(Vec::new())),
        }
    }

    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    /// Replace the neighbor list. Our own ID and duplicates are dropped.
    pub fn set_neighbors(&self, neighbors: Vec<NodeId>) {
        let mut filtered: Vec<NodeId> = Vec::with_capacity(neighbors.len());
        for neighbor in neighbors {
            if neighbor != self.node_id && !filtered.contains(&neighbor) {
                filtered.push(neighbor);
            }
        }

        debug!("Neighbors of {} set to {:?}", self.node_id, filtered);
        *self.neighbors.write().unwrap_or_else(|e| e.into_inner()) = Arc::from(filtered);
    }

    /// Pick our entry out of a full cluster topology.
    ///
    /// A map without an entry for us still replaces the list (with nothing).
    pub fn apply_topology(&self, topology: &HashMap<NodeId, Vec<NodeId>>) {
        match topology.get(&self.node_id) {
            Some(neighbors) => self.set_neighbors(neighbors.clone()),
            None => {
                warn!(
                    "Topology has no entry for {} ({} nodes listed), clearing neighbors",
                    self.node_id,
                    topology.len()
                );
                self.set_neighbors(Vec::new());
            }
        }
    }

    /// The list in effect right now.
    pub fn neighbors(&self) -> Arc<[NodeId]> {
        self.neighbors
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}
