//! NodeId: Identifier for a node or client in the cluster.
//!
//! The cluster assigns these (e.g. "n1" for nodes, "c4" for clients), so
//! unlike a generated ID there is no format to validate beyond non-empty.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt::{self, Display, Formatter};

/// A cluster-assigned identifier for a node or client.
///
/// # Examples
/// ```
/// use gossip_core::NodeId;
///
/// let id = NodeId::from("n1");
/// assert_eq!(id.to_string(), "n1");
/// assert!(id.is_server());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this ID names a cluster node rather than a client.
    ///
    /// Clients are conventionally prefixed with `c`.
    pub fn is_server(&self) -> bool {
        !self.0.starts_with('c')
    }
}

impl Display for NodeId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for NodeId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

// Lets topology maps keyed by NodeId be looked up with a plain &str
impl Borrow<str> for NodeId {
    fn borrow(&self) -> &str {
        &self.0
    }
}
