//! Message bodies understood by the broadcast engine.
//!
//! Bodies are JSON objects discriminated by a `type` field. Request/reply
//! correlation fields (`msg_id`, `in_reply_to`) belong to the envelope and
//! are handled by the transport, not here.

use crate::handler::HandlerError;
use crate::{NodeId, Value};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Every body type this crate can decode.
const KNOWN_TYPES: &[&str] = &[
    "broadcast",
    "broadcast_ok",
    "read",
    "read_ok",
    "topology",
    "topology_ok",
    "gossip",
    "gossip_ok",
    "error",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Body {
    /// Client injects a value.
    Broadcast { message: Value },
    BroadcastOk,

    /// Client asks for every value this node has seen.
    Read,
    ReadOk { messages: Vec<Value> },

    /// Full cluster neighbor map; each node keeps only its own entry.
    Topology {
        topology: HashMap<NodeId, Vec<NodeId>>,
    },
    TopologyOk,

    /// Peer-to-peer value propagation.
    Gossip { value: Value },
    GossipOk,

    /// Error reply for a request that could not be served.
    Error { code: ErrorCode, text: String },
}

impl Body {
    /// Decode a body from a JSON object, classifying failures.
    ///
    /// An unrecognized `type` is `NotSupported`; anything else that fails to
    /// decode (missing `type`, wrong field shapes) is `Malformed`.
    pub fn from_json(body: serde_json::Value) -> Result<Self, HandlerError> {
        let msg_type = match body.get("type") {
            Some(serde_json::Value::String(t)) => t.clone(),
            Some(other) => {
                return Err(HandlerError::Malformed(format!(
                    "type must be a string, got {}",
                    other
                )));
            }
            None => return Err(HandlerError::Malformed("missing type field".into())),
        };

        if !KNOWN_TYPES.contains(&msg_type.as_str()) {
            return Err(HandlerError::NotSupported(msg_type));
        }

        serde_json::from_value(body)
            .map_err(|e| HandlerError::Malformed(format!("invalid {} body: {}", msg_type, e)))
    }

    /// Serialize to a JSON object.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).expect("Body serialization should not fail")
    }

    /// The wire `type` of this body.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Broadcast { .. } => "broadcast",
            Self::BroadcastOk => "broadcast_ok",
            Self::Read => "read",
            Self::ReadOk { .. } => "read_ok",
            Self::Topology { .. } => "topology",
            Self::TopologyOk => "topology_ok",
            Self::Gossip { .. } => "gossip",
            Self::GossipOk => "gossip_ok",
            Self::Error { .. } => "error",
        }
    }

    /// Build an error reply body.
    pub fn error(code: ErrorCode, text: impl Into<String>) -> Self {
        Self::Error {
            code,
            text: text.into(),
        }
    }
}

/// Numeric error codes carried in `error` bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "u32", into = "u32")]
pub enum ErrorCode {
    Timeout,
    NodeNotFound,
    NotSupported,
    TemporarilyUnavailable,
    MalformedRequest,
    Crash,
    Abort,
    Other(u32),
}

impl From<u32> for ErrorCode {
    fn from(code: u32) -> Self {
        match code {
            0 => Self::Timeout,
            1 => Self::NodeNotFound,
            10 => Self::NotSupported,
            11 => Self::TemporarilyUnavailable,
            12 => Self::MalformedRequest,
            13 => Self::Crash,
            14 => Self::Abort,
            other => Self::Other(other),
        }
    }
}

impl From<ErrorCode> for u32 {
    fn from(code: ErrorCode) -> u32 {
        match code {
            ErrorCode::Timeout => 0,
            ErrorCode::NodeNotFound => 1,
            ErrorCode::NotSupported => 10,
            ErrorCode::TemporarilyUnavailable => 11,
            ErrorCode::MalformedRequest => 12,
            ErrorCode::Crash => 13,
            ErrorCode::Abort => 14,
            ErrorCode::Other(code) => code,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wire_shapes() {
        assert_eq!(
            Body::Broadcast {
                message: Value::from(42)
            }
            .to_json(),
            json!({"type": "broadcast", "message": 42})
        );
        assert_eq!(Body::BroadcastOk.to_json(), json!({"type": "broadcast_ok"}));
        assert_eq!(Body::Read.to_json(), json!({"type": "read"}));
        assert_eq!(
            Body::ReadOk {
                messages: vec![Value::from(1), Value::from(2)]
            }
            .to_json(),
            json!({"type": "read_ok", "messages": [1, 2]})
        );
        assert_eq!(Body::TopologyOk.to_json(), json!({"type": "topology_ok"}));
        assert_eq!(
            Body::Gossip {
                value: Value::from(7)
            }
            .to_json(),
            json!({"type": "gossip", "value": 7})
        );
        assert_eq!(Body::GossipOk.to_json(), json!({"type": "gossip_ok"}));
    }

    #[test]
    fn test_decode_topology() {
        let body = Body::from_json(json!({
            "type": "topology",
            "topology": {"n1": ["n2", "n3"], "n2": ["n1"]}
        }))
        .unwrap();

        match body {
            Body::Topology { topology } => {
                assert_eq!(
                    topology.get("n1"),
                    Some(&vec![NodeId::from("n2"), NodeId::from("n3")])
                );
                assert_eq!(topology.len(), 2);
            }
            other => panic!("Expected topology, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_ignores_unknown_fields() {
        let body = Body::from_json(json!({"type": "read", "extra": true})).unwrap();
        assert_eq!(body, Body::Read);
    }

    #[test]
    fn test_decode_missing_type_is_malformed() {
        let err = Body::from_json(json!({"message": 1})).unwrap_err();
        assert!(matches!(err, HandlerError::Malformed(_)));
    }

    #[test]
    fn test_decode_non_string_type_is_malformed() {
        let err = Body::from_json(json!({"type": 5})).unwrap_err();
        assert!(matches!(err, HandlerError::Malformed(_)));
    }

    #[test]
    fn test_decode_unknown_type_is_not_supported() {
        let err = Body::from_json(json!({"type": "txn", "txn": []})).unwrap_err();
        assert!(matches!(err, HandlerError::NotSupported(t) if t == "txn"));
    }

    #[test]
    fn test_decode_wrong_shape_is_malformed() {
        let err = Body::from_json(json!({"type": "broadcast", "message": "hello"})).unwrap_err();
        assert!(matches!(err, HandlerError::Malformed(_)));

        let err = Body::from_json(json!({"type": "gossip"})).unwrap_err();
        assert!(matches!(err, HandlerError::Malformed(_)));
    }

    #[test]
    fn test_error_body() {
        let body = Body::error(ErrorCode::MalformedRequest, "bad");
        assert_eq!(
            body.to_json(),
            json!({"type": "error", "code": 12, "text": "bad"})
        );

        let parsed = Body::from_json(json!({"type": "error", "code": 99, "text": "?"})).unwrap();
        assert_eq!(parsed, Body::error(ErrorCode::Other(99), "?"));
    }

    #[test]
    fn test_type_name_matches_wire() {
        let bodies = [
            Body::Read,
            Body::GossipOk,
            Body::Gossip {
                value: Value::from(1),
            },
        ];
        for body in bodies {
            assert_eq!(body.to_json()["type"], body.type_name());
        }
    }
}
