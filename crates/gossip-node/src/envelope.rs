//! Line-delimited JSON envelopes.
//!
//! Every message on stdin/stdout is one JSON object per line:
//! `{"src": "n1", "dest": "n2", "body": {"type": ..., "msg_id": 3, ...}}`.
//! The body keeps its correlation IDs next to the typed fields, so the
//! payload is held as a raw JSON map until the engine decodes it.

use gossip_core::{Body, NodeId};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub src: NodeId,
    pub dest: NodeId,
    pub body: Payload,
}

impl Envelope {
    pub fn new(src: NodeId, dest: NodeId, body: Payload) -> Self {
        Self { src, dest, body }
    }

    /// Parse one input line.
    pub fn from_line(line: &str) -> serde_json::Result<Self> {
        serde_json::from_str(line)
    }

    /// Serialize to a single line (no trailing newline).
    pub fn to_line(&self) -> String {
        serde_json::to_string(self).expect("Envelope serialization should not fail")
    }
}

/// Message body with correlation IDs split out from the typed fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msg_id: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_reply_to: Option<u64>,

    /// Everything else, including `type`
    #[serde(flatten)]
    pub fields: Map<String, Json>,
}

impl Payload {
    /// Wrap a typed body.
    pub fn from_body(body: &Body) -> Self {
        let fields = match body.to_json() {
            Json::Object(map) => map,
            // Body is an internally tagged enum, always an object
            other => unreachable!("body serialized to non-object {}", other),
        };
        Self {
            msg_id: None,
            in_reply_to: None,
            fields,
        }
    }

    pub fn with_msg_id(mut self, msg_id: u64) -> Self {
        self.msg_id = Some(msg_id);
        self
    }

    pub fn in_reply_to(mut self, msg_id: Option<u64>) -> Self {
        self.in_reply_to = msg_id;
        self
    }

    /// The `type` field, if present and a string.
    pub fn msg_type(&self) -> Option<&str> {
        self.fields.get("type").and_then(Json::as_str)
    }

    /// The typed fields as a JSON object, for decoding into a `Body`.
    pub fn to_json(&self) -> Json {
        Json::Object(self.fields.clone())
    }
}

/// First message every node receives: who it is and who else exists.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct InitBody {
    pub node_id: NodeId,
    pub node_ids: Vec<NodeId>,
}

impl InitBody {
    pub const TYPE: &'static str = "init";
    pub const REPLY_TYPE: &'static str = "init_ok";

    /// Decode from a payload whose type is `init`.
    pub fn from_payload(payload: &Payload) -> serde_json::Result<Self> {
        serde_json::from_value(payload.to_json())
    }

    /// The `init_ok` reply fields.
    pub fn reply() -> Map<String, Json> {
        let mut fields = Map::new();
        fields.insert("type".into(), Json::String(Self::REPLY_TYPE.into()));
        fields
    }
}
