//! Scriptable in-process transport for unit tests.

use crate::transport::{Result, Transport, TransportError};
use crate::{Body, GossipSender, NodeId};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone)]
pub(crate) struct Recorded {
    pub dest: NodeId,
    pub body: Body,
    pub at: Instant,
}

/// Acks every gossip call unless told otherwise.
pub(crate) struct MockTransport {
    node_id: NodeId,
    /// Calls to fail immediately, per destination
    failures: Mutex<HashMap<NodeId, u32>>,
    /// Canned replies returned before the normal ack, per destination
    replies: Mutex<HashMap<NodeId, (Body, u32)>>,
    /// Destinations that never answer (calls run into their timeout)
    unreachable: Mutex<HashSet<NodeId>>,
    calls: Mutex<Vec<Recorded>>,
    sends: Mutex<Vec<Recorded>>,
}

impl MockTransport {
    pub fn new(node_id: &str) -> Self {
        Self {
            node_id: node_id.into(),
            failures: Mutex::new(HashMap::new()),
            replies: Mutex::new(HashMap::new()),
            unreachable: Mutex::new(HashSet::new()),
            calls: Mutex::new(Vec::new()),
            sends: Mutex::new(Vec::new()),
        }
    }

    pub fn node_id_owned(&self) -> NodeId {
        self.node_id.clone()
    }

    pub fn fail_next(&self, dest: &str, times: u32) {
        self.failures.lock().unwrap().insert(dest.into(), times);
    }

    pub fn reply_with(&self, dest: &str, body: Body, times: u32) {
        self.replies.lock().unwrap().insert(dest.into(), (body, times));
    }

    pub fn set_unreachable(&self, dest: &str, unreachable: bool) {
        let mut set = self.unreachable.lock().unwrap();
        if unreachable {
            set.insert(dest.into());
        } else {
            set.remove(dest);
        }
    }

    pub fn calls(&self) -> Vec<Recorded> {
        self.calls.lock().unwrap().clone()
    }

    pub fn sends(&self) -> Vec<Recorded> {
        self.sends.lock().unwrap().clone()
    }

    fn take_failure(&self, dest: &NodeId) -> bool {
        let mut failures = self.failures.lock().unwrap();
        match failures.get_mut(dest) {
            Some(n) if *n > 0 => {
                *n -= 1;
                true
            }
            _ => false,
        }
    }

    fn take_reply(&self, dest: &NodeId) -> Option<Body> {
        let mut replies = self.replies.lock().unwrap();
        match replies.get_mut(dest) {
            Some((body, n)) if *n > 0 => {
                *n -= 1;
                Some(body.clone())
            }
            _ => None,
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    async fn send(&self, dest: &NodeId, body: Body) -> Result<()> {
        self.sends.lock().unwrap().push(Recorded {
            dest: dest.clone(),
            body,
            at: Instant::now(),
        });
        Ok(())
    }

    async fn call(&self, dest: &NodeId, body: Body, timeout: Duration) -> Result<Body> {
        self.calls.lock().unwrap().push(Recorded {
            dest: dest.clone(),
            body,
            at: Instant::now(),
        });

        let unreachable = self.unreachable.lock().unwrap().contains(dest);
        if unreachable {
            tokio::time::sleep(timeout).await;
            return Err(TransportError::Timeout(timeout));
        }
        if self.take_failure(dest) {
            return Err(TransportError::SendFailed(format!("{} dropped the message", dest)));
        }
        if let Some(reply) = self.take_reply(dest) {
            return Ok(reply);
        }
        Ok(Body::GossipOk)
    }
}

/// Let spawned deliveries run until none are left.
pub(crate) async fn settle(sender: &GossipSender) {
    for _ in 0..10_000 {
        if sender.in_flight() == 0 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("{} deliveries still in flight", sender.in_flight());
}
