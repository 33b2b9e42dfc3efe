//! Reliable gossip delivery.
//!
//! Each (value, destination) pair gets its own task that keeps calling the
//! destination until it answers `gossip_ok`, sleeping an exponentially
//! growing interval between attempts. Tasks share nothing but the transport
//! and topology handles, and all of them stop when the sender shuts down.

use crate::backoff::{Backoff, BackoffConfig};
use crate::{Body, NodeId, Topology, Transport, TransportError, Value};
use std::collections::HashSet;
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

/// Failed attempts after which a delivery is reported at warn level.
const WARN_AFTER_ATTEMPTS: u32 = 8;

/// How a value is pushed to each neighbor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeliveryMode {
    /// Call and retry with backoff until acknowledged
    #[default]
    Reliable,
    /// One fire-and-forget send, no ack, no retry
    BestEffort,
}

impl Display for DeliveryMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reliable => f.write_str("reliable"),
            Self::BestEffort => f.write_str("best-effort"),
        }
    }
}

impl FromStr for DeliveryMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "reliable" => Ok(Self::Reliable),
            "best-effort" | "best_effort" => Ok(Self::BestEffort),
            other => Err(format!(
                "unknown delivery mode '{}' (expected 'reliable' or 'best-effort')",
                other
            )),
        }
    }
}

/// Configuration for gossip delivery.
#[derive(Debug, Clone)]
pub struct GossipConfig {
    /// Retry schedule between failed attempts
    pub backoff: BackoffConfig,
    /// How long one attempt waits for `gossip_ok` (default: 1s)
    pub ack_timeout: Duration,
    pub mode: DeliveryMode,
}

impl Default for GossipConfig {
    fn default() -> Self {
        Self {
            backoff: BackoffConfig::default(),
            ack_timeout: Duration::from_secs(1),
            mode: DeliveryMode::Reliable,
        }
    }
}

/// How a single delivery ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Destination acknowledged after `attempts` calls
    Delivered { attempts: u32 },
    /// Best-effort send handed to the transport
    Sent,
    /// Sender shut down before an ack arrived
    Cancelled,
}

/// Spawns and owns every in-flight gossip delivery.
///
/// Cheap to clone; clones share the same task set and shutdown signal.
#[derive(Clone)]
pub struct GossipSender {
    transport: Arc<dyn Transport>,
    topology: Arc<Topology>,
    config: Arc<GossipConfig>,
    /// (value, destination) pairs with a reliable delivery still retrying
    pending: Arc<Mutex<HashSet<(Value, NodeId)>>>,
    tracker: TaskTracker,
    cancel: CancellationToken,
}

impl GossipSender {
    pub fn new(transport: Arc<dyn Transport>, topology: Arc<Topology>, config: GossipConfig) -> Self {
        Self {
            transport,
            topology,
            config: Arc::new(config),
            pending: Arc::new(Mutex::new(HashSet::new())),
            tracker: TaskTracker::new(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn config(&self) -> &GossipConfig {
        &self.config
    }

    /// Push `value` to every current neighbor, one task per neighbor.
    ///
    /// Reads the topology once, so the whole fan-out targets a single list.
    /// Returns the number of deliveries started; a neighbor that already has
    /// a reliable delivery of this value retrying is skipped.
    pub fn fan_out(&self, value: Value) -> usize {
        if self.cancel.is_cancelled() {
            debug!("Sender shut down, not fanning out {}", value);
            return 0;
        }

        let neighbors = self.topology.neighbors();
        let mut started = 0;

        for dest in neighbors.iter() {
            match self.config.mode {
                DeliveryMode::Reliable => {
                    let key = (value, dest.clone());
                    let is_new = self
                        .pending
                        .lock()
                        .unwrap_or_else(|e| e.into_inner())
                        .insert(key.clone());
                    if !is_new {
                        debug!("Delivery of {} to {} already in flight", value, dest);
                        continue;
                    }

                    let sender = self.clone();
                    let dest = dest.clone();
                    self.tracker.spawn(async move {
                        sender.deliver(&dest, value).await;
                        sender
                            .pending
                            .lock()
                            .unwrap_or_else(|e| e.into_inner())
                            .remove(&key);
                    });
                }
                DeliveryMode::BestEffort => {
                    let sender = self.clone();
                    let dest = dest.clone();
                    self.tracker.spawn(async move {
                        sender.send_once(&dest, value).await;
                    });
                }
            }
            started += 1;
        }

        debug!(
            "Fanned out {} to {} of {} neighbor(s)",
            value,
            started,
            neighbors.len()
        );
        started
    }

    /// Deliver `value` to `dest`, retrying until acknowledged or cancelled.
    pub async fn deliver(&self, dest: &NodeId, value: Value) -> DeliveryOutcome {
        let mut backoff = Backoff::new(self.config.backoff.clone());

        loop {
            let attempt = backoff.attempts() + 1;
            let body = Body::Gossip { value };

            let result = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return DeliveryOutcome::Cancelled,
                result = self.transport.call(dest, body, self.config.ack_timeout) => result,
            };

            let err = match result {
                Ok(Body::GossipOk) => {
                    if attempt > 1 {
                        info!("Delivered {} to {} after {} attempts", value, dest, attempt);
                    } else {
                        debug!("Delivered {} to {}", value, dest);
                    }
                    return DeliveryOutcome::Delivered { attempts: attempt };
                }
                Ok(other) => unexpected_reply(&other),
                Err(e) => e,
            };
            debug!("Gossip {} to {} failed (attempt {}): {}", value, dest, attempt, err);

            let delay = backoff.advance();
            if attempt == WARN_AFTER_ATTEMPTS {
                warn!(
                    "Gossip {} to {} still unacknowledged after {} attempts, next retry in {:?}",
                    value, dest, attempt, delay
                );
            }

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return DeliveryOutcome::Cancelled,
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    async fn send_once(&self, dest: &NodeId, value: Value) -> DeliveryOutcome {
        match self.transport.send(dest, Body::Gossip { value }).await {
            Ok(()) => debug!("Sent {} to {}", value, dest),
            Err(e) => debug!("Best-effort gossip {} to {} failed: {}", value, dest, e),
        }
        DeliveryOutcome::Sent
    }

    /// Number of delivery tasks still running.
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// Cancel every in-flight delivery and wait for the tasks to exit.
    pub async fn shutdown(&self) {
        let remaining = self.tracker.len();
        if remaining > 0 {
            info!("Cancelling {} in-flight deliveries", remaining);
        }
        self.cancel.cancel();
        self.tracker.close();
        self.tracker.wait().await;
    }
}

/// Anything but `gossip_ok` in answer to a gossip call.
fn unexpected_reply(body: &Body) -> TransportError {
    match body {
        Body::Error { code, text } => {
            TransportError::UnexpectedReply(format!("error {}: {}", u32::from(*code), text))
        }
        other => TransportError::UnexpectedReply(other.type_name().to_string()),
    }
}
