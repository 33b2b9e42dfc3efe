//! Node runtime: stdin/stdout message loop hosting the broadcast engine.
//!
//! Handles everything the engine treats as an external collaborator:
//! - Waiting for `init` before constructing the handler
//! - Assigning message IDs and correlating replies to pending calls
//! - Dispatching each request on its own task
//! - Serializing all output through one writer task

use crate::envelope::{Envelope, InitBody, Payload};
use anyhow::{Result, bail};
use async_trait::async_trait;
use gossip_core::transport::Result as TransportResult;
use gossip_core::{Body, BroadcastHandler, ErrorCode, GossipConfig, NodeId, Transport, TransportError};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::string::FromUtf8Error;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{self, AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

/// How long to wait for queued output to drain on shutdown.
const FLUSH_TIMEOUT: Duration = Duration::from_secs(1);

/// Outbound side of a node: implements `Transport` over the output channel.
pub struct NodeIo {
    node_id: NodeId,
    next_msg_id: AtomicU64,
    out_tx: mpsc::UnboundedSender<String>,
    /// Waiters for replies, keyed by the msg_id of the request
    pending: Mutex<HashMap<u64, oneshot::Sender<Body>>>,
}

impl NodeIo {
    pub fn new(node_id: NodeId, out_tx: mpsc::UnboundedSender<String>) -> Self {
        Self {
            node_id,
            next_msg_id: AtomicU64::new(1),
            out_tx,
            pending: Mutex::new(HashMap::new()),
        }
    }

    fn next_msg_id(&self) -> u64 {
        self.next_msg_id.fetch_add(1, Ordering::Relaxed)
    }

    fn write(&self, dest: &NodeId, payload: Payload) -> TransportResult<()> {
        let envelope = Envelope::new(self.node_id.clone(), dest.clone(), payload);
        self.out_tx
            .send(envelope.to_line())
            .map_err(|_| TransportError::Closed)
    }

    /// Answer a request. Requests without a msg_id expect no reply.
    pub fn reply(&self, request: &Envelope, body: Body) -> TransportResult<()> {
        self.reply_payload(request, Payload::from_body(&body))
    }

    /// Reply with raw payload fields (for bodies outside the engine's vocabulary).
    fn reply_payload(&self, request: &Envelope, payload: Payload) -> TransportResult<()> {
        let Some(msg_id) = request.body.msg_id else {
            debug!(
                "Not replying {:?} to {}: request had no msg_id",
                payload.msg_type(),
                request.src
            );
            return Ok(());
        };

        let payload = payload
            .with_msg_id(self.next_msg_id())
            .in_reply_to(Some(msg_id));
        self.write(&request.src, payload)
    }

    /// Hand a reply to whoever is waiting on `in_reply_to`.
    ///
    /// Returns false if nobody is (the call already timed out).
    pub fn resolve(&self, in_reply_to: u64, body: Body) -> bool {
        let waiter = self
            .pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&in_reply_to);
        match waiter {
            Some(tx) => tx.send(body).is_ok(),
            None => false,
        }
    }

    /// Number of calls still waiting for a reply.
    pub fn pending_calls(&self) -> usize {
        self.pending.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

#[async_trait]
impl Transport for NodeIo {
    fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    async fn send(&self, dest: &NodeId, body: Body) -> TransportResult<()> {
        self.write(dest, Payload::from_body(&body))
    }

    async fn call(&self, dest: &NodeId, body: Body, timeout: Duration) -> TransportResult<Body> {
        let msg_id = self.next_msg_id();
        let (tx, rx) = oneshot::channel();
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(msg_id, tx);

        if let Err(e) = self.write(dest, Payload::from_body(&body).with_msg_id(msg_id)) {
            self.pending
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .remove(&msg_id);
            return Err(e);
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) => Err(TransportError::Closed),
            Err(_) => {
                self.pending
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .remove(&msg_id);
                Err(TransportError::Timeout(timeout))
            }
        }
    }
}

/// Runs one node over a pair of byte streams (stdin/stdout in production).
pub struct NodeRuntime {
    config: GossipConfig,
    shutdown: CancellationToken,
}

impl NodeRuntime {
    pub fn new(config: GossipConfig) -> Self {
        Self {
            config,
            shutdown: CancellationToken::new(),
        }
    }

    /// Token that stops the runtime when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Serve until input ends or the shutdown token fires.
    pub async fn run<R, W>(self, reader: R, writer: W) -> Result<()>
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let writer_task = spawn_writer(writer, out_rx);
        let mut lines = LineReader::new(reader);

        let Some(init) = self.wait_for_init(&mut lines, &out_tx).await? else {
            info!("Shutdown before init");
            return Ok(());
        };
        info!(
            "Initialized as {} ({} nodes in cluster, {} delivery)",
            init.node_id,
            init.node_ids.len(),
            self.config.mode
        );

        let io = Arc::new(NodeIo::new(init.node_id, out_tx));
        let handler = Arc::new(BroadcastHandler::new(io.clone(), self.config.clone()));
        let requests = TaskTracker::new();

        loop {
            let line = tokio::select! {
                _ = self.shutdown.cancelled() => {
                    info!("Shutdown signal received");
                    break;
                }
                line = lines.next_line() => line?,
            };

            let line = match line {
                Some(Ok(line)) => line,
                Some(Err(e)) => {
                    warn!("Skipping line that is not UTF-8 ({} bytes): {}", e.as_bytes().len(), e);
                    continue;
                }
                None => {
                    info!("Input closed");
                    break;
                }
            };
            if line.trim().is_empty() {
                continue;
            }

            let envelope = match Envelope::from_line(&line) {
                Ok(envelope) => envelope,
                Err(e) => {
                    warn!("Skipping unparseable line ({}): {}", e, line);
                    continue;
                }
            };

            dispatch(envelope, &io, &handler, &requests);
        }

        // Requests still being answered hold the output open
        requests.close();
        requests.wait().await;
        handler.shutdown().await;
        debug!(
            "Stopped with {} values, {} calls pending",
            handler.store().len(),
            io.pending_calls()
        );
        drop(handler);
        drop(io);

        if tokio::time::timeout(FLUSH_TIMEOUT, writer_task).await.is_err() {
            warn!("Output did not drain within {:?}", FLUSH_TIMEOUT);
        }
        Ok(())
    }

    /// Read until `init` arrives, turning away anything else.
    async fn wait_for_init<R>(
        &self,
        lines: &mut LineReader<R>,
        out_tx: &mpsc::UnboundedSender<String>,
    ) -> Result<Option<InitBody>>
    where
        R: AsyncRead + Unpin,
    {
        loop {
            let line = tokio::select! {
                _ = self.shutdown.cancelled() => return Ok(None),
                line = lines.next_line() => line?,
            };
            let line = match line {
                Some(Ok(line)) => line,
                Some(Err(e)) => {
                    warn!("Skipping line that is not UTF-8 ({} bytes): {}", e.as_bytes().len(), e);
                    continue;
                }
                None => bail!("Input closed before init"),
            };

            let envelope = match Envelope::from_line(&line) {
                Ok(envelope) => envelope,
                Err(e) => {
                    warn!("Skipping unparseable line ({}): {}", e, line);
                    continue;
                }
            };

            if envelope.body.msg_type() != Some(InitBody::TYPE) {
                warn!(
                    "Received {:?} from {} before init",
                    envelope.body.msg_type(),
                    envelope.src
                );
                let body = Body::error(ErrorCode::TemporarilyUnavailable, "node not initialized");
                reply_raw(out_tx, &envelope, Payload::from_body(&body));
                continue;
            }

            match InitBody::from_payload(&envelope.body) {
                Ok(init) => {
                    let reply = Payload {
                        msg_id: None,
                        in_reply_to: None,
                        fields: InitBody::reply(),
                    };
                    reply_raw(out_tx, &envelope, reply);
                    return Ok(Some(init));
                }
                Err(e) => {
                    warn!("Malformed init from {}: {}", envelope.src, e);
                    let body = Body::error(ErrorCode::MalformedRequest, format!("invalid init: {}", e));
                    reply_raw(out_tx, &envelope, Payload::from_body(&body));
                }
            }
        }
    }
}

/// Route one inbound envelope: replies resolve waiters, requests get a task.
fn dispatch(
    envelope: Envelope,
    io: &Arc<NodeIo>,
    handler: &Arc<BroadcastHandler>,
    requests: &TaskTracker,
) {
    if let Some(in_reply_to) = envelope.body.in_reply_to {
        match Body::from_json(envelope.body.to_json()) {
            Ok(body) => {
                if !io.resolve(in_reply_to, body) {
                    debug!(
                        "Late reply {} from {} (in_reply_to {})",
                        envelope.body.msg_type().unwrap_or("?"),
                        envelope.src,
                        in_reply_to
                    );
                }
            }
            Err(e) => warn!("Undecodable reply from {}: {}", envelope.src, e),
        }
        return;
    }

    if envelope.body.msg_type() == Some(InitBody::TYPE) {
        warn!("Ignoring repeated init from {}", envelope.src);
        let reply = Payload {
            msg_id: None,
            in_reply_to: None,
            fields: InitBody::reply(),
        };
        if let Err(e) = io.reply_payload(&envelope, reply) {
            error!("Failed to reply to {}: {}", envelope.src, e);
        }
        return;
    }

    let io = io.clone();
    let handler = handler.clone();
    requests.spawn(async move {
        let reply = handler.handle_json(envelope.body.to_json());
        if let Err(e) = io.reply(&envelope, reply) {
            error!("Failed to reply to {}: {}", envelope.src, e);
        }
    });
}

/// Reply before a `NodeIo` exists (we answer as whoever the message was for).
fn reply_raw(out_tx: &mpsc::UnboundedSender<String>, request: &Envelope, payload: Payload) {
    let Some(msg_id) = request.body.msg_id else {
        return;
    };
    let reply = Envelope::new(
        request.dest.clone(),
        request.src.clone(),
        payload.in_reply_to(Some(msg_id)),
    );
    if out_tx.send(reply.to_line()).is_err() {
        error!("Failed to reply to {}: output closed", request.src);
    }
}

/// Newline-delimited input that survives lines which are not UTF-8.
struct LineReader<R> {
    reader: BufReader<R>,
    buf: Vec<u8>,
}

impl<R: AsyncRead + Unpin> LineReader<R> {
    fn new(reader: R) -> Self {
        Self {
            reader: BufReader::new(reader),
            buf: Vec::new(),
        }
    }

    /// Next line without its terminator, or `None` at end of input.
    ///
    /// Only I/O failures are errors; undecodable bytes come back as the
    /// inner `Err` so the caller can skip that one line. Partial reads stay
    /// buffered, so this is safe to use as a `select!` branch.
    async fn next_line(&mut self) -> io::Result<Option<Result<String, FromUtf8Error>>> {
        let read = self.reader.read_until(b'\n', &mut self.buf).await?;
        if read == 0 && self.buf.is_empty() {
            return Ok(None);
        }

        let mut bytes = std::mem::take(&mut self.buf);
        if bytes.last() == Some(&b'\n') {
            bytes.pop();
            if bytes.last() == Some(&b'\r') {
                bytes.pop();
            }
        }
        Ok(Some(String::from_utf8(bytes)))
    }
}

/// Single task owning the output stream; exits when every sender is gone.
fn spawn_writer<W>(mut writer: W, mut out_rx: mpsc::UnboundedReceiver<String>) -> JoinHandle<()>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        while let Some(mut line) = out_rx.recv().await {
            line.push('\n');
            if let Err(e) = writer.write_all(line.as_bytes()).await {
                error!("Failed to write output: {}", e);
                break;
            }
            if let Err(e) = writer.flush().await {
                error!("Failed to flush output: {}", e);
                break;
            }
        }
    })
}
