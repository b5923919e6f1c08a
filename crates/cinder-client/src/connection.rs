//! TCP connection to one cluster node.
//!
//! A connection is opened by a handshake and then multiplexes catalog
//! requests:
//!
//! - a writer task owns the write half and drains an outbox of encoded frames
//! - a reader task owns the read half and routes each reply to the waiter
//!   registered under its request id
//!
//! Replies may arrive in any order. A request whose deadline expires is
//! removed from the pending table; a reply arriving after that is dropped.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::{Bytes, BytesMut};
use cinder_proto::{
    frame, ClientHello, ClientMessage, HandshakeReply, ProtoError, Request, RequestId, Response,
    ServerHello, ServerMessage, HANDSHAKE_REQUEST_ID,
};
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::error::{ClientError, ClientResult};

/// Capacity of the outbound frame queue.
const OUTBOX_CAPACITY: usize = 1024;

/// Initial read buffer size.
const READ_BUFFER_SIZE: usize = 4096;

type ReplySender = oneshot::Sender<ClientResult<Response>>;

/// Requests waiting for a reply, keyed by request id.
type PendingRequests = DashMap<RequestId, ReplySender>;

/// An established, handshaken connection.
pub(crate) struct Connection {
    /// Endpoint as configured.
    endpoint: String,
    /// Resolved peer address.
    peer_addr: SocketAddr,
    /// Encoded frames waiting for the writer task.
    outbox: mpsc::Sender<Bytes>,
    /// Requests waiting for replies.
    pending: Arc<PendingRequests>,
    /// Next request id; 0 is reserved for the handshake.
    next_request_id: AtomicU64,
    /// Set once the connection is shut down or broken.
    closed: Arc<AtomicBool>,
    /// Reader and writer tasks.
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("endpoint", &self.endpoint)
            .field("peer_addr", &self.peer_addr)
            .field("pending", &self.pending.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Connection {
    /// Connects to `endpoint` and performs the handshake.
    ///
    /// Must run inside the session runtime: the reader and writer tasks are
    /// spawned onto the current runtime. The caller bounds the whole exchange
    /// with its own deadline.
    pub(crate) async fn open(
        endpoint: &str,
        hello: &ClientHello,
    ) -> ClientResult<(Self, ServerHello)> {
        Self::open_with_outbox(endpoint, hello, OUTBOX_CAPACITY).await
    }

    /// Like [`open`](Self::open) with an explicit outbox capacity.
    pub(crate) async fn open_with_outbox(
        endpoint: &str,
        hello: &ClientHello,
        outbox_capacity: usize,
    ) -> ClientResult<(Self, ServerHello)> {
        let mut stream = TcpStream::connect(endpoint).await?;
        stream.set_nodelay(true)?;
        let peer_addr = stream.peer_addr()?;
        debug!("TCP connection to {} ({}) established", endpoint, peer_addr);

        let greeting = frame::encode(HANDSHAKE_REQUEST_ID, &ClientMessage::Hello(hello.clone()))?;
        frame::write_frame(&mut stream, &greeting).await?;

        let mut buf = BytesMut::with_capacity(READ_BUFFER_SIZE);
        let reply = frame::read_frame(&mut stream, &mut buf)
            .await?
            .ok_or_else(|| {
                ClientError::Transport(format!("{endpoint} closed the connection during handshake"))
            })?;

        let (request_id, message): (RequestId, ServerMessage) = frame::decode(reply)?;
        if request_id != HANDSHAKE_REQUEST_ID {
            return Err(ClientError::MalformedReply(format!(
                "handshake reply carries request id {request_id}"
            )));
        }

        let server_hello = match message {
            ServerMessage::Handshake(HandshakeReply::Accepted(server_hello)) => server_hello,
            ServerMessage::Handshake(HandshakeReply::Rejected { version, reason }) => {
                return Err(ClientError::ProtocolIncompatible {
                    client: hello.version,
                    server: version,
                    reason,
                });
            }
            ServerMessage::Response(response) => {
                return Err(ClientError::MalformedReply(format!(
                    "expected a handshake reply, got {}",
                    response.kind()
                )));
            }
        };

        if !hello.version.is_compatible_with(&server_hello.version) {
            return Err(ClientError::ProtocolIncompatible {
                client: hello.version,
                server: server_hello.version,
                reason: "major version mismatch".to_string(),
            });
        }

        let (read_half, write_half) = stream.into_split();
        let connection = Self::spawn_io(
            endpoint.to_string(),
            peer_addr,
            read_half,
            write_half,
            buf,
            outbox_capacity,
        );
        Ok((connection, server_hello))
    }

    /// Starts the reader and writer tasks on the current runtime.
    fn spawn_io(
        endpoint: String,
        peer_addr: SocketAddr,
        read_half: OwnedReadHalf,
        write_half: OwnedWriteHalf,
        buffered: BytesMut,
        outbox_capacity: usize,
    ) -> Self {
        let (outbox_tx, outbox_rx) = mpsc::channel(outbox_capacity);
        let pending: Arc<PendingRequests> = Arc::new(DashMap::new());
        let closed = Arc::new(AtomicBool::new(false));

        let writer = tokio::spawn(write_loop(
            endpoint.clone(),
            write_half,
            outbox_rx,
            Arc::clone(&pending),
            Arc::clone(&closed),
        ));
        let reader = tokio::spawn(read_loop(
            endpoint.clone(),
            read_half,
            buffered,
            Arc::clone(&pending),
            Arc::clone(&closed),
        ));

        Self {
            endpoint,
            peer_addr,
            outbox: outbox_tx,
            pending,
            next_request_id: AtomicU64::new(HANDSHAKE_REQUEST_ID + 1),
            closed,
            tasks: Mutex::new(vec![writer, reader]),
        }
    }

    /// Sends a request and waits for its reply.
    ///
    /// `timeout` bounds the whole exchange, including the wait for room in
    /// the outbox when the peer stops reading.
    pub(crate) async fn request(
        &self,
        request: Request,
        timeout: Duration,
    ) -> ClientResult<Response> {
        if self.is_closed() {
            return Err(ClientError::SessionClosed);
        }

        let operation = request.kind();
        let request_id = self.next_request_id.fetch_add(1, Ordering::Relaxed);
        let data = frame::encode(request_id, &ClientMessage::Request(request))
            .map_err(|e| ClientError::InvalidRequest(e.to_string()))?;

        let (reply_tx, reply_rx) = oneshot::channel();
        self.pending.insert(request_id, reply_tx);

        // A shutdown racing with the insert above may have drained the table already.
        if self.is_closed() {
            self.pending.remove(&request_id);
            return Err(ClientError::SessionClosed);
        }

        let started = Instant::now();
        trace!("sending {} request {} to {}", operation, request_id, self.endpoint);

        let exchange = async {
            if self.outbox.send(data).await.is_err() {
                self.pending.remove(&request_id);
                return Err(ClientError::SessionClosed);
            }
            reply_rx.await.unwrap_or(Err(ClientError::SessionClosed))
        };

        match tokio::time::timeout(timeout, exchange).await {
            Ok(reply) => reply,
            Err(_) => {
                self.pending.remove(&request_id);
                debug!(
                    "{} request {} to {} timed out after {:?}",
                    operation, request_id, self.endpoint, timeout
                );
                Err(ClientError::timeout(operation, started.elapsed()))
            }
        }
    }

    /// Closes the connection. In-flight requests complete with `SessionClosed`.
    pub(crate) fn shutdown(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            fail_pending(&self.pending, || ClientError::SessionClosed);
        }
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
    }

    /// Returns true once the connection is shut down or broken.
    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Number of requests waiting for a reply.
    pub(crate) fn pending_requests(&self) -> usize {
        self.pending.len()
    }

    /// Endpoint as configured.
    pub(crate) fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Resolved peer address.
    pub(crate) fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Completes every pending request with an error built by `make_error`.
fn fail_pending(pending: &PendingRequests, make_error: impl Fn() -> ClientError) {
    let ids: Vec<RequestId> = pending.iter().map(|entry| *entry.key()).collect();
    for id in ids {
        if let Some((_, reply_tx)) = pending.remove(&id) {
            let _ = reply_tx.send(Err(make_error()));
        }
    }
}

/// Marks the connection broken and fails everything in flight.
fn mark_broken(
    endpoint: &str,
    pending: &PendingRequests,
    closed: &AtomicBool,
    reason: &str,
    make_error: impl Fn() -> ClientError,
) {
    if closed.swap(true, Ordering::SeqCst) {
        return;
    }
    warn!("connection to {} lost: {}", endpoint, reason);
    fail_pending(pending, make_error);
}

async fn write_loop(
    endpoint: String,
    mut writer: OwnedWriteHalf,
    mut outbox: mpsc::Receiver<Bytes>,
    pending: Arc<PendingRequests>,
    closed: Arc<AtomicBool>,
) {
    while let Some(data) = outbox.recv().await {
        if let Err(e) = frame::write_frame(&mut writer, &data).await {
            let reason = format!("write failed: {e}");
            mark_broken(&endpoint, &pending, &closed, &reason, || {
                ClientError::Transport(reason.clone())
            });
            return;
        }
    }
    let _ = writer.shutdown().await;
}

async fn read_loop(
    endpoint: String,
    mut reader: OwnedReadHalf,
    mut buf: BytesMut,
    pending: Arc<PendingRequests>,
    closed: Arc<AtomicBool>,
) {
    // A corrupt header is the peer's fault; anything else is the stream's.
    let (reason, malformed) = loop {
        match frame::read_frame(&mut reader, &mut buf).await {
            Ok(Some(data)) => {
                if let Err(e) = dispatch_reply(&pending, data) {
                    break (format!("unreadable frame: {e}"), true);
                }
            }
            Ok(None) => break ("connection closed by peer".to_string(), false),
            Err(e @ (ProtoError::InvalidMagic(_) | ProtoError::FrameTooLarge(_))) => {
                break (format!("invalid reply header: {e}"), true);
            }
            Err(e) => break (format!("read failed: {e}"), false),
        }
    };
    mark_broken(&endpoint, &pending, &closed, &reason, || {
        if malformed {
            ClientError::MalformedReply(reason.clone())
        } else {
            ClientError::Transport(reason.clone())
        }
    });
}

/// Routes one reply frame to its waiter.
///
/// Header errors leave the stream unusable and are returned; payload errors
/// only fail the request they belong to.
fn dispatch_reply(pending: &PendingRequests, data: Bytes) -> ClientResult<()> {
    let (request_id, payload) = frame::split(data)?;

    let reply = match frame::decode_payload::<ServerMessage>(&payload) {
        Ok(ServerMessage::Response(response)) => Ok(response),
        Ok(ServerMessage::Handshake(_)) => Err(ClientError::MalformedReply(
            "handshake reply on an established session".to_string(),
        )),
        Err(e) => Err(ClientError::from(e)),
    };

    match pending.remove(&request_id) {
        Some((_, reply_tx)) => {
            let _ = reply_tx.send(reply);
        }
        None => debug!("discarding reply for unknown or expired request {}", request_id),
    }
    Ok(())
}
