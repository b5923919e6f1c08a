//! In-process cluster node speaking the client protocol.
//!
//! Each node owns its own IO runtime, so it can serve both blocking tests and
//! `tokio::test` tests. Fault injection knobs cover the failure modes the
//! client has to handle: rejected or missing handshakes, slow replies and
//! undecodable replies.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use bytes::{BufMut, Bytes, BytesMut};
use cinder_proto::{
    frame, Capabilities, ClientMessage, ErrorCode, HandshakeReply, ProtocolVersion, Request,
    RequestId, Response, ServerHello, ServerMessage, HANDSHAKE_REQUEST_ID,
};
use parking_lot::RwLock;
use tokio::net::{TcpListener, TcpStream};
use tokio::runtime::Runtime;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::catalog::TestCatalog;

/// Behavior of a test node.
#[derive(Debug, Clone)]
pub struct NodeOptions {
    /// Name reported in the handshake.
    pub node_name: String,
    /// Protocol version reported in the handshake.
    pub protocol_version: ProtocolVersion,
    /// Rejects every handshake with this reason.
    pub reject_reason: Option<String>,
    /// Accepts connections but never answers the handshake.
    pub silent: bool,
    /// Delay before each catalog reply.
    pub reply_delay: Duration,
    /// Replies with frames whose payload cannot be decoded.
    pub corrupt_replies: bool,
    /// Answers catalog requests with a server error.
    pub fail_requests: bool,
}

impl Default for NodeOptions {
    fn default() -> Self {
        Self {
            node_name: "test-node".to_string(),
            protocol_version: ProtocolVersion::CURRENT,
            reject_reason: None,
            silent: false,
            reply_delay: Duration::ZERO,
            corrupt_replies: false,
            fail_requests: false,
        }
    }
}

impl NodeOptions {
    /// Default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the node name.
    pub fn node_name(mut self, name: impl Into<String>) -> Self {
        self.node_name = name.into();
        self
    }

    /// Sets the protocol version reported in the handshake.
    pub fn protocol_version(mut self, version: ProtocolVersion) -> Self {
        self.protocol_version = version;
        self
    }

    /// Rejects every handshake.
    pub fn reject(mut self, reason: impl Into<String>) -> Self {
        self.reject_reason = Some(reason.into());
        self
    }

    /// Never answers handshakes.
    pub fn silent(mut self) -> Self {
        self.silent = true;
        self
    }

    /// Delays every catalog reply.
    pub fn reply_delay(mut self, delay: Duration) -> Self {
        self.reply_delay = delay;
        self
    }

    /// Sends undecodable replies.
    pub fn corrupt_replies(mut self) -> Self {
        self.corrupt_replies = true;
        self
    }
}

/// State shared by the accept loop and connection handlers.
struct NodeState {
    options: RwLock<NodeOptions>,
    catalog: Arc<TestCatalog>,
    next_session_id: AtomicU64,
    sessions_accepted: AtomicU64,
    requests_served: AtomicU64,
}

/// A running test node.
///
/// Stops when dropped or on [`shutdown`](Self::shutdown); open connections
/// are closed with it.
pub struct TestNode {
    address: SocketAddr,
    state: Arc<NodeState>,
    shutdown_tx: watch::Sender<bool>,
    stopped: AtomicBool,
    runtime: Option<Runtime>,
}

impl TestNode {
    /// Starts a node with default options serving a catalog that holds
    /// `PUB.TBL1`.
    pub fn start() -> anyhow::Result<Self> {
        let catalog = Arc::new(TestCatalog::new());
        catalog.create_table("PUB", "TBL1");
        Self::start_with(NodeOptions::default(), catalog)
    }

    /// Starts a node serving `catalog`.
    pub fn start_with(options: NodeOptions, catalog: Arc<TestCatalog>) -> anyhow::Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("cinder-test-node")
            .enable_io()
            .enable_time()
            .build()
            .context("failed to build node runtime")?;

        let std_listener =
            std::net::TcpListener::bind("127.0.0.1:0").context("failed to bind node listener")?;
        std_listener.set_nonblocking(true)?;
        let address = std_listener.local_addr()?;

        let listener = {
            let _guard = runtime.enter();
            TcpListener::from_std(std_listener)?
        };

        info!("test node {} listening on {}", options.node_name, address);

        let state = Arc::new(NodeState {
            options: RwLock::new(options),
            catalog,
            next_session_id: AtomicU64::new(1),
            sessions_accepted: AtomicU64::new(0),
            requests_served: AtomicU64::new(0),
        });

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        runtime.spawn(accept_loop(listener, Arc::clone(&state), shutdown_rx));

        Ok(Self {
            address,
            state,
            shutdown_tx,
            stopped: AtomicBool::new(false),
            runtime: Some(runtime),
        })
    }

    /// Listen address.
    pub fn address(&self) -> SocketAddr {
        self.address
    }

    /// Listen address as a `host:port` endpoint string.
    pub fn endpoint(&self) -> String {
        self.address.to_string()
    }

    /// The catalog this node serves.
    pub fn catalog(&self) -> &Arc<TestCatalog> {
        &self.state.catalog
    }

    /// Catalog requests answered so far.
    pub fn requests_served(&self) -> u64 {
        self.state.requests_served.load(Ordering::SeqCst)
    }

    /// Handshakes accepted so far.
    pub fn sessions_accepted(&self) -> u64 {
        self.state.sessions_accepted.load(Ordering::SeqCst)
    }

    /// Changes the delay before each catalog reply.
    pub fn set_reply_delay(&self, delay: Duration) {
        self.state.options.write().reply_delay = delay;
    }

    /// Switches undecodable replies on or off.
    pub fn set_corrupt_replies(&self, corrupt: bool) {
        self.state.options.write().corrupt_replies = corrupt;
    }

    /// Switches server-error replies on or off.
    pub fn set_fail_requests(&self, fail: bool) {
        self.state.options.write().fail_requests = fail;
    }

    /// Stops the node and drops every open connection.
    pub fn shutdown(&mut self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self.shutdown_tx.send(true);
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
        info!("test node at {} stopped", self.address);
    }
}

impl Drop for TestNode {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for TestNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestNode")
            .field("address", &self.address)
            .field("stopped", &self.stopped)
            .finish()
    }
}

async fn accept_loop(
    listener: TcpListener,
    state: Arc<NodeState>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, addr)) => {
                        debug!("accepted connection from {}", addr);
                        let state = Arc::clone(&state);
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(state, stream).await {
                                warn!("connection error: {:#}", e);
                            }
                        });
                    }
                    Err(e) => warn!("accept error: {}", e),
                }
            }
            _ = shutdown_rx.changed() => break,
        }
    }
}

async fn handle_connection(state: Arc<NodeState>, mut stream: TcpStream) -> anyhow::Result<()> {
    let mut buf = BytesMut::with_capacity(4096);

    let Some(data) = frame::read_frame(&mut stream, &mut buf).await? else {
        return Ok(());
    };
    let (request_id, message): (RequestId, ClientMessage) = frame::decode(data)?;
    let hello = match message {
        ClientMessage::Hello(hello) if request_id == HANDSHAKE_REQUEST_ID => hello,
        other => anyhow::bail!("expected a handshake, got {:?}", other),
    };

    let options = state.options.read().clone();
    if options.silent {
        // Hold the connection open without answering.
        while frame::read_frame(&mut stream, &mut buf).await?.is_some() {}
        return Ok(());
    }

    if let Some(reason) = options.reject_reason {
        let reply = ServerMessage::Handshake(HandshakeReply::Rejected {
            version: options.protocol_version,
            reason,
        });
        let data = frame::encode(HANDSHAKE_REQUEST_ID, &reply)?;
        frame::write_frame(&mut stream, &data).await?;
        return Ok(());
    }

    let session_id = state.next_session_id.fetch_add(1, Ordering::SeqCst);
    let reply = ServerMessage::Handshake(HandshakeReply::Accepted(ServerHello {
        version: options.protocol_version,
        session_id,
        capabilities: Capabilities::CATALOG.with(Capabilities::OUT_OF_ORDER_REPLIES),
        node_name: options.node_name.clone(),
    }));
    let data = frame::encode(HANDSHAKE_REQUEST_ID, &reply)?;
    frame::write_frame(&mut stream, &data).await?;
    state.sessions_accepted.fetch_add(1, Ordering::SeqCst);
    debug!("session {} opened for {}", session_id, hello.client_name);

    let (mut read_half, mut write_half) = stream.into_split();
    let (outbox_tx, mut outbox_rx) = mpsc::channel::<Bytes>(256);

    let writer = tokio::spawn(async move {
        while let Some(data) = outbox_rx.recv().await {
            if frame::write_frame(&mut write_half, &data).await.is_err() {
                break;
            }
        }
    });

    while let Some(data) = frame::read_frame(&mut read_half, &mut buf).await? {
        let (request_id, message): (RequestId, ClientMessage) = frame::decode(data)?;
        let state = Arc::clone(&state);
        let outbox = outbox_tx.clone();
        // Each request is answered independently, so replies can overtake each other.
        tokio::spawn(async move {
            let reply = serve(&state, request_id, message).await;
            match reply {
                Ok(data) => {
                    let _ = outbox.send(data).await;
                }
                Err(e) => warn!("failed to encode reply to {}: {}", request_id, e),
            }
        });
    }

    debug!("session {} closed by client", session_id);
    drop(outbox_tx);
    let _ = writer.await;
    Ok(())
}

async fn serve(
    state: &NodeState,
    request_id: RequestId,
    message: ClientMessage,
) -> anyhow::Result<Bytes> {
    let options = state.options.read().clone();
    if !options.reply_delay.is_zero() {
        tokio::time::sleep(options.reply_delay).await;
    }

    let response = match message {
        ClientMessage::Request(_) if options.fail_requests => Response::Error {
            code: ErrorCode::Internal,
            message: "catalog unavailable".to_string(),
        },
        ClientMessage::Request(Request::GetTable { name }) => {
            Response::Table(state.catalog.get(&name))
        }
        ClientMessage::Request(Request::ListTables) => Response::Tables(state.catalog.list()),
        ClientMessage::Hello(_) => Response::Error {
            code: ErrorCode::InvalidRequest,
            message: "session already established".to_string(),
        },
    };
    state.requests_served.fetch_add(1, Ordering::SeqCst);

    if options.corrupt_replies {
        return Ok(corrupt_frame(request_id));
    }
    Ok(frame::encode(request_id, &ServerMessage::Response(response))?)
}

/// A frame with a valid header and a payload no message decodes from.
fn corrupt_frame(request_id: RequestId) -> Bytes {
    let payload = [0xFFu8; 8];
    let mut buf = BytesMut::with_capacity(frame::HEADER_SIZE + payload.len());
    buf.put_u32(frame::FRAME_MAGIC);
    buf.put_u64(request_id);
    buf.put_u32(payload.len() as u32);
    buf.put_slice(&payload);
    buf.freeze()
}
