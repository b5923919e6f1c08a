//! Client sessions.
//!
//! A [`Client`] is a handle to one live, handshaken connection to a cluster
//! node. It only exists once the handshake has succeeded; bring-up either
//! yields a ready session or an error, never a half-open one.

mod bootstrap;

use std::fmt;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use cinder_proto::{Capabilities, ProtocolVersion};
use parking_lot::RwLock;

use crate::catalog::CatalogClient;
use crate::config::ClientConfig;
use crate::connection::Connection;
use crate::error::{ClientError, ClientResult, ErrorKind};
use crate::logging::SessionLogger;
use crate::result::{ensure_blocking_allowed, Deferred, OpResult};
use crate::runtime::ClientRuntime;
use crate::tables::Tables;

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// Bring-up in progress.
    Connecting,
    /// Handshake done; operations are accepted.
    Ready,
    /// `close()` in progress.
    Closing,
    /// Closed locally or by the peer.
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Connecting => write!(f, "connecting"),
            SessionState::Ready => write!(f, "ready"),
            SessionState::Closing => write!(f, "closing"),
            SessionState::Closed => write!(f, "closed"),
        }
    }
}

/// Statistics about session usage.
#[derive(Debug, Clone, Default)]
pub struct ClientStats {
    /// Catalog requests issued.
    pub requests: u64,
    /// Catalog requests that failed.
    pub failed_requests: u64,
    /// Catalog requests that timed out.
    pub timeouts: u64,
    /// Tables returned by lookups and listings.
    pub tables_resolved: u64,
    /// Connection attempts made during bring-up.
    pub connection_attempts: u64,
    /// Connection attempts that failed during bring-up.
    pub connection_failures: u64,
    /// Requests currently waiting for a reply.
    pub in_flight: usize,
}

/// Shared state behind every clone of a [`Client`].
pub(crate) struct SessionInner {
    config: ClientConfig,
    logger: SessionLogger,
    /// Default schema, already normalized.
    default_schema: String,
    session_id: u64,
    server_version: ProtocolVersion,
    capabilities: Capabilities,
    node_name: String,
    connected_at: Instant,
    state: RwLock<SessionState>,
    stats: RwLock<ClientStats>,
    catalog: CatalogClient,
    connection: Arc<Connection>,
    /// Declared last so the connection's tasks are aborted before the
    /// runtime shuts down.
    runtime: ClientRuntime,
}

impl SessionInner {
    /// Current state; a connection broken by the peer reads as `Closed`.
    fn state(&self) -> SessionState {
        let state = *self.state.read();
        if state == SessionState::Ready && self.connection.is_closed() {
            SessionState::Closed
        } else {
            state
        }
    }

    fn ensure_ready(&self) -> ClientResult<()> {
        match self.state() {
            SessionState::Ready => Ok(()),
            _ => Err(ClientError::SessionClosed),
        }
    }

    pub(crate) fn default_schema(&self) -> &str {
        &self.default_schema
    }

    pub(crate) fn catalog(&self) -> &CatalogClient {
        &self.catalog
    }

    /// Spawns onto the session runtime.
    pub(crate) fn spawn<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.runtime.spawn(future);
    }

    /// Runs one catalog operation, refusing it unless the session is ready
    /// and keeping the statistics.
    pub(crate) async fn call<T, F>(&self, operation: F, resolved: impl Fn(&T) -> usize) -> ClientResult<T>
    where
        F: Future<Output = ClientResult<T>>,
    {
        self.ensure_ready()?;
        self.stats.write().requests += 1;

        let result = operation.await;

        let mut stats = self.stats.write();
        match &result {
            Ok(value) => stats.tables_resolved += resolved(value) as u64,
            Err(e) => {
                stats.failed_requests += 1;
                if e.kind() == ErrorKind::Timeout {
                    stats.timeouts += 1;
                }
            }
        }
        result
    }

    fn close(&self) {
        {
            let mut state = self.state.write();
            if matches!(*state, SessionState::Closing | SessionState::Closed) {
                return;
            }
            *state = SessionState::Closing;
        }

        self.logger.info(format!(
            "closing session {} to {}",
            self.session_id,
            self.connection.endpoint()
        ));
        self.connection.shutdown();
        *self.state.write() = SessionState::Closed;
    }
}

impl Drop for SessionInner {
    fn drop(&mut self) {
        self.close();
    }
}

/// Handle to a ready session.
///
/// Clones share the session. The session closes on [`close`](Self::close)
/// or when the last clone is dropped, which may happen on any thread,
/// including inside a sink.
///
/// ```rust,no_run
/// use std::time::Duration;
/// use cinder_client::{Client, ClientConfig};
///
/// let config = ClientConfig::new(["127.0.0.1:10800"]);
/// let client = Client::start(config, Duration::from_secs(5))?;
/// let table = client.tables().get_table("PUB.TBL1").wait()?;
/// println!("{:?}", table.map(|t| t.name().to_string()));
/// # Ok::<(), cinder_client::ClientError>(())
/// ```
#[derive(Clone)]
pub struct Client {
    inner: Arc<SessionInner>,
}

impl Client {
    /// Starts a session, blocking until it is ready or `deadline` expires.
    ///
    /// Must not be called from inside an async runtime; use
    /// [`start_deferred`](Self::start_deferred) and await it there.
    pub fn start(config: ClientConfig, deadline: Duration) -> ClientResult<Client> {
        ensure_blocking_allowed()?;
        Self::start_deferred(config, deadline).wait()
    }

    /// Starts a session and resolves the returned deferred result with it.
    pub fn start_deferred(config: ClientConfig, deadline: Duration) -> Deferred<Client> {
        let (promise, deferred) = Deferred::pair();
        Self::start_async(config, deadline, promise.into_sink());
        deferred
    }

    /// Starts a session and hands the outcome to `sink`.
    ///
    /// Returns immediately. The sink is invoked exactly once: inline for an
    /// invalid configuration, otherwise on a client IO thread.
    pub fn start_async<F>(config: ClientConfig, deadline: Duration, sink: F)
    where
        F: FnOnce(OpResult<Client>) + Send + 'static,
    {
        if let Err(e) = config.validate() {
            sink(OpResult::err(e));
            return;
        }

        let runtime = match ClientRuntime::new(config.worker_threads) {
            Ok(runtime) => runtime,
            Err(e) => {
                sink(OpResult::err(e));
                return;
            }
        };

        let handle = runtime.handle().clone();
        handle.spawn(async move {
            let logger = SessionLogger::new(config.logger.clone());
            let outcome = match bootstrap::establish(&config, deadline, &logger).await {
                Ok(established) => Ok(Client::ready(config, logger, runtime, established)),
                Err(e) => {
                    drop(runtime);
                    Err(e)
                }
            };
            sink(outcome.into());
        });
    }

    fn ready(
        config: ClientConfig,
        logger: SessionLogger,
        runtime: ClientRuntime,
        established: bootstrap::Established,
    ) -> Client {
        let bootstrap::Established {
            connection,
            server,
            connection_attempts,
            connection_failures,
        } = established;

        let connection = Arc::new(connection);
        let catalog = CatalogClient::new(Arc::clone(&connection), config.operation_timeout);
        let default_schema = config.schema_component();

        Client {
            inner: Arc::new(SessionInner {
                logger,
                default_schema,
                session_id: server.session_id,
                server_version: server.version,
                capabilities: server.capabilities,
                node_name: server.node_name,
                connected_at: Instant::now(),
                state: RwLock::new(SessionState::Ready),
                stats: RwLock::new(ClientStats {
                    connection_attempts,
                    connection_failures,
                    ..ClientStats::default()
                }),
                catalog,
                connection,
                runtime,
                config,
            }),
        }
    }

    /// Returns the table discovery facade.
    pub fn tables(&self) -> Tables {
        Tables::new(Arc::clone(&self.inner))
    }

    /// Closes the session.
    ///
    /// In-flight operations complete with `SessionClosed`; later operations
    /// fail the same way. Idempotent.
    pub fn close(&self) {
        self.inner.close();
    }

    /// Returns the session state.
    pub fn state(&self) -> SessionState {
        self.inner.state()
    }

    /// Returns true if operations are accepted.
    pub fn is_ready(&self) -> bool {
        self.state() == SessionState::Ready
    }

    /// Session id assigned by the node.
    pub fn session_id(&self) -> u64 {
        self.inner.session_id
    }

    /// Name of the node serving this session.
    pub fn node_name(&self) -> &str {
        &self.inner.node_name
    }

    /// Protocol version reported by the node.
    pub fn server_version(&self) -> ProtocolVersion {
        self.inner.server_version
    }

    /// Capabilities advertised by the node.
    pub fn server_capabilities(&self) -> Capabilities {
        self.inner.capabilities
    }

    /// Endpoint this session is connected to.
    pub fn endpoint(&self) -> &str {
        self.inner.connection.endpoint()
    }

    /// Resolved address of the node.
    pub fn peer_addr(&self) -> SocketAddr {
        self.inner.connection.peer_addr()
    }

    /// Returns the configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Returns session statistics.
    pub fn stats(&self) -> ClientStats {
        let mut stats = self.inner.stats.read().clone();
        stats.in_flight = self.inner.connection.pending_requests();
        stats
    }

    /// Returns how long the session has been open.
    pub fn connection_duration(&self) -> Duration {
        self.inner.connected_at.elapsed()
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("endpoint", &self.endpoint())
            .field("session_id", &self.session_id())
            .field("node", &self.node_name())
            .field("state", &self.state())
            .finish()
    }
}
