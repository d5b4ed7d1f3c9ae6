//! Self-healing telemetry connection.
//!
//! One supervisor task owns at most one socket at a time and walks the
//! states `Disconnected → Connecting → Connected`. Entering `Connecting`
//! arms the idle deadline; a successful connect and every inbound message
//! rearm it. When the deadline passes, or the socket closes or errors, the
//! socket is closed and a new one is opened to the same endpoint. There is
//! no backoff and no retry limit: the server is expected to be on the local
//! network and eventually reachable.
//!
//! A failed connect attempt waits out the armed deadline before retrying,
//! so an unreachable server is tried once per idle period.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::net::TcpStream;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until, timeout_at};
use tokio_tungstenite::tungstenite::Message as Frame;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::error::TransportError;

/// Idle period after which a silent connection is replaced.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(5);

/// Shorter idle timeouts are raised to this.
pub const MIN_IDLE_TIMEOUT: Duration = Duration::from_secs(1);

// ---------------------------------------------------------------------------
// Transport seams
// ---------------------------------------------------------------------------

/// An open connection delivering text payloads.
#[async_trait]
pub trait Socket: Send {
    /// Next payload. `None` once the peer has closed the connection.
    async fn recv(&mut self) -> Option<Result<String, TransportError>>;

    /// Close the connection. Errors are not interesting at this point.
    async fn close(&mut self);
}

/// Opens sockets to an endpoint.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Socket: Socket + 'static;

    async fn connect(&self, endpoint: &str) -> Result<Self::Socket, TransportError>;
}

// ---------------------------------------------------------------------------
// WebSocket transport
// ---------------------------------------------------------------------------

/// Plain `ws://` connector backed by tokio-tungstenite.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

pub struct WsSocket {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl Connector for WsConnector {
    type Socket = WsSocket;

    async fn connect(&self, endpoint: &str) -> Result<WsSocket, TransportError> {
        let (stream, _response) = tokio_tungstenite::connect_async(endpoint)
            .await
            .map_err(|e| TransportError::Connect {
                endpoint: endpoint.to_string(),
                reason: e.to_string(),
            })?;
        Ok(WsSocket { stream })
    }
}

#[async_trait]
impl Socket for WsSocket {
    async fn recv(&mut self) -> Option<Result<String, TransportError>> {
        loop {
            let frame = match self.stream.next().await? {
                Ok(frame) => frame,
                Err(e) => return Some(Err(TransportError::Read(e.to_string()))),
            };
            match frame {
                Frame::Text(text) => return Some(Ok(text.to_string())),
                Frame::Binary(bytes) => match String::from_utf8(bytes.to_vec()) {
                    Ok(text) => return Some(Ok(text)),
                    Err(_) => log::debug!("ignoring non-UTF-8 binary frame"),
                },
                Frame::Close(_) => return None,
                Frame::Ping(_) | Frame::Pong(_) | Frame::Frame(_) => {}
            }
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.stream.close(None).await {
            log::debug!("websocket close: {e}");
        }
    }
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionState {
    pub fn label(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
        }
    }
}

/// Observable supervisor status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConnectionStatus {
    pub state: ConnectionState,
    /// Successful connects so far; the current socket's sequence number.
    pub generation: u64,
    /// Connections or attempts abandoned and replaced.
    pub reconnects: u64,
    /// Payloads delivered to the callback.
    pub messages: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionConfig {
    pub idle_timeout: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
        }
    }
}

// ---------------------------------------------------------------------------
// Manager
// ---------------------------------------------------------------------------

pub struct ConnectionManager<C: Connector> {
    connector: Arc<C>,
    config: ConnectionConfig,
}

impl<C: Connector> ConnectionManager<C> {
    pub fn new(connector: C, config: ConnectionConfig) -> Self {
        let config = ConnectionConfig {
            idle_timeout: config.idle_timeout.max(MIN_IDLE_TIMEOUT),
        };
        Self {
            connector: Arc::new(connector),
            config,
        }
    }

    /// Start supervising a connection to `endpoint`, delivering every payload
    /// to `on_message`. Must be called inside a tokio runtime.
    ///
    /// Dropping the returned handle stops the supervisor as well; call
    /// [`ConnectionHandle::shutdown`] to also wait for the socket to close.
    pub fn connect<F>(&self, endpoint: impl Into<String>, on_message: F) -> ConnectionHandle
    where
        F: FnMut(String) + Send + 'static,
    {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let (status_tx, status_rx) = watch::channel(ConnectionStatus::default());

        let supervisor = Supervisor {
            connector: Arc::clone(&self.connector),
            endpoint: endpoint.into(),
            idle_timeout: self.config.idle_timeout,
            status: status_tx,
        };
        let task = tokio::spawn(supervisor.run(on_message, shutdown_rx));

        ConnectionHandle {
            shutdown: shutdown_tx,
            status: status_rx,
            task,
        }
    }
}

pub struct ConnectionHandle {
    shutdown: oneshot::Sender<()>,
    status: watch::Receiver<ConnectionStatus>,
    task: JoinHandle<()>,
}

impl ConnectionHandle {
    pub fn status(&self) -> ConnectionStatus {
        *self.status.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.clone()
    }

    /// Cancel the idle timer, close the socket and wait for the supervisor.
    pub async fn shutdown(self) {
        let Self { shutdown, task, .. } = self;
        let _ = shutdown.send(());
        if let Err(e) = task.await {
            log::warn!("connection supervisor ended abnormally: {e}");
        }
    }
}

enum Exit {
    Shutdown,
    IdleTimeout,
    Closed,
    Failed(TransportError),
}

struct Supervisor<C: Connector> {
    connector: Arc<C>,
    endpoint: String,
    idle_timeout: Duration,
    status: watch::Sender<ConnectionStatus>,
}

impl<C: Connector> Supervisor<C> {
    async fn run<F>(self, mut on_message: F, mut shutdown: oneshot::Receiver<()>)
    where
        F: FnMut(String) + Send,
    {
        loop {
            self.status.send_modify(|s| s.state = ConnectionState::Connecting);
            let deadline = Instant::now() + self.idle_timeout;
            log::info!("connecting to {}", self.endpoint);

            let attempt = tokio::select! {
                _ = &mut shutdown => break,
                result = timeout_at(deadline, self.connector.connect(&self.endpoint)) => result,
            };

            let mut socket = match attempt {
                Ok(Ok(socket)) => socket,
                Ok(Err(e)) => {
                    log::warn!(
                        "{e}; retrying in {:?}",
                        deadline.saturating_duration_since(Instant::now())
                    );
                    tokio::select! {
                        _ = &mut shutdown => break,
                        _ = sleep_until(deadline) => {}
                    }
                    self.status.send_modify(|s| s.reconnects += 1);
                    continue;
                }
                Err(_) => {
                    log::warn!("{}", TransportError::ConnectTimeout(self.endpoint.clone()));
                    self.status.send_modify(|s| s.reconnects += 1);
                    continue;
                }
            };

            self.status.send_modify(|s| {
                s.state = ConnectionState::Connected;
                s.generation += 1;
            });
            log::info!("connected to {}", self.endpoint);

            let mut deadline = Instant::now() + self.idle_timeout;
            let exit = loop {
                tokio::select! {
                    _ = &mut shutdown => break Exit::Shutdown,
                    _ = sleep_until(deadline) => break Exit::IdleTimeout,
                    frame = socket.recv() => match frame {
                        Some(Ok(payload)) => {
                            deadline = Instant::now() + self.idle_timeout;
                            self.status.send_modify(|s| s.messages += 1);
                            log::trace!("received {} bytes", payload.len());
                            on_message(payload);
                        }
                        Some(Err(e)) => break Exit::Failed(e),
                        None => break Exit::Closed,
                    },
                }
            };

            socket.close().await;
            match exit {
                Exit::Shutdown => break,
                Exit::IdleTimeout => log::info!(
                    "no message for {:?}, reconnecting",
                    self.idle_timeout
                ),
                Exit::Closed => log::info!("server closed the connection, reconnecting"),
                Exit::Failed(e) => log::warn!("{e}, reconnecting"),
            }
            self.status.send_modify(|s| s.reconnects += 1);
        }

        self.status.send_modify(|s| s.state = ConnectionState::Disconnected);
        log::info!("connection to {} shut down", self.endpoint);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
