//! WebSocket connection to the `rsdd` daemon.
//!
//! A [`DaemonConnection`] multiplexes RPC calls over one socket. Each call
//! carries a fresh call id; a background reader matches [`RpcMessage::Reply`]
//! frames to waiting callers and forwards [`Signal`]s to the receiver
//! returned by [`DaemonConnection::connect`]. Replies and signals may arrive
//! in any interleaving.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use rsd_proto::envelope::EnvelopeError;
use rsd_proto::rpc::{self, CodecError, Method, RpcError, RpcMessage, Signal};

/// Type alias for the write half of a WebSocket connection.
type WsSender = futures_util::stream::SplitSink<
    WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>,
    Message,
>;

/// Type alias for the read half of a WebSocket connection.
type WsReader =
    futures_util::stream::SplitStream<WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>>;

/// Callers waiting for a reply, keyed by call id.
type PendingCalls = Arc<parking_lot::Mutex<HashMap<u64, ReplySlot>>>;

/// Where the reader task sends one call's outcome.
type ReplySlot = oneshot::Sender<Result<String, RpcError>>;

/// Errors from talking to the daemon.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// Connecting or waiting for a reply took too long.
    #[error("timed out waiting for the daemon")]
    Timeout,

    /// The daemon could not be reached.
    #[error("daemon unreachable at {url}: {reason}")]
    Unreachable {
        /// Endpoint that was tried.
        url: String,
        /// Underlying failure.
        reason: String,
    },

    /// The socket closed before a reply arrived.
    #[error("connection to daemon closed")]
    ConnectionClosed,

    /// A frame could not be encoded.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// The daemon answered with an error.
    #[error("daemon rejected call: {0}")]
    Remote(#[from] RpcError),

    /// An argument or reply payload is not a valid envelope.
    #[error("envelope error: {0}")]
    Envelope(#[from] EnvelopeError),
}

/// Build the WebSocket endpoint for a daemon listening on `addr`.
///
/// # Errors
///
/// Returns [`ConnectionError::Unreachable`] when `addr` does not form a valid URL.
pub fn endpoint(addr: &str) -> Result<url::Url, ConnectionError> {
    let raw = format!("ws://{addr}/ws");
    url::Url::parse(&raw).map_err(|e| ConnectionError::Unreachable {
        url: raw,
        reason: e.to_string(),
    })
}

/// A live RPC connection to the daemon.
pub struct DaemonConnection {
    /// The endpoint this connection was opened against.
    url: url::Url,
    /// Write half of the socket, shared by concurrent callers.
    ws_sender: Arc<Mutex<WsSender>>,
    /// Reply slots for in-flight calls.
    pending: PendingCalls,
    next_call_id: AtomicU64,
    /// Cleared by the reader when the socket goes away.
    connected: Arc<AtomicBool>,
    call_timeout: Duration,
    reader_handle: tokio::task::JoinHandle<()>,
}

impl DaemonConnection {
    /// Connect to the daemon listening on `addr` (`host:port`).
    ///
    /// Returns the connection and the stream of signals the daemon pushes.
    ///
    /// # Errors
    ///
    /// - [`ConnectionError::Timeout`] if the handshake exceeds `connect_timeout`.
    /// - [`ConnectionError::Unreachable`] if nothing accepts the connection.
    pub async fn connect(
        addr: &str,
        connect_timeout: Duration,
        call_timeout: Duration,
    ) -> Result<(Self, mpsc::UnboundedReceiver<Signal>), ConnectionError> {
        let url = endpoint(addr)?;
        let (ws_stream, _response) =
            tokio::time::timeout(connect_timeout, connect_async(url.as_str()))
                .await
                .map_err(|_| {
                    tracing::warn!(url = %url, "daemon connect timed out");
                    ConnectionError::Timeout
                })?
                .map_err(|e| {
                    tracing::warn!(url = %url, err = %e, "daemon connect failed");
                    ConnectionError::Unreachable {
                        url: url.to_string(),
                        reason: e.to_string(),
                    }
                })?;
        tracing::debug!(url = %url, "connected to daemon");

        let (ws_sender, ws_reader) = ws_stream.split();
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        let pending = PendingCalls::default();
        let connected = Arc::new(AtomicBool::new(true));

        let reader_handle = tokio::spawn(reader_loop(
            ws_reader,
            Arc::clone(&pending),
            signal_tx,
            Arc::clone(&connected),
        ));

        let conn = Self {
            url,
            ws_sender: Arc::new(Mutex::new(ws_sender)),
            pending,
            next_call_id: AtomicU64::new(1),
            connected,
            call_timeout,
            reader_handle,
        };
        Ok((conn, signal_rx))
    }

    /// The endpoint this connection talks to.
    pub const fn url(&self) -> &url::Url {
        &self.url
    }

    /// Whether the socket is still open.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    /// Invoke `method` with `args` and wait for its reply.
    ///
    /// # Errors
    ///
    /// - [`ConnectionError::ConnectionClosed`] if the socket is gone.
    /// - [`ConnectionError::Timeout`] if no reply arrives within the call timeout.
    /// - [`ConnectionError::Remote`] if the daemon answers with an error.
    pub async fn call(&self, method: Method, args: Vec<String>) -> Result<String, ConnectionError> {
        let call_id = self.next_call_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(call_id, tx);

        // The reader clears the flag before failing pending calls, so a call
        // registered after that sweep sees it here.
        if !self.is_connected() {
            self.forget(call_id);
            return Err(ConnectionError::ConnectionClosed);
        }

        let bytes = rpc::encode(&RpcMessage::Call {
            call_id,
            method,
            args,
        })
        .inspect_err(|_| self.forget(call_id))?;

        let sent = {
            let mut sender = self.ws_sender.lock().await;
            sender.send(Message::Binary(bytes.into())).await
        };
        if let Err(e) = sent {
            tracing::warn!(err = %e, %method, "daemon send failed");
            self.connected.store(false, Ordering::Relaxed);
            self.forget(call_id);
            return Err(ConnectionError::ConnectionClosed);
        }
        tracing::trace!(call_id, %method, "call sent");

        match tokio::time::timeout(self.call_timeout, rx).await {
            Ok(Ok(outcome)) => Ok(outcome?),
            Ok(Err(_)) => Err(ConnectionError::ConnectionClosed),
            Err(_) => {
                tracing::warn!(call_id, %method, "daemon reply timed out");
                self.forget(call_id);
                Err(ConnectionError::Timeout)
            }
        }
    }

    /// Send a close frame. Pending calls fail once the daemon closes its side.
    pub async fn close(&self) {
        let mut sender = self.ws_sender.lock().await;
        if let Err(e) = sender.close().await {
            tracing::debug!(err = %e, "daemon close failed");
        }
    }

    fn forget(&self, call_id: u64) {
        self.pending.lock().remove(&call_id);
    }
}

impl Drop for DaemonConnection {
    fn drop(&mut self) {
        self.reader_handle.abort();
    }
}

impl std::fmt::Debug for DaemonConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DaemonConnection")
            .field("url", &self.url.as_str())
            .field("connected", &self.is_connected())
            .field("pending", &self.pending.lock().len())
            .finish_non_exhaustive()
    }
}

/// Background task that routes incoming frames.
///
/// Replies complete their pending call; signals go to `signals`. Malformed
/// frames are logged and skipped. On exit the connection is marked closed
/// and every pending caller is released with `ConnectionClosed`.
async fn reader_loop(
    mut ws_reader: WsReader,
    pending: PendingCalls,
    signals: mpsc::UnboundedSender<Signal>,
    connected: Arc<AtomicBool>,
) {
    while let Some(msg_result) = ws_reader.next().await {
        match msg_result {
            Ok(Message::Binary(data)) => match rpc::decode(&data) {
                Ok(RpcMessage::Reply { call_id, outcome }) => {
                    let Some(slot) = pending.lock().remove(&call_id) else {
                        tracing::debug!(call_id, "reply for unknown or expired call");
                        continue;
                    };
                    if slot.send(outcome).is_err() {
                        tracing::debug!(call_id, "caller gone before reply");
                    }
                }
                Ok(RpcMessage::Signal(signal)) => {
                    if signals.send(signal).is_err() {
                        tracing::debug!("signal receiver dropped, discarding signal");
                    }
                }
                Ok(RpcMessage::Call { call_id, method, .. }) => {
                    tracing::debug!(call_id, %method, "unexpected call from daemon");
                }
                Err(e) => {
                    tracing::warn!(err = %e, "malformed daemon frame, skipping");
                }
            },
            Ok(Message::Close(_)) => {
                tracing::debug!("daemon closed the connection");
                break;
            }
            Ok(Message::Ping(_) | Message::Pong(_) | Message::Text(_) | Message::Frame(_)) => {}
            Err(e) => {
                tracing::warn!(err = %e, "daemon WebSocket read error");
                break;
            }
        }
    }
    connected.store(false, Ordering::Relaxed);
    pending.lock().clear();
    tracing::debug!("daemon reader task exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use rsd_daemon::context::DaemonContext;
    use rsd_daemon::pubsub::DaemonChannel;
    use rsd_daemon::rpc::RpcDispatcher;
    use rsd_daemon::server::{DaemonServer, start_server};
    use rsd_daemon::service::TaskService;
    use rsd_daemon::store::{DescriptionStore, TaskStore};
    use rsd_proto::rpc::RpcErrorKind;

    const TIMEOUT: Duration = Duration::from_secs(5);

    async fn start(dir: &tempfile::TempDir) -> (DaemonServer, Arc<DaemonChannel>) {
        let ctx = DaemonContext::new(
            TaskStore::new(dir.path().join("tasks.json")),
            DescriptionStore::new(dir.path().join("descriptions")),
        );
        let channel = Arc::new(DaemonChannel::new());
        let dispatcher = Arc::new(RpcDispatcher::new(
            TaskService::new(Arc::new(ctx)),
            Arc::clone(&channel),
        ));
        (start_server("127.0.0.1:0", dispatcher).await.unwrap(), channel)
    }

    async fn connect(server: &DaemonServer) -> (DaemonConnection, mpsc::UnboundedReceiver<Signal>) {
        DaemonConnection::connect(&server.local_addr().to_string(), TIMEOUT, TIMEOUT)
            .await
            .unwrap()
    }

    #[test]
    fn endpoint_points_at_ws_path() {
        let url = endpoint("127.0.0.1:7717").unwrap();
        assert_eq!(url.as_str(), "ws://127.0.0.1:7717/ws");
    }

    #[tokio::test]
    async fn ping_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let (server, _) = start(&dir).await;
        let (conn, _signals) = connect(&server).await;
        assert!(conn.is_connected());
        assert_eq!(conn.call(Method::Ping, vec![]).await.unwrap(), "pong");
    }

    #[tokio::test]
    async fn concurrent_calls_get_their_own_replies() {
        let dir = tempfile::tempdir().unwrap();
        let (server, _) = start(&dir).await;
        let (conn, _signals) = connect(&server).await;
        let conn = Arc::new(conn);

        let handles: Vec<_> = (0..10)
            .map(|i| {
                let conn = Arc::clone(&conn);
                tokio::spawn(async move {
                    let id = format!(r#"{{"id": "missing-{i}"}}"#);
                    conn.call(Method::GetDescription, vec![id]).await
                })
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), "");
        }
    }

    #[tokio::test]
    async fn remote_error_is_surfaced() {
        let dir = tempfile::tempdir().unwrap();
        let (server, _) = start(&dir).await;
        let (conn, _signals) = connect(&server).await;
        let err = conn
            .call(Method::AddTask, vec![r#"{"neither": 1}"#.to_string()])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ConnectionError::Remote(RpcError {
                kind: RpcErrorKind::InvalidPayload,
                ..
            })
        ));
        // The connection stays usable after a rejected call.
        assert_eq!(conn.call(Method::Ping, vec![]).await.unwrap(), "pong");
    }

    #[tokio::test]
    async fn broadcast_signals_reach_the_receiver() {
        let dir = tempfile::tempdir().unwrap();
        let (server, channel) = start(&dir).await;
        let (_conn, mut signals) = connect(&server).await;

        // Wait until the daemon has registered the connection.
        tokio::time::timeout(TIMEOUT, async {
            while channel.client_count() == 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        channel.publish("task/pin", "hello");
        let signal = tokio::time::timeout(TIMEOUT, signals.recv()).await.unwrap().unwrap();
        assert_eq!(
            signal,
            Signal::Broadcast {
                topic: "task/pin".to_string(),
                payload: "hello".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn unreachable_daemon_is_reported() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let err = DaemonConnection::connect(&addr, TIMEOUT, TIMEOUT).await.unwrap_err();
        assert!(matches!(err, ConnectionError::Unreachable { .. }));
    }

    #[tokio::test]
    async fn calls_fail_after_daemon_stops() {
        let dir = tempfile::tempdir().unwrap();
        let (server, _) = start(&dir).await;
        let (conn, _signals) = connect(&server).await;
        server.stop(TIMEOUT).await.unwrap();

        tokio::time::timeout(TIMEOUT, async {
            while conn.is_connected() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
        let err = conn.call(Method::Ping, vec![]).await.unwrap_err();
        assert!(matches!(err, ConnectionError::ConnectionClosed));
    }
}
