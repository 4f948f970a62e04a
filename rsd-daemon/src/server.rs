//! WebSocket server: connection handling and frame routing.
//!
//! Each client connects to `/ws` and exchanges postcard-encoded
//! [`RpcMessage`] binary frames. Calls are answered with replies carrying
//! the same `call_id`; signals from the [`DaemonChannel`] are interleaved on
//! the same socket.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use rsd_proto::rpc::{self, RpcMessage, Signal};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;

use crate::pubsub::DaemonChannel;
use crate::rpc::RpcDispatcher;

/// Errors raised while running the server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// The listener could not bind.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Requested address.
        addr: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The listener bound to an address outside the loopback interface.
    #[error("refusing to serve on non-loopback address {0}")]
    NotLoopback(SocketAddr),

    /// The server task panicked or was aborted.
    #[error("server task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    /// The server did not stop within the shutdown timeout.
    #[error("server did not stop within {0:?}")]
    ShutdownTimeout(Duration),
}

/// Shared state handed to every connection.
struct ServerState {
    dispatcher: Arc<RpcDispatcher>,
    shutdown: watch::Receiver<bool>,
    next_conn: AtomicU64,
}

/// A running daemon server.
#[derive(Debug)]
pub struct DaemonServer {
    addr: SocketAddr,
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl DaemonServer {
    /// The bound address (useful when binding port 0).
    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Stops accepting clients and closes every open connection.
    pub fn shutdown(&self) {
        tracing::info!("shutting down server");
        let _ = self.shutdown.send(true);
    }

    /// Waits for the server task to finish.
    ///
    /// # Errors
    ///
    /// Returns `ServerError::Join` if the server task panicked.
    pub async fn wait(self) -> Result<(), ServerError> {
        Ok(self.handle.await?)
    }

    /// Signals shutdown and waits up to `timeout` for the server to stop.
    /// The server task is aborted if it overruns.
    ///
    /// # Errors
    ///
    /// Returns `ServerError::ShutdownTimeout` on overrun, or
    /// `ServerError::Join` if the server task panicked.
    pub async fn stop(self, timeout: Duration) -> Result<(), ServerError> {
        self.shutdown();
        let abort = self.handle.abort_handle();
        match tokio::time::timeout(timeout, self.handle).await {
            Ok(joined) => Ok(joined?),
            Err(_) => {
                abort.abort();
                Err(ServerError::ShutdownTimeout(timeout))
            }
        }
    }
}

/// Starts the daemon server on `addr` and returns once it is listening.
///
/// # Errors
///
/// Returns an error if the listener cannot bind or binds a non-loopback
/// address.
pub async fn start_server(
    addr: &str,
    dispatcher: Arc<RpcDispatcher>,
) -> Result<DaemonServer, ServerError> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind {
            addr: addr.to_string(),
            source,
        })?;
    let bound_addr = listener.local_addr().map_err(|source| ServerError::Bind {
        addr: addr.to_string(),
        source,
    })?;
    if !bound_addr.ip().is_loopback() {
        return Err(ServerError::NotLoopback(bound_addr));
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let channel = Arc::clone(dispatcher.channel());
    let state = Arc::new(ServerState {
        dispatcher,
        shutdown: shutdown_rx.clone(),
        next_conn: AtomicU64::new(1),
    });
    let app = axum::Router::new()
        .route("/ws", axum::routing::get(ws_handler))
        .with_state(state);

    channel.set_serving(true);
    let mut stop = shutdown_rx;
    let handle = tokio::spawn(async move {
        let graceful = async move {
            let _ = stop.wait_for(|stopped| *stopped).await;
        };
        if let Err(e) = axum::serve(listener, app).with_graceful_shutdown(graceful).await {
            tracing::error!(error = %e, "server error");
        }
        channel.set_serving(false);
        tracing::info!("server stopped");
    });

    tracing::info!(addr = %bound_addr, "daemon listening");
    Ok(DaemonServer {
        addr: bound_addr,
        shutdown: shutdown_tx,
        handle,
    })
}

/// axum handler that upgrades an HTTP request to a WebSocket connection.
async fn ws_handler(
    ws: axum::extract::ws::WebSocketUpgrade,
    axum::extract::State(state): axum::extract::State<Arc<ServerState>>,
) -> impl axum::response::IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handles one client connection until it closes or the server shuts down.
async fn handle_socket(socket: WebSocket, state: Arc<ServerState>) {
    let conn_id = state.next_conn.fetch_add(1, Ordering::Relaxed);
    tracing::info!(conn_id, "client connected");

    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
    let mut signals = state.dispatcher.channel().signals();

    // Writer: replies from the reply queue and signals from the channel.
    let mut write_task = tokio::spawn(async move {
        loop {
            let msg = tokio::select! {
                reply = rx.recv() => match reply {
                    Some(msg) => msg,
                    None => break,
                },
                signal = signals.recv() => match signal {
                    Ok(signal) => match encode_signal(signal) {
                        Some(msg) => msg,
                        None => continue,
                    },
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        tracing::warn!(conn_id, missed, "client lagging, signals dropped");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            };
            if ws_sender.send(msg).await.is_err() {
                tracing::warn!(conn_id, "WebSocket write failed");
                break;
            }
        }
        let _ = ws_sender.send(Message::Close(None)).await;
    });

    // Reader: decode frames and run calls.
    let reader_state = Arc::clone(&state);
    let mut read_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_receiver.next().await {
            match msg {
                Message::Binary(data) => handle_frame(conn_id, &data, &reader_state, &tx),
                Message::Close(_) => {
                    tracing::info!(conn_id, "received close frame");
                    break;
                }
                _ => {
                    // Ignore text, ping, pong frames.
                }
            }
        }
    });

    let mut shutdown = state.shutdown.clone();
    tokio::select! {
        _ = &mut read_task => {
            write_task.abort();
        }
        _ = &mut write_task => {
            read_task.abort();
        }
        _ = shutdown.wait_for(|stopped| *stopped) => {
            read_task.abort();
            write_task.abort();
        }
    }
    tracing::info!(conn_id, "client disconnected");
}

/// Decodes one binary frame. Calls run on their own task so a disconnect
/// never interrupts a mutation halfway; the dispatcher gate keeps them
/// serialized.
fn handle_frame(
    conn_id: u64,
    data: &[u8],
    state: &Arc<ServerState>,
    tx: &mpsc::UnboundedSender<Message>,
) {
    let msg = match rpc::decode(data) {
        Ok(m) => m,
        Err(e) => {
            tracing::warn!(conn_id, error = %e, "failed to decode frame");
            return;
        }
    };

    match msg {
        RpcMessage::Call {
            call_id,
            method,
            args,
        } => {
            tracing::debug!(conn_id, call_id, method = %method, "call received");
            let dispatcher = Arc::clone(&state.dispatcher);
            let tx = tx.clone();
            tokio::spawn(async move {
                let outcome = dispatcher.handle(method, &args).await;
                let reply = RpcMessage::Reply { call_id, outcome };
                match rpc::encode(&reply) {
                    Ok(bytes) => {
                        let _ = tx.send(Message::Binary(bytes.into()));
                    }
                    Err(e) => {
                        tracing::error!(conn_id, call_id, error = %e, "failed to encode reply");
                    }
                }
            });
        }
        other => {
            tracing::warn!(conn_id, msg = ?other, "unexpected frame from client");
        }
    }
}

fn encode_signal(signal: Signal) -> Option<Message> {
    match rpc::encode(&RpcMessage::Signal(signal)) {
        Ok(bytes) => Some(Message::Binary(bytes.into())),
        Err(e) => {
            tracing::error!(error = %e, "failed to encode signal");
            None
        }
    }
}
