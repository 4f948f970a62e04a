//! Daemon side of the publish/subscribe channel.
//!
//! [`DaemonChannel`] fans outbound signals out to every connected client
//! and dispatches inbound `Publish` calls to daemon-local subscribers.

use std::sync::atomic::{AtomicBool, Ordering};

use rsd_proto::dispatch::{DispatchReport, Event, Handler, SubscriberRegistry, sync_handler};
use rsd_proto::rpc::{STATUS_PUBLISHED, Signal};
use rsd_proto::topics;
use tokio::sync::broadcast;

/// Signals buffered per client before a slow client starts lagging.
const SIGNAL_CAPACITY: usize = 256;

/// Daemon role of the publish/subscribe channel.
#[derive(Debug)]
pub struct DaemonChannel {
    registry: SubscriberRegistry,
    signals: broadcast::Sender<Signal>,
    serving: AtomicBool,
}

impl Default for DaemonChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl DaemonChannel {
    /// Creates a channel that is not yet serving.
    #[must_use]
    pub fn new() -> Self {
        let (signals, _) = broadcast::channel(SIGNAL_CAPACITY);
        Self {
            registry: SubscriberRegistry::new(),
            signals,
            serving: AtomicBool::new(false),
        }
    }

    /// Marks whether the WebSocket server is accepting clients.
    pub fn set_serving(&self, serving: bool) {
        self.serving.store(serving, Ordering::SeqCst);
    }

    /// Whether outbound signals are currently deliverable.
    #[must_use]
    pub fn is_serving(&self) -> bool {
        self.serving.load(Ordering::SeqCst)
    }

    /// Registers a daemon-local handler for `topic`.
    pub fn subscribe(&self, topic: impl Into<String>, handler: impl Handler + 'static) {
        self.registry.subscribe(topic, handler);
    }

    /// Subscribes a wildcard handler that records each client change event
    /// in the daemon log.
    pub fn log_client_events(&self) {
        self.subscribe(
            topics::WILDCARD,
            sync_handler(|event: Event| {
                tracing::debug!(
                    topic = %event.topic,
                    bytes = event.payload.len(),
                    "client change event"
                );
                Ok(())
            }),
        );
    }

    /// Number of daemon-local handlers registered directly under `topic`.
    #[must_use]
    pub fn handler_count(&self, topic: &str) -> usize {
        self.registry.handler_count(topic)
    }

    /// A receiver for every signal emitted from now on. One per connection.
    #[must_use]
    pub fn signals(&self) -> broadcast::Receiver<Signal> {
        self.signals.subscribe()
    }

    /// Number of connections currently receiving signals.
    #[must_use]
    pub fn client_count(&self) -> usize {
        self.signals.receiver_count()
    }

    /// Broadcasts `topic`/`payload` to every client.
    pub fn publish(&self, topic: &str, payload: &str) {
        tracing::debug!(topic = %topic, "broadcasting publish");
        self.emit(Signal::Broadcast {
            topic: topic.to_string(),
            payload: payload.to_string(),
        });
    }

    /// Broadcasts the full serialized task list to every client.
    pub fn task_updated(&self, payload: String) {
        tracing::debug!(bytes = payload.len(), "broadcasting task list");
        self.emit(Signal::TaskUpdated { payload });
    }

    /// Entry point for the `Publish` RPC: delivers to daemon-local handlers
    /// (topic then wildcard) and returns `"published"`.
    pub async fn receive_publish(&self, topic: &str, payload: &str) -> &'static str {
        tracing::info!(topic = %topic, "received publish");
        let DispatchReport { delivered, failed } = self.registry.dispatch(topic, payload).await;
        tracing::debug!(topic = %topic, delivered, failed, "publish dispatched");
        STATUS_PUBLISHED
    }

    fn emit(&self, signal: Signal) {
        if !self.is_serving() {
            tracing::warn!("cannot broadcast: channel is not serving");
            return;
        }
        // Err only means no client is connected right now.
        if self.signals.send(signal).is_err() {
            tracing::debug!("no connected clients for broadcast");
        }
    }
}
