//! Client side of the publish/subscribe channel.
//!
//! [`ClientChannel`] delivers daemon signals to local subscribers and sends
//! local publishes to the daemon. Publishing never waits: events go onto a
//! queue drained by one task that performs the `Publish` call and logs the
//! result.

use std::sync::Arc;

use parking_lot::Mutex;
use rsd_proto::dispatch::{DispatchReport, Event, Handler, SubscriberRegistry, sync_handler};
use rsd_proto::rpc::{Method, Signal};
use rsd_proto::{Task, envelope, topics};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::connection::DaemonConnection;

/// An attached daemon connection and the tasks serving it.
struct Link {
    connection: Arc<DaemonConnection>,
    outbound: mpsc::UnboundedSender<(String, String)>,
    publisher: JoinHandle<()>,
    pump: JoinHandle<()>,
}

/// Client role of the publish/subscribe channel.
pub struct ClientChannel {
    registry: Arc<SubscriberRegistry>,
    link: Mutex<Option<Link>>,
}

impl Default for ClientChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientChannel {
    /// Creates a channel with no connection attached.
    #[must_use]
    pub fn new() -> Self {
        Self {
            registry: Arc::new(SubscriberRegistry::new()),
            link: Mutex::new(None),
        }
    }

    /// Attaches `connection`, delivering everything received on `signals`
    /// to local subscribers. Any previously attached connection is detached.
    pub fn attach(
        &self,
        connection: Arc<DaemonConnection>,
        mut signals: mpsc::UnboundedReceiver<Signal>,
    ) {
        let registry = Arc::clone(&self.registry);
        let pump = tokio::spawn(async move {
            while let Some(signal) = signals.recv().await {
                deliver(&registry, signal).await;
            }
            tracing::debug!("signal stream ended");
        });

        let (outbound, queue) = mpsc::unbounded_channel();
        let publisher = tokio::spawn(drain_publishes(Arc::clone(&connection), queue));

        let previous = self.link.lock().replace(Link {
            connection,
            outbound,
            publisher,
            pump,
        });
        if let Some(old) = previous {
            tracing::debug!("replacing attached daemon connection");
            old.pump.abort();
        }
    }

    /// Whether a daemon connection is attached.
    pub fn is_attached(&self) -> bool {
        self.link.lock().is_some()
    }

    /// The attached connection, if any.
    pub fn connection(&self) -> Option<Arc<DaemonConnection>> {
        self.link.lock().as_ref().map(|link| Arc::clone(&link.connection))
    }

    /// Registers a local handler for `topic` (or `"*"` for every topic).
    pub fn subscribe(&self, topic: impl Into<String>, handler: impl Handler + 'static) {
        self.registry.subscribe(topic, handler);
    }

    /// Queues `topic`/`payload` for the daemon and returns immediately.
    ///
    /// With no connection attached the event is dropped with a warning.
    pub fn publish(&self, topic: &str, payload: &str) {
        let guard = self.link.lock();
        let Some(link) = guard.as_ref() else {
            tracing::warn!(topic = %topic, "cannot publish: no daemon connection");
            return;
        };
        if link.outbound.send((topic.to_string(), payload.to_string())).is_err() {
            tracing::warn!(topic = %topic, "cannot publish: publisher task has stopped");
        }
    }

    /// Delivers one daemon signal to local subscribers.
    pub async fn deliver(&self, signal: Signal) -> DispatchReport {
        deliver(&self.registry, signal).await
    }

    /// Detaches the connection after every queued publish has been sent.
    pub async fn close(&self) {
        let Some(link) = self.link.lock().take() else {
            return;
        };
        let Link {
            connection,
            outbound,
            publisher,
            pump,
        } = link;
        drop(outbound);
        if let Err(e) = publisher.await {
            tracing::warn!(error = %e, "publisher task failed");
        }
        pump.abort();
        connection.close().await;
    }
}

impl std::fmt::Debug for ClientChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientChannel")
            .field("registry", &self.registry)
            .field("attached", &self.is_attached())
            .finish()
    }
}

/// The most recent task list pushed by the daemon.
///
/// Subscribe [`TaskCache::handler`] to [`topics::UPDATED_TASKS`]; each
/// broadcast replaces the whole list.
#[derive(Debug, Clone, Default)]
pub struct TaskCache {
    latest: Arc<Mutex<Option<Vec<Task>>>>,
}

impl TaskCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A handler that decodes each broadcast and replaces the cached list.
    pub fn handler(&self) -> impl Handler + 'static {
        let latest = Arc::clone(&self.latest);
        sync_handler(move |event: Event| {
            let tasks = envelope::deserialize_tasks(&event.payload)?;
            tracing::debug!(count = tasks.len(), "task list refreshed from daemon");
            *latest.lock() = Some(tasks);
            Ok(())
        })
    }

    /// The last list received, or `None` before the first broadcast.
    #[must_use]
    pub fn latest(&self) -> Option<Vec<Task>> {
        self.latest.lock().clone()
    }
}

/// `TaskUpdated` goes to [`topics::UPDATED_TASKS`]; a `Broadcast` to its own topic.
async fn deliver(registry: &SubscriberRegistry, signal: Signal) -> DispatchReport {
    let (topic, payload) = match signal {
        Signal::TaskUpdated { payload } => (topics::UPDATED_TASKS.to_string(), payload),
        Signal::Broadcast { topic, payload } => (topic, payload),
    };
    tracing::debug!(topic = %topic, "delivering daemon signal");
    registry.dispatch(&topic, &payload).await
}

async fn drain_publishes(
    connection: Arc<DaemonConnection>,
    mut queue: mpsc::UnboundedReceiver<(String, String)>,
) {
    while let Some((topic, payload)) = queue.recv().await {
        match connection.call(Method::Publish, vec![topic.clone(), payload]).await {
            Ok(status) => tracing::debug!(topic = %topic, status = %status, "publish acknowledged"),
            Err(e) => tracing::warn!(topic = %topic, error = %e, "publish failed"),
        }
    }
}
