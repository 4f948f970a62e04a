//! Topic-addressed subscriber registry shared by daemon and client channels.
//!
//! Handlers are registered per topic and invoked in registration order,
//! followed by handlers registered under [`WILDCARD`]. A handler that
//! returns an error or panics is logged and skipped; the rest still run.

use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use parking_lot::RwLock;

use crate::topics::WILDCARD;

/// Error type handlers may return.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Completion result of a handler.
pub type HandlerResult = Result<(), HandlerError>;

/// An event delivered to subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    /// Topic the event was published or broadcast under.
    pub topic: String,
    /// Raw payload text, usually envelope JSON.
    pub payload: String,
}

impl Event {
    /// Creates an event.
    pub fn new(topic: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }
}

/// Subscriber capability: consume an event and report completion.
///
/// Implemented for every `Fn(Event) -> impl Future<Output = HandlerResult>`
/// closure. Synchronous closures are adapted with [`sync_handler`].
pub trait Handler: Send + Sync {
    /// Handles one event.
    fn handle(&self, event: Event) -> BoxFuture<'static, HandlerResult>;
}

impl<F, Fut> Handler for F
where
    F: Fn(Event) -> Fut + Send + Sync,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    fn handle(&self, event: Event) -> BoxFuture<'static, HandlerResult> {
        Box::pin(self(event))
    }
}

/// Adapter returned by [`sync_handler`].
pub struct SyncHandler<F>(F);

impl<F> Handler for SyncHandler<F>
where
    F: Fn(Event) -> HandlerResult + Send + Sync,
{
    fn handle(&self, event: Event) -> BoxFuture<'static, HandlerResult> {
        Box::pin(std::future::ready((self.0)(event)))
    }
}

/// Wraps a synchronous closure as a [`Handler`].
pub const fn sync_handler<F>(f: F) -> SyncHandler<F>
where
    F: Fn(Event) -> HandlerResult + Send + Sync,
{
    SyncHandler(f)
}

/// Outcome counts of one dispatch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Handlers that completed successfully.
    pub delivered: usize,
    /// Handlers that returned an error or panicked.
    pub failed: usize,
}

/// Mapping from topic to an ordered list of handlers.
#[derive(Default)]
pub struct SubscriberRegistry {
    handlers: RwLock<HashMap<String, Vec<Arc<dyn Handler>>>>,
}

impl SubscriberRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a handler to the topic's list.
    pub fn subscribe(&self, topic: impl Into<String>, handler: impl Handler + 'static) {
        let topic = topic.into();
        tracing::debug!(topic = %topic, "subscribed handler");
        self.handlers
            .write()
            .entry(topic)
            .or_default()
            .push(Arc::new(handler));
    }

    /// Number of handlers registered directly under `topic`.
    #[must_use]
    pub fn handler_count(&self, topic: &str) -> usize {
        self.handlers.read().get(topic).map_or(0, Vec::len)
    }

    /// Handlers that receive an event on `topic`: the topic's own list, then
    /// the wildcard list. The wildcard list is included once even when
    /// `topic` is itself the wildcard.
    fn handlers_for(&self, topic: &str) -> Vec<Arc<dyn Handler>> {
        let map = self.handlers.read();
        let mut out: Vec<Arc<dyn Handler>> = map.get(topic).cloned().unwrap_or_default();
        if topic != WILDCARD {
            if let Some(wild) = map.get(WILDCARD) {
                out.extend(wild.iter().cloned());
            }
        }
        out
    }

    /// Delivers an event to every matching handler in order.
    ///
    /// The registry lock is not held while handlers run, so handlers may
    /// subscribe further handlers; those take effect from the next dispatch.
    pub async fn dispatch(&self, topic: &str, payload: &str) -> DispatchReport {
        let handlers = self.handlers_for(topic);
        let mut report = DispatchReport::default();
        if handlers.is_empty() {
            tracing::debug!(topic = %topic, "no handlers for topic");
            return report;
        }
        tracing::debug!(topic = %topic, handlers = handlers.len(), "dispatching event");

        for handler in handlers {
            let event = Event::new(topic, payload);
            let started = std::panic::catch_unwind(AssertUnwindSafe(|| handler.handle(event)));
            let outcome = match started {
                Ok(fut) => AssertUnwindSafe(fut).catch_unwind().await,
                Err(panic) => Err(panic),
            };
            match outcome {
                Ok(Ok(())) => report.delivered += 1,
                Ok(Err(e)) => {
                    report.failed += 1;
                    tracing::error!(topic = %topic, error = %e, "handler failed");
                }
                Err(panic) => {
                    report.failed += 1;
                    let panic = panic_message(&*panic);
                    tracing::error!(topic = %topic, panic = %panic, "handler panicked");
                }
            }
        }
        report
    }
}

impl std::fmt::Debug for SubscriberRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let map = self.handlers.read();
        let mut topics: Vec<_> = map.iter().map(|(t, h)| (t.clone(), h.len())).collect();
        topics.sort();
        f.debug_struct("SubscriberRegistry")
            .field("topics", &topics)
            .finish()
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
