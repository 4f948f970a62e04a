//! Runs one client command end to end.
//!
//! Opens the configured backend, executes the command, publishes the
//! resulting change event when a daemon is attached, and renders the
//! outcome. While attached, daemon task-list broadcasts land in a
//! [`TaskCache`].

use std::io::Write;
use std::sync::Arc;

use rsd_daemon::context::DaemonContext;
use rsd_daemon::service::TaskService;
use rsd_daemon::store::{DescriptionStore, TaskStore};
use rsd_proto::topics;

use crate::api::{Backend, RpcApi};
use crate::commands::{self, Command, Outcome};
use crate::config::{BackendKind, ClientConfig};
use crate::connection::DaemonConnection;
use crate::error::ClientError;
use crate::pubsub::{ClientChannel, TaskCache};
use crate::render::{self, RenderOptions};

/// Opens the backend selected in `config`, attaching daemon connections to `channel`.
///
/// # Errors
///
/// Returns [`ClientError::Connection`] when the daemon cannot be reached.
pub async fn open_backend(
    config: &ClientConfig,
    channel: &ClientChannel,
) -> Result<Backend, ClientError> {
    let backend = match config.backend {
        BackendKind::Daemon => {
            let (conn, signals) = DaemonConnection::connect(
                &config.daemon_addr,
                config.connect_timeout,
                config.call_timeout,
            )
            .await?;
            let conn = Arc::new(conn);
            channel.attach(Arc::clone(&conn), signals);
            Backend::Daemon(RpcApi::new(conn))
        }
        BackendKind::Local => {
            let ctx = DaemonContext::new(
                TaskStore::new(&config.task_store_path),
                DescriptionStore::new(&config.description_store_path),
            );
            Backend::Local(TaskService::new(Arc::new(ctx)))
        }
    };
    tracing::debug!(backend = backend.name(), "backend opened");
    Ok(backend)
}

/// Runs `command` and writes its rendered outcome to `out`.
///
/// # Errors
///
/// Returns [`ClientError`] if the backend fails or output cannot be written.
pub async fn execute<W: Write>(
    config: &ClientConfig,
    command: &Command,
    out: &mut W,
) -> Result<(), ClientError> {
    let channel = ClientChannel::new();
    let cache = TaskCache::new();
    channel.subscribe(topics::UPDATED_TASKS, cache.handler());
    let backend = open_backend(config, &channel).await?;

    let result = commands::run(&backend, command).await;
    let rendered = result.map(|report| {
        if let Some(event) = report.event.as_ref().filter(|_| channel.is_attached()) {
            channel.publish(&event.topic, &event.payload);
        }
        report.outcome
    });
    // Flush queued publishes before reporting, whatever the outcome.
    channel.close().await;
    if let Some(pushed) = cache.latest() {
        tracing::debug!(count = pushed.len(), "daemon pushed a task list during the command");
    }

    match rendered? {
        Outcome::Tasks(tasks) => {
            let opts = RenderOptions {
                color: config.color,
                metadata: config.metadata,
            };
            render::render_tasks(out, &tasks, opts)?;
        }
        Outcome::Description(text) => render::render_description(out, text.as_deref())?,
    }
    Ok(())
}
