//! `rsdd` -- the `ReadySetDone` task daemon.
//!
//! Owns the task document and description files and serves them to `rsd`
//! clients over a loopback WebSocket. Every successful mutation is followed
//! by a broadcast of the full task list to all connected clients.
//!
//! # Usage
//!
//! ```bash
//! # Run on the default address 127.0.0.1:7717
//! rsdd
//!
//! # Custom address and task document
//! rsdd --listen 127.0.0.1:8080 --task-store /tmp/tasks.json
//!
//! # Or via environment variables
//! RSD_LISTEN_ADDR=127.0.0.1:8080 RSD_LOG_LEVEL=debug rsdd
//! ```

use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use rsd_daemon::config::{DaemonCliArgs, DaemonConfig};
use rsd_daemon::context::DaemonContext;
use rsd_daemon::pubsub::DaemonChannel;
use rsd_daemon::rpc::RpcDispatcher;
use rsd_daemon::server;
use rsd_daemon::service::TaskService;
use tracing_appender::non_blocking::WorkerGuard;

#[tokio::main]
async fn main() {
    let cli = DaemonCliArgs::parse();

    // Load config from CLI args + env vars + config file + defaults.
    let config = match DaemonConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            std::process::exit(1);
        }
    };

    let _guard = init_logging(&config);

    tracing::info!(
        addr = %config.listen_addr,
        tasks = %config.task_store_path.display(),
        descriptions = %config.description_store_path.display(),
        "starting rsdd"
    );

    let ctx = Arc::new(DaemonContext::from_config(&config));
    let channel = Arc::new(DaemonChannel::new());
    channel.log_client_events();
    let dispatcher = Arc::new(RpcDispatcher::new(TaskService::new(ctx), channel));

    let server = match server::start_server(&config.listen_addr, dispatcher).await {
        Ok(server) => server,
        Err(e) => {
            tracing::error!(error = %e, "failed to start daemon server");
            eprintln!("Error starting daemon: {e}");
            std::process::exit(1);
        }
    };

    shutdown_signal().await;
    tracing::info!("shutdown requested");
    if let Err(e) = server.stop(config.shutdown_timeout).await {
        tracing::warn!(error = %e, "unclean shutdown");
    }
    tracing::info!("rsdd exiting");
}

/// Initialize logging to stderr, or to `log_file` when configured.
///
/// `RUST_LOG` overrides the configured level. The returned [`WorkerGuard`]
/// must be held until exit so buffered file output is flushed.
fn init_logging(config: &DaemonConfig) -> Option<WorkerGuard> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level));

    let Some((dir, file_name)) = config.log_file.as_deref().and_then(split_log_path) else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_ansi(config.color)
            .with_writer(std::io::stderr)
            .init();
        return None;
    };

    let file_appender = tracing_appender::rolling::never(dir, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_env_filter(env_filter)
        .with_ansi(false)
        .init();
    Some(guard)
}

fn split_log_path(path: &Path) -> Option<(&Path, &str)> {
    let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
    Some((dir, path.file_name()?.to_str()?))
}

/// Resolves on Ctrl-C, or SIGTERM on Unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
