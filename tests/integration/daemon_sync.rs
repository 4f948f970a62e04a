// Test-specific lint overrides: integration tests use unwrap/expect freely,
// and some pedantic/nursery lints are not appropriate for test code.
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::future_not_send,
    clippy::missing_panics_doc
)]

//! End-to-end sync between `rsdd` and `rsd` clients over a real WebSocket.
//!
//! These tests validate:
//! - Every mutation broadcasts the full task list to every client
//! - The broadcast payload matches an immediate `ListTasks`
//! - Client publishes reach daemon-local subscribers, wildcard included
//! - Malformed payloads come back as `InvalidPayload`
//! - A client connecting late resynchronizes with `ListTasks`

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use rsd::api::RpcApi;
use rsd::app;
use rsd::commands::Command;
use rsd::config::{BackendKind, ClientConfig};
use rsd::connection::{ConnectionError, DaemonConnection};
use rsd::pubsub::{ClientChannel, TaskCache};
use rsd_daemon::context::DaemonContext;
use rsd_daemon::pubsub::DaemonChannel;
use rsd_daemon::rpc::RpcDispatcher;
use rsd_daemon::server::{DaemonServer, start_server};
use rsd_daemon::service::TaskService;
use rsd_daemon::store::{DescriptionStore, TaskStore};
use rsd_proto::dispatch::{Event, sync_handler};
use rsd_proto::envelope;
use rsd_proto::rpc::{Method, RpcError, RpcErrorKind};
use rsd_proto::{Task, TaskApi, topics};

const TIMEOUT: Duration = Duration::from_secs(5);

struct Daemon {
    server: DaemonServer,
    channel: Arc<DaemonChannel>,
    _dir: tempfile::TempDir,
}

async fn start_daemon() -> Daemon {
    let dir = tempfile::tempdir().unwrap();
    let ctx = DaemonContext::new(
        TaskStore::new(dir.path().join("tasks.json")),
        DescriptionStore::new(dir.path().join("descriptions")),
    );
    let channel = Arc::new(DaemonChannel::new());
    channel.log_client_events();
    let dispatcher = Arc::new(RpcDispatcher::new(
        TaskService::new(Arc::new(ctx)),
        Arc::clone(&channel),
    ));
    let server = start_server("127.0.0.1:0", dispatcher).await.unwrap();
    Daemon {
        server,
        channel,
        _dir: dir,
    }
}

/// A connected client whose `update/tasks` payloads arrive on `updates`.
struct Client {
    api: RpcApi,
    channel: ClientChannel,
    updates: mpsc::UnboundedReceiver<String>,
}

async fn connect(daemon: &Daemon) -> Client {
    let before = daemon.channel.client_count();
    let (conn, signals) =
        DaemonConnection::connect(&daemon.server.local_addr().to_string(), TIMEOUT, TIMEOUT)
            .await
            .unwrap();
    let conn = Arc::new(conn);

    let channel = ClientChannel::new();
    let (tx, updates) = mpsc::unbounded_channel();
    channel.subscribe(
        topics::UPDATED_TASKS,
        sync_handler(move |event: Event| {
            tx.send(event.payload)?;
            Ok(())
        }),
    );
    channel.attach(Arc::clone(&conn), signals);

    // Broadcasts only reach connections the daemon has finished registering.
    tokio::time::timeout(TIMEOUT, async {
        while daemon.channel.client_count() <= before {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("daemon never registered the connection");

    Client {
        api: RpcApi::new(conn),
        channel,
        updates,
    }
}

async fn next_update(client: &mut Client) -> Vec<Task> {
    let payload = tokio::time::timeout(TIMEOUT, client.updates.recv())
        .await
        .expect("no broadcast within timeout")
        .expect("update stream closed");
    envelope::deserialize_tasks(&payload).unwrap()
}

// =============================================================================
// Broadcast sync
// =============================================================================

#[tokio::test]
async fn mutation_broadcasts_full_list_to_every_client() {
    let daemon = start_daemon().await;
    let mut alice = connect(&daemon).await;
    let mut bob = connect(&daemon).await;

    let task = Task::new("shared errand");
    alice.api.add_task(&task).await.unwrap();

    for client in [&mut alice, &mut bob] {
        let tasks = next_update(client).await;
        assert_eq!(tasks, vec![task.clone()]);
    }
}

#[tokio::test]
async fn broadcast_matches_immediate_list() {
    let daemon = start_daemon().await;
    let mut client = connect(&daemon).await;

    let first = Task::new("first");
    let second = Task::new("second");
    client.api.add_task(&first).await.unwrap();
    client.api.add_task(&second).await.unwrap();
    client.api.mark_done(&first.id).await.unwrap();
    client.api.pin(&second.id).await.unwrap();

    let mut last = Vec::new();
    for _ in 0..4 {
        last = next_update(&mut client).await;
    }
    assert_eq!(last, client.api.list_tasks().await.unwrap());
    assert!(last[0].done);
    assert_eq!(last[0].completed, Some(first.created));
    assert!(last[1].pinned);
}

#[tokio::test]
async fn each_mutation_method_broadcasts() {
    let daemon = start_daemon().await;
    let mut client = connect(&daemon).await;
    let task = Task::new("walk the dog");
    let id = &task.id;

    client.api.add_task(&task).await.unwrap();
    client.api.update_task(&task).await.unwrap();
    client.api.mark_done(id).await.unwrap();
    client.api.mark_not_done(id).await.unwrap();
    client.api.toggle(id).await.unwrap();
    client.api.pin(id).await.unwrap();
    client.api.unpin(id).await.unwrap();
    client.api.rename(id, "walk the cat").await.unwrap();
    client.api.set_description(id, "around the block").await.unwrap();
    client.api.delete_task(id).await.unwrap();

    let mut snapshots = Vec::new();
    for _ in 0..10 {
        snapshots.push(next_update(&mut client).await);
    }
    assert_eq!(snapshots[7][0].title, "walk the cat");
    assert!(snapshots[9].is_empty());

    // Reads do not broadcast.
    client.api.list_tasks().await.unwrap();
    client.api.get_description(id).await.unwrap();
    assert!(
        tokio::time::timeout(Duration::from_millis(200), client.updates.recv())
            .await
            .is_err()
    );
}

#[tokio::test]
async fn late_client_resynchronizes_with_list() {
    let daemon = start_daemon().await;
    let early = connect(&daemon).await;
    let tasks = [Task::new("a"), Task::new("b")];
    for task in &tasks {
        early.api.add_task(task).await.unwrap();
    }

    let mut late = connect(&daemon).await;
    assert_eq!(late.api.list_tasks().await.unwrap(), tasks.to_vec());
    // Nothing was broadcast to it for changes made before it joined.
    assert!(
        tokio::time::timeout(Duration::from_millis(200), late.updates.recv())
            .await
            .is_err()
    );
}

#[tokio::test]
async fn task_cache_follows_broadcasts() {
    let daemon = start_daemon().await;
    let client = connect(&daemon).await;
    let cache = TaskCache::new();
    client.channel.subscribe(topics::UPDATED_TASKS, cache.handler());

    let task = Task::new("water plants").with_done(true);
    client.api.add_task(&task).await.unwrap();

    let cached = tokio::time::timeout(TIMEOUT, async {
        loop {
            if let Some(tasks) = cache.latest() {
                return tasks;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("cache never received a broadcast");
    assert_eq!(cached, vec![task]);
    assert_eq!(cached[0].completed, Some(cached[0].created));
}

// =============================================================================
// Publish
// =============================================================================

#[tokio::test]
async fn client_publish_reaches_daemon_subscribers() {
    let daemon = start_daemon().await;
    let seen = Arc::new(Mutex::new(Vec::new()));
    for topic in [topics::TASK_ADD, topics::WILDCARD] {
        let sink = Arc::clone(&seen);
        let label = topic.to_string();
        daemon.channel.subscribe(
            topic,
            sync_handler(move |event: Event| {
                sink.lock().push((label.clone(), event));
                Ok(())
            }),
        );
    }

    let client = connect(&daemon).await;
    client.channel.publish(topics::TASK_ADD, r#"{"id": "x"}"#);
    client.channel.publish("other/topic", "plain");
    client.channel.close().await;

    let seen = seen.lock().clone();
    assert_eq!(
        seen,
        vec![
            (topics::TASK_ADD.to_string(), Event::new(topics::TASK_ADD, r#"{"id": "x"}"#)),
            (topics::WILDCARD.to_string(), Event::new(topics::TASK_ADD, r#"{"id": "x"}"#)),
            (topics::WILDCARD.to_string(), Event::new("other/topic", "plain")),
        ]
    );
}

#[tokio::test]
async fn daemon_publish_reaches_client_topic() {
    let daemon = start_daemon().await;
    let client = connect(&daemon).await;
    let (tx, mut rx) = mpsc::unbounded_channel();
    client.channel.subscribe(
        "notice",
        sync_handler(move |event: Event| {
            tx.send(event)?;
            Ok(())
        }),
    );

    daemon.channel.publish("notice", "maintenance at noon");
    let event = tokio::time::timeout(TIMEOUT, rx.recv()).await.unwrap().unwrap();
    assert_eq!(event, Event::new("notice", "maintenance at noon"));
}

// =============================================================================
// Errors
// =============================================================================

#[tokio::test]
async fn malformed_payload_is_invalid_payload() {
    let daemon = start_daemon().await;
    let client = connect(&daemon).await;
    let conn = client.api.connection();

    let err = conn
        .call(Method::AddTask, vec![r#"{"title": "no keys"}"#.to_string()])
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ConnectionError::Remote(RpcError {
            kind: RpcErrorKind::InvalidPayload,
            ..
        })
    ));

    // A task method given an id envelope is rejected the same way.
    let id_only = envelope::serialize_id(&Task::new("x").id).unwrap();
    let err = conn.call(Method::UpdateTask, vec![id_only]).await.unwrap_err();
    assert!(matches!(
        err,
        ConnectionError::Remote(RpcError {
            kind: RpcErrorKind::InvalidPayload,
            ..
        })
    ));
    assert!(client.api.list_tasks().await.unwrap().is_empty());
}

#[tokio::test]
async fn missing_id_is_a_silent_no_op() {
    let daemon = start_daemon().await;
    let client = connect(&daemon).await;
    let ghost = Task::new("never stored");
    client.api.toggle(&ghost.id).await.unwrap();
    client.api.delete_task(&ghost.id).await.unwrap();
    assert_eq!(client.api.get_task(&ghost.id).await.unwrap(), None);
    assert!(client.api.list_tasks().await.unwrap().is_empty());
}

// =============================================================================
// Command runner
// =============================================================================

#[tokio::test]
async fn commands_through_daemon_render_the_refreshed_list() {
    let daemon = start_daemon().await;
    let mut watcher = connect(&daemon).await;
    let config = ClientConfig {
        daemon_addr: daemon.server.local_addr().to_string(),
        backend: BackendKind::Daemon,
        ..ClientConfig::default()
    };

    let mut out = Vec::new();
    let add = Command::Add {
        title: "call mom".to_string(),
        done: false,
        pin: true,
    };
    app::execute(&config, &add, &mut out).await.unwrap();
    let text = String::from_utf8(out).unwrap();
    assert!(text.starts_with("ReadySetDone v"), "{text}");
    assert!(text.contains("1   call mom"), "{text}");

    let broadcast = next_update(&mut watcher).await;
    assert_eq!(broadcast.len(), 1);
    assert!(broadcast[0].pinned);

    let mut out = Vec::new();
    app::execute(&config, &Command::Done { index: 1 }, &mut out).await.unwrap();
    assert!(String::from_utf8(out).unwrap().contains("1 ✔ call mom"));
}
