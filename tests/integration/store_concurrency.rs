// Test-specific lint overrides: integration tests use unwrap/expect freely,
// and some pedantic/nursery lints are not appropriate for test code.
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::future_not_send,
    clippy::missing_panics_doc,
    clippy::cast_possible_truncation
)]

//! Stress tests for the locked task and description stores.
//!
//! These tests validate:
//! - N concurrent saves on one `TaskStore` yield exactly N tasks
//! - Concurrent edits from the task service never lose an update
//! - Descriptions for different ids proceed independently
//! - A document written by another tool is read and rewritten faithfully

use std::sync::Arc;

use rsd_daemon::context::DaemonContext;
use rsd_daemon::service::TaskService;
use rsd_daemon::store::{DescriptionStore, TaskStore};
use rsd_proto::{Task, TaskApi, TaskId};

fn service(dir: &tempfile::TempDir) -> TaskService {
    let ctx = DaemonContext::new(
        TaskStore::new(dir.path().join("tasks.json")),
        DescriptionStore::new(dir.path().join("descriptions")),
    );
    TaskService::new(Arc::new(ctx))
}

// =============================================================================
// TaskStore
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn hundred_concurrent_saves_keep_every_task() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(TaskStore::new(dir.path().join("tasks.json")));

    let handles: Vec<_> = (0..100)
        .map(|i| {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.save(Task::new(format!("task {i}"))).await })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let tasks = store.load_all().await.unwrap();
    assert_eq!(tasks.len(), 100);
    let mut ids: Vec<_> = tasks.iter().map(|t| t.id.clone()).collect();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 100);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn interleaved_saves_and_deletes_settle_consistently() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(TaskStore::new(dir.path().join("tasks.json")));
    let tasks: Vec<_> = (0..40).map(|i| Task::new(format!("t{i}"))).collect();
    for task in &tasks {
        store.save(task.clone()).await.unwrap();
    }

    // Delete the even tasks while re-saving the odd ones.
    let handles: Vec<_> = tasks
        .iter()
        .enumerate()
        .map(|(i, task)| {
            let store = Arc::clone(&store);
            let task = task.clone();
            tokio::spawn(async move {
                if i % 2 == 0 {
                    store.delete(&task.id).await.map(|_| ())
                } else {
                    store.save(task).await
                }
            })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let remaining = store.load_all().await.unwrap();
    let expected: Vec<_> = tasks.iter().skip(1).step_by(2).cloned().collect();
    assert_eq!(remaining, expected);
}

// =============================================================================
// TaskService
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_pins_and_renames_on_distinct_tasks() {
    let dir = tempfile::tempdir().unwrap();
    let svc = service(&dir);
    let tasks: Vec<_> = (0..30).map(|i| Task::new(format!("t{i}"))).collect();
    for task in &tasks {
        svc.add_task(task).await.unwrap();
    }

    let handles: Vec<_> = tasks
        .iter()
        .map(|task| {
            let svc = svc.clone();
            let id = task.id.clone();
            tokio::spawn(async move {
                svc.pin(&id).await?;
                svc.rename(&id, &format!("renamed {id}")).await
            })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let listed = svc.list_tasks().await.unwrap();
    assert_eq!(listed.len(), 30);
    for (task, original) in listed.iter().zip(&tasks) {
        assert_eq!(task.id, original.id);
        assert!(task.pinned);
        assert_eq!(task.title, format!("renamed {}", task.id));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_toggles_on_one_task_count_exactly() {
    let dir = tempfile::tempdir().unwrap();
    let svc = service(&dir);
    let task = Task::new("flip");
    svc.add_task(&task).await.unwrap();

    let handles: Vec<_> = (0..21)
        .map(|_| {
            let svc = svc.clone();
            let id = task.id.clone();
            tokio::spawn(async move { svc.toggle(&id).await })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    // An odd number of toggles leaves the task done, with the backfilled time.
    let got = svc.get_task(&task.id).await.unwrap().unwrap();
    assert!(got.done);
    assert_eq!(got.completed, Some(task.created));
}

// =============================================================================
// DescriptionStore
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn descriptions_for_many_ids_in_parallel() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(DescriptionStore::new(dir.path().join("descriptions")));

    let handles: Vec<_> = (0..50)
        .map(|i| {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                let id = TaskId::new(format!("id-{i}"));
                store.save(&id, &format!("# {i}\n")).await?;
                store.load(&id).await
            })
        })
        .collect();
    for (i, handle) in handles.into_iter().enumerate() {
        let text = handle.await.unwrap().unwrap();
        assert_eq!(text, Some(format!("# {i}\n")));
    }
}

// =============================================================================
// Foreign documents
// =============================================================================

#[tokio::test]
async fn document_from_another_tool_is_read_and_preserved() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tasks.json");
    std::fs::write(
        &path,
        r#"[
    {
        "id": "legacy-1",
        "task": "written elsewhere",
        "done": true,
        "created": "2025-05-01 10:00:00.250000",
        "completed": "2025-05-02 09:15:00",
        "due": null,
        "pinned": true
    },
    {
        "id": "legacy-2",
        "task": "still open",
        "done": false,
        "created": "2025-05-03T08:00:00+02:00",
        "completed": null,
        "due": "2025-06-01",
        "pinned": false
    }
]"#,
    )
    .unwrap();

    let store = TaskStore::new(&path);
    let tasks = store.load_all().await.unwrap();
    assert_eq!(tasks.len(), 2);
    assert_eq!(tasks[0].title, "written elsewhere");
    assert!(tasks[0].pinned);
    assert!(tasks[1].due.is_some());

    // Rewriting through an unrelated save keeps the existing tasks intact.
    store.save(Task::new("new")).await.unwrap();
    let reread = store.load_all().await.unwrap();
    assert_eq!(&reread[..2], &tasks[..]);
    assert_eq!(reread[2].title, "new");
    let text = std::fs::read_to_string(&path).unwrap();
    assert!(text.contains(r#""created": "2025-05-03T08:00:00+02:00""#), "{text}");
}
