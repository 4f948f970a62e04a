//! File-backed storage for tasks and their descriptions.
//!
//! [`TaskStore`] keeps every task in one JSON array document and rewrites
//! the whole document on each change. [`DescriptionStore`] keeps one
//! Markdown file per task id, each behind its own [`LockedFile`].

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use rsd_proto::{Task, TaskId};
use serde::Serialize;
use serde_json::ser::PrettyFormatter;

use crate::fs::LockedFile;

/// Errors raised by the stores.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Underlying file I/O failed.
    #[error("store I/O error: {0}")]
    Io(#[from] io::Error),

    /// The task document is not a JSON array of tasks.
    #[error("task document is malformed: {0}")]
    Document(#[from] serde_json::Error),

    /// The id cannot be used as a description file name.
    #[error("task id {0:?} cannot name a description file")]
    InvalidId(String),
}

/// Canonical task collection persisted as one JSON document.
#[derive(Debug, Clone)]
pub struct TaskStore {
    file: LockedFile,
}

impl TaskStore {
    /// Creates a store backed by the document at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            file: LockedFile::new(path),
        }
    }

    /// Path of the backing document.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Loads every task in document order. An absent, empty or
    /// whitespace-only document holds no tasks.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on I/O failure or a malformed document.
    pub async fn load_all(&self) -> Result<Vec<Task>, StoreError> {
        let text = self.file.read().await?;
        parse_document(&text)
    }

    /// Loads the task with `id`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on I/O failure or a malformed document.
    pub async fn load(&self, id: &TaskId) -> Result<Option<Task>, StoreError> {
        Ok(self.load_all().await?.into_iter().find(|t| &t.id == id))
    }

    /// Upserts `task`: replaces the first task with the same id in place,
    /// or appends it.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on I/O failure or a malformed document.
    pub async fn save(&self, task: Task) -> Result<(), StoreError> {
        tracing::debug!(task_id = %task.id, "saving task");
        self.file
            .modify(move |text| -> Result<(Option<String>, ()), StoreError> {
                let mut tasks = parse_document(&text)?;
                match tasks.iter_mut().find(|t| t.id == task.id) {
                    Some(slot) => *slot = task,
                    None => tasks.push(task),
                }
                Ok((Some(render_document(&tasks)?), ()))
            })
            .await
    }

    /// Removes the task with `id`. Returns whether a task was removed; the
    /// document is not rewritten when nothing matched.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on I/O failure or a malformed document.
    pub async fn delete(&self, id: &TaskId) -> Result<bool, StoreError> {
        let id = id.clone();
        self.file
            .modify(move |text| -> Result<(Option<String>, bool), StoreError> {
                let mut tasks = parse_document(&text)?;
                let before = tasks.len();
                tasks.retain(|t| t.id != id);
                if tasks.len() == before {
                    return Ok((None, false));
                }
                Ok((Some(render_document(&tasks)?), true))
            })
            .await
    }

    /// Applies `edit` to the task with `id` in place. `edit` returns whether
    /// it changed anything. Returns whether the document was rewritten,
    /// which happens only when the task exists and `edit` reports a change.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on I/O failure or a malformed document.
    pub async fn update<F>(&self, id: &TaskId, edit: F) -> Result<bool, StoreError>
    where
        F: FnOnce(&mut Task) -> bool + Send + 'static,
    {
        let id = id.clone();
        self.file
            .modify(move |text| -> Result<(Option<String>, bool), StoreError> {
                let mut tasks = parse_document(&text)?;
                let Some(task) = tasks.iter_mut().find(|t| t.id == id) else {
                    return Ok((None, false));
                };
                if !edit(task) {
                    return Ok((None, false));
                }
                Ok((Some(render_document(&tasks)?), true))
            })
            .await
    }
}

fn parse_document(text: &str) -> Result<Vec<Task>, StoreError> {
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }
    Ok(serde_json::from_str(text)?)
}

/// Renders the task document with four-space indentation.
fn render_document(tasks: &[Task]) -> Result<String, StoreError> {
    let mut out = Vec::new();
    let formatter = PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut out, formatter);
    tasks.serialize(&mut ser)?;
    String::from_utf8(out)
        .map_err(|e| StoreError::Io(io::Error::new(io::ErrorKind::InvalidData, e)))
}

/// Markdown descriptions, one `<id>.md` file per task.
///
/// Each id gets its own lock while a call on it is in flight. The entry is
/// dropped once the last such call finishes.
#[derive(Debug)]
pub struct DescriptionStore {
    dir: PathBuf,
    files: Mutex<HashMap<TaskId, LockedFile>>,
}

impl DescriptionStore {
    /// Creates a store rooted at `dir`. The directory is created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            files: Mutex::new(HashMap::new()),
        }
    }

    /// Directory holding the description files.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Loads the description for `id`. `None` when none was ever written;
    /// an existing empty file is `Some("")`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] for an unusable id or on I/O failure.
    pub async fn load(&self, id: &TaskId) -> Result<Option<String>, StoreError> {
        let file = self.file_for(id)?;
        let text = file.read_existing().await;
        self.release(id, file);
        Ok(text?)
    }

    /// Writes the description for `id`, creating the file if needed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] for an unusable id or on I/O failure.
    pub async fn save(&self, id: &TaskId, text: &str) -> Result<(), StoreError> {
        let file = self.file_for(id)?;
        tracing::debug!(task_id = %id, bytes = text.len(), "saving description");
        let written = file.write(text.to_string()).await;
        self.release(id, file);
        Ok(written?)
    }

    /// Returns the lock for `id`, creating it if no call holds one.
    fn file_for(&self, id: &TaskId) -> Result<LockedFile, StoreError> {
        validate_id(id)?;
        let mut files = self.files.lock();
        let file = files
            .entry(id.clone())
            .or_insert_with(|| LockedFile::new(self.dir.join(format!("{id}.md"))));
        Ok(file.clone())
    }

    /// Drops the cached lock for `id` when `file` was its last user. Clones
    /// are only handed out under the map lock, so none can appear meanwhile.
    fn release(&self, id: &TaskId, file: LockedFile) {
        let mut files = self.files.lock();
        drop(file);
        if files.get(id).is_some_and(|cached| !cached.is_shared()) {
            files.remove(id);
        }
    }
}

fn validate_id(id: &TaskId) -> Result<(), StoreError> {
    let s = id.as_str();
    let unusable = s.is_empty() || s.contains(['/', '\\', '\0']) || s.contains("..");
    if unusable {
        return Err(StoreError::InvalidId(s.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn store_in(dir: &tempfile::TempDir) -> TaskStore {
        TaskStore::new(dir.path().join("tasks.json"))
    }

    #[tokio::test]
    async fn empty_or_whitespace_document_has_no_tasks() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        assert!(store.load_all().await.unwrap().is_empty());
        std::fs::write(store.path(), "  \n\t").unwrap();
        assert!(store.load_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn save_is_upsert_preserving_position() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let a = Task::new("a");
        let b = Task::new("b");
        let c = Task::new("c");
        for t in [&a, &b, &c] {
            store.save(t.clone()).await.unwrap();
        }
        let mut renamed = b.clone();
        renamed.title = "b2".to_string();
        store.save(renamed).await.unwrap();

        let titles: Vec<_> = store
            .load_all()
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.title)
            .collect();
        assert_eq!(titles, vec!["a", "b2", "c"]);
    }

    #[tokio::test]
    async fn load_finds_by_id() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let task = Task::new("find me");
        store.save(task.clone()).await.unwrap();
        assert_eq!(store.load(&task.id).await.unwrap(), Some(task));
        assert_eq!(store.load(&TaskId::new("missing")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn delete_missing_id_does_not_rewrite() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        store.save(Task::new("keep")).await.unwrap();
        let before = std::fs::read_to_string(store.path()).unwrap();
        // Hand-edited formatting survives when nothing is removed.
        let edited = before.replace("    ", "  ");
        std::fs::write(store.path(), &edited).unwrap();

        assert!(!store.delete(&TaskId::new("nope")).await.unwrap());
        assert_eq!(std::fs::read_to_string(store.path()).unwrap(), edited);
    }

    #[tokio::test]
    async fn delete_removes_task() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let a = Task::new("a");
        let b = Task::new("b");
        store.save(a.clone()).await.unwrap();
        store.save(b.clone()).await.unwrap();
        assert!(store.delete(&a.id).await.unwrap());
        assert_eq!(store.load_all().await.unwrap(), vec![b]);
    }

    #[tokio::test]
    async fn update_reports_change_and_skips_noop() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let task = Task::new("t");
        store.save(task.clone()).await.unwrap();

        assert!(
            store
                .update(&task.id, |t| {
                    t.pinned = true;
                    true
                })
                .await
                .unwrap()
        );
        assert!(store.load(&task.id).await.unwrap().unwrap().pinned);
        assert!(!store.update(&task.id, |_| false).await.unwrap());
        assert!(!store.update(&TaskId::new("missing"), |_| true).await.unwrap());
    }

    #[tokio::test]
    async fn document_uses_task_key_and_four_space_indent() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        store.save(Task::new("title here")).await.unwrap();
        let text = std::fs::read_to_string(store.path()).unwrap();
        assert!(text.starts_with("[\n    {\n        \"id\""));
        assert!(text.contains("\"task\": \"title here\""));
    }

    #[tokio::test]
    async fn malformed_document_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        std::fs::write(store.path(), "{not json").unwrap();
        assert!(matches!(
            store.load_all().await,
            Err(StoreError::Document(_))
        ));
        assert!(store.save(Task::new("x")).await.is_err());
        assert_eq!(std::fs::read_to_string(store.path()).unwrap(), "{not json");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_saves_keep_every_task() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(store_in(&dir));
        let mut handles = Vec::new();
        for i in 0..25 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store.save(Task::new(format!("task {i}"))).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert_eq!(store.load_all().await.unwrap().len(), 25);
    }

    #[tokio::test]
    async fn description_absent_then_written() {
        let dir = tempfile::tempdir().unwrap();
        let store = DescriptionStore::new(dir.path().join("descriptions"));
        let id = TaskId::new("abc");
        assert_eq!(store.load(&id).await.unwrap(), None);
        store.save(&id, "# Notes\n").await.unwrap();
        assert_eq!(store.load(&id).await.unwrap().as_deref(), Some("# Notes\n"));
        assert!(dir.path().join("descriptions").join("abc.md").exists());
    }

    #[tokio::test]
    async fn empty_description_is_some_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = DescriptionStore::new(dir.path());
        let id = TaskId::new("e");
        store.save(&id, "").await.unwrap();
        assert_eq!(store.load(&id).await.unwrap(), Some(String::new()));
    }

    #[tokio::test]
    async fn description_lock_is_shared_while_in_use() {
        let dir = tempfile::tempdir().unwrap();
        let store = DescriptionStore::new(dir.path());
        let id = TaskId::new("same");
        let held = store.file_for(&id).unwrap();
        let again = store.file_for(&id).unwrap();
        assert!(held.is_shared());
        assert_eq!(store.files.lock().len(), 1);

        store.release(&id, again);
        assert_eq!(store.files.lock().len(), 1);
        store.release(&id, held);
        assert!(store.files.lock().is_empty());
    }

    #[tokio::test]
    async fn description_locks_are_evicted_after_use() {
        let dir = tempfile::tempdir().unwrap();
        let store = DescriptionStore::new(dir.path());
        for i in 0..10 {
            let id = TaskId::new(format!("t{i}"));
            store.save(&id, "x").await.unwrap();
            store.load(&id).await.unwrap();
        }
        assert!(store.files.lock().is_empty());
        assert_eq!(
            store.load(&TaskId::new("t3")).await.unwrap().as_deref(),
            Some("x")
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_description_writes_leave_one_whole_text() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(DescriptionStore::new(dir.path()));
        let id = TaskId::new("busy");
        let mut handles = Vec::new();
        for i in 0..20 {
            let store = Arc::clone(&store);
            let id = id.clone();
            handles.push(tokio::spawn(async move {
                store.save(&id, &format!("version {i}")).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        let text = store.load(&id).await.unwrap().unwrap();
        assert!(text.starts_with("version "), "{text}");
        assert!(store.files.lock().is_empty());
    }

    #[tokio::test]
    async fn path_like_ids_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = DescriptionStore::new(dir.path());
        for bad in ["../escape", "a/b", "a\\b", ""] {
            assert!(matches!(
                store.save(&TaskId::new(bad), "x").await,
                Err(StoreError::InvalidId(_))
            ));
        }
    }
}
