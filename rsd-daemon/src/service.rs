//! Task business rules.
//!
//! [`TaskService`] is the only code that mutates stored tasks. It applies
//! the rules defined on [`Task`] as in-place edits through
//! [`TaskStore::update`], so a rule that finds nothing to change (or no
//! task) leaves the document untouched.

use std::sync::Arc;

use rsd_proto::{Task, TaskApi, TaskId};

use crate::context::DaemonContext;
use crate::store::StoreError;

/// Errors raised by [`TaskService`].
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// A store operation failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Task service over the daemon's stores.
#[derive(Debug, Clone)]
pub struct TaskService {
    ctx: Arc<DaemonContext>,
}

impl TaskService {
    /// Creates a service over the given context.
    #[must_use]
    pub const fn new(ctx: Arc<DaemonContext>) -> Self {
        Self { ctx }
    }

    /// The shared daemon context.
    #[must_use]
    pub const fn context(&self) -> &Arc<DaemonContext> {
        &self.ctx
    }

    async fn edit<F>(&self, op: &'static str, id: &TaskId, edit: F) -> Result<(), ServiceError>
    where
        F: FnOnce(&mut Task) -> bool + Send + 'static,
    {
        let changed = self.ctx.tasks.update(id, edit).await?;
        tracing::debug!(task_id = %id, op, changed, "applied task edit");
        Ok(())
    }
}

impl TaskApi for TaskService {
    type Error = ServiceError;

    async fn list_tasks(&self) -> Result<Vec<Task>, ServiceError> {
        Ok(self.ctx.tasks.load_all().await?)
    }

    async fn get_task(&self, id: &TaskId) -> Result<Option<Task>, ServiceError> {
        Ok(self.ctx.tasks.load(id).await?)
    }

    async fn add_task(&self, task: &Task) -> Result<(), ServiceError> {
        tracing::info!(task_id = %task.id, "adding task");
        Ok(self.ctx.tasks.save(task.clone()).await?)
    }

    async fn update_task(&self, task: &Task) -> Result<(), ServiceError> {
        tracing::info!(task_id = %task.id, "updating task");
        Ok(self.ctx.tasks.save(task.clone()).await?)
    }

    async fn delete_task(&self, id: &TaskId) -> Result<(), ServiceError> {
        let removed = self.ctx.tasks.delete(id).await?;
        tracing::info!(task_id = %id, removed, "deleted task");
        Ok(())
    }

    async fn mark_done(&self, id: &TaskId) -> Result<(), ServiceError> {
        self.edit("mark_done", id, Task::mark_done).await
    }

    async fn mark_not_done(&self, id: &TaskId) -> Result<(), ServiceError> {
        self.edit("mark_not_done", id, Task::mark_not_done).await
    }

    async fn toggle(&self, id: &TaskId) -> Result<(), ServiceError> {
        self.edit("toggle", id, Task::toggle).await
    }

    async fn pin(&self, id: &TaskId) -> Result<(), ServiceError> {
        self.edit("pin", id, |task| task.set_pinned(true)).await
    }

    async fn unpin(&self, id: &TaskId) -> Result<(), ServiceError> {
        self.edit("unpin", id, |task| task.set_pinned(false)).await
    }

    async fn rename(&self, id: &TaskId, title: &str) -> Result<(), ServiceError> {
        let title = title.to_string();
        self.edit("rename", id, move |task| task.rename(&title)).await
    }

    async fn get_description(&self, id: &TaskId) -> Result<Option<String>, ServiceError> {
        Ok(self.ctx.descriptions.load(id).await?)
    }

    async fn set_description(&self, id: &TaskId, text: &str) -> Result<(), ServiceError> {
        Ok(self.ctx.descriptions.save(id, text).await?)
    }
}
