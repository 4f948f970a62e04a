//! In-memory [`TaskApi`] that records every call.

use std::collections::HashMap;
use std::convert::Infallible;

use parking_lot::Mutex;
use rsd_proto::{Task, TaskApi, TaskId};

/// One recorded call, with its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiCall {
    ListTasks,
    GetTask(TaskId),
    AddTask(Task),
    UpdateTask(Task),
    DeleteTask(TaskId),
    MarkDone(TaskId),
    MarkNotDone(TaskId),
    Toggle(TaskId),
    Pin(TaskId),
    Unpin(TaskId),
    Rename(TaskId, String),
    GetDescription(TaskId),
    SetDescription(TaskId, String),
}

impl ApiCall {
    /// Whether this call can change stored state.
    pub const fn is_mutation(&self) -> bool {
        !matches!(self, Self::ListTasks | Self::GetTask(_) | Self::GetDescription(_))
    }
}

/// Test backend holding tasks in memory.
///
/// Edits go through the rule methods on [`Task`], the same ones the
/// daemon's task service uses, so command logic can be checked without
/// touching disk.
#[derive(Debug, Default)]
pub struct RecordingApi {
    tasks: Mutex<Vec<Task>>,
    descriptions: Mutex<HashMap<TaskId, String>>,
    calls: Mutex<Vec<ApiCall>>,
}

impl RecordingApi {
    /// Starts with `tasks` in storage order.
    pub fn with_tasks(tasks: Vec<Task>) -> Self {
        Self {
            tasks: Mutex::new(tasks),
            ..Self::default()
        }
    }

    /// Every call so far, oldest first.
    pub fn calls(&self) -> Vec<ApiCall> {
        self.calls.lock().clone()
    }

    /// Only the calls that could change state.
    pub fn mutations(&self) -> Vec<ApiCall> {
        self.calls.lock().iter().filter(|c| c.is_mutation()).cloned().collect()
    }

    /// Current tasks in storage order.
    pub fn tasks(&self) -> Vec<Task> {
        self.tasks.lock().clone()
    }

    fn record(&self, call: ApiCall) {
        self.calls.lock().push(call);
    }

    fn upsert(&self, task: &Task) {
        let mut tasks = self.tasks.lock();
        match tasks.iter_mut().find(|t| t.id == task.id) {
            Some(slot) => *slot = task.clone(),
            None => tasks.push(task.clone()),
        }
    }

    fn edit(&self, id: &TaskId, rule: impl FnOnce(&mut Task) -> bool) {
        if let Some(task) = self.tasks.lock().iter_mut().find(|t| &t.id == id) {
            rule(task);
        }
    }
}

impl TaskApi for RecordingApi {
    type Error = Infallible;

    async fn list_tasks(&self) -> Result<Vec<Task>, Infallible> {
        self.record(ApiCall::ListTasks);
        Ok(self.tasks())
    }

    async fn get_task(&self, id: &TaskId) -> Result<Option<Task>, Infallible> {
        self.record(ApiCall::GetTask(id.clone()));
        Ok(self.tasks.lock().iter().find(|t| &t.id == id).cloned())
    }

    async fn add_task(&self, task: &Task) -> Result<(), Infallible> {
        self.record(ApiCall::AddTask(task.clone()));
        self.upsert(task);
        Ok(())
    }

    async fn update_task(&self, task: &Task) -> Result<(), Infallible> {
        self.record(ApiCall::UpdateTask(task.clone()));
        self.upsert(task);
        Ok(())
    }

    async fn delete_task(&self, id: &TaskId) -> Result<(), Infallible> {
        self.record(ApiCall::DeleteTask(id.clone()));
        self.tasks.lock().retain(|t| &t.id != id);
        Ok(())
    }

    async fn mark_done(&self, id: &TaskId) -> Result<(), Infallible> {
        self.record(ApiCall::MarkDone(id.clone()));
        self.edit(id, Task::mark_done);
        Ok(())
    }

    async fn mark_not_done(&self, id: &TaskId) -> Result<(), Infallible> {
        self.record(ApiCall::MarkNotDone(id.clone()));
        self.edit(id, Task::mark_not_done);
        Ok(())
    }

    async fn toggle(&self, id: &TaskId) -> Result<(), Infallible> {
        self.record(ApiCall::Toggle(id.clone()));
        self.edit(id, Task::toggle);
        Ok(())
    }

    async fn pin(&self, id: &TaskId) -> Result<(), Infallible> {
        self.record(ApiCall::Pin(id.clone()));
        self.edit(id, |task| task.set_pinned(true));
        Ok(())
    }

    async fn unpin(&self, id: &TaskId) -> Result<(), Infallible> {
        self.record(ApiCall::Unpin(id.clone()));
        self.edit(id, |task| task.set_pinned(false));
        Ok(())
    }

    async fn rename(&self, id: &TaskId, title: &str) -> Result<(), Infallible> {
        self.record(ApiCall::Rename(id.clone(), title.to_string()));
        self.edit(id, |task| task.rename(title));
        Ok(())
    }

    async fn get_description(&self, id: &TaskId) -> Result<Option<String>, Infallible> {
        self.record(ApiCall::GetDescription(id.clone()));
        Ok(self.descriptions.lock().get(id).cloned())
    }

    async fn set_description(&self, id: &TaskId, text: &str) -> Result<(), Infallible> {
        self.record(ApiCall::SetDescription(id.clone(), text.to_string()));
        self.descriptions.lock().insert(id.clone(), text.to_string());
        Ok(())
    }
}
