//! The task API capability.
//!
//! [`TaskApi`] is implemented by every backend a client can drive:
//! - the daemon's task service, used directly when no daemon is running
//! - the RPC client that forwards each call to `rsdd`
//! - a recording mock used in tests
//!
//! Mutations on an unknown id succeed without effect in every backend.

use std::future::Future;

use crate::task::{Task, TaskId};

/// Async task operations.
pub trait TaskApi: Send + Sync {
    /// Error produced by this backend.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Returns every task in storage order.
    fn list_tasks(&self) -> impl Future<Output = Result<Vec<Task>, Self::Error>> + Send;

    /// Returns the task with `id`, if any.
    fn get_task(
        &self,
        id: &TaskId,
    ) -> impl Future<Output = Result<Option<Task>, Self::Error>> + Send;

    /// Stores a new task.
    fn add_task(&self, task: &Task) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Replaces the stored task with the same id, or appends it.
    fn update_task(&self, task: &Task) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Removes the task. Its description is left in place.
    fn delete_task(&self, id: &TaskId) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Marks the task done, backfilling `completed` from `created` when unset.
    fn mark_done(&self, id: &TaskId) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Marks the task not done and clears `completed`.
    fn mark_not_done(&self, id: &TaskId) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Flips the task's done flag.
    fn toggle(&self, id: &TaskId) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Pins the task.
    fn pin(&self, id: &TaskId) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Unpins the task.
    fn unpin(&self, id: &TaskId) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Replaces the task's title.
    fn rename(
        &self,
        id: &TaskId,
        title: &str,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Returns the task's description, if one was ever written.
    fn get_description(
        &self,
        id: &TaskId,
    ) -> impl Future<Output = Result<Option<String>, Self::Error>> + Send;

    /// Writes the task's description.
    fn set_description(
        &self,
        id: &TaskId,
        text: &str,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;
}
