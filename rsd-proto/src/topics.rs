//! Publish/subscribe topic names.

/// A task was added.
pub const TASK_ADD: &str = "task/add";
/// A task was replaced.
pub const TASK_UPDATE: &str = "task/update";
/// A task was deleted.
pub const TASK_DELETE: &str = "task/delete";
/// A task was marked done.
pub const TASK_MARK_DONE: &str = "task/mark-done";
/// A task was marked not done.
pub const TASK_MARK_NOT_DONE: &str = "task/mark-not-done";
/// A task's done flag was flipped.
pub const TASK_TOGGLE: &str = "task/toggle";
/// A task was pinned.
pub const TASK_PIN: &str = "task/pin";
/// A task was unpinned.
pub const TASK_UNPIN: &str = "task/unpin";
/// A description was requested.
pub const DESCRIPTION_GET: &str = "description/get";
/// A description was written.
pub const DESCRIPTION_SET: &str = "description/set";

/// Full task list after a change. Broadcast `TaskUpdated` signals are
/// delivered to handlers registered here.
pub const UPDATED_TASKS: &str = "update/tasks";

/// Subscribing to this topic receives every event.
pub const WILDCARD: &str = "*";
