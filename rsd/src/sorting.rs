//! Display order for task lists.
//!
//! Pinned tasks come first, then tasks still open, then the oldest by
//! creation time. Command indexes are 1-based positions in this order.

use std::cmp::Ordering;

use rsd_proto::{Task, TaskId};

/// Default display ordering.
pub fn compare(a: &Task, b: &Task) -> Ordering {
    b.pinned
        .cmp(&a.pinned)
        .then(a.done.cmp(&b.done))
        .then(a.created.cmp(&b.created))
}

/// Sorts into display order. Ties keep storage order.
pub fn sorted(mut tasks: Vec<Task>) -> Vec<Task> {
    tasks.sort_by(compare);
    tasks
}

/// Id of the task shown at 1-based `index`, or `None` when out of range.
pub fn id_at_index(tasks: &[Task], index: usize) -> Option<TaskId> {
    let position = index.checked_sub(1)?;
    let mut order: Vec<&Task> = tasks.iter().collect();
    order.sort_by(|a, b| compare(a, b));
    order.get(position).map(|task| task.id.clone())
}
