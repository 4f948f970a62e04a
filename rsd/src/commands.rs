//! Client subcommands.
//!
//! Commands that address a task take its 1-based index in display order
//! (see [`crate::sorting`]). An index with no task behind it is logged and
//! nothing is changed. Every command except reading a description ends by
//! fetching the refreshed list for rendering.

use rsd_proto::dispatch::Event;
use rsd_proto::envelope::{self, EnvelopeError};
use rsd_proto::{Task, TaskApi, TaskId, topics};

use crate::sorting;

/// Task commands.
#[derive(clap::Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// List all tasks
    List,
    /// Add a task
    Add {
        /// Task title
        title: String,
        /// Mark the task as done
        #[arg(short, long)]
        done: bool,
        /// Pin the task
        #[arg(short, long)]
        pin: bool,
    },
    /// Mark a task done
    Done {
        /// Position in the list
        index: usize,
    },
    /// Mark a task not done
    NotDone {
        /// Position in the list
        index: usize,
    },
    /// Toggle a task's done state
    Toggle {
        /// Position in the list
        index: usize,
    },
    /// Pin a task to the top
    Pin {
        /// Position in the list
        index: usize,
    },
    /// Unpin a task
    Unpin {
        /// Position in the list
        index: usize,
    },
    /// Delete a task
    Delete {
        /// Position in the list
        index: usize,
    },
    /// Rename a task
    Rename {
        /// Position in the list
        index: usize,
        /// New title
        title: String,
    },
    /// Show or replace a task's description
    Description {
        /// Position in the list
        index: usize,
        /// Replace the description with this text
        #[arg(long)]
        set: Option<String>,
    },
}

/// What the command produced for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The refreshed task list.
    Tasks(Vec<Task>),
    /// A task's description.
    Description(Option<String>),
}

/// Result of running a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    /// What to render.
    pub outcome: Outcome,
    /// Change notification to publish, if the command acted on a task.
    pub event: Option<Event>,
}

/// Runs `command` against `api`.
///
/// # Errors
///
/// Returns the backend's error if any call fails.
#[allow(clippy::too_many_lines)]
pub async fn run<A: TaskApi>(api: &A, command: &Command) -> Result<Report, A::Error> {
    let mut event = None;
    match command {
        Command::List => {}
        Command::Add { title, done, pin } => {
            let task = Task::new(title.as_str()).with_pinned(*pin).with_done(*done);
            api.add_task(&task).await?;
            event = to_event(topics::TASK_ADD, envelope::serialize_task(&task));
        }
        Command::Done { index } => {
            if let Some(id) = resolve(api, *index).await? {
                api.mark_done(&id).await?;
                event = id_event(topics::TASK_MARK_DONE, &id);
            }
        }
        Command::NotDone { index } => {
            if let Some(id) = resolve(api, *index).await? {
                api.mark_not_done(&id).await?;
                event = id_event(topics::TASK_MARK_NOT_DONE, &id);
            }
        }
        Command::Toggle { index } => {
            if let Some(id) = resolve(api, *index).await? {
                api.toggle(&id).await?;
                event = id_event(topics::TASK_TOGGLE, &id);
            }
        }
        Command::Pin { index } => {
            if let Some(id) = resolve(api, *index).await? {
                api.pin(&id).await?;
                event = id_event(topics::TASK_PIN, &id);
            }
        }
        Command::Unpin { index } => {
            if let Some(id) = resolve(api, *index).await? {
                api.unpin(&id).await?;
                event = id_event(topics::TASK_UNPIN, &id);
            }
        }
        Command::Delete { index } => {
            if let Some(id) = resolve(api, *index).await? {
                api.delete_task(&id).await?;
                event = id_event(topics::TASK_DELETE, &id);
            }
        }
        Command::Rename { index, title } => {
            if let Some(id) = resolve(api, *index).await? {
                api.rename(&id, title).await?;
                event = id_event(topics::TASK_UPDATE, &id);
            }
        }
        Command::Description { index, set } => {
            if let Some(id) = resolve(api, *index).await? {
                if let Some(text) = set {
                    api.set_description(&id, text).await?;
                    event = id_event(topics::DESCRIPTION_SET, &id);
                } else {
                    let description = api.get_description(&id).await?;
                    return Ok(Report {
                        outcome: Outcome::Description(description),
                        event: id_event(topics::DESCRIPTION_GET, &id),
                    });
                }
            }
        }
    }

    let tasks = api.list_tasks().await?;
    Ok(Report {
        outcome: Outcome::Tasks(tasks),
        event,
    })
}

async fn resolve<A: TaskApi>(api: &A, index: usize) -> Result<Option<TaskId>, A::Error> {
    let tasks = api.list_tasks().await?;
    let id = sorting::id_at_index(&tasks, index);
    if id.is_none() {
        tracing::warn!(index, count = tasks.len(), "no task found at index");
    }
    Ok(id)
}

fn id_event(topic: &str, id: &TaskId) -> Option<Event> {
    to_event(topic, envelope::serialize_id(id))
}

fn to_event(topic: &str, payload: Result<String, EnvelopeError>) -> Option<Event> {
    payload
        .inspect_err(|e| {
            tracing::warn!(topic = %topic, error = %e, "could not encode change event");
        })
        .ok()
        .map(|payload| Event::new(topic, payload))
}
