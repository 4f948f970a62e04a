//! JSON text envelopes carried in RPC arguments and broadcast payloads.
//!
//! An envelope is a JSON object. The presence of the `task` key marks a full
//! [`Task`]; otherwise the presence of `id` marks an [`Id`] reference. An
//! empty string is the encoding of "no value" in both directions.

use serde_json::Value;

use crate::task::{Id, Task, TaskId};

/// Error type for envelope encode/decode operations.
#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    /// Payload is not valid JSON, or a field has the wrong shape.
    #[error("malformed envelope: {0}")]
    Malformed(#[from] serde_json::Error),
    /// Payload is a JSON value other than an object.
    #[error("envelope must be a JSON object")]
    NotAnObject,
    /// Object carries neither a `task` nor an `id` key.
    #[error("unsupported envelope, missing 'task' or 'id' key")]
    UnknownKind,
    /// Envelope decoded, but as a different kind than the caller needs.
    #[error("expected a {expected} envelope")]
    WrongKind {
        /// Kind the caller required.
        expected: &'static str,
    },
}

/// A decoded envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Envelope {
    /// Full task record.
    Task(Task),
    /// Identifier-only reference.
    Id(Id),
}

impl Envelope {
    /// Identifier of the referenced task, whichever kind this is.
    #[must_use]
    pub const fn task_id(&self) -> &TaskId {
        match self {
            Self::Task(task) => &task.id,
            Self::Id(id) => &id.id,
        }
    }
}

impl From<Task> for Envelope {
    fn from(task: Task) -> Self {
        Self::Task(task)
    }
}

impl From<Id> for Envelope {
    fn from(id: Id) -> Self {
        Self::Id(id)
    }
}

/// Serializes an optional envelope. `None` becomes the empty string.
///
/// # Errors
///
/// Returns `EnvelopeError::Malformed` if JSON serialization fails.
pub fn serialize(envelope: Option<&Envelope>) -> Result<String, EnvelopeError> {
    match envelope {
        None => Ok(String::new()),
        Some(Envelope::Task(task)) => Ok(serde_json::to_string(task)?),
        Some(Envelope::Id(id)) => Ok(serde_json::to_string(id)?),
    }
}

/// Serializes a single task as a task envelope.
///
/// # Errors
///
/// Returns `EnvelopeError::Malformed` if JSON serialization fails.
pub fn serialize_task(task: &Task) -> Result<String, EnvelopeError> {
    Ok(serde_json::to_string(task)?)
}

/// Serializes an identifier as an id envelope.
///
/// # Errors
///
/// Returns `EnvelopeError::Malformed` if JSON serialization fails.
pub fn serialize_id(id: &TaskId) -> Result<String, EnvelopeError> {
    Ok(serde_json::to_string(&Id::from(id.clone()))?)
}

/// Deserializes envelope text. The empty string (or whitespace) is `None`.
///
/// # Errors
///
/// Returns `EnvelopeError::UnknownKind` when the object has neither key,
/// `EnvelopeError::NotAnObject` for non-object JSON, and
/// `EnvelopeError::Malformed` for invalid JSON or fields.
pub fn deserialize(text: &str) -> Result<Option<Envelope>, EnvelopeError> {
    if text.trim().is_empty() {
        return Ok(None);
    }
    let value: Value = serde_json::from_str(text)?;
    let Value::Object(map) = &value else {
        return Err(EnvelopeError::NotAnObject);
    };
    if map.contains_key("task") {
        return Ok(Some(Envelope::Task(serde_json::from_value(value)?)));
    }
    if map.contains_key("id") {
        return Ok(Some(Envelope::Id(serde_json::from_value(value)?)));
    }
    Err(EnvelopeError::UnknownKind)
}

/// Deserializes text that must hold a task envelope.
///
/// # Errors
///
/// Returns `EnvelopeError::WrongKind` for an id envelope, plus any error
/// from [`deserialize`].
pub fn deserialize_task(text: &str) -> Result<Option<Task>, EnvelopeError> {
    match deserialize(text)? {
        None => Ok(None),
        Some(Envelope::Task(task)) => Ok(Some(task)),
        Some(Envelope::Id(_)) => Err(EnvelopeError::WrongKind { expected: "task" }),
    }
}

/// Deserializes text that references a task. Either kind is accepted; a
/// task envelope contributes its identifier.
///
/// # Errors
///
/// Any error from [`deserialize`].
pub fn deserialize_id(text: &str) -> Result<Option<TaskId>, EnvelopeError> {
    Ok(deserialize(text)?.map(|envelope| envelope.task_id().clone()))
}

/// Serializes a task list as a JSON array of task envelopes.
///
/// # Errors
///
/// Returns `EnvelopeError::Malformed` if JSON serialization fails.
pub fn serialize_tasks(tasks: &[Task]) -> Result<String, EnvelopeError> {
    Ok(serde_json::to_string(tasks)?)
}

/// Deserializes a JSON array of task envelopes. Blank text is an empty list.
///
/// # Errors
///
/// Returns `EnvelopeError::Malformed` when the text is not an array of tasks.
pub fn deserialize_tasks(text: &str) -> Result<Vec<Task>, EnvelopeError> {
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }
    Ok(serde_json::from_str(text)?)
}
