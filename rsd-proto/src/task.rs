//! Task data model shared by the daemon and its clients.
//!
//! A [`Task`] is the unit of work tracked by `ReadySetDone`. The daemon owns
//! the canonical copy; clients only ever hold snapshots received over RPC or
//! broadcast, which may be stale the moment a broadcast is missed.

use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, FixedOffset, Local, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Deserializer, Serialize, Serializer, de};
use uuid::Uuid;

/// Opaque, globally unique task identifier.
///
/// Freshly generated identifiers are UUID v7 strings, but any string read
/// from a task document is accepted verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    /// Wraps an existing identifier string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a fresh time-ordered identifier (UUID v7).
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    /// Returns the identifier text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TaskId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Reference to a task by identifier only.
///
/// Used at the serialization boundary to tell "caller wants to reference a
/// task" apart from "caller is sending a full task".
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Id {
    /// Identifier of the referenced task.
    pub id: TaskId,
}

impl Id {
    /// Creates a reference to the given task identifier.
    pub fn new(id: impl Into<TaskId>) -> Self {
        Self { id: id.into() }
    }
}

impl From<TaskId> for Id {
    fn from(id: TaskId) -> Self {
        Self { id }
    }
}

/// A single task.
///
/// Invariant: `completed` is `Some` exactly when `done` is `true`. The
/// state-changing methods below maintain it; each returns whether it changed
/// anything so callers can skip rewriting an untouched document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Immutable identifier, never reassigned.
    pub id: TaskId,
    /// Task title. Serialized under the `task` key for compatibility with
    /// existing task documents.
    #[serde(rename = "task")]
    pub title: String,
    /// Whether the task is complete.
    pub done: bool,
    /// When the task was created. Set exactly once.
    pub created: Timestamp,
    /// When the task last became done.
    #[serde(default, with = "optional_timestamp")]
    pub completed: Option<Timestamp>,
    /// User-set due date.
    #[serde(default, with = "optional_timestamp")]
    pub due: Option<Timestamp>,
    /// Pinned tasks sort first. Independent of `done`.
    #[serde(default)]
    pub pinned: bool,
}

impl Task {
    /// Creates a new open task stamped with a fresh identifier and the
    /// current local time.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            id: TaskId::generate(),
            title: title.into(),
            done: false,
            created: Timestamp::now(),
            completed: None,
            due: None,
            pinned: false,
        }
    }

    /// Sets the done state through [`Task::mark_done`] or [`Task::mark_not_done`].
    #[must_use]
    pub fn with_done(mut self, done: bool) -> Self {
        if done {
            self.mark_done();
        } else {
            self.mark_not_done();
        }
        self
    }

    /// Sets the due date.
    #[must_use]
    pub const fn with_due(mut self, due: Option<Timestamp>) -> Self {
        self.due = due;
        self
    }

    /// Sets the pinned flag.
    #[must_use]
    pub const fn with_pinned(mut self, pinned: bool) -> Self {
        self.pinned = pinned;
        self
    }

    /// Returns an [`Id`] reference to this task.
    #[must_use]
    pub fn to_id(&self) -> Id {
        Id::from(self.id.clone())
    }

    /// Marks the task done. A task without a recorded completion time takes
    /// its creation time.
    ///
    /// Returns `false` when the task was already done.
    pub fn mark_done(&mut self) -> bool {
        if self.done {
            return false;
        }
        self.done = true;
        self.completed = self.completed.or(Some(self.created));
        true
    }

    /// Marks the task not done and clears its completion time.
    ///
    /// Returns `false` when the task was already open.
    pub fn mark_not_done(&mut self) -> bool {
        if !self.done {
            return false;
        }
        self.done = false;
        self.completed = None;
        true
    }

    /// Flips the done state. Always changes the task.
    pub fn toggle(&mut self) -> bool {
        if self.done {
            self.mark_not_done()
        } else {
            self.mark_done()
        }
    }

    /// Sets the pinned flag, returning whether it changed.
    pub fn set_pinned(&mut self, pinned: bool) -> bool {
        std::mem::replace(&mut self.pinned, pinned) != pinned
    }

    /// Replaces the title, returning whether it changed.
    pub fn rename(&mut self, title: &str) -> bool {
        if self.title == title {
            return false;
        }
        title.clone_into(&mut self.title);
        true
    }
}

/// A point in time as written in a task document.
///
/// Holds the wall-clock time and, when the source text carried one, its UTC
/// offset. Formatting reproduces the offset, so a document written by another
/// tool keeps its timestamps across a rewrite. Timestamps created here are
/// naive local time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Timestamp {
    wall: NaiveDateTime,
    offset: Option<FixedOffset>,
}

const OUTPUT_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";
const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];
const OFFSET_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f%:z", "%Y-%m-%d %H:%M:%S%.f%:z"];

impl Timestamp {
    /// The current local time, without an offset.
    #[must_use]
    pub fn now() -> Self {
        Self::from(Local::now().naive_local())
    }

    /// A wall-clock time at a fixed UTC offset.
    #[must_use]
    pub const fn with_offset(wall: NaiveDateTime, offset: FixedOffset) -> Self {
        Self {
            wall,
            offset: Some(offset),
        }
    }

    /// The wall-clock time as written.
    #[must_use]
    pub const fn naive(&self) -> NaiveDateTime {
        self.wall
    }

    /// The UTC offset, if the timestamp carried one.
    #[must_use]
    pub const fn offset(&self) -> Option<FixedOffset> {
        self.offset
    }

    /// Formats the wall-clock time with a strftime pattern.
    pub fn format<'a>(&self, fmt: &'a str) -> impl fmt::Display + 'a {
        self.wall.format(fmt)
    }

    /// Parses ISO-8601 text.
    ///
    /// Accepts `T` or space separators, an optional fraction, an optional
    /// `+HH:MM` or `Z` offset, and bare dates (read as midnight). Returns
    /// `None` when nothing matches.
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        if let Some(wall) = NAIVE_FORMATS
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        {
            return Some(Self::from(wall));
        }
        let with_offset = OFFSET_FORMATS
            .iter()
            .find_map(|fmt| DateTime::parse_from_str(text, fmt).ok())
            .or_else(|| DateTime::parse_from_rfc3339(text).ok());
        if let Some(dt) = with_offset {
            return Some(Self::with_offset(dt.naive_local(), *dt.offset()));
        }
        NaiveDate::parse_from_str(text, "%Y-%m-%d")
            .ok()
            .map(|date| Self::from(date.and_time(NaiveTime::MIN)))
    }
}

impl From<NaiveDateTime> for Timestamp {
    fn from(wall: NaiveDateTime) -> Self {
        Self { wall, offset: None }
    }
}

impl Ord for Timestamp {
    fn cmp(&self, other: &Self) -> Ordering {
        let secs = |ts: &Self| ts.offset.map(|o| o.local_minus_utc());
        self.wall
            .cmp(&other.wall)
            .then_with(|| secs(self).cmp(&secs(other)))
    }
}

impl PartialOrd for Timestamp {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// ISO-8601 with the `T` separator, a fraction only when non-zero, and the
/// offset when present.
impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.wall.format(OUTPUT_FORMAT))?;
        if let Some(offset) = self.offset {
            write!(f, "{offset}")?;
        }
        Ok(())
    }
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Self::parse(&text).ok_or_else(|| de::Error::custom(format!("invalid timestamp: {text:?}")))
    }
}

/// Nullable timestamps. `null` and `""` read as `None`, never as a sentinel date.
mod optional_timestamp {
    use serde::{Deserialize, Deserializer, Serialize, Serializer, de};

    use super::Timestamp;

    #[allow(clippy::ref_option)]
    pub fn serialize<S: Serializer>(
        value: &Option<Timestamp>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        value.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Timestamp>, D::Error> {
        match Option::<String>::deserialize(deserializer)? {
            None => Ok(None),
            Some(text) if text.trim().is_empty() => Ok(None),
            Some(text) => Timestamp::parse(&text)
                .map(Some)
                .ok_or_else(|| de::Error::custom(format!("invalid timestamp: {text:?}"))),
        }
    }
}
