//! RPC wire protocol between `rsd` clients and the `rsdd` daemon.
//!
//! Defines the [`RpcMessage`] enum that is postcard-encoded and sent over
//! WebSocket binary frames. Arguments and replies are envelope text (see
//! [`crate::envelope`]), so the frame layer never inspects task contents.

use serde::{Deserialize, Serialize};

/// Status string returned by mutation calls.
pub const STATUS_OK: &str = "ok";
/// Status string returned by `Publish`.
pub const STATUS_PUBLISHED: &str = "published";
/// Status string returned by `Ping`.
pub const STATUS_PONG: &str = "pong";

/// Remote methods exposed by the daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Method {
    /// `(task envelope) -> "ok"`
    AddTask,
    /// `(id envelope) -> "ok"`
    DeleteTask,
    /// `(task envelope) -> "ok"`
    UpdateTask,
    /// `(id envelope) -> "ok"`
    MarkDone,
    /// `(id envelope) -> "ok"`
    MarkNotDone,
    /// `(id envelope) -> "ok"`
    Toggle,
    /// `(id envelope) -> "ok"`
    Pin,
    /// `(id envelope) -> "ok"`
    Unpin,
    /// `(id envelope, title) -> "ok"`
    RenameTask,
    /// `(id envelope, text) -> "ok"`
    SetDescription,
    /// `(id envelope) -> text or ""`
    GetDescription,
    /// `(id envelope) -> task envelope or ""`
    GetTask,
    /// `() -> task list`
    ListTasks,
    /// `(topic, payload) -> "published"`
    Publish,
    /// `() -> "pong"`
    Ping,
}

impl Method {
    /// Every method, in declaration order.
    pub const ALL: [Self; 15] = [
        Self::AddTask,
        Self::DeleteTask,
        Self::UpdateTask,
        Self::MarkDone,
        Self::MarkNotDone,
        Self::Toggle,
        Self::Pin,
        Self::Unpin,
        Self::RenameTask,
        Self::SetDescription,
        Self::GetDescription,
        Self::GetTask,
        Self::ListTasks,
        Self::Publish,
        Self::Ping,
    ];

    /// Wire name of the method.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::AddTask => "AddTask",
            Self::DeleteTask => "DeleteTask",
            Self::UpdateTask => "UpdateTask",
            Self::MarkDone => "MarkDone",
            Self::MarkNotDone => "MarkNotDone",
            Self::Toggle => "Toggle",
            Self::Pin => "Pin",
            Self::Unpin => "Unpin",
            Self::RenameTask => "RenameTask",
            Self::SetDescription => "SetDescription",
            Self::GetDescription => "GetDescription",
            Self::GetTask => "GetTask",
            Self::ListTasks => "ListTasks",
            Self::Publish => "Publish",
            Self::Ping => "Ping",
        }
    }

    /// Number of string arguments the method takes.
    #[must_use]
    pub const fn arity(self) -> usize {
        match self {
            Self::ListTasks | Self::Ping => 0,
            Self::RenameTask | Self::SetDescription | Self::Publish => 2,
            _ => 1,
        }
    }

    /// Whether a successful call changes daemon state and so must be
    /// followed by a `TaskUpdated` broadcast.
    #[must_use]
    pub const fn is_mutation(self) -> bool {
        !matches!(
            self,
            Self::GetDescription | Self::GetTask | Self::ListTasks | Self::Publish | Self::Ping
        )
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Classification of a failed call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RpcErrorKind {
    /// Arguments could not be decoded, or had the wrong envelope kind or count.
    InvalidPayload,
    /// The daemon failed while handling a well-formed call (I/O and similar).
    Internal,
}

/// Error returned to the caller of a failed call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{kind:?}: {message}")]
pub struct RpcError {
    /// Failure class.
    pub kind: RpcErrorKind,
    /// Human-readable detail.
    pub message: String,
}

impl RpcError {
    /// Creates an `InvalidPayload` error.
    pub fn invalid_payload(message: impl Into<String>) -> Self {
        Self {
            kind: RpcErrorKind::InvalidPayload,
            message: message.into(),
        }
    }

    /// Creates an `Internal` error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            kind: RpcErrorKind::Internal,
            message: message.into(),
        }
    }
}

/// Unsolicited daemon-to-client notifications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Signal {
    /// Full current task list after a successful mutation.
    TaskUpdated {
        /// Serialized task list.
        payload: String,
    },
    /// Daemon-side publish forwarded to every client.
    Broadcast {
        /// Destination topic.
        topic: String,
        /// Opaque payload text.
        payload: String,
    },
}

/// Frames exchanged over the daemon WebSocket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RpcMessage {
    /// Client invokes a method. `call_id` is chosen by the client and echoed
    /// in the matching [`RpcMessage::Reply`].
    Call {
        /// Correlation id.
        call_id: u64,
        /// Method to invoke.
        method: Method,
        /// Positional string arguments.
        args: Vec<String>,
    },
    /// Daemon answers a call.
    Reply {
        /// Correlation id of the call being answered.
        call_id: u64,
        /// Return value or error.
        outcome: Result<String, RpcError>,
    },
    /// Daemon notification, interleaved freely with replies.
    Signal(Signal),
}

/// Error type for frame encode/decode operations.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] postcard::Error),
}

/// Encodes an [`RpcMessage`] into bytes using postcard.
///
/// # Errors
///
/// Returns `CodecError::Serialization` if the message cannot be serialized.
pub fn encode(msg: &RpcMessage) -> Result<Vec<u8>, CodecError> {
    Ok(postcard::to_allocvec(msg)?)
}

/// Decodes an [`RpcMessage`] from bytes using postcard.
///
/// # Errors
///
/// Returns `CodecError::Serialization` if the bytes are not a valid message.
pub fn decode(bytes: &[u8]) -> Result<RpcMessage, CodecError> {
    Ok(postcard::from_bytes(bytes)?)
}
