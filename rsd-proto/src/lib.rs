//! Shared data model and wire protocol for `ReadySetDone`.

pub mod api;
pub mod dispatch;
pub mod envelope;
pub mod rpc;
pub mod task;
pub mod topics;

pub use api::TaskApi;
pub use task::{Id, Task, TaskId, Timestamp};
