//! Task API backends available to the client.
//!
//! [`Backend`] picks between the daemon ([`RpcApi`]) and direct access to
//! the task files ([`TaskService`]). [`RecordingApi`] is an in-memory
//! stand-in used by tests.

mod recording;
mod rpc;

pub use recording::{ApiCall, RecordingApi};
pub use rpc::RpcApi;

use rsd_daemon::service::TaskService;
use rsd_proto::{Task, TaskApi, TaskId};

use crate::error::ClientError;

/// The backend selected by the `backend` setting.
#[derive(Debug, Clone)]
pub enum Backend {
    /// Every call goes through `rsdd`.
    Daemon(RpcApi),
    /// The client reads and writes the task files itself.
    Local(TaskService),
}

impl Backend {
    /// Short name for logs.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Daemon(_) => "daemon",
            Self::Local(_) => "local",
        }
    }
}

/// Runs the same call against whichever backend is selected.
macro_rules! delegate {
    ($self:ident, $api:ident => $call:expr) => {
        match $self {
            Self::Daemon($api) => Ok($call.await?),
            Self::Local($api) => Ok($call.await?),
        }
    };
}

impl TaskApi for Backend {
    type Error = ClientError;

    async fn list_tasks(&self) -> Result<Vec<Task>, ClientError> {
        delegate!(self, api => api.list_tasks())
    }

    async fn get_task(&self, id: &TaskId) -> Result<Option<Task>, ClientError> {
        delegate!(self, api => api.get_task(id))
    }

    async fn add_task(&self, task: &Task) -> Result<(), ClientError> {
        delegate!(self, api => api.add_task(task))
    }

    async fn update_task(&self, task: &Task) -> Result<(), ClientError> {
        delegate!(self, api => api.update_task(task))
    }

    async fn delete_task(&self, id: &TaskId) -> Result<(), ClientError> {
        delegate!(self, api => api.delete_task(id))
    }

    async fn mark_done(&self, id: &TaskId) -> Result<(), ClientError> {
        delegate!(self, api => api.mark_done(id))
    }

    async fn mark_not_done(&self, id: &TaskId) -> Result<(), ClientError> {
        delegate!(self, api => api.mark_not_done(id))
    }

    async fn toggle(&self, id: &TaskId) -> Result<(), ClientError> {
        delegate!(self, api => api.toggle(id))
    }

    async fn pin(&self, id: &TaskId) -> Result<(), ClientError> {
        delegate!(self, api => api.pin(id))
    }

    async fn unpin(&self, id: &TaskId) -> Result<(), ClientError> {
        delegate!(self, api => api.unpin(id))
    }

    async fn rename(&self, id: &TaskId, title: &str) -> Result<(), ClientError> {
        delegate!(self, api => api.rename(id, title))
    }

    async fn get_description(&self, id: &TaskId) -> Result<Option<String>, ClientError> {
        delegate!(self, api => api.get_description(id))
    }

    async fn set_description(&self, id: &TaskId, text: &str) -> Result<(), ClientError> {
        delegate!(self, api => api.set_description(id, text))
    }
}
