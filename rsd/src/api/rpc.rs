//! [`TaskApi`] over a daemon connection.

use std::sync::Arc;

use rsd_proto::envelope;
use rsd_proto::rpc::{Method, STATUS_OK};
use rsd_proto::{Task, TaskApi, TaskId};

use crate::connection::{ConnectionError, DaemonConnection};

/// Forwards every operation to `rsdd` as an RPC call.
#[derive(Debug, Clone)]
pub struct RpcApi {
    conn: Arc<DaemonConnection>,
}

impl RpcApi {
    /// Wraps an open connection.
    pub const fn new(conn: Arc<DaemonConnection>) -> Self {
        Self { conn }
    }

    /// The underlying connection.
    pub const fn connection(&self) -> &Arc<DaemonConnection> {
        &self.conn
    }

    async fn expect_ok(&self, method: Method, args: Vec<String>) -> Result<(), ConnectionError> {
        let status = self.conn.call(method, args).await?;
        if status != STATUS_OK {
            tracing::debug!(%method, status = %status, "unexpected status from daemon");
        }
        Ok(())
    }

    async fn with_id(&self, method: Method, id: &TaskId) -> Result<(), ConnectionError> {
        self.expect_ok(method, vec![envelope::serialize_id(id)?]).await
    }

    async fn with_task(&self, method: Method, task: &Task) -> Result<(), ConnectionError> {
        self.expect_ok(method, vec![envelope::serialize_task(task)?]).await
    }
}

impl TaskApi for RpcApi {
    type Error = ConnectionError;

    async fn list_tasks(&self) -> Result<Vec<Task>, ConnectionError> {
        let text = self.conn.call(Method::ListTasks, vec![]).await?;
        Ok(envelope::deserialize_tasks(&text)?)
    }

    async fn get_task(&self, id: &TaskId) -> Result<Option<Task>, ConnectionError> {
        let text = self.conn.call(Method::GetTask, vec![envelope::serialize_id(id)?]).await?;
        Ok(envelope::deserialize_task(&text)?)
    }

    async fn add_task(&self, task: &Task) -> Result<(), ConnectionError> {
        self.with_task(Method::AddTask, task).await
    }

    async fn update_task(&self, task: &Task) -> Result<(), ConnectionError> {
        self.with_task(Method::UpdateTask, task).await
    }

    async fn delete_task(&self, id: &TaskId) -> Result<(), ConnectionError> {
        self.with_id(Method::DeleteTask, id).await
    }

    async fn mark_done(&self, id: &TaskId) -> Result<(), ConnectionError> {
        self.with_id(Method::MarkDone, id).await
    }

    async fn mark_not_done(&self, id: &TaskId) -> Result<(), ConnectionError> {
        self.with_id(Method::MarkNotDone, id).await
    }

    async fn toggle(&self, id: &TaskId) -> Result<(), ConnectionError> {
        self.with_id(Method::Toggle, id).await
    }

    async fn pin(&self, id: &TaskId) -> Result<(), ConnectionError> {
        self.with_id(Method::Pin, id).await
    }

    async fn unpin(&self, id: &TaskId) -> Result<(), ConnectionError> {
        self.with_id(Method::Unpin, id).await
    }

    async fn rename(&self, id: &TaskId, title: &str) -> Result<(), ConnectionError> {
        let args = vec![envelope::serialize_id(id)?, title.to_string()];
        self.expect_ok(Method::RenameTask, args).await
    }

    /// The daemon answers `""` for a missing description, which maps to `None`.
    async fn get_description(&self, id: &TaskId) -> Result<Option<String>, ConnectionError> {
        let text = self
            .conn
            .call(Method::GetDescription, vec![envelope::serialize_id(id)?])
            .await?;
        Ok((!text.is_empty()).then_some(text))
    }

    async fn set_description(&self, id: &TaskId, text: &str) -> Result<(), ConnectionError> {
        let args = vec![envelope::serialize_id(id)?, text.to_string()];
        self.expect_ok(Method::SetDescription, args).await
    }
}
