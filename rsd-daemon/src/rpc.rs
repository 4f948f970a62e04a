//! RPC dispatch and the mutation → broadcast protocol.
//!
//! [`RpcDispatcher`] decodes call arguments, routes them to the
//! [`TaskService`], and after every successful mutation broadcasts the full
//! current task list as a `TaskUpdated` signal. Task calls pass one at a
//! time through a dispatcher-wide gate, so a broadcast snapshot always
//! reflects exactly the mutations that completed before it. `Publish` is
//! dispatched outside the gate.

use std::sync::Arc;

use rsd_proto::envelope::{self, EnvelopeError};
use rsd_proto::rpc::{Method, RpcError, STATUS_OK, STATUS_PONG};
use rsd_proto::{Task, TaskApi, TaskId};
use tokio::sync::Mutex;

use crate::pubsub::DaemonChannel;
use crate::service::{ServiceError, TaskService};

/// Routes RPC calls to the task service and emits state broadcasts.
#[derive(Debug)]
pub struct RpcDispatcher {
    service: TaskService,
    channel: Arc<DaemonChannel>,
    gate: Mutex<()>,
}

impl RpcDispatcher {
    /// Creates a dispatcher over `service` that broadcasts on `channel`.
    #[must_use]
    pub fn new(service: TaskService, channel: Arc<DaemonChannel>) -> Self {
        Self {
            service,
            channel,
            gate: Mutex::new(()),
        }
    }

    /// The channel this dispatcher broadcasts on.
    #[must_use]
    pub const fn channel(&self) -> &Arc<DaemonChannel> {
        &self.channel
    }

    /// Handles one call to completion, including the follow-up broadcast.
    ///
    /// # Errors
    ///
    /// Returns `InvalidPayload` for malformed or mis-typed arguments and
    /// `Internal` when the service fails.
    pub async fn handle(&self, method: Method, args: &[String]) -> Result<String, RpcError> {
        if args.len() != method.arity() {
            return Err(RpcError::invalid_payload(format!(
                "{method} takes {} argument(s), got {}",
                method.arity(),
                args.len()
            )));
        }
        // Publish touches no task state, and its handlers may call back in.
        if method == Method::Publish {
            return Ok(self.publish(&args[0], &args[1]).await);
        }

        let _turn = self.gate.lock().await;

        let reply = self.invoke(method, args).await.inspect_err(|e| {
            tracing::warn!(method = %method, error = %e, "call failed");
        })?;

        if method.is_mutation() {
            self.broadcast_snapshot().await;
        }
        Ok(reply)
    }

    async fn invoke(&self, method: Method, args: &[String]) -> Result<String, RpcError> {
        let svc = &self.service;
        tracing::debug!(method = %method, "invoking");
        match method {
            Method::AddTask => ok(svc.add_task(&task_arg(&args[0])?).await),
            Method::UpdateTask => ok(svc.update_task(&task_arg(&args[0])?).await),
            Method::DeleteTask => ok(svc.delete_task(&id_arg(&args[0])?).await),
            Method::MarkDone => ok(svc.mark_done(&id_arg(&args[0])?).await),
            Method::MarkNotDone => ok(svc.mark_not_done(&id_arg(&args[0])?).await),
            Method::Toggle => ok(svc.toggle(&id_arg(&args[0])?).await),
            Method::Pin => ok(svc.pin(&id_arg(&args[0])?).await),
            Method::Unpin => ok(svc.unpin(&id_arg(&args[0])?).await),
            Method::RenameTask => ok(svc.rename(&id_arg(&args[0])?, &args[1]).await),
            Method::SetDescription => ok(svc.set_description(&id_arg(&args[0])?, &args[1]).await),
            Method::GetDescription => {
                let text = svc.get_description(&id_arg(&args[0])?).await.map_err(internal)?;
                Ok(text.unwrap_or_default())
            }
            Method::GetTask => {
                let task = svc.get_task(&id_arg(&args[0])?).await.map_err(internal)?;
                match task {
                    Some(task) => envelope::serialize_task(&task).map_err(encode_failure),
                    None => Ok(String::new()),
                }
            }
            Method::ListTasks => {
                let tasks = svc.list_tasks().await.map_err(internal)?;
                envelope::serialize_tasks(&tasks).map_err(encode_failure)
            }
            Method::Publish => Ok(self.publish(&args[0], &args[1]).await),
            Method::Ping => Ok(STATUS_PONG.to_string()),
        }
    }

    async fn publish(&self, topic: &str, payload: &str) -> String {
        self.channel.receive_publish(topic, payload).await.to_string()
    }

    /// Serializes the current task list and emits `TaskUpdated`. A failure
    /// here is logged; the mutation it follows has already succeeded.
    async fn broadcast_snapshot(&self) {
        let payload = match self.service.list_tasks().await {
            Ok(tasks) => envelope::serialize_tasks(&tasks),
            Err(e) => {
                tracing::error!(error = %e, "failed to load tasks for broadcast");
                return;
            }
        };
        match payload {
            Ok(payload) => self.channel.task_updated(payload),
            Err(e) => tracing::error!(error = %e, "failed to serialize tasks for broadcast"),
        }
    }
}

fn ok(result: Result<(), ServiceError>) -> Result<String, RpcError> {
    result.map(|()| STATUS_OK.to_string()).map_err(internal)
}

fn internal(e: ServiceError) -> RpcError {
    tracing::error!(error = %e, "task service failed");
    RpcError::internal(e.to_string())
}

fn encode_failure(e: EnvelopeError) -> RpcError {
    RpcError::internal(e.to_string())
}

fn task_arg(text: &str) -> Result<Task, RpcError> {
    envelope::deserialize_task(text)
        .map_err(|e| RpcError::invalid_payload(e.to_string()))?
        .ok_or_else(|| RpcError::invalid_payload("expected a task envelope, got nothing"))
}

fn id_arg(text: &str) -> Result<TaskId, RpcError> {
    envelope::deserialize_id(text)
        .map_err(|e| RpcError::invalid_payload(e.to_string()))?
        .ok_or_else(|| RpcError::invalid_payload("expected an id envelope, got nothing"))
}
