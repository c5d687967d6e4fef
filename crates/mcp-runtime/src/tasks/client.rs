//! Client-side task plugin: polls `tasks/get`, then drains `tasks/result`
//! into a stream of [`StreamEvent`]s.
//!
//! No analogue in `rmcp` (it has no task concept at all); shaped as a
//! [`Plugin`] so it slots into the same `on_before_send_request` /
//! `on_response` hooks every other cross-cutting concern uses.

use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, BoxStream};
use serde_json::Value;

use crate::error::{ProtocolError, ProtocolResult};
use crate::model::{JsonObject, TaskStatus, TaskSummary};
use crate::plugin::Plugin;

#[derive(Debug, Clone)]
pub enum StreamEvent {
    TaskCreated { task: TaskSummary },
    TaskStatus { task: TaskSummary },
    Result { value: Value },
    Error { error: ProtocolError },
}

#[derive(Debug, Clone, Copy)]
pub struct TaskRequestOptions {
    /// How often to re-poll `tasks/get` while a task is non-terminal.
    pub poll_interval: Duration,
}

impl Default for TaskRequestOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(250),
        }
    }
}

/// The client-side half of the caller/callee pair: given a created task,
/// drives the `tasks/get` → `tasks/result` polling sequence and yields it
/// as a [`Stream`] of [`StreamEvent`]s.
pub struct TaskClientPlugin {
    options: TaskRequestOptions,
}

impl TaskClientPlugin {
    pub fn new(options: TaskRequestOptions) -> Self {
        Self { options }
    }

    /// Polls a task to completion, calling `get_task`/`get_result` supplied
    /// by the engine (kept generic over the actual RPC mechanism so this
    /// module has no direct dependency on `engine::Engine`).
    pub fn request_stream<G, R, GF, RF>(
        &self,
        initial: TaskSummary,
        get_task: G,
        get_result: R,
    ) -> BoxStream<'static, StreamEvent>
    where
        G: Fn(String) -> GF + Send + Sync + 'static,
        GF: std::future::Future<Output = ProtocolResult<TaskSummary>> + Send + 'static,
        R: Fn(String) -> RF + Send + Sync + 'static,
        RF: std::future::Future<Output = ProtocolResult<JsonObject>> + Send + 'static,
    {
        let poll_interval = self.options.poll_interval;
        Box::pin(stream::unfold(
            Some(TaskPollState::Created(initial)),
            move |state| {
                let get_task = &get_task;
                let get_result = &get_result;
                async move {
                    let state = state?;
                    let (event, next) = advance(state, poll_interval, get_task, get_result).await;
                    Some((event, next))
                }
            },
        ))
    }
}

enum TaskPollState {
    Created(TaskSummary),
    Polling(TaskSummary),
    Finishing(TaskSummary),
}

async fn advance<G, R, GF, RF>(
    state: TaskPollState,
    poll_interval: Duration,
    get_task: &G,
    get_result: &R,
) -> (StreamEvent, Option<TaskPollState>)
where
    G: Fn(String) -> GF,
    GF: std::future::Future<Output = ProtocolResult<TaskSummary>>,
    R: Fn(String) -> RF,
    RF: std::future::Future<Output = ProtocolResult<JsonObject>>,
{
    match state {
        TaskPollState::Created(task) => {
            let next = if task.status.is_terminal() || task.status == TaskStatus::InputRequired {
                TaskPollState::Finishing(task.clone())
            } else {
                TaskPollState::Polling(task.clone())
            };
            (StreamEvent::TaskCreated { task }, Some(next))
        }
        TaskPollState::Polling(task) => {
            tokio::time::sleep(poll_interval).await;
            match get_task(task.task_id.clone()).await {
                Ok(updated) => {
                    let next = if updated.status.is_terminal() || updated.status == TaskStatus::InputRequired
                    {
                        TaskPollState::Finishing(updated.clone())
                    } else {
                        TaskPollState::Polling(updated.clone())
                    };
                    (StreamEvent::TaskStatus { task: updated }, Some(next))
                }
                Err(error) => (StreamEvent::Error { error }, None),
            }
        }
        TaskPollState::Finishing(task) => {
            let event = match task.status {
                TaskStatus::Completed | TaskStatus::InputRequired => {
                    match get_result(task.task_id.clone()).await {
                        Ok(result) => StreamEvent::Result {
                            value: Value::Object(result),
                        },
                        Err(error) => StreamEvent::Error { error },
                    }
                }
                TaskStatus::Failed => StreamEvent::Error {
                    error: ProtocolError::internal(
                        task.status_message.unwrap_or_else(|| "task failed".to_string()),
                    ),
                },
                TaskStatus::Cancelled => StreamEvent::Error {
                    error: ProtocolError::RequestCancelled {
                        reason: Some("task cancelled".to_string()),
                    },
                },
                TaskStatus::Working => StreamEvent::Error {
                    error: ProtocolError::internal("task reached Finishing in a non-terminal state"),
                },
            };
            (event, None)
        }
    }
}

#[async_trait]
impl Plugin for TaskClientPlugin {
    fn name(&self) -> &str {
        "task-client"
    }
}
