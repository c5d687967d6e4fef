//! Server-side task lifecycle: binds `TaskStore` + `TaskMessageQueue` to the
//! `tasks/get`, `tasks/result`, `tasks/list`, `tasks/cancel` methods and
//! stamps `_meta.mcp/relatedTask` onto messages sent while a handler is
//! running as a deferred task.
//!
//! Shaped after `rmcp::task_manager::OperationProcessor`, whose
//! `running_tasks: HashMap<String, JoinHandle<...>>` plus
//! `tokio::time::timeout` wrapper is the same shape generalized here around
//! `TaskStore` instead of a raw `JoinHandle` map.

use std::sync::Arc;

use crate::error::{ProtocolError, ProtocolResult};
use crate::model::{JsonObject, Meta, RelatedTask, Task, TaskStatus, TaskSummary};
use crate::tasks::queue::TaskMessageQueue;
use crate::tasks::store::TaskStore;

/// Handed to a request handler invoked as a deferred task, so it can check
/// its own id and report incremental status without reaching back into the
/// engine's internals.
#[derive(Clone)]
pub struct TaskContext {
    pub task_id: String,
    store: Arc<dyn TaskStore>,
    queue: Arc<TaskMessageQueue>,
}

impl TaskContext {
    pub fn new(task_id: String, store: Arc<dyn TaskStore>, queue: Arc<TaskMessageQueue>) -> Self {
        Self {
            task_id,
            store,
            queue,
        }
    }

    pub async fn report_status(&self, message: impl Into<String>) -> ProtocolResult<()> {
        self.store
            .update_status(&self.task_id, TaskStatus::Working, Some(message.into()))
            .await
    }

    /// `_meta.mcp/relatedTask` to attach to a request/notification sent from
    /// within this task's handler, so the receiver can correlate it.
    pub fn related_task_meta(&self) -> Meta {
        let mut meta = Meta::default();
        meta.set_related_task(RelatedTask {
            task_id: self.task_id.clone(),
        });
        meta
    }

    pub fn queue(&self) -> &Arc<TaskMessageQueue> {
        &self.queue
    }
}

/// Owns the task store and message queue and exposes the four task methods
/// as plain async functions; `engine.rs` wires these to the method router.
pub struct TaskManager {
    store: Arc<dyn TaskStore>,
    queue: Arc<TaskMessageQueue>,
}

impl TaskManager {
    pub fn new(store: Arc<dyn TaskStore>) -> Self {
        Self {
            store,
            queue: Arc::new(TaskMessageQueue::new()),
        }
    }

    pub fn store(&self) -> &Arc<dyn TaskStore> {
        &self.store
    }

    pub fn queue(&self) -> &Arc<TaskMessageQueue> {
        &self.queue
    }

    /// Creates the task record a deferred handler will run against, and a
    /// `TaskContext` to pass into that handler.
    pub async fn begin_task(
        &self,
        method: &str,
        params: Option<JsonObject>,
        ttl: Option<u64>,
    ) -> (Task, TaskContext) {
        let task = self.store.create_task(method, params, ttl).await;
        let ctx = TaskContext::new(task.task_id.clone(), self.store.clone(), self.queue.clone());
        (task, ctx)
    }

    /// `tasks/get`: returns the current status snapshot.
    pub async fn get(&self, task_id: &str) -> ProtocolResult<TaskSummary> {
        self.store
            .get(task_id)
            .await
            .map(|t| t.summary())
            .ok_or_else(|| ProtocolError::invalid_params(format!("unknown task id {task_id}")))
    }

    /// `tasks/list`.
    pub async fn list(&self) -> Vec<TaskSummary> {
        self.store.list().await.iter().map(Task::summary).collect()
    }

    /// `tasks/cancel`: marks the task cancelled and rejects any
    /// pending side-channel resolvers.
    pub async fn cancel(&self, task_id: &str) -> ProtocolResult<()> {
        self.store
            .update_status(task_id, TaskStatus::Cancelled, None)
            .await?;
        self.queue
            .clear_rejecting(task_id, "Task cancelled or completed")
            .await;
        Ok(())
    }

    /// `tasks/result`: long-polls until the task reaches a
    /// terminal state, then returns its result or error.
    pub async fn result(&self, task_id: &str) -> ProtocolResult<JsonObject> {
        loop {
            let task = self
                .store
                .get(task_id)
                .await
                .ok_or_else(|| ProtocolError::invalid_params(format!("unknown task id {task_id}")))?;
            match task.status {
                TaskStatus::Completed => {
                    return Ok(task.result.unwrap_or_default());
                }
                TaskStatus::Failed => {
                    let data = task.error.unwrap_or_default();
                    return Err(ProtocolError::internal(
                        data.get("message")
                            .and_then(|v| v.as_str())
                            .unwrap_or("task failed")
                            .to_string(),
                    ));
                }
                TaskStatus::Cancelled => {
                    return Err(ProtocolError::RequestCancelled {
                        reason: Some("task cancelled".to_string()),
                    });
                }
                TaskStatus::Working | TaskStatus::InputRequired => {
                    self.store.wait_for_change(task_id).await;
                }
            }
        }
    }
}
