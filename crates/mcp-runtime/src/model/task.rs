//! Server-side `Task` entity.
//!
//! Shaped after the `OperationDescriptor`/`TaskResult` split in
//! `rmcp::task_manager`, reworked around a single store-owned `Task` record
//! with a status state machine, rather than a JoinHandle-per-operation
//! processor.

use serde::{Deserialize, Serialize};

use super::meta::JsonObject;

/// Reserved key under `params.task` that requests task-augmented execution.
pub const TASK_CAPABILITY_PARAM_KEY: &str = "task";

/// A task's lifecycle state. Terminal states are absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Working,
    InputRequired,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }
}

/// A server-side deferred-execution record owned by a `TaskStore`.
#[derive(Debug, Clone)]
pub struct Task {
    pub task_id: String,
    pub status: TaskStatus,
    pub poll_interval: Option<u64>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub ttl: Option<u64>,
    pub status_message: Option<String>,
    /// The method of the request that created this task.
    pub method: String,
    pub params: Option<JsonObject>,
    /// Present once the task reaches `completed`.
    pub result: Option<JsonObject>,
    /// Present once the task reaches `failed`.
    pub error: Option<JsonObject>,
}

impl Task {
    pub fn new(task_id: impl Into<String>, method: impl Into<String>, params: Option<JsonObject>) -> Self {
        Self {
            task_id: task_id.into(),
            status: TaskStatus::Working,
            poll_interval: None,
            created_at: chrono::Utc::now(),
            ttl: None,
            status_message: None,
            method: method.into(),
            params,
            result: None,
            error: None,
        }
    }

    pub fn with_ttl(mut self, ttl: Option<u64>) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Option<u64>) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// A task with a stored result must be `completed` or `failed`.
    pub fn has_consistent_result(&self) -> bool {
        match self.status {
            TaskStatus::Completed => self.result.is_some(),
            TaskStatus::Failed => self.error.is_some(),
            _ => self.result.is_none() && self.error.is_none(),
        }
    }

    pub fn summary(&self) -> TaskSummary {
        TaskSummary {
            task_id: self.task_id.clone(),
            status: self.status,
            poll_interval: self.poll_interval,
            status_message: self.status_message.clone(),
        }
    }
}

/// The wire-facing view of a [`Task`] returned by `tasks/get` and `tasks/list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskSummary {
    pub task_id: String,
    pub status: TaskStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub poll_interval: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_message: Option<String>,
}

/// The immediate response to a task-augmented request: the task has been
/// created but the actual result is retrieved later via `tasks/result`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTaskResult {
    pub task: TaskSummary,
}
