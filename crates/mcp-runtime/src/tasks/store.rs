//! `TaskStore`.
//!
//! The interface is this crate's contract; persistence beyond it is a
//! non-goal. `InMemoryTaskStore` is the reference implementation used by
//! tests and the default configuration, shaped loosely after the
//! `running_tasks`/`completed_results` split in
//! `rmcp::task_manager::OperationProcessor`, reworked around an explicit
//! `Task` state machine rather than a JoinHandle pool.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};

use crate::error::{ProtocolError, ProtocolResult};
use crate::model::{JsonObject, Task, TaskStatus};

#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn create_task(&self, method: &str, params: Option<JsonObject>, ttl: Option<u64>) -> Task;

    async fn get(&self, task_id: &str) -> Option<Task>;

    async fn list(&self) -> Vec<Task>;

    /// Transitions terminal states at most once.
    async fn update_status(
        &self,
        task_id: &str,
        status: TaskStatus,
        status_message: Option<String>,
    ) -> ProtocolResult<()>;

    async fn store_result(&self, task_id: &str, result: JsonObject) -> ProtocolResult<()>;

    async fn store_error(&self, task_id: &str, error: JsonObject) -> ProtocolResult<()>;

    /// Suspends until `task_id`'s status changes, or returns immediately if
    /// it is already terminal. Used by the `tasks/result` long-poll instead
    /// of a bare sleep loop.
    async fn wait_for_change(&self, task_id: &str);
}

struct StoredTask {
    task: Task,
    notify: Arc<Notify>,
}

#[derive(Default)]
pub struct InMemoryTaskStore {
    tasks: Mutex<HashMap<String, StoredTask>>,
    next_id: std::sync::atomic::AtomicU64,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate_id(&self) -> String {
        let n = self
            .next_id
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        format!("t_{n}")
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn create_task(&self, method: &str, params: Option<JsonObject>, ttl: Option<u64>) -> Task {
        let task_id = self.allocate_id();
        let task = Task::new(task_id.clone(), method, params).with_ttl(ttl);
        let mut tasks = self.tasks.lock().await;
        tasks.insert(
            task_id,
            StoredTask {
                task: task.clone(),
                notify: Arc::new(Notify::new()),
            },
        );
        task
    }

    async fn get(&self, task_id: &str) -> Option<Task> {
        self.tasks.lock().await.get(task_id).map(|t| t.task.clone())
    }

    async fn list(&self) -> Vec<Task> {
        self.tasks.lock().await.values().map(|t| t.task.clone()).collect()
    }

    async fn update_status(
        &self,
        task_id: &str,
        status: TaskStatus,
        status_message: Option<String>,
    ) -> ProtocolResult<()> {
        let mut tasks = self.tasks.lock().await;
        let stored = tasks
            .get_mut(task_id)
            .ok_or_else(|| ProtocolError::internal(format!("unknown task {task_id}")))?;
        if stored.task.status.is_terminal() {
            return Err(ProtocolError::internal(format!(
                "task {task_id} is already in a terminal state"
            )));
        }
        stored.task.status = status;
        stored.task.status_message = status_message;
        stored.notify.notify_waiters();
        Ok(())
    }

    async fn store_result(&self, task_id: &str, result: JsonObject) -> ProtocolResult<()> {
        let mut tasks = self.tasks.lock().await;
        let stored = tasks
            .get_mut(task_id)
            .ok_or_else(|| ProtocolError::internal(format!("unknown task {task_id}")))?;
        if stored.task.status.is_terminal() {
            return Err(ProtocolError::internal(format!(
                "task {task_id} is already in a terminal state"
            )));
        }
        stored.task.status = TaskStatus::Completed;
        stored.task.result = Some(result);
        stored.notify.notify_waiters();
        Ok(())
    }

    async fn store_error(&self, task_id: &str, error: JsonObject) -> ProtocolResult<()> {
        let mut tasks = self.tasks.lock().await;
        let stored = tasks
            .get_mut(task_id)
            .ok_or_else(|| ProtocolError::internal(format!("unknown task {task_id}")))?;
        if stored.task.status.is_terminal() {
            return Err(ProtocolError::internal(format!(
                "task {task_id} is already in a terminal state"
            )));
        }
        stored.task.status = TaskStatus::Failed;
        stored.task.error = Some(error);
        stored.notify.notify_waiters();
        Ok(())
    }

    async fn wait_for_change(&self, task_id: &str) {
        let notify = {
            let tasks = self.tasks.lock().await;
            match tasks.get(task_id) {
                Some(stored) if stored.task.status.is_terminal() => return,
                Some(stored) => stored.notify.clone(),
                None => return,
            }
        };
        notify.notified().await;
    }
}
