//! `TaskMessageQueue`.
//!
//! New module — `rmcp::task_manager` has no side-channel queue (it assumes
//! the caller awaits a `JoinHandle` directly); this buffers messages for a
//! task whose originating request is no longer being awaited by the
//! client, rather than writing them straight to the transport.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, oneshot};

use crate::error::ProtocolError;
use crate::model::{JsonRpcMessage, RequestId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueuedMessageKind {
    Request,
    Notification,
    Response,
    Error,
}

#[derive(Debug, Clone)]
pub struct QueuedMessage {
    pub kind: QueuedMessageKind,
    pub message: JsonRpcMessage,
    pub timestamp: DateTime<Utc>,
}

type ResponseResolver = oneshot::Sender<Result<serde_json::Value, ProtocolError>>;

#[derive(Default)]
struct TaskQueueEntry {
    messages: Vec<QueuedMessage>,
    resolvers: HashMap<RequestId, ResponseResolver>,
}

/// Holds, per task id, the notifications/requests the engine could not
/// deliver directly because the client is not currently listening on the
/// originating request.
#[derive(Default)]
pub struct TaskMessageQueue {
    by_task: Mutex<HashMap<String, TaskQueueEntry>>,
}

impl TaskMessageQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn enqueue(&self, task_id: &str, message: QueuedMessage) {
        let mut by_task = self.by_task.lock().await;
        by_task.entry(task_id.to_string()).or_default().messages.push(message);
    }

    /// Registers a resolver for a request enqueued as part of this task, so
    /// a later response/error can be matched back to the original caller.
    pub async fn register_resolver(&self, task_id: &str, request_id: RequestId, resolver: ResponseResolver) {
        let mut by_task = self.by_task.lock().await;
        by_task
            .entry(task_id.to_string())
            .or_default()
            .resolvers
            .insert(request_id, resolver);
    }

    pub async fn resolve(&self, task_id: &str, request_id: &RequestId, result: Result<serde_json::Value, ProtocolError>) {
        let mut by_task = self.by_task.lock().await;
        if let Some(entry) = by_task.get_mut(task_id) {
            if let Some(resolver) = entry.resolvers.remove(request_id) {
                let _ = resolver.send(result);
            }
        }
    }

    /// Drains all queued messages for `task_id`, leaving resolvers intact
    /// (they resolve independently as responses arrive).
    pub async fn drain(&self, task_id: &str) -> Vec<QueuedMessage> {
        let mut by_task = self.by_task.lock().await;
        by_task
            .get_mut(task_id)
            .map(|entry| std::mem::take(&mut entry.messages))
            .unwrap_or_default()
    }

    /// Drops queued messages and rejects pending resolvers for a cancelled
    /// or completed task.
    pub async fn clear_rejecting(&self, task_id: &str, reason: &str) {
        let mut by_task = self.by_task.lock().await;
        if let Some(mut entry) = by_task.remove(task_id) {
            entry.messages.clear();
            for (_, resolver) in entry.resolvers.drain() {
                let _ = resolver.send(Err(ProtocolError::internal(reason.to_string())));
            }
        }
    }
}
