//! StreamManager: chunked tool-argument streaming.
//!
//! New module — `rmcp::model::tool::Tool`/`ToolExecution` is static, so
//! there is no direct analogue. Built on `model::tool::StreamingArgument`
//! / `MergeStrategy` (added to the adapted `Tool` type for this purpose) and
//! on the per-request idle-timer shape already established in
//! [`crate::timeout::TimeoutManager`] — two `tokio::time::sleep_until` races
//! against a `Notify` reset, here doubled up for a warning threshold and a
//! hard timeout.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::error::{ProtocolError, ProtocolResult};
use crate::model::{JsonObject, MergeStrategy, StreamingArgument};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamStatus {
    Active,
    Warning,
    Timeout,
    Cancelled,
    Completed,
}

#[derive(Debug, Error)]
pub enum StreamValidationError {
    #[error("unknown stream {0}")]
    UnknownStream(String),
    #[error("unknown streaming argument {argument} for call {call_id}")]
    UnknownArgument { call_id: String, argument: String },
    #[error("argument {argument} rejects chunk type for merge strategy {strategy:?}")]
    InvalidChunkType {
        argument: String,
        strategy: MergeStrategy,
    },
    #[error("stream {0} is not active")]
    NotActive(String),
}

impl From<StreamValidationError> for ProtocolError {
    fn from(value: StreamValidationError) -> Self {
        ProtocolError::InvalidParams(value.to_string())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct StreamConfig {
    pub warning_threshold_ms: u64,
    pub default_timeout_ms: u64,
    pub max_timeout_ms: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            warning_threshold_ms: 15_000,
            default_timeout_ms: 30_000,
            max_timeout_ms: 120_000,
        }
    }
}

impl StreamConfig {
    /// `defaultTimeoutMs` clamped into `[1000, maxTimeoutMs]`.
    fn clamped_timeout(&self) -> Duration {
        let max = self.max_timeout_ms.max(1000);
        Duration::from_millis(self.default_timeout_ms.clamp(1000, max))
    }

    fn warning(&self) -> Duration {
        Duration::from_millis(self.warning_threshold_ms)
    }
}

#[derive(Debug, Clone, Default)]
struct ArgumentBuffer {
    chunks: Vec<Value>,
    complete: bool,
}

pub struct StreamState {
    pub call_id: String,
    pub tool_name: String,
    arguments: HashMap<String, ArgumentBuffer>,
    pub start_time: Instant,
    pub last_activity_time: Instant,
    pub status: StreamStatus,
    pub config: StreamConfig,
    pub annotations: Vec<StreamingArgument>,
}

impl StreamState {
    fn annotation(&self, name: &str) -> Option<&StreamingArgument> {
        self.annotations.iter().find(|a| a.name == name)
    }
}

fn accepts(strategy: MergeStrategy, value: &Value) -> bool {
    match strategy {
        MergeStrategy::Concatenate => {
            matches!(value, Value::String(_) | Value::Number(_) | Value::Bool(_))
        }
        MergeStrategy::JsonMerge => matches!(value, Value::Object(_) | Value::Null),
        MergeStrategy::Last => true,
    }
}

fn coerce_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}

/// Merges a single argument's chunks per its declared strategy.
fn merge_argument(strategy: MergeStrategy, chunks: &[Value]) -> Value {
    match strategy {
        MergeStrategy::Concatenate => {
            Value::String(chunks.iter().map(coerce_to_string).collect::<String>())
        }
        MergeStrategy::JsonMerge => {
            let mut merged = JsonObject::new();
            for chunk in chunks {
                if let Value::Object(obj) = chunk {
                    merged.extend(obj.clone());
                }
            }
            Value::Object(merged)
        }
        MergeStrategy::Last => chunks.last().cloned().unwrap_or(Value::Null),
    }
}

type ErrorCallback = Arc<dyn Fn(&str, &StreamValidationError) + Send + Sync>;
type WarningCallback = Arc<dyn Fn(&str) + Send + Sync>;
type TimeoutCallback = Arc<dyn Fn(&str) + Send + Sync>;
type CancellationCallback = Arc<dyn Fn(&str) + Send + Sync>;

#[derive(Default, Clone)]
pub struct StreamCallbacks {
    pub on_error: Option<ErrorCallback>,
    pub on_warning: Option<WarningCallback>,
    pub on_timeout: Option<TimeoutCallback>,
    pub on_cancellation: Option<CancellationCallback>,
}

struct Entry {
    state: StreamState,
    notify: Arc<Notify>,
    supervisor: JoinHandle<()>,
}

/// Owns every active stream.
pub struct StreamManager {
    streams: Arc<Mutex<HashMap<String, Entry>>>,
    callbacks: StreamCallbacks,
}

impl StreamManager {
    pub fn new(callbacks: StreamCallbacks) -> Self {
        Self {
            streams: Arc::new(Mutex::new(HashMap::new())),
            callbacks,
        }
    }

    /// `tools/stream_call`: opens a `StreamState` and starts its idle/warning
    /// supervisor.
    pub async fn open(
        &self,
        call_id: impl Into<String>,
        tool_name: impl Into<String>,
        annotations: Vec<StreamingArgument>,
        config: StreamConfig,
    ) {
        let call_id = call_id.into();
        let now = Instant::now();
        let state = StreamState {
            call_id: call_id.clone(),
            tool_name: tool_name.into(),
            arguments: HashMap::new(),
            start_time: now,
            last_activity_time: now,
            status: StreamStatus::Active,
            config,
            annotations,
        };
        let notify = Arc::new(Notify::new());
        let supervisor = self.spawn_supervisor(call_id.clone(), notify.clone());
        let mut streams = self.streams.lock().await;
        streams.insert(
            call_id,
            Entry {
                state,
                notify,
                supervisor,
            },
        );
    }

    fn spawn_supervisor(&self, call_id: String, notify: Arc<Notify>) -> JoinHandle<()> {
        let streams = self.streams.clone();
        let callbacks = self.callbacks.clone();
        tokio::spawn(async move {
            loop {
                let (warning_deadline, timeout_deadline) = {
                    let streams = streams.lock().await;
                    match streams.get(&call_id) {
                        Some(entry) if entry.state.status == StreamStatus::Active
                            || entry.state.status == StreamStatus::Warning =>
                        {
                            (
                                entry.state.last_activity_time + entry.state.config.warning(),
                                entry.state.last_activity_time + entry.state.config.clamped_timeout(),
                            )
                        }
                        _ => return,
                    }
                };

                tokio::select! {
                    _ = tokio::time::sleep_until(warning_deadline), if Instant::now() < warning_deadline => {
                        let mut streams = streams.lock().await;
                        if let Some(entry) = streams.get_mut(&call_id) {
                            if entry.state.status == StreamStatus::Active {
                                entry.state.status = StreamStatus::Warning;
                                if let Some(cb) = &callbacks.on_warning {
                                    cb(&call_id);
                                }
                            }
                        }
                    }
                    _ = tokio::time::sleep_until(timeout_deadline), if Instant::now() >= warning_deadline => {
                        let mut streams = streams.lock().await;
                        if let Some(entry) = streams.get_mut(&call_id) {
                            entry.state.status = StreamStatus::Timeout;
                            if let Some(cb) = &callbacks.on_timeout {
                                cb(&call_id);
                            }
                        }
                        return;
                    }
                    _ = notify.notified() => {
                        continue;
                    }
                }
            }
        })
    }

    /// `tools/stream_chunk`: resets the idle timer and validates the chunk
    /// type against the argument's declared merge strategy.
    pub async fn chunk(
        &self,
        call_id: &str,
        argument: &str,
        data: Value,
        is_final: bool,
    ) -> Result<(), StreamValidationError> {
        let mut streams = self.streams.lock().await;
        let entry = streams
            .get_mut(call_id)
            .ok_or_else(|| StreamValidationError::UnknownStream(call_id.to_string()))?;

        if entry.state.status != StreamStatus::Active && entry.state.status != StreamStatus::Warning {
            return Err(StreamValidationError::NotActive(call_id.to_string()));
        }

        let strategy = entry
            .state
            .annotation(argument)
            .map(|a| a.merge_strategy)
            .ok_or_else(|| StreamValidationError::UnknownArgument {
                call_id: call_id.to_string(),
                argument: argument.to_string(),
            })?;

        if !accepts(strategy, &data) {
            let error = StreamValidationError::InvalidChunkType {
                argument: argument.to_string(),
                strategy,
            };
            if let Some(cb) = &self.callbacks.on_error {
                cb(call_id, &error);
            }
            return Err(error);
        }

        entry.state.last_activity_time = Instant::now();
        entry.state.status = StreamStatus::Active;
        let buffer = entry.state.arguments.entry(argument.to_string()).or_default();
        buffer.chunks.push(data);
        if is_final {
            buffer.complete = true;
        }
        entry.notify.notify_waiters();
        Ok(())
    }

    /// `tools/stream_complete`: merges every argument if all are complete
    /// and non-empty; otherwise returns `Ok(None)` and leaves the stream
    /// open.
    pub async fn complete(&self, call_id: &str) -> ProtocolResult<Option<JsonObject>> {
        let mut streams = self.streams.lock().await;
        let entry = streams
            .get_mut(call_id)
            .ok_or_else(|| ProtocolError::invalid_params(format!("unknown stream {call_id}")))?;

        let all_ready = entry
            .state
            .annotations
            .iter()
            .all(|ann| match entry.state.arguments.get(&ann.name) {
                Some(buf) => buf.complete && !buf.chunks.is_empty(),
                None => false,
            });

        if !all_ready {
            return Ok(None);
        }

        let mut merged = JsonObject::new();
        for ann in &entry.state.annotations {
            let buffer = &entry.state.arguments[&ann.name];
            merged.insert(ann.name.clone(), merge_argument(ann.merge_strategy, &buffer.chunks));
        }
        entry.state.status = StreamStatus::Completed;
        entry.supervisor.abort();
        Ok(Some(merged))
    }

    /// Cancels a stream, aborting its supervisor and firing the
    /// cancellation callback.
    pub async fn cancel(&self, call_id: &str) {
        let mut streams = self.streams.lock().await;
        if let Some(mut entry) = streams.remove(call_id) {
            entry.state.status = StreamStatus::Cancelled;
            entry.supervisor.abort();
            if let Some(cb) = &self.callbacks.on_cancellation {
                cb(call_id);
            }
        }
    }

    pub async fn status(&self, call_id: &str) -> Option<StreamStatus> {
        self.streams.lock().await.get(call_id).map(|e| e.state.status)
    }

    pub async fn active_count(&self) -> usize {
        self.streams.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_annotation() -> StreamingArgument {
        StreamingArgument {
            name: "text".to_string(),
            merge_strategy: MergeStrategy::Concatenate,
        }
    }

    #[tokio::test]
    async fn concatenate_merge_joins_chunks() {
        let manager = StreamManager::new(StreamCallbacks::default());
        manager
            .open("call-1", "echo", vec![text_annotation()], StreamConfig::default())
            .await;
        manager
            .chunk("call-1", "text", Value::String("Hello ".to_string()), false)
            .await
            .unwrap();
        manager
            .chunk("call-1", "text", Value::String("World".to_string()), true)
            .await
            .unwrap();
        let result = manager.complete("call-1").await.unwrap().unwrap();
        assert_eq!(result.get("text").unwrap(), &Value::String("Hello World".to_string()));
    }

    #[tokio::test]
    async fn json_merge_spreads_objects_left_to_right() {
        let manager = StreamManager::new(StreamCallbacks::default());
        let annotation = StreamingArgument {
            name: "data".to_string(),
            merge_strategy: MergeStrategy::JsonMerge,
        };
        manager
            .open("call-2", "configure", vec![annotation], StreamConfig::default())
            .await;
        let mut a = JsonObject::new();
        a.insert("a".to_string(), Value::from(1));
        let mut b = JsonObject::new();
        b.insert("b".to_string(), Value::from(2));
        manager.chunk("call-2", "data", Value::Object(a), false).await.unwrap();
        manager.chunk("call-2", "data", Value::Object(b), true).await.unwrap();
        let result = manager.complete("call-2").await.unwrap().unwrap();
        let merged = result.get("data").unwrap().as_object().unwrap();
        assert_eq!(merged.get("a").unwrap(), &Value::from(1));
        assert_eq!(merged.get("b").unwrap(), &Value::from(2));
    }

    #[tokio::test]
    async fn invalid_chunk_type_is_rejected() {
        let manager = StreamManager::new(StreamCallbacks::default());
        let annotation = StreamingArgument {
            name: "data".to_string(),
            merge_strategy: MergeStrategy::JsonMerge,
        };
        manager
            .open("call-3", "configure", vec![annotation], StreamConfig::default())
            .await;
        let err = manager
            .chunk("call-3", "data", Value::Array(vec![]), false)
            .await
            .unwrap_err();
        assert!(matches!(err, StreamValidationError::InvalidChunkType { .. }));
    }

    #[tokio::test]
    async fn incomplete_stream_returns_none() {
        let manager = StreamManager::new(StreamCallbacks::default());
        manager
            .open("call-4", "echo", vec![text_annotation()], StreamConfig::default())
            .await;
        manager
            .chunk("call-4", "text", Value::String("partial".to_string()), false)
            .await
            .unwrap();
        let result = manager.complete("call-4").await.unwrap();
        assert!(result.is_none());
    }
}
