//! `_meta` and extension-bag types threaded through every JSON-RPC message.
//!
//! Shaped after the call sites in `rmcp::service::serve_inner`
//! (`request.get_meta_mut()`, `request.extensions_mut()`, the progress-token
//! stamping in `Peer::send_request_with_option`) — the defining file wasn't
//! available, so the shape is rebuilt from usage.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A JSON-RPC id: string-or-integer, unique per sender within a session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    Number(i64),
    String(Arc<str>),
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestId::Number(n) => write!(f, "{n}"),
            RequestId::String(s) => write!(f, "{s}"),
        }
    }
}

/// Alias for a JSON-RPC `params`/`result` object.
pub type JsonObject = Map<String, Value>;

/// Either a numeric or string token, used for progress tokens and similar.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NumberOrString {
    Number(i64),
    String(Arc<str>),
}

impl std::fmt::Display for NumberOrString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NumberOrString::Number(n) => write!(f, "{n}"),
            NumberOrString::String(s) => write!(f, "{s}"),
        }
    }
}

/// Opaque progress correlation token carried in `params._meta.progressToken`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProgressToken(pub NumberOrString);

/// Reserved `_meta` key associating a message with a task.
pub const RELATED_TASK_META_KEY: &str = "mcp/relatedTask";
const PROGRESS_TOKEN_META_KEY: &str = "progressToken";

/// `params._meta`: a free-form object with a few reserved keys the engine
/// understands (`progressToken`, `mcp/relatedTask`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Meta(#[serde(flatten)] pub JsonObject);

impl Meta {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    /// Merge `other` into `self`, `other` winning on key conflicts.
    pub fn extend(&mut self, other: Meta) {
        self.0.extend(other.0);
    }

    pub fn set_progress_token(&mut self, token: ProgressToken) {
        let value = match token.0 {
            NumberOrString::Number(n) => Value::from(n),
            NumberOrString::String(s) => Value::from(s.to_string()),
        };
        self.0.insert(PROGRESS_TOKEN_META_KEY.to_string(), value);
    }

    pub fn progress_token(&self) -> Option<ProgressToken> {
        match self.0.get(PROGRESS_TOKEN_META_KEY)? {
            Value::Number(n) => Some(ProgressToken(NumberOrString::Number(n.as_i64()?))),
            Value::String(s) => Some(ProgressToken(NumberOrString::String(Arc::from(
                s.as_str(),
            )))),
            _ => None,
        }
    }

    /// The `mcp/relatedTask` tag.
    pub fn related_task(&self) -> Option<RelatedTask> {
        let value = self.0.get(RELATED_TASK_META_KEY)?;
        serde_json::from_value(value.clone()).ok()
    }

    pub fn set_related_task(&mut self, related: RelatedTask) {
        if let Ok(value) = serde_json::to_value(related) {
            self.0.insert(RELATED_TASK_META_KEY.to_string(), value);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelatedTask {
    #[serde(rename = "taskId")]
    pub task_id: String,
}

/// A type-keyed bag of request-scoped values, the way `service.rs` threads
/// transport-specific extras (session id, headers) alongside `Meta` without
/// polluting the wire format. Analogous to `http::Extensions`.
#[derive(Default, Clone)]
pub struct Extensions(HashMap<TypeId, Arc<dyn Any + Send + Sync>>);

impl std::fmt::Debug for Extensions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Extensions")
            .field("len", &self.0.len())
            .finish()
    }
}

impl Extensions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<T: Send + Sync + 'static>(&mut self, value: T) -> Option<Arc<T>> {
        self.0
            .insert(TypeId::of::<T>(), Arc::new(value))
            .and_then(|old| old.downcast::<T>().ok())
    }

    pub fn get<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.0
            .get(&TypeId::of::<T>())
            .and_then(|v| v.clone().downcast::<T>().ok())
    }
}

/// Implemented by every wire payload that carries an optional `_meta`.
pub trait GetMeta {
    fn get_meta_mut(&mut self) -> &mut Meta;
    fn get_meta(&self) -> &Meta;
}

/// Implemented by every wire payload carrying request-scoped [`Extensions`].
pub trait GetExtensions {
    fn extensions_mut(&mut self) -> &mut Extensions;
    fn extensions(&self) -> &Extensions;
}
