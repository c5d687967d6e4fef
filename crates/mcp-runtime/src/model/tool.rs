//! Tool descriptors as carried over the wire.
//!
//! Shaped after `rmcp::model::tool::Tool`. `with_output_schema`/`with_input_schema`
//! (which called into `rmcp::handler::server::tool`'s schema cache) are
//! dropped along with that module; `streaming_arguments` is new, backing
//! `StreamManager`'s per-argument merge strategy.

use std::{borrow::Cow, sync::Arc};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{JsonObject, Meta};

/// A tool that can be invoked through `tools/call` (or streamed through
/// `tools/stream_call`, see [`streaming_arguments`](Tool::streaming_arguments)).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "schemars", derive(schemars::JsonSchema))]
pub struct Tool {
    pub name: Cow<'static, str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<Cow<'static, str>>,
    /// A JSON Schema object defining the expected parameters for the tool.
    pub input_schema: Arc<JsonObject>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<Arc<JsonObject>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotations: Option<ToolAnnotations>,
    /// Execution-related configuration, including task support mode.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution: Option<ToolExecution>,
    /// Arguments the tool accepts via chunked `tools/stream_chunk` delivery,
    /// and how each is merged on `tools/stream_complete`. Empty
    /// for tools that only support a single `tools/call` invocation.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub streaming_arguments: Vec<StreamingArgument>,
    #[serde(rename = "_meta", skip_serializing_if = "Option::is_none")]
    pub meta: Option<Meta>,
}

/// How a single streamed argument's chunks are merged into a final value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "schemars", derive(schemars::JsonSchema))]
pub enum MergeStrategy {
    /// Chunks are joined as strings; non-string chunks are stringified first.
    Concatenate,
    /// Chunks must be objects (or `null`); merged left-to-right, last wins.
    JsonMerge,
    /// The final chunk is the value; earlier chunks are discarded.
    Last,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "schemars", derive(schemars::JsonSchema))]
pub struct StreamingArgument {
    pub name: String,
    pub merge_strategy: MergeStrategy,
}

/// Per-tool task support mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "schemars", derive(schemars::JsonSchema))]
pub enum TaskSupport {
    /// Clients MUST NOT invoke this tool as a task (default).
    #[default]
    Forbidden,
    /// Clients MAY invoke this tool as either a task or a normal call.
    Optional,
    /// Clients MUST invoke this tool as a task.
    Required,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "schemars", derive(schemars::JsonSchema))]
pub struct ToolExecution {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_support: Option<TaskSupport>,
}

impl ToolExecution {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_task_support(mut self, task_support: TaskSupport) -> Self {
        self.task_support = Some(task_support);
        self
    }
}

/// Hints describing a tool's behavior. Not guaranteed to be faithful;
/// clients should never make tool-use decisions solely on annotations
/// received from an untrusted server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "schemars", derive(schemars::JsonSchema))]
pub struct ToolAnnotations {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// If true, the tool does not modify its environment. Default: false.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read_only_hint: Option<bool>,
    /// Meaningful only when `readOnlyHint == false`. Default: true.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destructive_hint: Option<bool>,
    /// Meaningful only when `readOnlyHint == false`. Default: false.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idempotent_hint: Option<bool>,
    /// Default: true.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub open_world_hint: Option<bool>,
}

impl ToolAnnotations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_title<T: Into<String>>(title: T) -> Self {
        ToolAnnotations {
            title: Some(title.into()),
            ..Self::default()
        }
    }

    pub fn read_only(self, read_only: bool) -> Self {
        ToolAnnotations {
            read_only_hint: Some(read_only),
            ..self
        }
    }

    pub fn destructive(self, destructive: bool) -> Self {
        ToolAnnotations {
            destructive_hint: Some(destructive),
            ..self
        }
    }

    pub fn idempotent(self, idempotent: bool) -> Self {
        ToolAnnotations {
            idempotent_hint: Some(idempotent),
            ..self
        }
    }

    pub fn open_world(self, open_world: bool) -> Self {
        ToolAnnotations {
            open_world_hint: Some(open_world),
            ..self
        }
    }

    pub fn is_destructive(&self) -> bool {
        self.destructive_hint.unwrap_or(true)
    }

    pub fn is_idempotent(&self) -> bool {
        self.idempotent_hint.unwrap_or(false)
    }
}

impl Tool {
    pub fn new<N, D, S>(name: N, description: D, input_schema: S) -> Self
    where
        N: Into<Cow<'static, str>>,
        D: Into<Cow<'static, str>>,
        S: Into<Arc<JsonObject>>,
    {
        Tool {
            name: name.into(),
            title: None,
            description: Some(description.into()),
            input_schema: input_schema.into(),
            output_schema: None,
            annotations: None,
            execution: None,
            streaming_arguments: Vec::new(),
            meta: None,
        }
    }

    pub fn annotate(self, annotations: ToolAnnotations) -> Self {
        Tool {
            annotations: Some(annotations),
            ..self
        }
    }

    pub fn with_execution(self, execution: ToolExecution) -> Self {
        Tool {
            execution: Some(execution),
            ..self
        }
    }

    pub fn with_streaming_arguments(self, streaming_arguments: Vec<StreamingArgument>) -> Self {
        Tool {
            streaming_arguments,
            ..self
        }
    }

    /// Returns `TaskSupport::Forbidden` if not explicitly set.
    pub fn task_support(&self) -> TaskSupport {
        self.execution
            .as_ref()
            .and_then(|e| e.task_support)
            .unwrap_or_default()
    }

    pub fn supports_streaming(&self) -> bool {
        !self.streaming_arguments.is_empty()
    }

    pub fn streaming_argument(&self, name: &str) -> Option<&StreamingArgument> {
        self.streaming_arguments.iter().find(|a| a.name == name)
    }

    pub fn schema_as_json_value(&self) -> Value {
        Value::Object(self.input_schema.as_ref().clone())
    }
}
