//! Wire-level data model.

pub mod capabilities;
pub mod jsonrpc;
pub mod meta;
pub mod task;
pub mod tool;

pub use capabilities::{
    ClientCapabilities, ElicitationCapability, ElicitationTaskCapability,
    ExperimentalCapabilities, ExtensionCapabilities, FormElicitationCapability,
    PromptsCapability, ResourcesCapability, RootsCapabilities, SamplingCapability,
    SamplingTaskCapability, ServerCapabilities, TaskRequestsCapability, TasksCapability,
    ToolsCapability, ToolsTaskCapability, UrlElicitationCapability,
};
pub use jsonrpc::{
    CANCELLED_NOTIFICATION_METHOD, CancelledNotificationParam, JSONRPC_VERSION, JsonRpcError,
    JsonRpcErrorMessage, JsonRpcMessage, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse,
    PROGRESS_NOTIFICATION_METHOD, ProgressNotificationParam, TASK_STATUS_NOTIFICATION_METHOD,
};
pub use meta::{
    Extensions, GetExtensions, GetMeta, JsonObject, Meta, NumberOrString, ProgressToken,
    RELATED_TASK_META_KEY, RelatedTask, RequestId,
};
pub use task::{CreateTaskResult, Task, TaskStatus, TaskSummary, TASK_CAPABILITY_PARAM_KEY};
pub use tool::{MergeStrategy, StreamingArgument, Tool, ToolAnnotations, ToolExecution, TaskSupport};
