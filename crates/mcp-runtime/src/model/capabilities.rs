//! Capability sets negotiated during `initialize`.
//!
//! Shaped after `rmcp::model::capabilities`. Its const-generic,
//! `pastey`-driven typestate builder is dropped along with the `macros`
//! feature; capability sets here are built with plain chainable setters,
//! which covers everything this negotiation needs.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::JsonObject;

pub type ExperimentalCapabilities = BTreeMap<String, JsonObject>;

/// MCP extension capabilities map.
///
/// Keys are extension identifiers in the format `{vendor-prefix}/{extension-name}`
/// (e.g. `io.modelcontextprotocol/ui`). Values are per-extension settings
/// objects; an empty object indicates support with no settings.
pub type ExtensionCapabilities = BTreeMap<String, JsonObject>;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "schemars", derive(schemars::JsonSchema))]
pub struct PromptsCapability {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub list_changed: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "schemars", derive(schemars::JsonSchema))]
pub struct ResourcesCapability {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscribe: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub list_changed: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "schemars", derive(schemars::JsonSchema))]
pub struct ToolsCapability {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub list_changed: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "schemars", derive(schemars::JsonSchema))]
pub struct RootsCapabilities {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub list_changed: Option<bool>,
}

/// Task capabilities shared by client and server.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "schemars", derive(schemars::JsonSchema))]
pub struct TasksCapability {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requests: Option<TaskRequestsCapability>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub list: Option<JsonObject>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancel: Option<JsonObject>,
}

/// Request types that support task-augmented execution.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "schemars", derive(schemars::JsonSchema))]
pub struct TaskRequestsCapability {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sampling: Option<SamplingTaskCapability>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elicitation: Option<ElicitationTaskCapability>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<ToolsTaskCapability>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "schemars", derive(schemars::JsonSchema))]
pub struct SamplingTaskCapability {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub create_message: Option<JsonObject>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "schemars", derive(schemars::JsonSchema))]
pub struct ElicitationTaskCapability {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub create: Option<JsonObject>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "schemars", derive(schemars::JsonSchema))]
pub struct ToolsTaskCapability {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call: Option<JsonObject>,
}

impl TasksCapability {
    /// Default client tasks capability: sampling and elicitation may be deferred.
    pub fn client_default() -> Self {
        Self {
            list: Some(JsonObject::new()),
            cancel: Some(JsonObject::new()),
            requests: Some(TaskRequestsCapability {
                sampling: Some(SamplingTaskCapability {
                    create_message: Some(JsonObject::new()),
                }),
                elicitation: Some(ElicitationTaskCapability {
                    create: Some(JsonObject::new()),
                }),
                tools: None,
            }),
        }
    }

    /// Default server tasks capability: `tools/call` may be deferred.
    pub fn server_default() -> Self {
        Self {
            list: Some(JsonObject::new()),
            cancel: Some(JsonObject::new()),
            requests: Some(TaskRequestsCapability {
                sampling: None,
                elicitation: None,
                tools: Some(ToolsTaskCapability {
                    call: Some(JsonObject::new()),
                }),
            }),
        }
    }

    pub fn supports_list(&self) -> bool {
        self.list.is_some()
    }

    pub fn supports_cancel(&self) -> bool {
        self.cancel.is_some()
    }

    pub fn supports_tools_call(&self) -> bool {
        self.requests
            .as_ref()
            .and_then(|r| r.tools.as_ref())
            .and_then(|t| t.call.as_ref())
            .is_some()
    }

    pub fn supports_sampling_create_message(&self) -> bool {
        self.requests
            .as_ref()
            .and_then(|r| r.sampling.as_ref())
            .and_then(|s| s.create_message.as_ref())
            .is_some()
    }

    pub fn supports_elicitation_create(&self) -> bool {
        self.requests
            .as_ref()
            .and_then(|r| r.elicitation.as_ref())
            .and_then(|e| e.create.as_ref())
            .is_some()
    }
}

/// Capability for form mode elicitation.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "schemars", derive(schemars::JsonSchema))]
pub struct FormElicitationCapability {
    /// Whether the client validates user input against `requestedSchema`
    /// before sending the response back to the server.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema_validation: Option<bool>,
}

/// Capability for URL mode elicitation.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[cfg_attr(feature = "schemars", derive(schemars::JsonSchema))]
pub struct UrlElicitationCapability {}

/// Elicitation lets servers request interactive input from users during a
/// call; this capability says the client can handle such requests.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "schemars", derive(schemars::JsonSchema))]
pub struct ElicitationCapability {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub form: Option<FormElicitationCapability>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<UrlElicitationCapability>,
}

/// Sampling capability with optional sub-capabilities.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "schemars", derive(schemars::JsonSchema))]
pub struct SamplingCapability {
    /// Support for `tools` / `toolChoice` parameters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<JsonObject>,
    /// Support for `includeContext` (soft-deprecated).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<JsonObject>,
}

/// Capabilities a client asserts at `initialize`.
///
/// # Builder
/// ```rust
/// # use mcp_runtime::model::ClientCapabilities;
/// let caps = ClientCapabilities::builder()
///     .enable_roots()
///     .enable_roots_list_changed()
///     .build();
/// ```
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[cfg_attr(feature = "schemars", derive(schemars::JsonSchema))]
pub struct ClientCapabilities {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub experimental: Option<ExperimentalCapabilities>,
    /// MCP extensions the client supports; keys are extension identifiers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extensions: Option<ExtensionCapabilities>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roots: Option<RootsCapabilities>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sampling: Option<SamplingCapability>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elicitation: Option<ElicitationCapability>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tasks: Option<TasksCapability>,
}

impl ClientCapabilities {
    pub fn builder() -> ClientCapabilitiesBuilder {
        ClientCapabilitiesBuilder::default()
    }
}

#[derive(Debug, Default, Clone)]
pub struct ClientCapabilitiesBuilder {
    experimental: Option<ExperimentalCapabilities>,
    extensions: Option<ExtensionCapabilities>,
    roots: Option<RootsCapabilities>,
    sampling: Option<SamplingCapability>,
    elicitation: Option<ElicitationCapability>,
    tasks: Option<TasksCapability>,
}

impl ClientCapabilitiesBuilder {
    pub fn enable_experimental(mut self) -> Self {
        self.experimental = Some(ExperimentalCapabilities::default());
        self
    }

    pub fn enable_extensions_with(mut self, extensions: ExtensionCapabilities) -> Self {
        self.extensions = Some(extensions);
        self
    }

    pub fn enable_roots(mut self) -> Self {
        self.roots = Some(RootsCapabilities::default());
        self
    }

    pub fn enable_roots_list_changed(mut self) -> Self {
        self.roots.get_or_insert_with(RootsCapabilities::default).list_changed = Some(true);
        self
    }

    pub fn enable_sampling(mut self) -> Self {
        self.sampling = Some(SamplingCapability::default());
        self
    }

    /// Enable tool calling in sampling requests.
    pub fn enable_sampling_tools(mut self) -> Self {
        self.sampling.get_or_insert_with(SamplingCapability::default).tools = Some(JsonObject::default());
        self
    }

    /// Enable context inclusion in sampling (soft-deprecated).
    pub fn enable_sampling_context(mut self) -> Self {
        self.sampling.get_or_insert_with(SamplingCapability::default).context = Some(JsonObject::default());
        self
    }

    pub fn enable_elicitation(mut self) -> Self {
        self.elicitation = Some(ElicitationCapability::default());
        self
    }

    /// Enable schema validation for form-mode elicitation responses.
    pub fn enable_elicitation_schema_validation(mut self) -> Self {
        self.elicitation.get_or_insert_with(ElicitationCapability::default).form = Some(FormElicitationCapability {
            schema_validation: Some(true),
        });
        self
    }

    pub fn enable_tasks(mut self) -> Self {
        self.tasks = Some(TasksCapability::client_default());
        self
    }

    pub fn build(self) -> ClientCapabilities {
        ClientCapabilities {
            experimental: self.experimental,
            extensions: self.extensions,
            roots: self.roots,
            sampling: self.sampling,
            elicitation: self.elicitation,
            tasks: self.tasks,
        }
    }
}

/// Capabilities a server asserts at `initialize`.
///
/// # Builder
/// ```rust
/// # use mcp_runtime::model::ServerCapabilities;
/// let caps = ServerCapabilities::builder()
///     .enable_tools()
///     .enable_tool_list_changed()
///     .build();
/// ```
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "schemars", derive(schemars::JsonSchema))]
pub struct ServerCapabilities {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub experimental: Option<ExperimentalCapabilities>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extensions: Option<ExtensionCapabilities>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<JsonObject>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completions: Option<JsonObject>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompts: Option<PromptsCapability>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourcesCapability>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<ToolsCapability>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tasks: Option<TasksCapability>,
}

impl ServerCapabilities {
    pub fn builder() -> ServerCapabilitiesBuilder {
        ServerCapabilitiesBuilder::default()
    }
}

#[derive(Debug, Default, Clone)]
pub struct ServerCapabilitiesBuilder {
    experimental: Option<ExperimentalCapabilities>,
    extensions: Option<ExtensionCapabilities>,
    logging: Option<JsonObject>,
    completions: Option<JsonObject>,
    prompts: Option<PromptsCapability>,
    resources: Option<ResourcesCapability>,
    tools: Option<ToolsCapability>,
    tasks: Option<TasksCapability>,
}

impl ServerCapabilitiesBuilder {
    pub fn enable_experimental(mut self) -> Self {
        self.experimental = Some(ExperimentalCapabilities::default());
        self
    }

    pub fn enable_extensions_with(mut self, extensions: ExtensionCapabilities) -> Self {
        self.extensions = Some(extensions);
        self
    }

    pub fn enable_logging(mut self) -> Self {
        self.logging = Some(JsonObject::default());
        self
    }

    pub fn enable_completions(mut self) -> Self {
        self.completions = Some(JsonObject::default());
        self
    }

    pub fn enable_prompts(mut self) -> Self {
        self.prompts = Some(PromptsCapability::default());
        self
    }

    pub fn enable_prompts_list_changed(mut self) -> Self {
        self.prompts.get_or_insert_with(PromptsCapability::default).list_changed = Some(true);
        self
    }

    pub fn enable_resources(mut self) -> Self {
        self.resources = Some(ResourcesCapability::default());
        self
    }

    pub fn enable_resources_list_changed(mut self) -> Self {
        self.resources.get_or_insert_with(ResourcesCapability::default).list_changed = Some(true);
        self
    }

    pub fn enable_resources_subscribe(mut self) -> Self {
        self.resources.get_or_insert_with(ResourcesCapability::default).subscribe = Some(true);
        self
    }

    pub fn enable_tools(mut self) -> Self {
        self.tools = Some(ToolsCapability::default());
        self
    }

    pub fn enable_tool_list_changed(mut self) -> Self {
        self.tools.get_or_insert_with(ToolsCapability::default).list_changed = Some(true);
        self
    }

    pub fn enable_tasks(mut self) -> Self {
        self.tasks = Some(TasksCapability::server_default());
        self
    }

    pub fn build(self) -> ServerCapabilities {
        ServerCapabilities {
            experimental: self.experimental,
            extensions: self.extensions,
            logging: self.logging,
            completions: self.completions,
            prompts: self.prompts,
            resources: self.resources,
            tools: self.tools,
            tasks: self.tasks,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_builder() {
        let builder = ServerCapabilities::builder()
            .enable_logging()
            .enable_experimental()
            .enable_prompts()
            .enable_resources()
            .enable_tools()
            .enable_tool_list_changed();
        assert_eq!(builder.logging, Some(JsonObject::default()));
        assert_eq!(builder.prompts, Some(PromptsCapability::default()));
        assert_eq!(builder.resources, Some(ResourcesCapability::default()));
        assert_eq!(
            builder.tools,
            Some(ToolsCapability {
                list_changed: Some(true),
            })
        );

        let client_builder = ClientCapabilities::builder()
            .enable_experimental()
            .enable_roots()
            .enable_roots_list_changed()
            .enable_sampling();
        assert_eq!(
            client_builder.experimental,
            Some(ExperimentalCapabilities::default())
        );
        assert_eq!(
            client_builder.roots,
            Some(RootsCapabilities {
                list_changed: Some(true),
            })
        );
    }

    #[test]
    fn test_task_capabilities_deserialization() {
        let json = serde_json::json!({
            "list": {},
            "cancel": {},
            "requests": {
                "tools": { "call": {} }
            }
        });

        let tasks: TasksCapability = serde_json::from_value(json).unwrap();
        assert!(tasks.list.is_some());
        assert!(tasks.cancel.is_some());
        let requests = tasks.requests.unwrap();
        assert!(requests.tools.unwrap().call.is_some());
    }

    #[test]
    fn test_tasks_capability_client_default() {
        let tasks = TasksCapability::client_default();
        assert!(tasks.supports_list());
        assert!(tasks.supports_cancel());
        assert!(tasks.supports_sampling_create_message());
        assert!(tasks.supports_elicitation_create());
        assert!(!tasks.supports_tools_call());

        let json = serde_json::to_value(&tasks).unwrap();
        assert_eq!(json["list"], serde_json::json!({}));
        assert_eq!(
            json["requests"]["sampling"]["createMessage"],
            serde_json::json!({})
        );
    }

    #[test]
    fn test_tasks_capability_server_default() {
        let tasks = TasksCapability::server_default();
        assert!(tasks.supports_tools_call());
        assert!(!tasks.supports_sampling_create_message());

        let json = serde_json::to_value(&tasks).unwrap();
        assert_eq!(json["requests"]["tools"]["call"], serde_json::json!({}));
    }

    #[test]
    fn test_client_extensions_capability() {
        let mut extensions = ExtensionCapabilities::new();
        extensions.insert(
            "io.modelcontextprotocol/ui".to_string(),
            serde_json::from_value(serde_json::json!({
                "mimeTypes": ["text/html;profile=mcp-app"]
            }))
            .unwrap(),
        );

        let capabilities = ClientCapabilities::builder()
            .enable_extensions_with(extensions)
            .enable_sampling()
            .build();

        let json = serde_json::to_value(&capabilities).unwrap();
        assert_eq!(
            json["extensions"]["io.modelcontextprotocol/ui"]["mimeTypes"],
            serde_json::json!(["text/html;profile=mcp-app"])
        );
        assert!(json["sampling"].is_object());
    }

    #[test]
    fn test_extensions_deserialization() {
        let json = serde_json::json!({
            "extensions": {
                "io.modelcontextprotocol/ui": {
                    "mimeTypes": ["text/html;profile=mcp-app"]
                }
            },
            "sampling": {}
        });

        let capabilities: ClientCapabilities = serde_json::from_value(json).unwrap();
        let extensions = capabilities.extensions.unwrap();
        assert!(extensions.contains_key("io.modelcontextprotocol/ui"));
    }
}
