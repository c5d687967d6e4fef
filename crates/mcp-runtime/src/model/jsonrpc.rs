//! JSON-RPC 2.0 message envelope (`JSONRPCMessage`).
//!
//! Shaped after the construction helpers used throughout `rmcp::service`'s
//! `serve_inner` (`JsonRpcMessage::{request,notification,response,error}`,
//! matching on `JsonRpcMessage::{Request,Notification,Response,Error}`).

use serde::{Deserialize, Serialize};

use super::meta::{Extensions, GetExtensions, GetMeta, JsonObject, Meta, RequestId};
use crate::error::ProtocolError;

pub const JSONRPC_VERSION: &str = "2.0";

/// One JSON-RPC value per `Transport::send`/`receive` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JsonRpcMessage {
    Request(JsonRpcRequest),
    Notification(JsonRpcNotification),
    Response(JsonRpcResponse),
    Error(JsonRpcErrorMessage),
}

impl JsonRpcMessage {
    pub fn request(method: impl Into<String>, params: Option<JsonObject>, id: RequestId) -> Self {
        JsonRpcMessage::Request(JsonRpcRequest {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            method: method.into(),
            params,
            meta: Meta::new(),
            extensions: Extensions::new(),
        })
    }

    pub fn notification(method: impl Into<String>, params: Option<JsonObject>) -> Self {
        JsonRpcMessage::Notification(JsonRpcNotification {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.into(),
            params,
            meta: Meta::new(),
            extensions: Extensions::new(),
        })
    }

    pub fn response(result: JsonObject, id: RequestId) -> Self {
        JsonRpcMessage::Response(JsonRpcResponse {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result,
        })
    }

    pub fn error(error: ProtocolError, id: RequestId) -> Self {
        JsonRpcMessage::Error(JsonRpcErrorMessage {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            error: JsonRpcError {
                code: error.code(),
                message: error.to_string(),
                data: error.data(),
            },
        })
    }

    pub fn as_request(&self) -> Option<&JsonRpcRequest> {
        match self {
            JsonRpcMessage::Request(r) => Some(r),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: RequestId,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<JsonObject>,
    #[serde(skip, default)]
    pub meta: Meta,
    #[serde(skip, default)]
    pub extensions: Extensions,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcNotification {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<JsonObject>,
    #[serde(skip, default)]
    pub meta: Meta,
    #[serde(skip, default)]
    pub extensions: Extensions,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: RequestId,
    pub result: JsonObject,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcErrorMessage {
    pub jsonrpc: String,
    pub id: RequestId,
    pub error: JsonRpcError,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

macro_rules! impl_meta_ext {
    ($ty:ty) => {
        impl GetMeta for $ty {
            fn get_meta_mut(&mut self) -> &mut Meta {
                &mut self.meta
            }
            fn get_meta(&self) -> &Meta {
                &self.meta
            }
        }
        impl GetExtensions for $ty {
            fn extensions_mut(&mut self) -> &mut Extensions {
                &mut self.extensions
            }
            fn extensions(&self) -> &Extensions {
                &self.extensions
            }
        }
    };
}

impl_meta_ext!(JsonRpcRequest);
impl_meta_ext!(JsonRpcNotification);

/// MCP `notifications/cancelled`.
pub const CANCELLED_NOTIFICATION_METHOD: &str = "notifications/cancelled";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelledNotificationParam {
    #[serde(rename = "requestId")]
    pub request_id: RequestId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// MCP `notifications/progress`.
pub const PROGRESS_NOTIFICATION_METHOD: &str = "notifications/progress";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressNotificationParam {
    #[serde(rename = "progressToken")]
    pub progress_token: super::meta::ProgressToken,
    pub progress: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// MCP `notifications/tasks/status`.
pub const TASK_STATUS_NOTIFICATION_METHOD: &str = "notifications/tasks/status";
