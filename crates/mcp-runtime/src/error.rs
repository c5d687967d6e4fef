//! Error taxonomy.
//!
//! Shaped after `rmcp::service::ServiceError` (`McpError`, `TransportSend`,
//! `TransportClosed`, `Cancelled{reason}`, `Timeout{timeout}`), extended
//! with the standard JSON-RPC codes and `UnauthorizedError` for the fetch
//! middleware.

use std::time::Duration;

use thiserror::Error;

pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;
pub const INTERNAL_ERROR: i64 = -32603;
/// Not part of the JSON-RPC base spec; MCP-runtime local timeout code.
pub const REQUEST_TIMEOUT: i64 = -32001;
/// Not part of the JSON-RPC base spec; MCP-runtime local cancellation code.
pub const REQUEST_CANCELLED: i64 = -32002;
pub const UNAUTHORIZED: i64 = -32003;

/// A wire-level error, with a JSON-RPC `code`, `message`, and optional `data`.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ProtocolErrorData {
    pub code: i64,
    pub message: String,
    pub data: Option<serde_json::Value>,
}

/// Top-level error taxonomy flowing through the engine.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("parse error: {0}")]
    ParseError(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("method not found: {0}")]
    MethodNotFound(String),
    #[error("invalid params: {0}")]
    InvalidParams(String),
    #[error("internal error: {0}")]
    InternalError(String),
    #[error("request timed out after {0:?}")]
    RequestTimeout(Duration),
    #[error(
        "request timed out after {elapsed:?} (max total timeout {max_total_timeout:?} exceeded)"
    )]
    MaxTotalTimeoutExceeded {
        elapsed: Duration,
        max_total_timeout: Duration,
    },
    #[error("request cancelled: {}", reason.as_deref().unwrap_or("<unknown>"))]
    RequestCancelled { reason: Option<String> },
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("transport closed")]
    TransportClosed,
    #[error("transport send failed: {0}")]
    TransportSend(String),
    #[error("no transport connected")]
    NotConnected,
    #[error("capability not supported: {0}")]
    CapabilityNotSupported(String),
    #[error("middleware error: {0}")]
    Middleware(String),
    #[error("{0}")]
    Wire(#[from] ProtocolErrorData),
}

impl ProtocolError {
    pub fn code(&self) -> i64 {
        match self {
            ProtocolError::ParseError(_) => PARSE_ERROR,
            ProtocolError::InvalidRequest(_) => INVALID_REQUEST,
            ProtocolError::MethodNotFound(_) => METHOD_NOT_FOUND,
            ProtocolError::InvalidParams(_) => INVALID_PARAMS,
            ProtocolError::InternalError(_) => INTERNAL_ERROR,
            ProtocolError::RequestTimeout(_) | ProtocolError::MaxTotalTimeoutExceeded { .. } => {
                REQUEST_TIMEOUT
            }
            ProtocolError::RequestCancelled { .. } => REQUEST_CANCELLED,
            ProtocolError::Unauthorized(_) => UNAUTHORIZED,
            ProtocolError::TransportClosed
            | ProtocolError::TransportSend(_)
            | ProtocolError::NotConnected
            | ProtocolError::Middleware(_) => INTERNAL_ERROR,
            ProtocolError::CapabilityNotSupported(_) => METHOD_NOT_FOUND,
            ProtocolError::Wire(data) => data.code,
        }
    }

    pub fn data(&self) -> Option<serde_json::Value> {
        match self {
            ProtocolError::MaxTotalTimeoutExceeded {
                elapsed,
                max_total_timeout,
            } => Some(serde_json::json!({
                "elapsed": elapsed.as_millis(),
                "maxTotalTimeout": max_total_timeout.as_millis(),
            })),
            ProtocolError::Wire(data) => data.data.clone(),
            _ => None,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        ProtocolError::InternalError(message.into())
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        ProtocolError::InvalidParams(message.into())
    }

    pub fn method_not_found(method: impl Into<String>) -> Self {
        ProtocolError::MethodNotFound(method.into())
    }
}

pub type ProtocolResult<T> = Result<T, ProtocolError>;
