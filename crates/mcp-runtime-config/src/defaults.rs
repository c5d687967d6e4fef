//! Default configuration values.
//!
//! The defaults here are kept in lockstep with the hardcoded defaults in
//! `mcp_runtime::timeout::DEFAULT_TIMEOUT`, `mcp_runtime::tasks::client`'s
//! `TaskRequestOptions::default()` (250ms), and
//! `mcp_runtime::streams::StreamConfig::default()` — this crate exists so
//! those defaults can be overridden from a config file instead of recompiled.

use crate::{RequestConfig, RuntimeConfig, StreamConfig, TaskConfig};

/// Create a default configuration
pub fn default_config() -> RuntimeConfig {
    RuntimeConfig {
        version: "1.0".to_string(),
        request: default_request_config(),
        task: default_task_config(),
        stream: default_stream_config(),
    }
}

pub fn default_request_config() -> RequestConfig {
    RequestConfig {
        default_timeout_secs: 60,
        max_total_timeout_secs: None,
        reset_on_progress: false,
    }
}

pub fn default_task_config() -> TaskConfig {
    TaskConfig {
        default_poll_interval_ms: 250,
    }
}

pub fn default_stream_config() -> StreamConfig {
    StreamConfig {
        warning_threshold_ms: 15_000,
        default_timeout_ms: 30_000,
        max_timeout_ms: 120_000,
    }
}
