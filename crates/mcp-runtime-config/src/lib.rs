//! Ambient configuration for the MCP protocol runtime.
//!
//! Shaped after `mcpkit-rs-config/src/lib.rs`, trimmed to the settings the
//! runtime actually reads: per-request timeouts (`mcp_runtime::timeout`),
//! the default task poll interval (`mcp_runtime::tasks::client`), and the
//! stream idle/warning thresholds (`mcp_runtime::streams`). The server
//! identity, transport, policy, and OCI distribution sections
//! `mcpkit-rs-config` carries have no counterpart here and were dropped
//! rather than kept as dead weight.

use std::path::Path;

use serde::{Deserialize, Serialize};

pub mod defaults;
pub mod error;
pub mod loader;
pub mod validation;

pub use error::{ConfigError, Result};
pub use loader::ConfigLoader;

/// Top-level runtime configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RuntimeConfig {
    /// Configuration format version
    pub version: String,

    /// Per-request timeout settings
    pub request: RequestConfig,

    /// Task subsystem defaults
    pub task: TaskConfig,

    /// Streaming tool-call manager defaults
    pub stream: StreamConfig,
}

/// Per-request timeout defaults, mirrored onto `mcp_runtime::timeout::TimeoutOptions`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestConfig {
    /// Default per-request timeout, in seconds
    pub default_timeout_secs: u64,

    /// Upper bound across all `reset()` extensions, in seconds
    pub max_total_timeout_secs: Option<u64>,

    /// Whether a `notifications/progress` for a request resets its timer
    #[serde(default)]
    pub reset_on_progress: bool,
}

/// Task subsystem defaults, mirrored onto `mcp_runtime::tasks::client::TaskRequestOptions`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskConfig {
    /// Default client-side poll interval for `tasks/result`, in milliseconds
    pub default_poll_interval_ms: u64,
}

/// Streaming defaults, mirrored onto `mcp_runtime::streams::StreamConfig`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Idle duration after which a stream is marked `Warning`, in milliseconds
    pub warning_threshold_ms: u64,

    /// Idle duration after which a stream times out, in milliseconds
    pub default_timeout_ms: u64,

    /// Upper bound `default_timeout_ms` is clamped to, in milliseconds
    pub max_timeout_ms: u64,
}

impl RuntimeConfig {
    /// Load configuration from a TOML file
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Load configuration from a TOML string
    pub fn from_toml(toml: &str) -> Result<Self> {
        let config: RuntimeConfig = toml::from_str(toml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML file
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load configuration from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: RuntimeConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a JSON file
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    /// Load configuration from a JSON string
    pub fn from_json(json: &str) -> Result<Self> {
        let config: RuntimeConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn to_toml_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let toml = toml::to_string_pretty(self)?;
        std::fs::write(path, toml)?;
        Ok(())
    }

    /// Save configuration to a YAML file
    pub fn to_yaml_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Save configuration to a JSON file
    pub fn to_json_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        validation::validate_config(self)
    }

    /// Merge with another configuration (other takes precedence)
    pub fn merge(&mut self, other: RuntimeConfig) -> Result<()> {
        if other.version != self.version {
            return Err(ConfigError::VersionMismatch {
                expected: self.version.clone(),
                found: other.version,
            });
        }

        self.request = other.request;
        self.task = other.task;
        self.stream = other.stream;

        Ok(())
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        defaults::default_config()
    }
}

#[cfg(test)]
mod tests;
