//! Error types for the configuration system.
//!
//! Grounded on `mcpkit-rs-config/src/error.rs`, trimmed of the policy and
//! anyhow-wrapped variants that had no remaining caller once the
//! policy/runtime/transport/distribution fields were dropped.

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Configuration error type
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("configuration parsing error: {0}")]
    ParseError(String),

    #[error("configuration validation error: {0}")]
    ValidationError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlDeError(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerError(#[from] toml::ser::Error),

    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: String, found: String },

    #[error("missing required field: {0}")]
    MissingField(String),

    #[error("invalid value for {field}: {value}")]
    InvalidValue { field: String, value: String },

    #[error("configuration not found at path: {0}")]
    NotFound(String),

    #[error("merge conflict: {0}")]
    MergeConflict(String),
}
