//! Configuration loader with multiple source support.
//!
//! Grounded on `mcpkit-rs-config/src/loader.rs`'s search-path/env-override
//! shape, rescoped from server/transport fields to the runtime's
//! request/task/stream settings.

use std::{
    env,
    path::{Path, PathBuf},
};

use crate::{ConfigError, Result, RuntimeConfig};

/// Configuration loader that supports multiple sources
pub struct ConfigLoader {
    search_paths: Vec<PathBuf>,
    env_prefix: String,
}

impl ConfigLoader {
    /// Create a new configuration loader
    pub fn new() -> Self {
        Self {
            search_paths: default_search_paths(),
            env_prefix: "MCP_RUNTIME".to_string(),
        }
    }

    /// Add a search path
    pub fn add_search_path<P: AsRef<Path>>(&mut self, path: P) -> &mut Self {
        self.search_paths.push(path.as_ref().to_path_buf());
        self
    }

    /// Set environment variable prefix
    pub fn set_env_prefix(&mut self, prefix: impl Into<String>) -> &mut Self {
        self.env_prefix = prefix.into();
        self
    }

    /// Load configuration from all available sources
    pub fn load(&self) -> Result<RuntimeConfig> {
        let mut config = RuntimeConfig::default();

        if let Some(file_config) = self.load_from_file()? {
            config.merge(file_config)?;
        }

        self.apply_env_overrides(&mut config)?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file
    pub fn load_from_specific_file<P: AsRef<Path>>(&self, path: P) -> Result<RuntimeConfig> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }

        let extension = path.extension().and_then(|s| s.to_str()).unwrap_or("");

        match extension {
            "toml" => RuntimeConfig::from_toml_file(path),
            "yaml" | "yml" => RuntimeConfig::from_yaml_file(path),
            "json" => RuntimeConfig::from_json_file(path),
            _ => Err(ConfigError::ValidationError(format!(
                "unsupported config file extension: {}",
                extension
            ))),
        }
    }

    /// Load configuration from the first found config file
    fn load_from_file(&self) -> Result<Option<RuntimeConfig>> {
        let config_names = [
            "mcp-runtime.toml",
            "mcp-runtime.yaml",
            "mcp-runtime.yml",
            "mcp-runtime.json",
            ".mcp-runtime.toml",
            ".mcp-runtime.yaml",
            ".mcp-runtime.yml",
            ".mcp-runtime.json",
            "config.toml",
            "config.yaml",
            "config.yml",
            "config.json",
        ];

        for dir in &self.search_paths {
            for name in &config_names {
                let path = dir.join(name);
                if path.exists() {
                    tracing::debug!("loading config from: {}", path.display());
                    return self.load_from_specific_file(path).map(Some);
                }
            }
        }

        Ok(None)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&self, config: &mut RuntimeConfig) -> Result<()> {
        if let Ok(secs) = env::var(format!("{}_REQUEST_TIMEOUT_SECS", self.env_prefix)) {
            config.request.default_timeout_secs = secs.parse().map_err(|_| {
                ConfigError::ValidationError(format!(
                    "invalid request timeout from env: {}",
                    secs
                ))
            })?;
        }

        if let Ok(secs) = env::var(format!("{}_MAX_TOTAL_TIMEOUT_SECS", self.env_prefix)) {
            config.request.max_total_timeout_secs = Some(secs.parse().map_err(|_| {
                ConfigError::ValidationError(format!(
                    "invalid max total timeout from env: {}",
                    secs
                ))
            })?);
        }

        if let Ok(ms) = env::var(format!("{}_TASK_POLL_INTERVAL_MS", self.env_prefix)) {
            config.task.default_poll_interval_ms = ms.parse().map_err(|_| {
                ConfigError::ValidationError(format!("invalid poll interval from env: {}", ms))
            })?;
        }

        Ok(())
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Get default configuration search paths
fn default_search_paths() -> Vec<PathBuf> {
    let mut paths = vec![env::current_dir().unwrap_or_default()];

    if let Ok(config_dir) = env::var("MCP_RUNTIME_CONFIG_DIR") {
        paths.push(PathBuf::from(config_dir));
    }

    if let Some(home) = dirs::home_dir() {
        paths.push(home.join(".config").join("mcp-runtime"));
        paths.push(home.join(".mcp-runtime"));
    }

    if let Some(config_home) = dirs::config_dir() {
        paths.push(config_home.join("mcp-runtime"));
    }

    paths.push(PathBuf::from("/etc/mcp-runtime"));

    paths
}
