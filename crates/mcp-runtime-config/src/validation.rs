//! Configuration validation.
//!
//! Grounded on `mcpkit-rs-config/src/validation.rs`'s per-section validator
//! shape, rescoped to the request/task/stream sections that remain.

use crate::{ConfigError, Result};

/// Validate a configuration
pub fn validate_config(config: &crate::RuntimeConfig) -> Result<()> {
    validate_version(&config.version)?;
    validate_request_config(&config.request)?;
    validate_task_config(&config.task)?;
    validate_stream_config(&config.stream)?;
    Ok(())
}

fn validate_version(version: &str) -> Result<()> {
    if version.is_empty() {
        return Err(ConfigError::ValidationError(
            "version cannot be empty".to_string(),
        ));
    }

    if !version.starts_with("1.") && version != "1" {
        return Err(ConfigError::ValidationError(format!(
            "unsupported configuration version: {}",
            version
        )));
    }

    Ok(())
}

fn validate_request_config(request: &crate::RequestConfig) -> Result<()> {
    if request.default_timeout_secs == 0 {
        return Err(ConfigError::ValidationError(
            "request.default_timeout_secs cannot be 0".to_string(),
        ));
    }

    if let Some(max_total) = request.max_total_timeout_secs {
        if max_total == 0 {
            return Err(ConfigError::ValidationError(
                "request.max_total_timeout_secs cannot be 0".to_string(),
            ));
        }
        if max_total < request.default_timeout_secs {
            return Err(ConfigError::ValidationError(format!(
                "request.max_total_timeout_secs ({}) cannot be less than request.default_timeout_secs ({})",
                max_total, request.default_timeout_secs
            )));
        }
    }

    Ok(())
}

fn validate_task_config(task: &crate::TaskConfig) -> Result<()> {
    if task.default_poll_interval_ms == 0 {
        return Err(ConfigError::ValidationError(
            "task.default_poll_interval_ms cannot be 0".to_string(),
        ));
    }

    Ok(())
}

fn validate_stream_config(stream: &crate::StreamConfig) -> Result<()> {
    if stream.default_timeout_ms == 0 {
        return Err(ConfigError::ValidationError(
            "stream.default_timeout_ms cannot be 0".to_string(),
        ));
    }

    if stream.max_timeout_ms == 0 {
        return Err(ConfigError::ValidationError(
            "stream.max_timeout_ms cannot be 0".to_string(),
        ));
    }

    if stream.warning_threshold_ms >= stream.default_timeout_ms {
        return Err(ConfigError::ValidationError(format!(
            "stream.warning_threshold_ms ({}) must be less than stream.default_timeout_ms ({})",
            stream.warning_threshold_ms, stream.default_timeout_ms
        )));
    }

    if stream.default_timeout_ms > stream.max_timeout_ms {
        return Err(ConfigError::ValidationError(format!(
            "stream.default_timeout_ms ({}) cannot exceed stream.max_timeout_ms ({})",
            stream.default_timeout_ms, stream.max_timeout_ms
        )));
    }

    Ok(())
}
