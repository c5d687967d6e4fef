#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use crate::*;

    const FULL_CONFIG_YAML: &str = r#"
version: "1.0"
request:
  default_timeout_secs: 45
  max_total_timeout_secs: 300
  reset_on_progress: true
task:
  default_poll_interval_ms: 500
stream:
  warning_threshold_ms: 10000
  default_timeout_ms: 20000
  max_timeout_ms: 60000
"#;

    #[test]
    fn test_full_yaml_config() {
        let config = RuntimeConfig::from_yaml(FULL_CONFIG_YAML).unwrap();
        assert_eq!(config.version, "1.0");
        assert_eq!(config.request.default_timeout_secs, 45);
        assert_eq!(config.request.max_total_timeout_secs, Some(300));
        assert!(config.request.reset_on_progress);
        assert_eq!(config.task.default_poll_interval_ms, 500);
        assert_eq!(config.stream.warning_threshold_ms, 10000);
    }

    #[test]
    fn test_toml_config() {
        let toml = r#"
version = "1.0"

[request]
default_timeout_secs = 30
reset_on_progress = false

[task]
default_poll_interval_ms = 200

[stream]
warning_threshold_ms = 5000
default_timeout_ms = 15000
max_timeout_ms = 45000
"#;
        let config = RuntimeConfig::from_toml(toml).unwrap();
        assert_eq!(config.request.default_timeout_secs, 30);
        assert_eq!(config.task.default_poll_interval_ms, 200);
    }

    #[test]
    fn test_json_config() {
        let json = r#"{
  "version": "1.0",
  "request": { "default_timeout_secs": 90, "reset_on_progress": false },
  "task": { "default_poll_interval_ms": 1000 },
  "stream": { "warning_threshold_ms": 1000, "default_timeout_ms": 5000, "max_timeout_ms": 10000 }
}"#;

        let config = RuntimeConfig::from_json(json).unwrap();
        assert_eq!(config.request.default_timeout_secs, 90);
        assert_eq!(config.task.default_poll_interval_ms, 1000);
    }

    #[test]
    fn test_default_config() {
        let config = RuntimeConfig::default();
        assert_eq!(config.version, "1.0");
        assert_eq!(config.request.default_timeout_secs, 60);
        assert_eq!(config.task.default_poll_interval_ms, 250);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_merge() {
        let mut config1 = RuntimeConfig::default();
        let config2 = RuntimeConfig::from_yaml(FULL_CONFIG_YAML).unwrap();

        config1.merge(config2).unwrap();

        assert_eq!(config1.request.default_timeout_secs, 45);
        assert_eq!(config1.task.default_poll_interval_ms, 500);
    }

    #[test]
    fn test_version_mismatch() {
        let mut config1 = RuntimeConfig::default();
        config1.version = "1.0".to_string();

        let mut config2 = RuntimeConfig::default();
        config2.version = "2.0".to_string();

        let result = config1.merge(config2);
        assert!(result.is_err());

        if let Err(ConfigError::VersionMismatch { expected, found }) = result {
            assert_eq!(expected, "1.0");
            assert_eq!(found, "2.0");
        } else {
            panic!("expected version mismatch error");
        }
    }

    #[test]
    fn test_validation_zero_timeout_rejected() {
        let mut config = RuntimeConfig::default();
        config.request.default_timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_max_total_below_default_rejected() {
        let mut config = RuntimeConfig::default();
        config.request.default_timeout_secs = 60;
        config.request.max_total_timeout_secs = Some(30);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_warning_threshold_must_be_below_default() {
        let mut config = RuntimeConfig::default();
        config.stream.warning_threshold_ms = config.stream.default_timeout_ms;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_default_timeout_above_max_rejected() {
        let mut config = RuntimeConfig::default();
        config.stream.default_timeout_ms = config.stream.max_timeout_ms + 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_loader_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("mcp-runtime.yaml");

        fs::write(&config_path, FULL_CONFIG_YAML).unwrap();

        let mut loader = ConfigLoader::new();
        loader.add_search_path(temp_dir.path());

        let config = loader.load().unwrap();
        assert_eq!(config.request.default_timeout_secs, 45);
        assert_eq!(config.task.default_poll_interval_ms, 500);
    }

    #[test]
    fn test_loader_env_override() {
        let temp_dir = TempDir::new().unwrap();

        let mut loader = ConfigLoader::new();
        loader.add_search_path(temp_dir.path());
        loader.set_env_prefix("TEST_MCP_RUNTIME_ENV_OVERRIDE");

        // SAFETY: test runs single-threaded wrt this env var and cleans up before returning.
        unsafe {
            std::env::set_var("TEST_MCP_RUNTIME_ENV_OVERRIDE_REQUEST_TIMEOUT_SECS", "15");
        }

        let config = loader.load().unwrap();
        assert_eq!(config.request.default_timeout_secs, 15);

        unsafe {
            std::env::remove_var("TEST_MCP_RUNTIME_ENV_OVERRIDE_REQUEST_TIMEOUT_SECS");
        }
    }
}
