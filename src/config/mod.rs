pub mod error;
pub mod load;
pub mod paths;
pub mod settings;

pub use error::ConfigError;
pub use load::{load_settings, load_settings_from};
pub use paths::{
    default_settings_path, default_state_root, CONFIG_ENV, HOME_ENV, SETTINGS_FILE_NAME,
    STATE_DIR_NAME,
};
pub use settings::{ExecutionSettings, LlmSettings, Settings};

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::PathBuf;
    use std::sync::Mutex;
    use tempfile::tempdir;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn relative_paths_resolve_against_state_root() {
        let temp = tempdir().expect("temp dir");
        let config_path = temp.path().join("config.yaml");
        fs::write(
            &config_path,
            r#"
state_root: state
tools_root: /opt/tools
execution:
  step_timeout_seconds: 30
"#,
        )
        .expect("write config");

        let settings = load_settings_from(&config_path).expect("load settings");
        let root = temp.path().join("state");
        assert_eq!(settings.state_root, root);
        assert_eq!(settings.tools_root, PathBuf::from("/opt/tools"));
        assert_eq!(settings.registry_path, root.join("registry/registry.json"));
        assert_eq!(settings.runs_dir, root.join("runs"));
        assert_eq!(settings.policy_path, root.join("policy.yaml"));
        assert_eq!(settings.execution.step_timeout_seconds, 30);
        assert_eq!(settings.execution.kill_grace_seconds, 5);
        assert!(settings.llm.is_none());
    }

    #[test]
    fn missing_settings_file_yields_defaults() {
        let temp = tempdir().expect("temp dir");
        let settings =
            load_settings_from(&temp.path().join("config.yaml")).expect("default settings");
        assert_eq!(settings.state_root, temp.path());
        assert_eq!(settings.execution, ExecutionSettings::default());
    }

    #[test]
    fn validation_rejects_threshold_outside_unit_range() {
        let settings: Settings = serde_yaml::from_str(
            r#"
execution:
  confidence_threshold: 1.5
"#,
        )
        .expect("parse settings");
        let err = settings.validate().expect_err("validation should fail");
        match err {
            ConfigError::Settings(message) => {
                assert!(message.contains("confidence_threshold"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn unknown_settings_fields_are_rejected() {
        let err = serde_yaml::from_str::<Settings>("workspace: /tmp\n")
            .expect_err("unknown field must fail");
        assert!(err.to_string().contains("unknown field"));
    }

    #[test]
    fn llm_settings_fill_retry_defaults() {
        let settings: Settings = serde_yaml::from_str(
            r#"
llm:
  endpoint: http://127.0.0.1:9/v1/chat/completions
  model: planner
"#,
        )
        .expect("parse settings");
        let llm = settings.llm.expect("llm settings");
        assert_eq!(llm.timeout_seconds, 60);
        assert_eq!(llm.max_retries, 2);
        assert_eq!(llm.retry_backoff_ms, 500);
        let config = llm.inference_config().expect("inference config");
        assert!(config.api_key.is_none());
    }

    #[test]
    fn state_root_follows_capflow_home() {
        let _guard = ENV_LOCK.lock().expect("env lock");
        let temp = tempdir().expect("temp dir");
        let old_home = std::env::var_os(HOME_ENV);
        let old_config = std::env::var_os(CONFIG_ENV);
        std::env::set_var(HOME_ENV, temp.path());
        std::env::remove_var(CONFIG_ENV);

        let path = default_settings_path().expect("settings path");
        assert_eq!(path, temp.path().join(SETTINGS_FILE_NAME));
        let settings = load_settings().expect("load defaults");
        assert_eq!(settings.runs_dir, temp.path().join("runs"));

        match old_home {
            Some(value) => std::env::set_var(HOME_ENV, value),
            None => std::env::remove_var(HOME_ENV),
        }
        if let Some(value) = old_config {
            std::env::set_var(CONFIG_ENV, value);
        }
    }
}
