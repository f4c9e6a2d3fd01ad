use super::ConfigError;
use crate::planner::HttpInferenceConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExecutionSettings {
    pub step_timeout_seconds: u64,
    pub kill_grace_seconds: u64,
    pub confidence_threshold: f64,
    pub stream_stderr: bool,
}

impl Default for ExecutionSettings {
    fn default() -> Self {
        Self {
            step_timeout_seconds: 900,
            kill_grace_seconds: 5,
            confidence_threshold: 0.75,
            stream_stderr: true,
        }
    }
}

fn default_llm_timeout_seconds() -> u64 {
    60
}

fn default_llm_max_retries() -> u32 {
    2
}

fn default_llm_retry_backoff_ms() -> u64 {
    500
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LlmSettings {
    pub endpoint: String,
    pub model: String,
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default = "default_llm_timeout_seconds")]
    pub timeout_seconds: u64,
    #[serde(default = "default_llm_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_llm_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

impl LlmSettings {
    pub fn inference_config(&self) -> Result<HttpInferenceConfig, ConfigError> {
        let api_key = match self.api_key_env.as_deref() {
            Some(name) => Some(
                std::env::var(name)
                    .ok()
                    .filter(|value| !value.trim().is_empty())
                    .ok_or_else(|| ConfigError::MissingApiKey {
                        name: name.to_string(),
                    })?,
            ),
            None => None,
        };
        Ok(HttpInferenceConfig {
            endpoint: self.endpoint.clone(),
            model: self.model.clone(),
            api_key,
            timeout: Duration::from_secs(self.timeout_seconds),
            max_retries: self.max_retries,
            retry_backoff: Duration::from_millis(self.retry_backoff_ms),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub state_root: PathBuf,
    pub tools_root: PathBuf,
    pub registry_path: PathBuf,
    pub runs_dir: PathBuf,
    pub policy_path: PathBuf,
    pub manifest_schema_path: Option<PathBuf>,
    pub execution: ExecutionSettings,
    pub llm: Option<LlmSettings>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            state_root: PathBuf::new(),
            tools_root: PathBuf::from("tools"),
            registry_path: PathBuf::from("registry/registry.json"),
            runs_dir: PathBuf::from("runs"),
            policy_path: PathBuf::from("policy.yaml"),
            manifest_schema_path: None,
            execution: ExecutionSettings::default(),
            llm: None,
        }
    }
}

fn resolve_against(base: &Path, path: &mut PathBuf) {
    if path.is_relative() {
        *path = base.join(&*path);
    }
}

impl Settings {
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn resolve_paths(&mut self, base: &Path) {
        if self.state_root.as_os_str().is_empty() {
            self.state_root = base.to_path_buf();
        } else {
            resolve_against(base, &mut self.state_root);
        }
        let root = self.state_root.clone();
        resolve_against(&root, &mut self.tools_root);
        resolve_against(&root, &mut self.registry_path);
        resolve_against(&root, &mut self.runs_dir);
        resolve_against(&root, &mut self.policy_path);
        if let Some(schema) = self.manifest_schema_path.as_mut() {
            resolve_against(&root, schema);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let execution = &self.execution;
        if execution.step_timeout_seconds == 0 {
            return Err(ConfigError::Settings(
                "`execution.step_timeout_seconds` must be >= 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&execution.confidence_threshold) {
            return Err(ConfigError::Settings(format!(
                "`execution.confidence_threshold` must be within [0, 1], got {}",
                execution.confidence_threshold
            )));
        }
        if let Some(llm) = &self.llm {
            if llm.endpoint.trim().is_empty() || llm.model.trim().is_empty() {
                return Err(ConfigError::Settings(
                    "`llm.endpoint` and `llm.model` must be non-empty".to_string(),
                ));
            }
            if llm.timeout_seconds == 0 {
                return Err(ConfigError::Settings(
                    "`llm.timeout_seconds` must be >= 1".to_string(),
                ));
            }
        }
        Ok(())
    }
}
