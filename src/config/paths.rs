use super::ConfigError;
use std::path::PathBuf;

pub const STATE_DIR_NAME: &str = ".capflow";
pub const SETTINGS_FILE_NAME: &str = "config.yaml";
pub const HOME_ENV: &str = "CAPFLOW_HOME";
pub const CONFIG_ENV: &str = "CAPFLOW_CONFIG";

fn non_empty_env(name: &str) -> Option<PathBuf> {
    std::env::var_os(name)
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
}

pub fn default_state_root() -> Result<PathBuf, ConfigError> {
    if let Some(root) = non_empty_env(HOME_ENV) {
        return Ok(root);
    }
    let home = std::env::var_os("HOME").ok_or(ConfigError::HomeDirectoryUnavailable)?;
    Ok(PathBuf::from(home).join(STATE_DIR_NAME))
}

pub fn default_settings_path() -> Result<PathBuf, ConfigError> {
    if let Some(path) = non_empty_env(CONFIG_ENV) {
        return Ok(path);
    }
    Ok(default_state_root()?.join(SETTINGS_FILE_NAME))
}
