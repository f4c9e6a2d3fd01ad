use super::{default_settings_path, default_state_root, ConfigError, Settings};
use std::path::Path;

pub fn load_settings() -> Result<Settings, ConfigError> {
    let path = default_settings_path()?;
    if !path.exists() {
        let mut settings = Settings::default();
        settings.resolve_paths(&default_state_root()?);
        settings.validate()?;
        return Ok(settings);
    }
    load_settings_from(&path)
}

pub fn load_settings_from(path: &Path) -> Result<Settings, ConfigError> {
    let base = path.parent().unwrap_or(Path::new("."));
    let mut settings = if path.exists() {
        Settings::from_path(path)?
    } else {
        Settings::default()
    };
    settings.resolve_paths(base);
    settings.validate()?;
    Ok(settings)
}
