#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid yaml in {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("settings validation failed: {0}")]
    Settings(String),
    #[error("environment variable `{name}` for the llm api key is not set")]
    MissingApiKey { name: String },
    #[error("failed to resolve home directory for the default state root")]
    HomeDirectoryUnavailable,
}

impl ConfigError {
    pub fn code(&self) -> &'static str {
        match self {
            ConfigError::Read { .. } => "io",
            ConfigError::Parse { .. } | ConfigError::Settings(_) => "validation.config",
            ConfigError::MissingApiKey { .. } => "config.missing_api_key",
            ConfigError::HomeDirectoryUnavailable => "config.home_unavailable",
        }
    }
}
