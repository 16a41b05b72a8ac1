mod defaults;
mod env;
pub mod types;
mod validation;

use std::path::Path;

pub use types::*;

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Missing environment variables: {0:?}")]
    MissingEnvVars(Vec<String>),

    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl StressConfig {
    /// Parse a stress configuration from a YAML string.
    /// `${VAR_NAME}` references are replaced with environment variable values first.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let interpolated = env::interpolate_env(yaml)?;
        let config: StressConfig = serde_yaml::from_str(&interpolated)?;
        Ok(config)
    }

    /// Load a stress configuration from a file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse, apply defaults, and validate in one go.
    pub fn load(yaml: &str) -> Result<Self, ConfigError> {
        let config = Self::from_yaml(yaml)?.effective();
        config.validate_or_err()?;
        Ok(config)
    }
}
