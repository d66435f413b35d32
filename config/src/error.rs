use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse YAML: {0}")]
    ParseYaml(#[from] serde_yaml::Error),

    #[error("Environment variable '{name}' has an invalid value: {value}")]
    InvalidEnvValue { name: String, value: String },

    #[error("Invalid config value: {0}")]
    InvalidValue(String),
}
