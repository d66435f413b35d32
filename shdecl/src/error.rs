//! Error types for shdecl

use thiserror::Error;

/// Result type alias for shdecl operations
pub type ShdeclResult<T> = Result<T, ShdeclError>;

/// Fatal errors; anything recoverable is a [`crate::task::Warning`] instead
#[derive(Error, Debug)]
pub enum ShdeclError {
    /// Lexer or parser failure; no tasks are produced for the script
    #[error("Parse error in {script}: {message}")]
    Parse { script: String, message: String },

    /// Shebang names an interpreter other than sh or bash
    #[error("Unsupported shell dialect in {script}: {interpreter}")]
    UnsupportedDialect { script: String, interpreter: String },

    /// IO error (reading scripts, writing generated files)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] shdecl_config::ConfigError),

    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// Some scripts of a batch could not be translated; output was still
    /// written for the others
    #[error("{failed} of {total} scripts skipped")]
    ScriptsSkipped { failed: usize, total: usize },

    /// Invalid argument
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}
