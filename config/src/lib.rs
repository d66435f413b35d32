//! shdecl configuration system
//!
//! Provides YAML-based configuration for the shell-to-task translator.
//!
//! # Configuration Loading Priority
//!
//! 1. Compiled-in defaults
//! 2. `/etc/shdecl/shdecl.yaml` (system-wide)
//! 3. `~/.config/shdecl/shdecl.yaml` (user)
//! 4. `./.shdecl.yaml` (project-local)
//! 5. `SHDECL_CONFIG=/path/to/config.yaml` (explicit)
//! 6. Environment variables (highest priority)
//!
//! # Example Configuration
//!
//! ```yaml
//! translate:
//!   pull: false
//!   push: true
//!   role_name: webserver
//!   umask: "022"
//!   allow_shell_fallback: true
//!
//! output:
//!   format: yaml
//!   generator: role
//!
//! logging:
//!   level: info
//! ```

#![allow(missing_docs)]

mod error;
mod loader;
mod types;

pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use types::*;

/// Load configuration from default locations.
///
/// Searches for config files in order and merges them.
/// Environment variables override file values.
pub fn load() -> Result<ShdeclConfig, ConfigError> {
    ConfigLoader::new().load()
}

/// Load configuration from a specific file.
pub fn load_from_file(path: &str) -> Result<ShdeclConfig, ConfigError> {
    ConfigLoader::new().with_file(path).load()
}
