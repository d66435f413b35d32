use serde::{Deserialize, Serialize};

/// Largest umask accepted: setuid, setgid, sticky and permission bits.
pub const MAX_UMASK: u32 = 0o7777;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShdeclConfig {
    pub translate: TranslateConfig,
    pub output: OutputConfig,
    pub logging: LoggingConfig,
}

impl ShdeclConfig {
    /// Reject values the translator cannot start from.
    pub fn validate(&self) -> Result<(), crate::ConfigError> {
        let umask = u32::from_str_radix(&self.translate.umask, 8).ok();
        if !umask.is_some_and(|mask| mask <= MAX_UMASK) {
            return Err(crate::ConfigError::InvalidValue(format!(
                "translate.umask must be an octal mask no greater than 7777, got '{}'",
                self.translate.umask
            )));
        }
        if let Some(role) = &self.translate.role_name {
            if role.is_empty() || role.chars().any(char::is_whitespace) {
                return Err(crate::ConfigError::InvalidValue(format!(
                    "translate.role_name must be a single non-empty word, got '{role}'"
                )));
            }
        }
        Ok(())
    }
}

/// Settings consumed by the translator core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TranslateConfig {
    /// Allow copies whose source is on a remote host.
    pub pull: bool,
    /// Allow copies whose destination is on a remote host.
    pub push: bool,
    /// Prefix applied to every register name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role_name: Option<String>,
    /// Umask in effect until the script sets its own.
    pub umask: String,
    /// Emit a shell task for unrecognised commands. When false, a disabled
    /// debug task is emitted instead.
    pub allow_shell_fallback: bool,
    /// Where `gunzip` archives are extracted.
    pub unarchive_dest: String,
}

impl Default for TranslateConfig {
    fn default() -> Self {
        Self {
            pull: false,
            push: false,
            role_name: None,
            umask: "022".to_string(),
            allow_shell_fallback: true,
            unarchive_dest: "/tmp".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub format: OutputFormat,
    pub generator: GeneratorKind,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Yaml,
    Json,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GeneratorKind {
    /// Full role skeleton with one task file per script.
    #[default]
    Role,
    /// A bare task list written to a single file.
    RoleTasks,
    /// A single playbook document.
    Playbook,
}

impl GeneratorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Role => "role",
            Self::RoleTasks => "role-tasks",
            Self::Playbook => "playbook",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: LogLevel,
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            filter: String::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}
