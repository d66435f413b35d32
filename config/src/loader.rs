use crate::{ConfigError, ShdeclConfig};
use regex::Regex;
use std::path::PathBuf;

pub struct ConfigLoader {
    explicit_file: Option<PathBuf>,
    search_paths: Vec<PathBuf>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    pub fn new() -> Self {
        let mut search_paths = Vec::new();

        if let Some(home) = dirs::home_dir() {
            search_paths.push(home.join(".config/shdecl/shdecl.yaml"));
        }
        search_paths.push(PathBuf::from("./.shdecl.yaml"));

        #[cfg(unix)]
        search_paths.insert(0, PathBuf::from("/etc/shdecl/shdecl.yaml"));

        Self {
            explicit_file: None,
            search_paths,
        }
    }

    pub fn with_file(mut self, path: &str) -> Self {
        self.explicit_file = Some(PathBuf::from(path));
        self
    }

    /// Replace the default search locations.
    pub fn with_search_paths(mut self, paths: Vec<PathBuf>) -> Self {
        self.search_paths = paths;
        self
    }

    pub fn load(&self) -> Result<ShdeclConfig, ConfigError> {
        let mut config = ShdeclConfig::default();

        if let Ok(env_path) = std::env::var("SHDECL_CONFIG") {
            config = self.read_file(&PathBuf::from(env_path))?;
        } else if let Some(ref explicit) = self.explicit_file {
            config = self.read_file(explicit)?;
        } else {
            for path in &self.search_paths {
                if path.exists() {
                    if let Ok(content) = std::fs::read_to_string(path) {
                        tracing::debug!(path = %path.display(), "merging config file");
                        config = self.merge_yaml(&config, &content)?;
                    }
                }
            }
        }

        apply_overrides(&mut config, |name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    fn read_file(&self, path: &PathBuf) -> Result<ShdeclConfig, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
            path: path.clone(),
            source: e,
        })?;
        tracing::debug!(path = %path.display(), "loading config file");
        self.parse_yaml(&content)
    }

    fn parse_yaml(&self, content: &str) -> Result<ShdeclConfig, ConfigError> {
        let expanded = self.expand_env_vars(content)?;
        Ok(serde_yaml::from_str(&expanded)?)
    }

    fn merge_yaml(&self, base: &ShdeclConfig, content: &str) -> Result<ShdeclConfig, ConfigError> {
        let overlay = self.parse_yaml(content)?;
        Ok(merge_configs(base, &overlay))
    }

    fn expand_env_vars(&self, content: &str) -> Result<String, ConfigError> {
        let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| ConfigError::InvalidValue(e.to_string()))?;
        Ok(re
            .replace_all(content, |caps: &regex::Captures| {
                let var_name = &caps[1];
                std::env::var(var_name).unwrap_or_default()
            })
            .to_string())
    }
}

/// Overlay values that differ from the defaults win.
fn merge_configs(base: &ShdeclConfig, overlay: &ShdeclConfig) -> ShdeclConfig {
    let defaults = ShdeclConfig::default();
    let mut result = base.clone();

    if overlay.translate.pull != defaults.translate.pull {
        result.translate.pull = overlay.translate.pull;
    }
    if overlay.translate.push != defaults.translate.push {
        result.translate.push = overlay.translate.push;
    }
    if overlay.translate.role_name.is_some() {
        result.translate.role_name = overlay.translate.role_name.clone();
    }
    if overlay.translate.umask != defaults.translate.umask {
        result.translate.umask = overlay.translate.umask.clone();
    }
    if overlay.translate.allow_shell_fallback != defaults.translate.allow_shell_fallback {
        result.translate.allow_shell_fallback = overlay.translate.allow_shell_fallback;
    }
    if overlay.translate.unarchive_dest != defaults.translate.unarchive_dest {
        result.translate.unarchive_dest = overlay.translate.unarchive_dest.clone();
    }
    if overlay.output.format != defaults.output.format {
        result.output.format = overlay.output.format;
    }
    if overlay.output.generator != defaults.output.generator {
        result.output.generator = overlay.output.generator;
    }
    if overlay.logging != defaults.logging {
        result.logging = overlay.logging.clone();
    }

    result
}

/// Apply `SHDECL_*` overrides looked up through `lookup`.
pub(crate) fn apply_overrides(
    config: &mut ShdeclConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<(), ConfigError> {
    if let Some(pull) = lookup("SHDECL_PULL") {
        config.translate.pull = parse_bool("SHDECL_PULL", &pull)?;
    }
    if let Some(push) = lookup("SHDECL_PUSH") {
        config.translate.push = parse_bool("SHDECL_PUSH", &push)?;
    }
    if let Some(strict) = lookup("SHDECL_STRICT") {
        config.translate.allow_shell_fallback = !parse_bool("SHDECL_STRICT", &strict)?;
    }
    if let Some(role) = lookup("SHDECL_ROLE_NAME") {
        if !role.is_empty() {
            config.translate.role_name = Some(role);
        }
    }
    if let Some(umask) = lookup("SHDECL_UMASK") {
        config.translate.umask = umask;
    }
    if let Some(level) = lookup("SHDECL_LOG_LEVEL") {
        config.logging.level =
            serde_yaml::from_str(&level).map_err(|_| ConfigError::InvalidEnvValue {
                name: "SHDECL_LOG_LEVEL".to_string(),
                value: level.clone(),
            })?;
    }
    Ok(())
}

fn parse_bool(name: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(ConfigError::InvalidEnvValue {
            name: name.to_string(),
            value: value.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn expand_env_vars_works() {
        std::env::set_var("SHDECL_TEST_VAR_123", "hello");
        let loader = ConfigLoader::new();
        let result = loader.expand_env_vars("value: ${SHDECL_TEST_VAR_123}").unwrap();
        assert_eq!(result, "value: hello");
        std::env::remove_var("SHDECL_TEST_VAR_123");
    }

    #[test]
    fn missing_env_var_becomes_empty() {
        let loader = ConfigLoader::new();
        let result = loader.expand_env_vars("value: ${NONEXISTENT_VAR_XYZ}").unwrap();
        assert_eq!(result, "value: ");
    }

    #[test]
    fn env_overrides_config() {
        let mut config = ShdeclConfig::default();
        apply_overrides(
            &mut config,
            lookup_from(&[
                ("SHDECL_PUSH", "true"),
                ("SHDECL_STRICT", "1"),
                ("SHDECL_ROLE_NAME", "web"),
                ("SHDECL_LOG_LEVEL", "debug"),
            ]),
        )
        .unwrap();
        assert!(config.translate.push);
        assert!(!config.translate.pull);
        assert!(!config.translate.allow_shell_fallback);
        assert_eq!(config.translate.role_name.as_deref(), Some("web"));
        assert_eq!(config.logging.level, crate::LogLevel::Debug);
    }

    #[test]
    fn bad_bool_override_is_rejected() {
        let mut config = ShdeclConfig::default();
        let err = apply_overrides(&mut config, lookup_from(&[("SHDECL_PULL", "maybe")]));
        assert!(matches!(err, Err(ConfigError::InvalidEnvValue { .. })));
    }

    #[test]
    fn later_files_override_earlier_ones() {
        let dir = tempfile::tempdir().unwrap();
        let system = dir.path().join("system.yaml");
        let local = dir.path().join("local.yaml");
        std::fs::write(&system, "translate:\n  push: true\n  umask: \"027\"\n").unwrap();
        std::fs::write(&local, "translate:\n  role_name: db\noutput:\n  format: json\n").unwrap();

        let loader = ConfigLoader::new().with_search_paths(vec![system, local]);
        let mut config = ShdeclConfig::default();
        for path in &loader.search_paths {
            let content = std::fs::read_to_string(path).unwrap();
            config = loader.merge_yaml(&config, &content).unwrap();
        }

        assert!(config.translate.push);
        assert_eq!(config.translate.umask, "027");
        assert_eq!(config.translate.role_name.as_deref(), Some("db"));
        assert_eq!(config.output.format, crate::OutputFormat::Json);
    }

    #[test]
    fn explicit_file_is_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shdecl.yaml");
        std::fs::write(&path, "output:\n  generator: playbook\n").unwrap();

        let config = ConfigLoader::new()
            .read_file(&path)
            .unwrap();
        assert_eq!(config.output.generator, crate::GeneratorKind::Playbook);
    }

    #[test]
    fn unreadable_file_reports_path() {
        let err = ConfigLoader::new()
            .read_file(&PathBuf::from("/nonexistent/shdecl.yaml"))
            .unwrap_err();
        assert!(err.to_string().contains("/nonexistent/shdecl.yaml"));
    }
}
