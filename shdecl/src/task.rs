//! Task records and per-script containers

use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::{Map, Value};
use thiserror::Error;

/// Module arguments: a mapping, or a free-form command line for
/// `shell`/`command`
#[derive(Debug, Clone, PartialEq)]
pub enum Parameters {
    Map(Map<String, Value>),
    FreeForm(String),
}

impl Parameters {
    /// Look up a mapping entry
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Self::Map(map) => map.get(key),
            Self::FreeForm(_) => None,
        }
    }

    pub fn as_free_form(&self) -> Option<&str> {
        match self {
            Self::FreeForm(cmd) => Some(cmd),
            Self::Map(_) => None,
        }
    }
}

impl From<Value> for Parameters {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(map) => Self::Map(map),
            Value::String(cmd) => Self::FreeForm(cmd),
            other => Self::FreeForm(other.to_string()),
        }
    }
}

impl Serialize for Parameters {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Map(map) => map.serialize(serializer),
            Self::FreeForm(cmd) => serializer.serialize_str(cmd),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Task {
    pub description: String,
    /// Fully qualified module name, e.g. `ansible.builtin.file`
    pub operation: String,
    pub parameters: Parameters,
    pub register: Option<String>,
    /// Guard expressions, outermost first; all must hold
    pub when: Vec<String>,
    /// Task-level keywords such as `ignore_errors` or `delegate_to`
    pub keywords: Map<String, Value>,
}

impl Task {
    pub fn new(
        description: impl Into<String>,
        operation: impl Into<String>,
        parameters: impl Into<Parameters>,
    ) -> Self {
        Self {
            description: description.into(),
            operation: operation.into(),
            parameters: parameters.into(),
            register: None,
            when: Vec::new(),
            keywords: Map::new(),
        }
    }

    /// Add a mapping parameter when `value` is present
    pub fn with_param(mut self, key: &str, value: Option<impl Into<Value>>) -> Self {
        if let (Parameters::Map(map), Some(value)) = (&mut self.parameters, value) {
            map.insert(key.to_string(), value.into());
        }
        self
    }

    pub fn with_keyword(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.keywords.insert(key.to_string(), value.into());
        self
    }

    pub fn param(&self, key: &str) -> Option<&Value> {
        self.parameters.get(key)
    }

    pub fn keyword(&self, key: &str) -> Option<&Value> {
        self.keywords.get(key)
    }
}

/// Field order follows the usual Ansible layout: name, module, register,
/// when, then keywords.
impl Serialize for Task {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("name", &self.description)?;
        map.serialize_entry(&self.operation, &self.parameters)?;
        if let Some(register) = &self.register {
            map.serialize_entry("register", register)?;
        }
        match self.when.as_slice() {
            [] => {}
            [single] => map.serialize_entry("when", single)?,
            all => map.serialize_entry("when", all)?,
        }
        for (key, value) in &self.keywords {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

/// Non-fatal problems found while translating one script
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Warning {
    #[error("no translation for `{command}` and shell fallback is disabled")]
    UnrecognizedVerb { command: String },

    #[error("unsupported test `{test}`; body emitted without a guard")]
    MalformedTest { test: String },

    #[error("`{test}` checks an exit status but no earlier task registered one")]
    MissingHandle { test: String },

    #[error("`{command}` rejected: {reason}")]
    PolicyRejection { command: String, reason: String },

    #[error("umask `{umask}` is not octal; modes omitted")]
    UnparsableUmask { umask: String },

    #[error("{construct} emitted as a shell task: {command}")]
    UnsupportedConstruct {
        construct: &'static str,
        command: String,
    },
}

/// The translated form of one script
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskContainer {
    pub name: String,
    pub tasks: Vec<Task>,
    /// Exported bindings, in order of first export
    pub variables: Map<String, Value>,
    pub warnings: Vec<Warning>,
}

impl TaskContainer {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty() && self.variables.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_serialize_layout() {
        let mut task = Task::new(
            "Ensure directory /tmp/foo exists",
            "ansible.builtin.file",
            json!({"path": "/tmp/foo", "state": "directory"}),
        )
        .with_param("mode", Some("0755"))
        .with_keyword("ignore_errors", true);
        task.register = Some("mkdir_1".to_string());
        task.when.push("shell_command_1 is succeeded".to_string());

        let value = serde_json::to_value(&task).unwrap();
        assert_eq!(
            value,
            json!({
                "name": "Ensure directory /tmp/foo exists",
                "ansible.builtin.file": {"path": "/tmp/foo", "state": "directory", "mode": "0755"},
                "register": "mkdir_1",
                "when": "shell_command_1 is succeeded",
                "ignore_errors": true,
            })
        );
        let keys: Vec<_> = value.as_object().unwrap().keys().cloned().collect();
        assert_eq!(
            keys,
            vec!["name", "ansible.builtin.file", "register", "when", "ignore_errors"]
        );
    }

    #[test]
    fn test_multiple_guards_serialize_as_list() {
        let mut task = Task::new("Echo text: hi", "ansible.builtin.debug", json!({"msg": "hi"}));
        task.when = vec!["a is succeeded".to_string(), "$V == x".to_string()];
        let value = serde_json::to_value(&task).unwrap();
        assert_eq!(value["when"], json!(["a is succeeded", "$V == x"]));
    }

    #[test]
    fn test_free_form_parameters() {
        let task = Task::new("Run ldconfig", "ansible.builtin.command", json!("ldconfig"));
        assert_eq!(task.parameters.as_free_form(), Some("ldconfig"));
        let yaml = serde_yaml::to_string(&task).unwrap();
        assert!(yaml.contains("ansible.builtin.command: ldconfig"));
    }

    #[test]
    fn test_absent_param_skipped() {
        let task = Task::new("Ensure file /x exists", "ansible.builtin.file", json!({"path": "/x"}))
            .with_param("mode", None::<String>);
        assert!(task.param("mode").is_none());
    }
}
