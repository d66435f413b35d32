//! The translator: walks a parsed script and emits Ansible tasks
//!
//! A [`Translator`] lives for a whole run. Register counters persist across
//! scripts; everything else (variables, umask, the last register handle) is
//! per-script state reset by [`Translator::translate_script`].
//!
//! The walk is split over three files, all `impl Translator`:
//! - this one: node dispatch, simple commands, fallback tasks
//! - `visit.rs`: `if` / `for` / `&&` `||` handling
//! - `emit.rs`: per-verb task emission

use crate::ast::{Node, NodeKind, Redirect, RedirectKind, Script, Segment, Word};
use crate::env::{Interpolation, VariableEnv};
use crate::error::{ShdeclError, ShdeclResult};
use crate::mode;
use crate::parser::parse;
use crate::policy::PolicyGate;
use crate::register::RegisterAllocator;
use crate::task::{Task, TaskContainer, Warning};
use serde_json::{json, Value};
use shdecl_config::TranslateConfig;

const SHELL_MODULE: &str = "ansible.builtin.shell";

/// A simple command with its words expanded, ready for emission
#[derive(Debug, Clone)]
pub(crate) struct Invocation {
    pub verb: String,
    pub args: Vec<String>,
    pub redirects: Vec<(RedirectKind, String)>,
    /// The command re-rendered with variables expanded
    pub raw: String,
}

impl Invocation {
    /// Target of the last `>` / `>>` style redirect, with whether it appends
    pub fn output_redirect(&self) -> Option<(&str, bool)> {
        self.redirects.iter().rev().find_map(|(kind, target)| match kind {
            RedirectKind::StdoutWrite | RedirectKind::BothWrite => Some((target.as_str(), false)),
            RedirectKind::StdoutAppend => Some((target.as_str(), true)),
            _ => None,
        })
    }
}

/// Handler declined its arguments; the command goes to the fallback task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Unsupported;

#[derive(Debug, Default)]
pub(crate) struct ScriptState {
    pub umask: String,
    /// Register of the most recent task that allocated one
    pub last_handle: Option<String>,
    pub container: TaskContainer,
}

pub struct Translator {
    pub(crate) config: TranslateConfig,
    pub(crate) registers: RegisterAllocator,
    pub(crate) gate: PolicyGate,
    pub(crate) env: VariableEnv,
    pub(crate) state: ScriptState,
}

impl Default for Translator {
    fn default() -> Self {
        Self::new(TranslateConfig::default())
    }
}

impl AsMut<VariableEnv> for Translator {
    fn as_mut(&mut self) -> &mut VariableEnv {
        &mut self.env
    }
}

impl Translator {
    pub fn new(config: TranslateConfig) -> Self {
        Self {
            registers: RegisterAllocator::new(config.role_name.clone()),
            gate: PolicyGate::new(config.pull, config.push),
            env: VariableEnv::new(),
            state: ScriptState::default(),
            config,
        }
    }

    pub fn config(&self) -> &TranslateConfig {
        &self.config
    }

    /// Parse and translate one script. `name` identifies the script in the
    /// container and in errors.
    pub fn translate(&mut self, name: &str, source: &str) -> ShdeclResult<TaskContainer> {
        check_dialect(name, source)?;
        let script = parse(source).map_err(|errs| ShdeclError::Parse {
            script: name.to_string(),
            message: errs
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; "),
        })?;
        Ok(self.translate_script(name, &script))
    }

    /// Translate an already parsed script
    pub fn translate_script(&mut self, name: &str, script: &Script) -> TaskContainer {
        tracing::debug!(script = name, nodes = script.nodes.len(), "translating");
        self.env = VariableEnv::new();
        self.state = ScriptState {
            umask: self.config.umask.clone(),
            last_handle: None,
            container: TaskContainer::new(name),
        };
        if mode::parse_umask(&self.state.umask).is_none() {
            let umask = self.state.umask.clone();
            self.warn(Warning::UnparsableUmask { umask });
        }

        for node in &script.nodes {
            self.visit_node(node, script);
        }

        let container = std::mem::take(&mut self.state.container);
        tracing::info!(
            script = name,
            tasks = container.tasks.len(),
            warnings = container.warnings.len(),
            "translated"
        );
        container
    }

    /// Top-level dispatch; loop bodies are replayed through here too
    pub(crate) fn visit_node(&mut self, node: &Node, script: &Script) {
        match &node.kind {
            NodeKind::Command { parts } if parts.iter().any(is_heredoc) => {
                self.unsupported_construct("here-document", node, script)
            }
            NodeKind::Command { parts } => self.visit_command(parts, script),
            NodeKind::If { parts } => self.visit_if(parts, script),
            NodeKind::For { parts } => self.visit_for(parts, script),
            NodeKind::List { parts } => self.visit_list(parts, script),
            NodeKind::Pipeline { .. } => self.unsupported_construct("pipeline", node, script),
            NodeKind::While { .. } => self.unsupported_construct("while loop", node, script),
            other => tracing::debug!(?other, "ignoring stray node"),
        }
    }

    fn visit_command(&mut self, parts: &[Node], _script: &Script) {
        let words: Vec<&Word> = parts.iter().filter_map(Node::as_word).collect();

        let Some((verb_word, arg_words)) = words.split_first() else {
            // Only assignments (and redirects): plain variable bindings
            for part in parts {
                if let NodeKind::Assignment(assignment) = &part.kind {
                    let value = self.bind_value(&assignment.value);
                    self.env.set_value(&assignment.name, value);
                }
            }
            return;
        };

        let verb = self.render_word(verb_word, false);
        match verb.as_str() {
            "export" => return self.export(arg_words),
            "umask" => return self.set_umask(arg_words),
            _ => {}
        }

        let invocation = Invocation {
            args: arg_words
                .iter()
                .map(|word| self.expand_word(word))
                .collect(),
            redirects: parts
                .iter()
                .filter_map(|part| match &part.kind {
                    NodeKind::Redirect(Redirect { kind, target }) => {
                        Some((*kind, self.expand_word(target)))
                    }
                    _ => None,
                })
                .collect(),
            raw: self.render_command(parts),
            verb,
        };
        self.dispatch(&invocation);
    }

    /// `export NAME=VALUE...`; also records the bindings on the container
    fn export(&mut self, args: &[&Word]) {
        for word in args {
            let (name, value) = match crate::ast::Assignment::from_segments(word.segments.clone()) {
                Ok(assignment) => {
                    let value = self.bind_value(&assignment.value);
                    (assignment.name, value)
                }
                // `export NAME` exports the current value
                Err(_) => {
                    let name = word.text();
                    let Some(value) = self.env.get(&name).map(str::to_string) else {
                        tracing::debug!(name = %name, "export of unbound name ignored");
                        continue;
                    };
                    (name, value)
                }
            };
            self.env.export_value(&name, value.clone());
            self.state.container.variables.insert(name, Value::String(value));
        }
    }

    fn set_umask(&mut self, args: &[&Word]) {
        let Some(mask) = args.first().map(|word| self.expand_word(word)) else {
            return;
        };
        if mode::parse_umask(&mask).is_none() {
            self.warn(Warning::UnparsableUmask { umask: mask.clone() });
        }
        tracing::debug!(umask = %mask, "umask changed");
        self.state.umask = mask;
    }

    /// Mode for a new file or directory under the current umask
    pub(crate) fn mode(&self, is_dir: bool) -> Option<String> {
        mode::mode_for(&self.state.umask, is_dir)
    }

    /// Append a task, allocating a register under `key` when given
    pub(crate) fn push_task(&mut self, mut task: Task, key: Option<&str>) {
        if let Some(key) = key {
            let handle = self.registers.allocate(key);
            task.register = Some(handle.clone());
            self.state.last_handle = Some(handle);
        }
        tracing::debug!(task = %task.description, module = %task.operation, "emit");
        self.state.container.tasks.push(task);
    }

    pub(crate) fn warn(&mut self, warning: Warning) {
        tracing::warn!(script = %self.state.container.name, "{}", warning);
        self.state.container.warnings.push(warning);
    }

    /// Shell task for a command with no declarative translation, or a
    /// skipped debug task when shell fallback is disabled
    pub(crate) fn fallback(&mut self, raw: &str) {
        if self.config.allow_shell_fallback {
            let task = Task::new(
                format!("Run shell command: {}", raw),
                SHELL_MODULE,
                Value::String(raw.to_string()),
            );
            self.push_task(task, Some("shell_command"));
        } else {
            let task = Task::new(
                format!("Unsupported command (shell fallback disabled): {}", raw),
                "ansible.builtin.debug",
                json!({ "msg": format!("Command skipped: {}", raw) }),
            );
            self.push_task(task, None);
            self.warn(Warning::UnrecognizedVerb {
                command: raw.to_string(),
            });
        }
    }

    fn unsupported_construct(&mut self, construct: &'static str, node: &Node, script: &Script) {
        let command = self.env.expand(&script.text_with_heredocs(&node.span));
        self.warn(Warning::UnsupportedConstruct {
            construct,
            command: command.clone(),
        });
        let task = Task::new(
            format!("Run shell command: {}", command),
            SHELL_MODULE,
            Value::String(command),
        );
        self.push_task(task, Some("shell_command"));
    }

    /// Word text with quotes removed and references resolved to their
    /// values. Single-quoted segments are taken literally.
    pub(crate) fn bind_value(&self, word: &Word) -> String {
        word.segments
            .iter()
            .map(|segment| match segment {
                Segment::SingleQuoted(s) => s.clone(),
                Segment::Bare(s) | Segment::DoubleQuoted(s) => {
                    self.env.interpolate(s, Interpolation::Interpret)
                }
            })
            .collect()
    }

    /// As [`bind_value`](Self::bind_value), but exported names become
    /// placeholders. Used for everything that ends up in a task.
    pub(crate) fn expand_word(&self, word: &Word) -> String {
        self.render_word(word, false)
    }

    /// Word as shell source with variables expanded, quotes kept when
    /// `quoted`
    fn render_word(&self, word: &Word, quoted: bool) -> String {
        word.segments
            .iter()
            .map(|segment| match (segment, quoted) {
                (Segment::SingleQuoted(s), true) => format!("'{}'", s),
                (Segment::SingleQuoted(s), false) => s.clone(),
                (Segment::DoubleQuoted(s), true) => format!("\"{}\"", self.env.expand(s)),
                (Segment::Bare(s) | Segment::DoubleQuoted(s), _) => self.env.expand(s),
            })
            .collect()
    }

    /// Command line rebuilt from its parts, for shell tasks
    pub(crate) fn render_command(&self, parts: &[Node]) -> String {
        parts
            .iter()
            .filter_map(|part| match &part.kind {
                NodeKind::Word(word) => Some(self.render_word(word, true)),
                NodeKind::Assignment(a) => Some(format!("{}={}", a.name, self.render_word(&a.value, true))),
                NodeKind::Redirect(Redirect { kind, target }) => {
                    let target = self.render_word(target, true);
                    Some(match kind {
                        RedirectKind::StdoutDup | RedirectKind::StderrDup => format!("{}{}", kind, target),
                        _ => format!("{} {}", kind, target),
                    })
                }
                _ => None,
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Reject scripts whose shebang names an interpreter other than sh or bash
fn check_dialect(name: &str, source: &str) -> ShdeclResult<()> {
    let Some(shebang) = source.lines().next().and_then(|line| line.strip_prefix("#!")) else {
        return Ok(());
    };
    let mut words = shebang.split_whitespace();
    let Some(program) = words.next() else {
        return Ok(());
    };
    let mut interpreter = program.rsplit('/').next().unwrap_or(program);
    if interpreter == "env" {
        interpreter = words.find(|w| !w.starts_with('-')).unwrap_or(interpreter);
    }
    match interpreter {
        "sh" | "bash" => Ok(()),
        other => Err(ShdeclError::UnsupportedDialect {
            script: name.to_string(),
            interpreter: other.to_string(),
        }),
    }
}

fn is_heredoc(part: &Node) -> bool {
    matches!(
        &part.kind,
        NodeKind::Redirect(Redirect {
            kind: RedirectKind::HereDoc | RedirectKind::HereDocStrip,
            ..
        })
    )
}
