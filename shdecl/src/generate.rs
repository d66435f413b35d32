//! Writing translated containers to disk
//!
//! Three layouts are supported, selected by [`GeneratorKind`]:
//! - `playbook`: one playbook document targeting all hosts
//! - `role-tasks`: a bare task list in a single file
//! - `role`: an Ansible role skeleton with one task file per script

use crate::error::ShdeclResult;
use crate::task::{Task, TaskContainer};
use serde::Serialize;
use serde_json::{json, Map, Value};
use shdecl_config::{GeneratorKind, OutputFormat};
use std::fs;
use std::path::Path;

const ROLE_DIRS: &[&str] = &[
    "tasks",
    "handlers",
    "files",
    "templates",
    "vars",
    "defaults",
    "meta",
];

const STUB_DIRS: &[&str] = &["tasks", "handlers", "vars", "defaults", "meta"];

const STUB_CONTENT: &str = "# This is a stub file for Ansible role\n";

const PLAY_NAME: &str = "Execute translated shell commands";

/// Write `containers` to `output` using the chosen layout
pub fn generate(
    kind: GeneratorKind,
    format: OutputFormat,
    containers: &[TaskContainer],
    output: &Path,
) -> ShdeclResult<()> {
    tracing::info!(
        generator = kind.as_str(),
        output = %output.display(),
        containers = containers.len(),
        "generating"
    );
    match kind {
        GeneratorKind::Playbook => write_playbook(format, containers, output),
        GeneratorKind::RoleTasks => write_role_tasks(format, containers, output),
        GeneratorKind::Role => write_role(format, containers, output),
    }
}

/// Serialize `value` in the requested format
pub fn render<T: Serialize + ?Sized>(format: OutputFormat, value: &T) -> ShdeclResult<String> {
    match format {
        OutputFormat::Yaml => Ok(serde_yaml::to_string(value)?),
        OutputFormat::Json => {
            let mut text = serde_json::to_string_pretty(value)?;
            text.push('\n');
            Ok(text)
        }
    }
}

/// Build the playbook document for the first container
pub fn playbook(containers: &[TaskContainer]) -> Value {
    let tasks: &[Task] = containers
        .first()
        .map(|c| c.tasks.as_slice())
        .unwrap_or_default();
    json!([{
        "name": PLAY_NAME,
        "hosts": "all",
        "become": true,
        "tasks": tasks,
    }])
}

fn write_playbook(
    format: OutputFormat,
    containers: &[TaskContainer],
    output: &Path,
) -> ShdeclResult<()> {
    write_file(output, &render(format, &playbook(containers))?)
}

fn write_role_tasks(
    format: OutputFormat,
    containers: &[TaskContainer],
    output: &Path,
) -> ShdeclResult<()> {
    let tasks: &[Task] = containers
        .iter()
        .find(|c| !c.tasks.is_empty())
        .map(|c| c.tasks.as_slice())
        .unwrap_or_default();
    write_file(output, &render(format, tasks)?)
}

fn write_role(format: OutputFormat, containers: &[TaskContainer], root: &Path) -> ShdeclResult<()> {
    create_skeleton(root)?;

    let mut includes = Vec::new();
    for container in containers.iter().filter(|c| !c.tasks.is_empty()) {
        let file_name = format!("{}.yml", container.name);
        write_file(
            &root.join("tasks").join(&file_name),
            &render(format, &container.tasks)?,
        )?;
        includes.push(json!({ "include_tasks": file_name }));
    }
    write_file(&root.join("tasks/main.yml"), &render(format, &includes)?)?;

    let variables = collect_variables(containers);
    if !variables.is_empty() {
        // Always YAML, the engine only loads vars files in that form
        write_file(
            &root.join("vars/vars.yml"),
            &render(OutputFormat::Yaml, &variables)?,
        )?;
    }
    Ok(())
}

/// Create the role directories and stub `main.yml` files. Existing files are
/// left alone.
fn create_skeleton(root: &Path) -> ShdeclResult<()> {
    for dir in ROLE_DIRS {
        fs::create_dir_all(root.join(dir))?;
    }
    for dir in STUB_DIRS {
        let stub = root.join(dir).join("main.yml");
        if !stub.exists() {
            fs::write(&stub, STUB_CONTENT)?;
        }
    }
    Ok(())
}

/// Exported variables of every container; later scripts win on conflicts
fn collect_variables(containers: &[TaskContainer]) -> Map<String, Value> {
    let mut merged = Map::new();
    for container in containers {
        for (name, value) in &container.variables {
            merged.insert(name.clone(), value.clone());
        }
    }
    merged
}

fn write_file(path: &Path, contents: &str) -> ShdeclResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    tracing::debug!(path = %path.display(), bytes = contents.len(), "write");
    fs::write(path, contents)?;
    Ok(())
}
