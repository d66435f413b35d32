use clap::{Parser, ValueEnum};
use shdecl::{ShdeclError, ShdeclResult, TaskContainer, Translator};
use shdecl_config::{GeneratorKind, OutputFormat, ShdeclConfig};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// shdecl - translate shell scripts into Ansible tasks
#[derive(Parser, Debug)]
#[command(name = "shdecl", version, about)]
struct Args {
    /// Script file, or a directory of `*.sh` scripts
    input: PathBuf,

    /// Output file (playbook, role-tasks) or role directory (role)
    output: PathBuf,

    /// Force JSON output
    #[arg(long, conflicts_with = "yaml")]
    json: bool,

    /// Force YAML output
    #[arg(long)]
    yaml: bool,

    /// Strict mode: no shell fallback for unrecognised commands
    #[arg(long)]
    strict: bool,

    /// What to generate
    #[arg(long, value_enum)]
    generator: Option<Generator>,

    /// Role name, used as the register prefix
    #[arg(long)]
    role_name: Option<String>,

    /// Allow copies from remote hosts
    #[arg(long)]
    pull: bool,

    /// Allow copies to remote hosts
    #[arg(long)]
    push: bool,

    /// Path to configuration file
    #[arg(short = 'c', long = "config", env = "SHDECL_CONFIG")]
    config: Option<String>,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Generator {
    Role,
    RoleTasks,
    Playbook,
}

impl From<Generator> for GeneratorKind {
    fn from(generator: Generator) -> Self {
        match generator {
            Generator::Role => Self::Role,
            Generator::RoleTasks => Self::RoleTasks,
            Generator::Playbook => Self::Playbook,
        }
    }
}

fn main() -> ExitCode {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => match shdecl_config::load_from_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Error: Failed to load config from {path}: {e}");
                return ExitCode::FAILURE;
            }
        },
        None => shdecl_config::load().unwrap_or_else(|e| {
            eprintln!("Warning: Failed to load config: {e}, using defaults");
            ShdeclConfig::default()
        }),
    };
    let config = apply_overrides(config, &args);

    init_logging(&config, args.debug);

    match run(&config, &args.input, &args.output) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("shdecl: {e}");
            ExitCode::FAILURE
        }
    }
}

/// CLI flags take priority over every config source
fn apply_overrides(mut config: ShdeclConfig, args: &Args) -> ShdeclConfig {
    if args.json {
        config.output.format = OutputFormat::Json;
    }
    if args.yaml {
        config.output.format = OutputFormat::Yaml;
    }
    if args.strict {
        config.translate.allow_shell_fallback = false;
    }
    if args.pull {
        config.translate.pull = true;
    }
    if args.push {
        config.translate.push = true;
    }
    if let Some(generator) = args.generator {
        config.output.generator = generator.into();
    }
    if let Some(role) = &args.role_name {
        config.translate.role_name = Some(role.clone());
    }
    config
}

fn init_logging(config: &ShdeclConfig, debug: bool) {
    let filter = if debug {
        "debug".to_string()
    } else if config.logging.filter.is_empty() {
        config.logging.level.as_str().to_string()
    } else {
        config.logging.filter.clone()
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(tracing_subscriber::EnvFilter::new(filter))
        .init();
}

fn run(config: &ShdeclConfig, input: &Path, output: &Path) -> ShdeclResult<()> {
    config.validate()?;

    let mut translator = Translator::new(config.translate.clone());
    let scripts = collect_scripts(input)?;
    let (containers, failed) = translate_all(&mut translator, &scripts);

    shdecl::generate(
        config.output.generator,
        config.output.format,
        &containers,
        output,
    )?;

    if failed > 0 {
        return Err(ShdeclError::ScriptsSkipped {
            failed,
            total: scripts.len(),
        });
    }
    Ok(())
}

/// Translate every script. A script that cannot be read or parsed is logged
/// and skipped; the count of skipped scripts is returned with the rest.
fn translate_all(translator: &mut Translator, scripts: &[PathBuf]) -> (Vec<TaskContainer>, usize) {
    let mut containers = Vec::with_capacity(scripts.len());
    let mut failed = 0;
    for path in scripts {
        match translate_file(translator, path) {
            Ok(container) => containers.push(container),
            Err(e) => {
                tracing::error!(path = %path.display(), error = %e, "skipped");
                failed += 1;
            }
        }
    }
    (containers, failed)
}

/// The input file itself, or the `*.sh` files of a directory in name order
fn collect_scripts(input: &Path) -> ShdeclResult<Vec<PathBuf>> {
    if input.is_file() {
        return Ok(vec![input.to_path_buf()]);
    }
    if !input.is_dir() {
        return Err(ShdeclError::InvalidArgument(format!(
            "input not found: {}",
            input.display()
        )));
    }

    let mut scripts = Vec::new();
    for entry in fs::read_dir(input)? {
        let path = entry?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "sh") {
            scripts.push(path);
        }
    }
    if scripts.is_empty() {
        return Err(ShdeclError::InvalidArgument(format!(
            "no *.sh scripts in {}",
            input.display()
        )));
    }
    scripts.sort();
    Ok(scripts)
}

fn translate_file(translator: &mut Translator, path: &Path) -> ShdeclResult<TaskContainer> {
    let name = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "script".to_string());
    tracing::info!(path = %path.display(), "processing");
    let source = fs::read_to_string(path)?;
    translator.translate(&name, &source)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_broken_script_does_not_stop_the_run() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.sh"), "touch /tmp/a\n").unwrap();
        fs::write(dir.path().join("b.sh"), "if true; then x\n").unwrap();
        fs::write(dir.path().join("c.sh"), "#!/usr/bin/perl\nprint 1;\n").unwrap();
        fs::write(dir.path().join("d.sh"), "mkdir /tmp/d\n").unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let scripts = collect_scripts(dir.path()).unwrap();
        assert_eq!(scripts.len(), 4);

        let mut translator = Translator::default();
        let (containers, failed) = translate_all(&mut translator, &scripts);
        assert_eq!(failed, 2);
        let names: Vec<_> = containers.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["a", "d"]);
    }

    #[test]
    fn test_run_writes_output_and_reports_skipped() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("scripts");
        fs::create_dir(&input).unwrap();
        fs::write(input.join("good.sh"), "touch /tmp/a\n").unwrap();
        fs::write(input.join("bad.sh"), "if true; then x\n").unwrap();
        let output = dir.path().join("role");

        let err = run(&ShdeclConfig::default(), &input, &output).unwrap_err();
        assert!(matches!(
            err,
            ShdeclError::ScriptsSkipped { failed: 1, total: 2 }
        ));
        assert!(output.join("tasks/good.yml").is_file());
    }

    #[test]
    fn test_missing_input() {
        let dir = tempdir().unwrap();
        let err = collect_scripts(&dir.path().join("nope")).unwrap_err();
        assert!(matches!(err, ShdeclError::InvalidArgument(_)));
    }
}
