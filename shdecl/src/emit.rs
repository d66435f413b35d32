//! Per-verb task emission
//!
//! Each recognised verb has an entry in [`HANDLERS`]. A handler that cannot
//! make sense of its arguments returns [`Unsupported`] and the command is
//! emitted through the shell fallback instead.

use crate::classify::{classify, Classified};
use crate::policy::{TransferOp, TransferRequest, Verdict};
use crate::task::{Task, Warning};
use crate::translate::{Invocation, Translator, Unsupported};
use regex::Regex;
use serde_json::{json, Map, Value};
use std::sync::OnceLock;

const FILE: &str = "ansible.builtin.file";
const COPY: &str = "ansible.builtin.copy";
const SYNCHRONIZE: &str = "ansible.posix.synchronize";

type Handler = fn(&mut Translator, &Invocation, &Classified) -> Result<(), Unsupported>;

static HANDLERS: &[(&str, Handler)] = &[
    ("mkdir", Translator::emit_mkdir),
    ("touch", Translator::emit_touch),
    ("ln", Translator::emit_ln),
    ("cp", Translator::emit_cp),
    ("mv", Translator::emit_mv),
    ("rm", Translator::emit_rm),
    ("chmod", Translator::emit_chmod),
    ("chown", Translator::emit_chown),
    ("gunzip", Translator::emit_gunzip),
    ("apt", Translator::emit_apt),
    ("apt-get", Translator::emit_apt),
    ("yum", Translator::emit_yum),
    ("dnf", Translator::emit_yum),
    ("systemctl", Translator::emit_systemctl),
    ("wget", Translator::emit_wget),
    ("md5sum", Translator::emit_md5sum),
    ("grep", Translator::emit_grep),
    ("ldconfig", Translator::emit_ldconfig),
    ("echo", Translator::emit_echo),
    ("scp", Translator::emit_scp),
    ("rsync", Translator::emit_rsync),
];

/// `[user@]host:path`, or a plain local path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub user: Option<String>,
    pub host: Option<String>,
    pub path: String,
}

fn remote_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^(?:(?P<user>[^@/:]+)@)?(?P<host>[^:/]+):(?P<path>.*)$").ok())
        .as_ref()
}

impl Endpoint {
    pub fn parse(text: &str) -> Self {
        let captures = remote_pattern().and_then(|re| re.captures(text));
        match captures {
            Some(caps) => Self {
                user: caps.name("user").map(|m| m.as_str().to_string()),
                host: caps.name("host").map(|m| m.as_str().to_string()),
                path: caps
                    .name("path")
                    .map_or_else(String::new, |m| m.as_str().to_string()),
            },
            None => Self {
                user: None,
                host: None,
                path: text.to_string(),
            },
        }
    }

    pub fn is_remote(&self) -> bool {
        self.host.is_some()
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (&self.user, &self.host) {
            (Some(user), Some(host)) => write!(f, "{}@{}:{}", user, host, self.path),
            (None, Some(host)) => write!(f, "{}:{}", host, self.path),
            _ => write!(f, "{}", self.path),
        }
    }
}

/// `owner[:group]` or `owner.group`
fn split_owner(spec: &str) -> (Option<&str>, Option<&str>) {
    let (owner, group) = match spec.split_once(':').or_else(|| spec.split_once('.')) {
        Some((owner, group)) => (owner, Some(group)),
        None => (spec, None),
    };
    (
        Some(owner).filter(|o| !o.is_empty()),
        group.filter(|g| !g.is_empty()),
    )
}

impl Translator {
    pub(crate) fn dispatch(&mut self, invocation: &Invocation) {
        let classified = match classify(&invocation.verb, &invocation.args) {
            Ok(classified) => classified,
            Err(err) => {
                tracing::debug!(error = %err, command = %invocation.raw, "no translation");
                return self.fallback(&invocation.raw);
            }
        };
        let handler = HANDLERS
            .iter()
            .find(|(verb, _)| *verb == invocation.verb)
            .map(|(_, handler)| *handler);

        let handled = handler.map_or(Err(Unsupported), |handler| {
            handler(self, invocation, &classified)
        });
        if handled.is_err() {
            tracing::debug!(command = %invocation.raw, "arguments not understood");
            self.fallback(&invocation.raw);
        }
    }

    fn emit_mkdir(&mut self, _: &Invocation, args: &Classified) -> Result<(), Unsupported> {
        if args.positional.is_empty() {
            return Err(Unsupported);
        }
        let mode = args
            .option(&["-m", "--mode"])
            .map(str::to_string)
            .or_else(|| self.mode(true));
        for path in &args.positional {
            let task = Task::new(
                format!("Ensure directory {} exists", path),
                FILE,
                json!({ "path": path, "state": "directory" }),
            )
            .with_param("mode", mode.clone());
            self.push_task(task, Some("mkdir"));
        }
        Ok(())
    }

    fn emit_touch(&mut self, _: &Invocation, args: &Classified) -> Result<(), Unsupported> {
        if args.positional.is_empty() {
            return Err(Unsupported);
        }
        let mode = self.mode(false);
        for path in &args.positional {
            let task = Task::new(
                format!("Ensure file {} exists", path),
                FILE,
                json!({ "path": path, "state": "touch" }),
            )
            .with_param("mode", mode.clone());
            self.push_task(task, Some("touch"));
        }
        Ok(())
    }

    fn emit_ln(&mut self, _: &Invocation, args: &Classified) -> Result<(), Unsupported> {
        let [src, dest] = args.positional.as_slice() else {
            return Err(Unsupported);
        };
        let (kind, state) = if args.has_flag(&["-s", "--symbolic"]) {
            ("symlink", "link")
        } else {
            ("hard link", "hard")
        };
        let force = args.has_flag(&["-f", "--force"]);
        let task = Task::new(
            format!("Create {} {} → {}", kind, dest, src),
            FILE,
            json!({ "src": src, "dest": dest, "state": state }),
        )
        .with_param("force", force.then_some(true));
        self.push_task(task, Some("ln"));
        Ok(())
    }

    fn emit_cp(&mut self, _: &Invocation, args: &Classified) -> Result<(), Unsupported> {
        let Some((dest, sources)) = args.positional.split_last() else {
            return Err(Unsupported);
        };
        if sources.is_empty() {
            return Err(Unsupported);
        }
        for src in sources {
            let task = Task::new(
                format!("Copy {} to {}", src, dest),
                COPY,
                json!({ "src": src, "dest": dest, "remote_src": false }),
            );
            self.push_task(task, Some("copy_file"));
        }
        Ok(())
    }

    fn emit_mv(&mut self, _: &Invocation, args: &Classified) -> Result<(), Unsupported> {
        let [src, dest] = args.positional.as_slice() else {
            return Err(Unsupported);
        };
        let task = Task::new(
            format!("Move {} to {}", src, dest),
            "ansible.builtin.command",
            json!({
                "cmd": format!("mv {} {}", src, dest),
                "creates": dest,
                "removes": src,
            }),
        );
        self.push_task(task, Some("mv"));
        Ok(())
    }

    fn emit_rm(&mut self, _: &Invocation, args: &Classified) -> Result<(), Unsupported> {
        if args.positional.is_empty() {
            return Err(Unsupported);
        }
        for path in &args.positional {
            let task = Task::new(
                format!("Ensure {} is absent", path),
                FILE,
                json!({ "path": path, "state": "absent" }),
            );
            self.push_task(task, Some("rm"));
        }
        Ok(())
    }

    fn emit_chmod(&mut self, _: &Invocation, args: &Classified) -> Result<(), Unsupported> {
        let Some((mode, paths)) = args.positional.split_first() else {
            return Err(Unsupported);
        };
        if paths.is_empty() {
            return Err(Unsupported);
        }
        // recurse is only valid together with state=directory
        let recurse = args.has_flag(&["-R", "--recursive"]);
        for path in paths {
            let task = Task::new(
                format!("Set permissions of {} to {}", path, mode),
                FILE,
                json!({ "path": path, "mode": mode }),
            )
            .with_param("state", recurse.then_some("directory"))
            .with_param("recurse", recurse.then_some(true));
            self.push_task(task, Some("chmod"));
        }
        Ok(())
    }

    fn emit_chown(&mut self, _: &Invocation, args: &Classified) -> Result<(), Unsupported> {
        let Some((spec, paths)) = args.positional.split_first() else {
            return Err(Unsupported);
        };
        let (owner, group) = split_owner(spec);
        if paths.is_empty() || (owner.is_none() && group.is_none()) {
            return Err(Unsupported);
        }
        let recurse = args.has_flag(&["-R", "--recursive"]);
        for path in paths {
            let task = Task::new(
                format!("Set ownership of {} to {}", path, spec),
                FILE,
                json!({ "path": path }),
            )
            .with_param("owner", owner)
            .with_param("group", group)
            .with_param("state", recurse.then_some("directory"))
            .with_param("recurse", recurse.then_some(true));
            self.push_task(task, Some("chown"));
        }
        Ok(())
    }

    fn emit_gunzip(&mut self, _: &Invocation, args: &Classified) -> Result<(), Unsupported> {
        if args.positional.is_empty() {
            return Err(Unsupported);
        }
        let dest = self.config.unarchive_dest.clone();
        for path in &args.positional {
            let task = Task::new(
                format!("Extract GZ archive {}", path),
                "ansible.builtin.unarchive",
                json!({ "src": path, "dest": dest, "remote_src": false }),
            );
            self.push_task(task, Some("gunzip"));
        }
        Ok(())
    }

    fn emit_apt(&mut self, _: &Invocation, args: &Classified) -> Result<(), Unsupported> {
        let packages = &args.positional;
        let (description, params) = match (args.subverb.as_deref(), packages.is_empty()) {
            (Some("update"), _) => (
                "Update APT package cache".to_string(),
                json!({ "update_cache": true }),
            ),
            (Some("upgrade" | "dist-upgrade"), _) => (
                "Upgrade all packages".to_string(),
                json!({ "upgrade": "dist" }),
            ),
            (Some("install"), false) => (
                format!("Install packages: {}", packages.join(" ")),
                json!({ "name": packages, "state": "present", "update_cache": true }),
            ),
            (Some("remove"), false) => (
                format!("Remove packages: {}", packages.join(" ")),
                json!({ "name": packages, "state": "absent" }),
            ),
            (Some("purge"), false) => (
                format!("Purge packages: {}", packages.join(" ")),
                json!({ "name": packages, "state": "absent", "purge": true }),
            ),
            _ => return Err(Unsupported),
        };
        self.push_task(Task::new(description, "ansible.builtin.apt", params), Some("apt"));
        Ok(())
    }

    /// yum and dnf share arguments; the module and register key follow the verb
    fn emit_yum(&mut self, invocation: &Invocation, args: &Classified) -> Result<(), Unsupported> {
        let manager = invocation.verb.as_str();
        let packages = &args.positional;
        let (description, params) = match (args.subverb.as_deref(), packages.is_empty()) {
            (Some("update" | "upgrade"), true) => (
                format!("Update {} package cache", manager.to_uppercase()),
                json!({ "name": "*", "state": "latest" }),
            ),
            (Some("update" | "upgrade"), false) => (
                format!("Update packages: {}", packages.join(" ")),
                json!({ "name": packages, "state": "latest" }),
            ),
            (Some("install"), false) => (
                format!("Install packages: {}", packages.join(" ")),
                json!({ "name": packages, "state": "present" }),
            ),
            (Some("remove" | "erase"), false) => (
                format!("Remove packages: {}", packages.join(" ")),
                json!({ "name": packages, "state": "absent" }),
            ),
            _ => return Err(Unsupported),
        };
        let task = Task::new(description, format!("ansible.builtin.{}", manager), params);
        self.push_task(task, Some(manager));
        Ok(())
    }

    fn emit_systemctl(&mut self, _: &Invocation, args: &Classified) -> Result<(), Unsupported> {
        let Some(action) = args.subverb.as_deref() else {
            return Err(Unsupported);
        };
        if args.positional.is_empty() {
            return Err(Unsupported);
        }
        let now = args.has_flag(&["--now"]);
        for unit in &args.positional {
            let (description, params) = match action {
                "start" | "stop" | "restart" | "reload" => {
                    let state = match action {
                        "start" => "started",
                        "stop" => "stopped",
                        "restart" => "restarted",
                        _ => "reloaded",
                    };
                    (
                        format!("Ensure service {} is {}", unit, state),
                        json!({ "name": unit, "state": state }),
                    )
                }
                "enable" | "disable" => {
                    let enabled = action == "enable";
                    let mut params = json!({ "name": unit, "enabled": enabled });
                    if now {
                        params["state"] = json!(if enabled { "started" } else { "stopped" });
                    }
                    let verb = if enabled { "Enable" } else { "Disable" };
                    (format!("{} service {}", verb, unit), params)
                }
                _ => return Err(Unsupported),
            };
            self.push_task(
                Task::new(description, "ansible.builtin.service", params),
                Some("systemctl"),
            );
        }
        Ok(())
    }

    fn emit_wget(&mut self, _: &Invocation, args: &Classified) -> Result<(), Unsupported> {
        let [url] = args.positional.as_slice() else {
            return Err(Unsupported);
        };
        let file_name = url
            .split(['?', '#'])
            .next()
            .and_then(|u| u.rsplit('/').next())
            .filter(|name| !name.is_empty());
        let dest = match (
            args.option(&["-O", "--output-document"]),
            args.option(&["-P", "--directory-prefix"]),
        ) {
            // -O - writes to stdout
            (Some("-"), _) => return Err(Unsupported),
            (Some(dest), _) => dest.to_string(),
            (None, Some(dir)) => format!("{}/{}", dir.trim_end_matches('/'), file_name.ok_or(Unsupported)?),
            (None, None) => file_name.ok_or(Unsupported)?.to_string(),
        };
        let task = Task::new(
            format!("Download {} to {}", url, dest),
            "ansible.builtin.get_url",
            json!({ "url": url, "dest": dest }),
        );
        self.push_task(task, Some("wget"));
        Ok(())
    }

    fn emit_md5sum(&mut self, _: &Invocation, args: &Classified) -> Result<(), Unsupported> {
        if args.positional.is_empty() {
            return Err(Unsupported);
        }
        for path in &args.positional {
            let task = Task::new(
                format!("Compute MD5 checksum of {}", path),
                "ansible.builtin.stat",
                json!({ "path": path, "get_checksum": true, "checksum_algorithm": "md5" }),
            );
            self.push_task(task, Some("md5sum"));
        }
        Ok(())
    }

    /// grep has no declarative equivalent; the task only gets a readable name
    fn emit_grep(&mut self, invocation: &Invocation, args: &Classified) -> Result<(), Unsupported> {
        let (pattern, files) = match args.option(&["-e"]) {
            Some(pattern) => (pattern, args.positional.as_slice()),
            None => {
                let (pattern, files) = args.positional.split_first().ok_or(Unsupported)?;
                (pattern.as_str(), files)
            }
        };
        if files.is_empty() {
            return Err(Unsupported);
        }
        let task = Task::new(
            format!("grep for {} in {}", pattern, files.join(" ")),
            "ansible.builtin.shell",
            Value::String(invocation.raw.clone()),
        );
        self.push_task(task, Some("grep"));
        Ok(())
    }

    fn emit_ldconfig(&mut self, invocation: &Invocation, _: &Classified) -> Result<(), Unsupported> {
        let task = Task::new(
            "Run ldconfig",
            "ansible.builtin.command",
            Value::String(invocation.raw.clone()),
        );
        self.push_task(task, Some("ldconfig"));
        Ok(())
    }

    fn emit_echo(&mut self, invocation: &Invocation, args: &Classified) -> Result<(), Unsupported> {
        let text = args.positional.join(" ");
        match invocation.output_redirect() {
            Some((file, false)) => {
                let content = if args.has_flag(&["-n"]) {
                    text
                } else {
                    format!("{}\n", text)
                };
                let task = Task::new(
                    format!("Write text to {}", file),
                    COPY,
                    json!({ "dest": file, "content": content }),
                )
                .with_param("mode", self.mode(false));
                self.push_task(task, Some("echo"));
            }
            Some((file, true)) => {
                let task = Task::new(
                    format!("Append text to {}", file),
                    "ansible.builtin.lineinfile",
                    json!({ "path": file, "line": text, "create": true, "insertafter": "EOF" }),
                )
                .with_param("mode", self.mode(false));
                self.push_task(task, Some("echo"));
            }
            None => {
                let task = Task::new(
                    format!("Echo text: {}", text),
                    "ansible.builtin.debug",
                    json!({ "msg": text }),
                );
                self.push_task(task, None);
            }
        }
        Ok(())
    }

    /// Split transfer arguments and consult the policy gate. `Ok(None)` when
    /// the transfer was rejected.
    fn transfer_endpoints(
        &mut self,
        op: TransferOp,
        invocation: &Invocation,
        args: &Classified,
    ) -> Result<Option<(Vec<Endpoint>, Endpoint)>, Unsupported> {
        let Some((dest, sources)) = args.positional.split_last() else {
            return Err(Unsupported);
        };
        if sources.is_empty() {
            return Err(Unsupported);
        }
        let dest = Endpoint::parse(dest);
        let sources: Vec<Endpoint> = sources.iter().map(|s| Endpoint::parse(s)).collect();
        let request = TransferRequest {
            op,
            src_is_remote: sources.iter().any(Endpoint::is_remote),
            dest_is_remote: dest.is_remote(),
        };

        if let Verdict::Reject(reason) = self.gate.evaluate(&request) {
            self.warn(Warning::PolicyRejection {
                command: invocation.raw.clone(),
                reason,
            });
            return Ok(None);
        }
        // remote to remote has no single-task form
        if request.src_is_remote && request.dest_is_remote {
            return Err(Unsupported);
        }
        Ok(Some((sources, dest)))
    }

    fn emit_scp(&mut self, invocation: &Invocation, args: &Classified) -> Result<(), Unsupported> {
        let Some((sources, dest)) = self.transfer_endpoints(TransferOp::Scp, invocation, args)? else {
            return Ok(());
        };

        let mut connection = Map::new();
        if let Some(port) = args.option(&["-P"]) {
            let port = port
                .parse::<u16>()
                .map_or_else(|_| Value::String(port.to_string()), Value::from);
            connection.insert("ansible_port".to_string(), port);
        }
        if let Some(key) = args.option(&["-i"]) {
            connection.insert("ansible_ssh_private_key_file".to_string(), key.into());
        }

        let recursive = args.has_flag(&["-r"]);
        for src in &sources {
            // (task, remote endpoint, delegate to the remote host)
            let (mut task, remote, delegate) = if dest.is_remote() {
                let task = Task::new(
                    format!("Copy {} to {}", src, dest),
                    COPY,
                    json!({ "src": src.path, "dest": dest.path }),
                );
                (task, Some(&dest), true)
            } else if src.is_remote() && recursive {
                // fetch only handles single files
                let task = Task::new(
                    format!("Synchronize {} to {}", src, dest),
                    SYNCHRONIZE,
                    json!({ "src": src.path, "dest": dest.path, "mode": "pull", "recursive": true }),
                );
                (task, Some(src), false)
            } else if src.is_remote() {
                let task = Task::new(
                    format!("Fetch {} to {}", src, dest),
                    "ansible.builtin.fetch",
                    json!({ "src": src.path, "dest": dest.path, "flat": true }),
                );
                (task, Some(src), true)
            } else {
                let task = Task::new(
                    format!("Copy {} to {}", src, dest),
                    COPY,
                    json!({ "src": src.path, "dest": dest.path, "remote_src": false }),
                );
                (task, None, false)
            };

            if let Some(remote) = remote {
                if let Some(host) = remote.host.as_deref().filter(|_| delegate) {
                    task = task.with_keyword("delegate_to", host);
                }
                if let Some(user) = &remote.user {
                    task = task.with_keyword("remote_user", user.as_str());
                }
                if !connection.is_empty() {
                    task = task.with_keyword("vars", Value::Object(connection.clone()));
                }
            }
            self.push_task(task, Some("scp"));
        }
        Ok(())
    }

    fn emit_rsync(&mut self, invocation: &Invocation, args: &Classified) -> Result<(), Unsupported> {
        let Some((sources, dest)) = self.transfer_endpoints(TransferOp::Rsync, invocation, args)? else {
            return Ok(());
        };
        if !sources.iter().any(Endpoint::is_remote) && !dest.is_remote() {
            return Err(Unsupported);
        }

        let (mode, remote) = if dest.is_remote() {
            ("push", Some(&dest))
        } else {
            ("pull", sources.iter().find(|s| s.is_remote()))
        };
        let recursive = args.has_flag(&["-r", "--recursive", "-a", "--archive"]);
        let delete = args.has_flag(&["--delete"]);

        for src in &sources {
            let mut task = Task::new(
                format!("Synchronize {} to {}", src, dest),
                SYNCHRONIZE,
                json!({ "src": src.path, "dest": dest.path, "mode": mode }),
            )
            .with_param("recursive", recursive.then_some(true))
            .with_param("delete", delete.then_some(true));
            if let Some(user) = remote.and_then(|r| r.user.as_deref()) {
                task = task.with_keyword("remote_user", user);
            }
            self.push_task(task, Some("rsync"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_remote() {
        let endpoint = Endpoint::parse("deploy@web1:/srv/app/");
        assert_eq!(endpoint.user.as_deref(), Some("deploy"));
        assert_eq!(endpoint.host.as_deref(), Some("web1"));
        assert_eq!(endpoint.path, "/srv/app/");
        assert_eq!(endpoint.to_string(), "deploy@web1:/srv/app/");
    }

    #[test]
    fn test_endpoint_host_only() {
        let endpoint = Endpoint::parse("web1:backup.tar");
        assert_eq!(endpoint.user, None);
        assert!(endpoint.is_remote());
        assert_eq!(endpoint.path, "backup.tar");
    }

    #[test]
    fn test_endpoint_local() {
        assert!(!Endpoint::parse("./dir").is_remote());
        assert!(!Endpoint::parse("/tmp/a:b").is_remote());
        assert!(!Endpoint::parse("file.txt").is_remote());
    }

    #[test]
    fn test_split_owner() {
        assert_eq!(split_owner("www-data:adm"), (Some("www-data"), Some("adm")));
        assert_eq!(split_owner("root"), (Some("root"), None));
        assert_eq!(split_owner(":staff"), (None, Some("staff")));
    }

    #[test]
    fn test_every_shape_has_a_handler() {
        for verb in [
            "mkdir", "touch", "ln", "cp", "mv", "rm", "chmod", "chown", "gunzip", "apt",
            "apt-get", "yum", "dnf", "systemctl", "wget", "md5sum", "grep", "ldconfig", "echo",
            "scp", "rsync",
        ] {
            assert!(crate::classify::shape_for(verb).is_some(), "{verb} has no shape");
            assert!(HANDLERS.iter().any(|(v, _)| *v == verb), "{verb} has no handler");
        }
    }
}
