//! Command classifier
//!
//! Splits a command's argument tokens into sub-verb, flags, value options and
//! positional arguments according to a static per-verb [`CommandShape`].

use std::collections::BTreeMap;
use thiserror::Error;

/// Argument grammar for one verb
#[derive(Debug, Clone, Copy)]
pub struct CommandShape {
    pub verb: &'static str,
    /// Boolean flags, long and short
    pub flags: &'static [&'static str],
    /// Options that consume the following token
    pub value_options: &'static [&'static str],
    /// Recognised only as the first token
    pub subverbs: &'static [&'static str],
}

impl CommandShape {
    const fn new(verb: &'static str) -> Self {
        Self {
            verb,
            flags: &[],
            value_options: &[],
            subverbs: &[],
        }
    }

    const fn flags(mut self, flags: &'static [&'static str]) -> Self {
        self.flags = flags;
        self
    }

    const fn values(mut self, value_options: &'static [&'static str]) -> Self {
        self.value_options = value_options;
        self
    }

    const fn subverbs(mut self, subverbs: &'static [&'static str]) -> Self {
        self.subverbs = subverbs;
        self
    }

    fn is_flag(&self, token: &str) -> bool {
        self.flags.contains(&token)
    }

    fn is_value_option(&self, token: &str) -> bool {
        self.value_options.contains(&token)
    }

    /// `-rf` style bundles, split only when every letter is a known flag
    fn split_bundle(&self, token: &str) -> Option<Vec<String>> {
        let letters = token.strip_prefix('-')?;
        if letters.len() < 2 || letters.starts_with('-') {
            return None;
        }
        let split: Vec<String> = letters.chars().map(|c| format!("-{}", c)).collect();
        split.iter().all(|f| self.is_flag(f)).then_some(split)
    }
}

const PACKAGE_SUBVERBS: &[&str] = &[
    "update",
    "upgrade",
    "dist-upgrade",
    "install",
    "remove",
    "purge",
    "erase",
];

static SHAPES: &[CommandShape] = &[
    CommandShape::new("mkdir")
        .flags(&["-p", "--parents", "-v", "--verbose"])
        .values(&["-m", "--mode"]),
    CommandShape::new("touch").flags(&["-a", "-c", "-m", "--no-create"]),
    CommandShape::new("ln").flags(&[
        "-s",
        "--symbolic",
        "-f",
        "--force",
        "-n",
        "-v",
    ]),
    CommandShape::new("cp").flags(&[
        "-r",
        "-R",
        "--recursive",
        "-a",
        "--archive",
        "-f",
        "--force",
        "-p",
        "-v",
    ]),
    CommandShape::new("mv").flags(&["-f", "--force", "-n", "-v"]),
    CommandShape::new("rm").flags(&[
        "-r",
        "-R",
        "--recursive",
        "-f",
        "--force",
        "-v",
    ]),
    CommandShape::new("chmod").flags(&["-R", "--recursive", "-v", "-f"]),
    CommandShape::new("chown").flags(&["-R", "--recursive", "-v", "-f", "-h"]),
    CommandShape::new("gunzip").flags(&["-f", "-k", "-v", "-q"]),
    CommandShape::new("apt")
        .flags(&["-y", "--yes", "-q", "-qq", "--no-install-recommends"])
        .subverbs(PACKAGE_SUBVERBS),
    CommandShape::new("apt-get")
        .flags(&["-y", "--yes", "-q", "-qq", "--no-install-recommends"])
        .subverbs(PACKAGE_SUBVERBS),
    CommandShape::new("yum")
        .flags(&["-y", "--assumeyes", "-q"])
        .subverbs(PACKAGE_SUBVERBS),
    CommandShape::new("dnf")
        .flags(&["-y", "--assumeyes", "-q"])
        .subverbs(PACKAGE_SUBVERBS),
    CommandShape::new("systemctl")
        .flags(&["-q", "--quiet", "--now"])
        .subverbs(&["start", "stop", "restart", "reload", "enable", "disable"]),
    CommandShape::new("wget")
        .flags(&["-q", "--quiet", "-c", "--continue", "-nv"])
        .values(&["-O", "--output-document", "-P", "--directory-prefix"]),
    CommandShape::new("md5sum").flags(&["-b", "-t", "--binary", "--text"]),
    CommandShape::new("grep")
        .flags(&[
            "-q", "-i", "-v", "-E", "-F", "-r", "-n", "-s", "-l", "-c", "-w", "-x",
        ])
        .values(&["-e", "-m", "-f"]),
    CommandShape::new("ldconfig"),
    CommandShape::new("echo").flags(&["-n", "-e", "-E"]),
    CommandShape::new("scp")
        .flags(&["-r", "-p", "-q", "-C", "-v"])
        .values(&["-i", "-P", "-o"]),
    CommandShape::new("rsync")
        .flags(&[
            "-a",
            "--archive",
            "-r",
            "--recursive",
            "-v",
            "-z",
            "-h",
            "-P",
            "--progress",
            "--delete",
        ])
        .values(&["-e", "--rsh", "--exclude"]),
];

/// Look up the shape for `verb`
pub fn shape_for(verb: &str) -> Option<&'static CommandShape> {
    SHAPES.iter().find(|shape| shape.verb == verb)
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ClassifyError {
    #[error("unknown verb: {0}")]
    UnknownVerb(String),
}

/// A command's tokens partitioned per its shape
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Classified {
    pub verb: String,
    pub subverb: Option<String>,
    pub flags: Vec<String>,
    pub options: BTreeMap<String, String>,
    pub positional: Vec<String>,
}

impl Classified {
    /// True if any of `names` was given
    pub fn has_flag(&self, names: &[&str]) -> bool {
        names.iter().any(|name| self.flags.iter().any(|f| f == name))
    }

    /// Value of the first of `names` that was given
    pub fn option(&self, names: &[&str]) -> Option<&str> {
        names
            .iter()
            .find_map(|name| self.options.get(*name))
            .map(String::as_str)
    }
}

/// Partition `tokens` (arguments after the verb) using the shape table.
pub fn classify(verb: &str, tokens: &[String]) -> Result<Classified, ClassifyError> {
    let shape = shape_for(verb).ok_or_else(|| ClassifyError::UnknownVerb(verb.to_string()))?;

    let mut classified = Classified {
        verb: verb.to_string(),
        ..Classified::default()
    };
    let mut pending: Option<&str> = None;

    for (position, token) in tokens.iter().enumerate() {
        if let Some(option) = pending.take() {
            classified.options.insert(option.to_string(), token.clone());
            continue;
        }

        if position == 0 && shape.subverbs.contains(&token.as_str()) {
            classified.subverb = Some(token.clone());
            continue;
        }

        if shape.is_value_option(token) {
            pending = shape.value_options.iter().copied().find(|o| *o == token.as_str());
            continue;
        }

        if shape.is_flag(token) {
            classified.flags.push(token.clone());
            continue;
        }

        if let Some((option, value)) = token.strip_prefix("--").and_then(|t| t.split_once('=')) {
            classified
                .options
                .insert(format!("--{}", option), value.to_string());
            continue;
        }

        if let Some(bundle) = shape.split_bundle(token) {
            classified.flags.extend(bundle);
            continue;
        }

        classified.positional.push(token.clone());
    }

    if let Some(option) = pending {
        tracing::debug!(verb, option, "value option without a value");
    }

    Ok(classified)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(args: &[&str]) -> Vec<String> {
        args.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn test_flags_and_positional() {
        let c = classify("mkdir", &tokens(&["-p", "/tmp/foo", "/tmp/bar"])).unwrap();
        assert!(c.has_flag(&["-p", "--parents"]));
        assert_eq!(c.positional, vec!["/tmp/foo", "/tmp/bar"]);
    }

    #[test]
    fn test_value_option_consumes_next() {
        let c = classify("scp", &tokens(&["-i", "key.pem", "-P", "2222", "a", "b"])).unwrap();
        assert_eq!(c.option(&["-i"]), Some("key.pem"));
        assert_eq!(c.option(&["-P"]), Some("2222"));
        assert_eq!(c.positional, vec!["a", "b"]);
    }

    #[test]
    fn test_long_option_with_equals() {
        let c = classify("wget", &tokens(&["--output-document=/tmp/x", "http://h/x"])).unwrap();
        assert_eq!(c.option(&["-O", "--output-document"]), Some("/tmp/x"));
        assert_eq!(c.positional, vec!["http://h/x"]);
    }

    #[test]
    fn test_bundled_flags() {
        let c = classify("rm", &tokens(&["-rf", "/tmp/x"])).unwrap();
        assert!(c.has_flag(&["-r"]));
        assert!(c.has_flag(&["-f"]));
        assert_eq!(c.positional, vec!["/tmp/x"]);
    }

    #[test]
    fn test_unknown_bundle_is_positional() {
        let c = classify("chmod", &tokens(&["-x", "/tmp/x"])).unwrap();
        assert!(c.flags.is_empty());
        assert_eq!(c.positional, vec!["-x", "/tmp/x"]);
    }

    #[test]
    fn test_subverb_only_at_position_zero() {
        let c = classify("apt-get", &tokens(&["install", "-y", "nginx", "update"])).unwrap();
        assert_eq!(c.subverb.as_deref(), Some("install"));
        assert!(c.has_flag(&["-y"]));
        assert_eq!(c.positional, vec!["nginx", "update"]);

        let c = classify("apt", &tokens(&["-y", "install", "nginx"])).unwrap();
        assert_eq!(c.subverb, None);
        assert_eq!(c.positional, vec!["install", "nginx"]);
    }

    #[test]
    fn test_unknown_verb() {
        assert_eq!(
            classify("frobnicate", &tokens(&["x"])),
            Err(ClassifyError::UnknownVerb("frobnicate".to_string()))
        );
    }

    #[test]
    fn test_trailing_value_option_dropped() {
        let c = classify("wget", &tokens(&["http://h/x", "-O"])).unwrap();
        assert!(c.options.is_empty());
        assert_eq!(c.positional, vec!["http://h/x"]);
    }
}
