//! Syntax tree for shell scripts
//!
//! The parser produces a flat, position-annotated node tree: compound
//! commands (`if`, `for`, `while`) keep their reserved words as child nodes so
//! the translator can walk them as a keyword-driven state machine.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;

/// Character offsets into the script source.
pub type Span = Range<usize>;

/// Words that only act as keywords in command position.
pub const RESERVED_WORDS: &[&str] = &[
    "if", "then", "elif", "else", "fi", "for", "in", "do", "done", "while", "until",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Script {
    pub source: String,
    pub nodes: Vec<Node>,
    /// Here-document bodies, in source order
    #[serde(default)]
    pub heredocs: Vec<HereDoc>,
}

/// Body lines of a `<<WORD` redirect, terminator line included. `operator`
/// is the offset of the `<<` that introduced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HereDoc {
    pub operator: usize,
    pub body: Span,
}

impl Script {
    /// Source text covered by `span`.
    pub fn text(&self, span: &Span) -> String {
        self.source
            .chars()
            .skip(span.start)
            .take(span.end.saturating_sub(span.start))
            .collect()
    }

    /// As [`text`](Self::text), followed by the bodies of here-documents
    /// opened inside `span` whose lines fall after it.
    pub fn text_with_heredocs(&self, span: &Span) -> String {
        let mut text = self.text(span);
        for heredoc in &self.heredocs {
            if span.contains(&heredoc.operator) && heredoc.body.start >= span.end {
                text.push('\n');
                text.push_str(&self.text(&heredoc.body));
            }
        }
        text
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub kind: NodeKind,
    pub span: Span,
}

impl Node {
    pub fn new(kind: NodeKind, span: Span) -> Self {
        Self { kind, span }
    }

    /// The keyword text if this is a reserved-word node.
    pub fn reserved(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::ReservedWord(word) => Some(word),
            _ => None,
        }
    }

    pub fn as_word(&self) -> Option<&Word> {
        match &self.kind {
            NodeKind::Word(word) => Some(word),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NodeKind {
    Word(Word),
    /// `NAME=VALUE` in command-prefix position
    Assignment(Assignment),
    /// Simple command: assignments, words and redirects in source order
    Command { parts: Vec<Node> },
    Redirect(Redirect),
    ReservedWord(String),
    /// `&&`, `||` or `|` between list/pipeline members
    Operator(ListOp),
    /// `if`, test, `then`, body..., [`elif` ...], [`else`, body...], `fi`
    If { parts: Vec<Node> },
    /// `for`, variable, `in`, values..., `do`, body..., `done`
    For { parts: Vec<Node> },
    /// `while`/`until`, test, `do`, body..., `done`
    While { parts: Vec<Node> },
    /// Pipelines joined by `&&` / `||`
    List { parts: Vec<Node> },
    /// Commands joined by `|`
    Pipeline { parts: Vec<Node> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ListOp {
    And,
    Or,
    Pipe,
}

impl fmt::Display for ListOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::And => write!(f, "&&"),
            Self::Or => write!(f, "||"),
            Self::Pipe => write!(f, "|"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Word {
    pub segments: Vec<Segment>,
}

impl Word {
    pub fn literal(s: &str) -> Self {
        Word {
            segments: vec![Segment::Bare(s.to_string())],
        }
    }

    /// Word text with quotes removed.
    pub fn text(&self) -> String {
        self.segments.iter().map(Segment::as_str).collect()
    }

    /// True if any part of the word was quoted.
    pub fn is_quoted(&self) -> bool {
        self.segments
            .iter()
            .any(|s| !matches!(s, Segment::Bare(_)))
    }

    /// The keyword this word spells, if it is an unquoted reserved word.
    pub fn reserved(&self) -> Option<&'static str> {
        match self.segments.as_slice() {
            [Segment::Bare(s)] => RESERVED_WORDS.iter().copied().find(|kw| *kw == s.as_str()),
            _ => None,
        }
    }
}

impl fmt::Display for Word {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for segment in &self.segments {
            match segment {
                Segment::Bare(s) => write!(f, "{}", s)?,
                Segment::SingleQuoted(s) => write!(f, "'{}'", s)?,
                Segment::DoubleQuoted(s) => write!(f, "\"{}\"", s)?,
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Segment {
    Bare(String),
    /// Never interpolated
    SingleQuoted(String),
    DoubleQuoted(String),
}

impl Segment {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Bare(s) | Self::SingleQuoted(s) | Self::DoubleQuoted(s) => s,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub name: String,
    pub value: Word,
}

impl Assignment {
    /// Split `NAME=VALUE` segments. Hands the segments back if the word is
    /// not an assignment.
    pub fn from_segments(segments: Vec<Segment>) -> Result<Self, Vec<Segment>> {
        let split = match segments.first() {
            Some(Segment::Bare(first)) => first
                .split_once('=')
                .filter(|(name, _)| is_identifier(name))
                .map(|(name, rest)| (name.to_string(), rest.to_string())),
            _ => None,
        };
        let Some((name, first_value)) = split else {
            return Err(segments);
        };

        let mut value = Vec::with_capacity(segments.len());
        if !first_value.is_empty() {
            value.push(Segment::Bare(first_value));
        }
        value.extend(segments.into_iter().skip(1));
        Ok(Assignment {
            name,
            value: Word { segments: value },
        })
    }
}

/// `[A-Za-z_][A-Za-z0-9_]*`
pub fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Redirect {
    pub kind: RedirectKind,
    pub target: Word,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RedirectKind {
    /// > file (stdout to file, truncate)
    StdoutWrite,
    /// >> file (stdout to file, append)
    StdoutAppend,
    /// < file (stdin from file)
    StdinRead,
    /// 2> file (stderr to file, truncate)
    StderrWrite,
    /// 2>> file (stderr to file, append)
    StderrAppend,
    /// &> file (stdout and stderr to file)
    BothWrite,
    /// >&N
    StdoutDup,
    /// 2>&N
    StderrDup,
    /// <<WORD (here-document)
    HereDoc,
    /// <<-WORD (here-document, leading tabs stripped)
    HereDocStrip,
}

impl fmt::Display for RedirectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = match self {
            Self::StdoutWrite => ">",
            Self::StdoutAppend => ">>",
            Self::StdinRead => "<",
            Self::StderrWrite => "2>",
            Self::StderrAppend => "2>>",
            Self::BothWrite => "&>",
            Self::StdoutDup => ">&",
            Self::StderrDup => "2>&",
            Self::HereDoc => "<<",
            Self::HereDocStrip => "<<-",
        };
        write!(f, "{}", op)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assignment_splits_name_and_value() {
        let a = Assignment::from_segments(vec![Segment::Bare("MYVAR=wibble".into())]).unwrap();
        assert_eq!(a.name, "MYVAR");
        assert_eq!(a.value.text(), "wibble");
    }

    #[test]
    fn assignment_keeps_quoted_value() {
        let a = Assignment::from_segments(vec![
            Segment::Bare("GREETING=".into()),
            Segment::DoubleQuoted("hello world".into()),
        ])
        .unwrap();
        assert_eq!(a.value.text(), "hello world");
        assert!(a.value.is_quoted());
    }

    #[test]
    fn non_identifier_is_not_assignment() {
        assert!(Assignment::from_segments(vec![Segment::Bare("--opt=1".into())]).is_err());
        assert!(Assignment::from_segments(vec![Segment::SingleQuoted("A=1".into())]).is_err());
    }

    #[test]
    fn reserved_words_only_when_bare() {
        assert_eq!(Word::literal("done").reserved(), Some("done"));
        let quoted = Word {
            segments: vec![Segment::DoubleQuoted("done".into())],
        };
        assert_eq!(quoted.reserved(), None);
    }

    #[test]
    fn script_text_uses_char_offsets() {
        let script = Script {
            source: "echo → ok".to_string(),
            nodes: vec![],
            heredocs: vec![],
        };
        assert_eq!(script.text(&(5..6)), "→");
        assert_eq!(script.text(&(7..9)), "ok");
    }

    #[test]
    fn heredoc_body_follows_its_command() {
        let script = Script {
            source: "cat <<EOF\nhi\nEOF\n".to_string(),
            nodes: vec![],
            heredocs: vec![HereDoc {
                operator: 4,
                body: 10..16,
            }],
        };
        assert_eq!(script.text_with_heredocs(&(0..9)), "cat <<EOF\nhi\nEOF");
        assert_eq!(script.text_with_heredocs(&(0..3)), "cat");
    }
}
