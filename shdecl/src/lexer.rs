//! Lexer for shell scripts
//!
//! Tokenizes script text into a stream of spanned tokens. Reserved words are
//! not recognised here: `done` is a keyword only in command position, so the
//! parser decides.

use crate::ast::{HereDoc, RedirectKind, Segment, Span};
use chumsky::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Token {
    /// Adjacent bare/quoted segments merged into one word
    Word(Vec<Segment>),

    // Operators
    Pipe,      // |
    Semicolon, // ;
    Newline,   // \n
    Ampersand, // &
    AndAnd,    // &&
    OrOr,      // ||

    Redirect(RedirectKind),

    LeftParen,  // (
    RightParen, // )
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::Word(segments) => {
                for segment in segments {
                    match segment {
                        Segment::Bare(s) => write!(f, "{}", s)?,
                        Segment::SingleQuoted(s) => write!(f, "'{}'", s)?,
                        Segment::DoubleQuoted(s) => write!(f, "\"{}\"", s)?,
                    }
                }
                Ok(())
            }
            Token::Pipe => write!(f, "|"),
            Token::Semicolon => write!(f, ";"),
            Token::Newline => write!(f, "\\n"),
            Token::Ampersand => write!(f, "&"),
            Token::AndAnd => write!(f, "&&"),
            Token::OrOr => write!(f, "||"),
            Token::Redirect(kind) => write!(f, "{}", kind),
            Token::LeftParen => write!(f, "("),
            Token::RightParen => write!(f, ")"),
        }
    }
}

pub fn lexer() -> impl Parser<char, Vec<(Token, Span)>, Error = Simple<char>> {
    let comment = just('#').then(filter(|c| *c != '\n').repeated()).ignored();

    // Whitespace (not including newlines); backslash-newline continues the line
    let ws = filter(|c: &char| *c == ' ' || *c == '\t' || *c == '\r')
        .ignored()
        .or(just("\\\n").ignored())
        .repeated();

    // Word segments: bare chars, single-quoted, double-quoted, escaped chars.
    // Adjacent segments (no whitespace between) form one word.
    let sq_seg = just('\'')
        .ignore_then(filter(|c| *c != '\'').repeated())
        .then_ignore(just('\''))
        .collect::<String>()
        .map(Segment::SingleQuoted);

    let dq_seg = just('"')
        .ignore_then(
            just('\\')
                .then(any())
                .map(|(_b, c): (char, char)| match c {
                    // POSIX: these escapes are interpreted inside double quotes
                    '"' => "\"".to_string(),
                    '\\' => "\\".to_string(),
                    '$' => "$".to_string(),
                    '`' => "`".to_string(),
                    '\n' => String::new(), // line continuation
                    // All other \X sequences are literal (backslash preserved)
                    _ => format!("\\{}", c),
                })
                .or(filter(|c: &char| *c != '"' && *c != '\\').map(|c: char| c.to_string()))
                .repeated(),
        )
        .then_ignore(just('"'))
        .map(|parts: Vec<String>| Segment::DoubleQuoted(parts.concat()));

    // $( ... ) kept verbatim, nested parentheses balanced
    let paren_group = recursive(|group| {
        just('(')
            .ignore_then(
                group
                    .map(|inner: String| format!("({})", inner))
                    .or(filter(|c: &char| *c != '(' && *c != ')').map(|c: char| c.to_string()))
                    .repeated(),
            )
            .then_ignore(just(')'))
            .map(|parts: Vec<String>| parts.concat())
    });
    let command_sub = just('$')
        .ignore_then(paren_group)
        .map(|inner| format!("$({})", inner));

    let backtick_sub = just('`')
        .ignore_then(filter(|c| *c != '`').repeated())
        .then_ignore(just('`'))
        .collect::<String>()
        .map(|inner| format!("`{}`", inner));

    let word_char = filter(|c: &char| {
        !c.is_whitespace()
            && !matches!(
                c,
                '|' | '&' | ';' | '<' | '>' | '(' | ')' | '"' | '\'' | '\\' | '`'
            )
    });

    // Backslash-escape outside quotes: \X → literal X (POSIX)
    let escaped_char = just('\\')
        .ignore_then(filter(|c: &char| *c != '\n'))
        .map(|c: char| c.to_string());

    let bare_seg = choice((
        escaped_char,
        command_sub,
        backtick_sub,
        word_char.map(|c: char| c.to_string()),
    ))
    .repeated()
    .at_least(1)
    .map(|parts: Vec<String>| Segment::Bare(parts.concat()));

    let word = choice((bare_seg, sq_seg, dq_seg))
        .repeated()
        .at_least(1)
        .map(Token::Word);

    // Longest operators first
    let redirect = choice((
        just("2>>").to(RedirectKind::StderrAppend),
        just("2>&").to(RedirectKind::StderrDup),
        just("2>").to(RedirectKind::StderrWrite),
        just("&>").to(RedirectKind::BothWrite),
        just(">>").to(RedirectKind::StdoutAppend),
        just(">&").to(RedirectKind::StdoutDup),
        just(">").to(RedirectKind::StdoutWrite),
        just("<<-").to(RedirectKind::HereDocStrip),
        just("<<").to(RedirectKind::HereDoc),
        just("<").to(RedirectKind::StdinRead),
    ))
    .map(Token::Redirect);

    let operator = choice((
        just("&&").to(Token::AndAnd),
        just("||").to(Token::OrOr),
        just("|").to(Token::Pipe),
        just("&").to(Token::Ampersand),
        just(";").to(Token::Semicolon),
        just("\n").to(Token::Newline),
        just("(").to(Token::LeftParen),
        just(")").to(Token::RightParen),
    ));

    let token = choice((redirect, operator, word));

    // Comments are lexed and then dropped so one may end the input
    let item = comment
        .to(None)
        .or(token.map_with_span(|tok, span| Some((tok, span))));

    item.padded_by(ws.clone())
        .repeated()
        .padded_by(ws)
        .then_ignore(end())
        .map(|items: Vec<Option<(Token, Span)>>| items.into_iter().flatten().collect())
}

/// Blank out here-document bodies so the lexer only sees the command lines.
///
/// Every body char except newlines becomes a space, so offsets into the
/// returned text are offsets into `input`. Returns the bodies found.
pub fn mask_heredocs(input: &str) -> (String, Vec<HereDoc>) {
    let mut chars: Vec<char> = input.chars().collect();
    let mut heredocs = Vec::new();
    let mut pos = 0;

    while pos < chars.len() {
        let eol = line_end(&chars, pos);
        let pending = heredoc_operators(&chars[pos..eol], pos);
        pos = eol + 1;

        for (operator, delimiter, strip_tabs) in pending {
            let start = pos.min(chars.len());
            let mut end = chars.len();
            let mut cursor = start;
            while cursor < chars.len() {
                let line_eol = line_end(&chars, cursor);
                let line: String = chars[cursor..line_eol].iter().collect();
                cursor = line_eol + 1;
                let candidate = if strip_tabs {
                    line.trim_start_matches('\t')
                } else {
                    line.as_str()
                };
                if candidate == delimiter {
                    end = line_eol;
                    break;
                }
            }
            for c in &mut chars[start..end] {
                if *c != '\n' {
                    *c = ' ';
                }
            }
            heredocs.push(HereDoc {
                operator,
                body: start..end,
            });
            pos = cursor;
        }
    }

    (chars.into_iter().collect(), heredocs)
}

fn line_end(chars: &[char], from: usize) -> usize {
    chars[from..]
        .iter()
        .position(|c| *c == '\n')
        .map_or(chars.len(), |i| from + i)
}

/// `<<WORD` / `<<-WORD` operators on one line, outside quotes and comments:
/// (offset of `<<`, delimiter with quotes removed, strip leading tabs)
fn heredoc_operators(line: &[char], offset: usize) -> Vec<(usize, String, bool)> {
    let mut found = Vec::new();
    let mut quote: Option<char> = None;
    let mut i = 0;

    while i < line.len() {
        let c = line[i];
        match quote {
            Some(q) if c == q => quote = None,
            Some('"') if c == '\\' => i += 1,
            Some(_) => {}
            None => match c {
                '\\' => i += 1,
                '\'' | '"' => quote = Some(c),
                '#' if i == 0 || line[i - 1].is_whitespace() => break,
                '<' if line.get(i + 1) == Some(&'<') => {
                    // <<< is a here-string
                    if line.get(i + 2) == Some(&'<') {
                        i += 3;
                        continue;
                    }
                    let mut j = i + 2;
                    let strip_tabs = line.get(j) == Some(&'-');
                    if strip_tabs {
                        j += 1;
                    }
                    while line.get(j).is_some_and(|c| *c == ' ' || *c == '\t') {
                        j += 1;
                    }
                    let mut delimiter = String::new();
                    while let Some(&d) = line.get(j) {
                        if d.is_whitespace() || ";|&<>()".contains(d) {
                            break;
                        }
                        if !matches!(d, '\'' | '"' | '\\') {
                            delimiter.push(d);
                        }
                        j += 1;
                    }
                    if !delimiter.is_empty() {
                        found.push((offset + i, delimiter, strip_tabs));
                    }
                    i = j;
                    continue;
                }
                _ => {}
            },
        }
        i += 1;
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(input: &str) -> Vec<Token> {
        lexer()
            .parse(input)
            .unwrap()
            .into_iter()
            .map(|(tok, _)| tok)
            .collect()
    }

    fn bare(s: &str) -> Token {
        Token::Word(vec![Segment::Bare(s.to_string())])
    }

    #[test]
    fn test_simple_command() {
        assert_eq!(lex("mkdir -p /tmp/foo"), vec![bare("mkdir"), bare("-p"), bare("/tmp/foo")]);
    }

    #[test]
    fn test_quoted_string() {
        assert_eq!(
            lex("echo \"hello world\""),
            vec![
                bare("echo"),
                Token::Word(vec![Segment::DoubleQuoted("hello world".to_string())]),
            ]
        );
    }

    #[test]
    fn test_single_quoted() {
        assert_eq!(
            lex("echo 'hello $world'"),
            vec![
                bare("echo"),
                Token::Word(vec![Segment::SingleQuoted("hello $world".to_string())]),
            ]
        );
    }

    #[test]
    fn test_variables_stay_inside_words() {
        assert_eq!(
            lex("cp /tmp/${s}.txt /tmp/bar_$s"),
            vec![bare("cp"), bare("/tmp/${s}.txt"), bare("/tmp/bar_$s")]
        );
    }

    #[test]
    fn test_compound_word() {
        assert_eq!(
            lex("NAME=\"a b\"'c'"),
            vec![Token::Word(vec![
                Segment::Bare("NAME=".to_string()),
                Segment::DoubleQuoted("a b".to_string()),
                Segment::SingleQuoted("c".to_string()),
            ])]
        );
    }

    #[test]
    fn test_redirection() {
        assert_eq!(
            lex("echo hello >> file.txt 2>&1"),
            vec![
                bare("echo"),
                bare("hello"),
                Token::Redirect(RedirectKind::StdoutAppend),
                bare("file.txt"),
                Token::Redirect(RedirectKind::StderrDup),
                bare("1"),
            ]
        );
    }

    #[test]
    fn test_list_operators() {
        assert_eq!(
            lex("a && b || c | d; e &"),
            vec![
                bare("a"),
                Token::AndAnd,
                bare("b"),
                Token::OrOr,
                bare("c"),
                Token::Pipe,
                bare("d"),
                Token::Semicolon,
                bare("e"),
                Token::Ampersand,
            ]
        );
    }

    #[test]
    fn test_comment() {
        assert_eq!(
            lex("echo hello # this is a comment\necho world # trailing"),
            vec![bare("echo"), bare("hello"), Token::Newline, bare("echo"), bare("world")]
        );
    }

    #[test]
    fn test_hash_inside_word() {
        assert_eq!(lex("echo a#b"), vec![bare("echo"), bare("a#b")]);
    }

    #[test]
    fn test_line_continuation() {
        assert_eq!(
            lex("apt install -y \\\n  foo"),
            vec![bare("apt"), bare("install"), bare("-y"), bare("foo")]
        );
    }

    #[test]
    fn test_command_substitution() {
        assert_eq!(
            lex("echo $(date +%s (x)) `uname`"),
            vec![bare("echo"), bare("$(date +%s (x))"), bare("`uname`")]
        );
    }

    #[test]
    fn test_spans_are_char_offsets() {
        let tokens = lexer().parse("ls  /tmp").unwrap();
        assert_eq!(tokens[0].1, 0..2);
        assert_eq!(tokens[1].1, 4..8);
    }

    #[test]
    fn test_whitespace_only() {
        assert!(lex("  \t ").is_empty());
    }

    #[test]
    fn test_heredoc_operator() {
        assert_eq!(
            lex("cat <<EOF"),
            vec![bare("cat"), Token::Redirect(RedirectKind::HereDoc), bare("EOF")]
        );
        assert_eq!(
            lex("cat <<-END"),
            vec![bare("cat"), Token::Redirect(RedirectKind::HereDocStrip), bare("END")]
        );
    }

    #[test]
    fn test_mask_heredocs() {
        let input = "cat <<EOF > /tmp/x\nit's $HOME\nEOF\ntouch /tmp/y\n";
        let (masked, heredocs) = mask_heredocs(input);

        assert_eq!(masked.chars().count(), input.chars().count());
        assert_eq!(masked, "cat <<EOF > /tmp/x\n          \n   \ntouch /tmp/y\n");
        assert_eq!(heredocs.len(), 1);
        assert_eq!(heredocs[0].operator, 4);
        let body: String = input
            .chars()
            .skip(heredocs[0].body.start)
            .take(heredocs[0].body.len())
            .collect();
        assert_eq!(body, "it's $HOME\nEOF");
    }

    #[test]
    fn test_mask_heredocs_quoted_delimiter_and_tabs() {
        let input = "cat <<-'END'\n\tbody\n\tEND\necho done";
        let (masked, heredocs) = mask_heredocs(input);
        assert_eq!(heredocs.len(), 1);
        assert!(masked.ends_with("\necho done"));
    }

    #[test]
    fn test_mask_heredocs_ignores_quotes_and_here_strings() {
        for input in ["echo '<<EOF'\nEOF", "cat <<<word\nword", "echo x # <<EOF\nEOF"] {
            let (masked, heredocs) = mask_heredocs(input);
            assert!(heredocs.is_empty(), "{input}");
            assert_eq!(masked, input);
        }
    }

    #[test]
    fn test_mask_heredocs_unterminated_runs_to_end() {
        let (masked, heredocs) = mask_heredocs("cat <<EOF\nno end");
        assert_eq!(heredocs[0].body, 10..16);
        assert_eq!(masked, "cat <<EOF\n      ");
    }
}
