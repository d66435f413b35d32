//! Parser for shell scripts
//!
//! Parses the spanned token stream into a [`Script`]. Compound commands keep
//! their reserved words as [`NodeKind::ReservedWord`] children.

use crate::ast::*;
use crate::lexer::Token;
use chumsky::prelude::*;
use chumsky::Stream;

/// Parse a token stream into the top-level node list
pub fn parser() -> impl Parser<Token, Vec<Node>, Error = Simple<Token>> {
    body(and_or()).then_ignore(end())
}

/// A `&&` / `||` list of pipelines; the unit every body is made of
fn and_or() -> impl Parser<Token, Node, Error = Simple<Token>> + Clone {
    recursive(|list| {
        let op = choice((
            just(Token::AndAnd).to(ListOp::And),
            just(Token::OrOr).to(ListOp::Or),
        ))
        .map_with_span(|op, span| Node::new(NodeKind::Operator(op), span))
        .then_ignore(just(Token::Newline).repeated());

        pipeline(list.clone())
            .then(op.then(pipeline(list)).repeated())
            .map_with_span(|(first, rest), span| {
                if rest.is_empty() {
                    return first;
                }
                let mut parts = vec![first];
                for (op, node) in rest {
                    parts.push(op);
                    parts.push(node);
                }
                Node::new(NodeKind::List { parts }, span)
            })
    })
}

/// Separators between list items
fn sep() -> impl Parser<Token, (), Error = Simple<Token>> + Clone {
    filter(|t| matches!(t, Token::Semicolon | Token::Newline | Token::Ampersand)).ignored()
}

/// Zero or more lists, each optionally followed by separators
fn body(
    list: impl Parser<Token, Node, Error = Simple<Token>> + Clone,
) -> impl Parser<Token, Vec<Node>, Error = Simple<Token>> + Clone {
    sep()
        .repeated()
        .ignore_then(list.then_ignore(sep().repeated()).repeated())
}

fn pipeline(
    list: impl Parser<Token, Node, Error = Simple<Token>> + Clone,
) -> impl Parser<Token, Node, Error = Simple<Token>> + Clone {
    let element = choice((
        if_clause(list.clone()),
        for_clause(list.clone()),
        while_clause(list),
        simple_command(),
    ));

    let pipe = just(Token::Pipe)
        .map_with_span(|_, span| Node::new(NodeKind::Operator(ListOp::Pipe), span))
        .then_ignore(just(Token::Newline).repeated());

    element
        .clone()
        .then(pipe.then(element).repeated())
        .map_with_span(|(first, rest), span| {
            if rest.is_empty() {
                return first;
            }
            let mut parts = vec![first];
            for (op, node) in rest {
                parts.push(op);
                parts.push(node);
            }
            Node::new(NodeKind::Pipeline { parts }, span)
        })
}

/// if list; then body [elif list; then body]... [else body] fi
fn if_clause(
    list: impl Parser<Token, Node, Error = Simple<Token>> + Clone,
) -> impl Parser<Token, Node, Error = Simple<Token>> + Clone {
    let sep1 = sep().repeated().at_least(1);

    let elif = reserved("elif")
        .then(list.clone())
        .then_ignore(sep1.clone())
        .then(reserved("then"))
        .then(body(list.clone()));

    reserved("if")
        .then(list.clone())
        .then_ignore(sep1)
        .then(reserved("then"))
        .then(body(list.clone()))
        .then(elif.repeated())
        .then(reserved("else").then(body(list)).or_not())
        .then(reserved("fi"))
        .map_with_span(
            |((((((kw_if, cond), kw_then), then_body), elifs), else_part), kw_fi), span| {
                let mut parts = vec![kw_if, cond, kw_then];
                parts.extend(then_body);
                for (((kw_elif, cond), kw_then), elif_body) in elifs {
                    parts.push(kw_elif);
                    parts.push(cond);
                    parts.push(kw_then);
                    parts.extend(elif_body);
                }
                if let Some((kw_else, else_body)) = else_part {
                    parts.push(kw_else);
                    parts.extend(else_body);
                }
                parts.push(kw_fi);
                Node::new(NodeKind::If { parts }, span)
            },
        )
}

/// for name in words; do body done
fn for_clause(
    list: impl Parser<Token, Node, Error = Simple<Token>> + Clone,
) -> impl Parser<Token, Node, Error = Simple<Token>> + Clone {
    reserved("for")
        .then(word())
        .then(reserved("in"))
        .then(word().repeated())
        .then_ignore(sep().repeated().at_least(1))
        .then(reserved("do"))
        .then(body(list))
        .then(reserved("done"))
        .map_with_span(
            |((((((kw_for, var), kw_in), values), kw_do), loop_body), kw_done), span| {
                let mut parts = vec![kw_for, var, kw_in];
                parts.extend(values);
                parts.push(kw_do);
                parts.extend(loop_body);
                parts.push(kw_done);
                Node::new(NodeKind::For { parts }, span)
            },
        )
}

/// while|until list; do body done
fn while_clause(
    list: impl Parser<Token, Node, Error = Simple<Token>> + Clone,
) -> impl Parser<Token, Node, Error = Simple<Token>> + Clone {
    reserved("while")
        .or(reserved("until"))
        .then(list.clone())
        .then_ignore(sep().repeated().at_least(1))
        .then(reserved("do"))
        .then(body(list))
        .then(reserved("done"))
        .map_with_span(|((((kw, cond), kw_do), loop_body), kw_done), span| {
            let mut parts = vec![kw, cond, kw_do];
            parts.extend(loop_body);
            parts.push(kw_done);
            Node::new(NodeKind::While { parts }, span)
        })
}

/// Assignments and redirects, then an optional command word with its
/// arguments. At least one part is required.
fn simple_command() -> impl Parser<Token, Node, Error = Simple<Token>> + Clone {
    let prefix = choice((assignment(), redirect())).repeated();
    let suffix = choice((redirect(), word())).repeated();

    prefix
        .then(command_word().then(suffix).or_not())
        .try_map(|(mut parts, tail), span| {
            if let Some((head, rest)) = tail {
                parts.push(head);
                parts.extend(rest);
            }
            if parts.is_empty() {
                Err(Simple::custom(span, "expected a command"))
            } else {
                Ok(Node::new(NodeKind::Command { parts }, span))
            }
        })
}

fn word_token() -> impl Parser<Token, Vec<Segment>, Error = Simple<Token>> + Clone {
    filter_map(|span, tok| match tok {
        Token::Word(segments) => Ok(segments),
        _ => Err(Simple::expected_input_found(span, Vec::new(), Some(tok))),
    })
}

fn word() -> impl Parser<Token, Node, Error = Simple<Token>> + Clone {
    word_token()
        .map_with_span(|segments, span| Node::new(NodeKind::Word(Word { segments }), span))
}

/// A word in command position; reserved words are rejected here
fn command_word() -> impl Parser<Token, Node, Error = Simple<Token>> + Clone {
    word_token().try_map(|segments, span| {
        let word = Word { segments };
        match word.reserved() {
            Some(kw) => Err(Simple::custom(span, format!("unexpected `{}`", kw))),
            None => Ok(Node::new(NodeKind::Word(word), span)),
        }
    })
}

fn reserved(keyword: &'static str) -> impl Parser<Token, Node, Error = Simple<Token>> + Clone {
    filter_map(move |span, tok: Token| {
        let is_keyword = matches!(
            &tok,
            Token::Word(segments) if matches!(segments.as_slice(), [Segment::Bare(s)] if s == keyword)
        );
        if is_keyword {
            Ok(Node::new(NodeKind::ReservedWord(keyword.to_string()), span))
        } else {
            Err(Simple::expected_input_found(span, Vec::new(), Some(tok)))
        }
    })
}

fn assignment() -> impl Parser<Token, Node, Error = Simple<Token>> + Clone {
    word_token().try_map(|segments, span: Span| match Assignment::from_segments(segments) {
        Ok(assignment) => Ok(Node::new(NodeKind::Assignment(assignment), span)),
        Err(_) => Err(Simple::custom(span, "not an assignment")),
    })
}

fn redirect() -> impl Parser<Token, Node, Error = Simple<Token>> + Clone {
    filter_map(|span, tok| match tok {
        Token::Redirect(kind) => Ok(kind),
        _ => Err(Simple::expected_input_found(span, Vec::new(), Some(tok))),
    })
    .then(word_token())
    .map_with_span(|(kind, segments), span| {
        Node::new(
            NodeKind::Redirect(Redirect {
                kind,
                target: Word { segments },
            }),
            span,
        )
    })
}

/// Parse input string directly to a [`Script`]
pub fn parse(input: &str) -> Result<Script, Vec<Simple<Token>>> {
    use crate::lexer::{lexer, mask_heredocs};

    // Here-document bodies are not shell syntax, lex the command lines only
    let (masked, heredocs) = mask_heredocs(input);
    let tokens = lexer().parse(masked.as_str()).map_err(|errs| {
        errs.into_iter()
            .map(|e| Simple::custom(e.span(), e.to_string()))
            .collect::<Vec<_>>()
    })?;

    // Then parse the spanned tokens
    let len = input.chars().count();
    let nodes = parser().parse(Stream::from_iter(len..len + 1, tokens.into_iter()))?;
    Ok(Script {
        source: input.to_string(),
        nodes,
        heredocs,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reserved_words(node: &Node) -> Vec<&str> {
        let parts = match &node.kind {
            NodeKind::If { parts } | NodeKind::For { parts } | NodeKind::While { parts } => parts,
            _ => panic!("Expected compound command"),
        };
        parts.iter().filter_map(Node::reserved).collect()
    }

    #[test]
    fn test_simple_command() {
        let script = parse("echo hello").unwrap();
        assert_eq!(script.nodes.len(), 1);
        if let NodeKind::Command { parts } = &script.nodes[0].kind {
            assert_eq!(parts.len(), 2);
            assert_eq!(parts[0].as_word().unwrap().text(), "echo");
        } else {
            panic!("Expected command");
        }
    }

    #[test]
    fn test_assignment() {
        let script = parse("x=5").unwrap();
        if let NodeKind::Command { parts } = &script.nodes[0].kind {
            assert!(matches!(&parts[0].kind, NodeKind::Assignment(a) if a.name == "x"));
        } else {
            panic!("Expected command");
        }
    }

    #[test]
    fn test_assignment_after_command_word_is_an_argument() {
        let script = parse("export A=1").unwrap();
        if let NodeKind::Command { parts } = &script.nodes[0].kind {
            assert_eq!(parts.len(), 2);
            assert_eq!(parts[1].as_word().unwrap().text(), "A=1");
        } else {
            panic!("Expected command");
        }
    }

    #[test]
    fn test_redirect() {
        let script = parse("echo hi > /tmp/out.txt").unwrap();
        if let NodeKind::Command { parts } = &script.nodes[0].kind {
            assert!(matches!(
                &parts[2].kind,
                NodeKind::Redirect(r) if r.kind == RedirectKind::StdoutWrite && r.target.text() == "/tmp/out.txt"
            ));
        } else {
            panic!("Expected command");
        }
    }

    #[test]
    fn test_heredoc_body_is_not_parsed() {
        let script = parse("cat <<'EOF' > /tmp/x\nif (( broken\nEOF\necho after\n").unwrap();
        assert_eq!(script.nodes.len(), 2);
        assert_eq!(script.heredocs.len(), 1);
        if let NodeKind::Command { parts } = &script.nodes[0].kind {
            assert!(matches!(
                &parts[1].kind,
                NodeKind::Redirect(r) if r.kind == RedirectKind::HereDoc && r.target.text() == "EOF"
            ));
        } else {
            panic!("Expected command");
        }
        assert_eq!(
            script.text_with_heredocs(&script.nodes[0].span),
            "cat <<'EOF' > /tmp/x\nif (( broken\nEOF"
        );
    }

    #[test]
    fn test_pipeline() {
        let script = parse("ls | grep foo").unwrap();
        assert!(matches!(&script.nodes[0].kind, NodeKind::Pipeline { parts } if parts.len() == 3));
    }

    #[test]
    fn test_and_or_list() {
        let script = parse("mkdir /a && touch /a/b || echo no").unwrap();
        if let NodeKind::List { parts } = &script.nodes[0].kind {
            assert_eq!(parts.len(), 5);
            assert!(matches!(parts[1].kind, NodeKind::Operator(ListOp::And)));
            assert!(matches!(parts[3].kind, NodeKind::Operator(ListOp::Or)));
        } else {
            panic!("Expected list");
        }
    }

    #[test]
    fn test_multiple_statements() {
        let script = parse("echo one; echo two\n\necho three &").unwrap();
        assert_eq!(script.nodes.len(), 3);
    }

    #[test]
    fn test_if_else() {
        let script = parse("if [ $? -eq 0 ]; then\n  touch /tmp/ok\nelse\n  touch /tmp/no\nfi").unwrap();
        assert_eq!(script.nodes.len(), 1);
        assert_eq!(reserved_words(&script.nodes[0]), vec!["if", "then", "else", "fi"]);
    }

    #[test]
    fn test_elif() {
        let script = parse("if [ a = b ]; then x; elif [ a = c ]; then y; fi").unwrap();
        assert_eq!(
            reserved_words(&script.nodes[0]),
            vec!["if", "then", "elif", "then", "fi"]
        );
    }

    #[test]
    fn test_for_loop() {
        let script = parse("for s in a b c; do\n  touch /tmp/$s\ndone").unwrap();
        if let NodeKind::For { parts } = &script.nodes[0].kind {
            // for, var, in, 3 values, do, body, done
            assert_eq!(parts.len(), 9);
            assert_eq!(parts[1].as_word().unwrap().text(), "s");
        } else {
            panic!("Expected for loop");
        }
    }

    #[test]
    fn test_nested_compound() {
        let script = parse("for s in a; do if [ $s = a ]; then touch /x; fi; done").unwrap();
        if let NodeKind::For { parts } = &script.nodes[0].kind {
            assert!(matches!(parts[5].kind, NodeKind::If { .. }));
        } else {
            panic!("Expected for loop");
        }
    }

    #[test]
    fn test_while_loop() {
        let script = parse("while true; do echo tick; done").unwrap();
        assert_eq!(reserved_words(&script.nodes[0]), vec!["while", "do", "done"]);
    }

    #[test]
    fn test_reserved_word_as_argument() {
        let script = parse("echo done").unwrap();
        assert!(matches!(&script.nodes[0].kind, NodeKind::Command { parts } if parts.len() == 2));
    }

    #[test]
    fn test_spans_cover_source() {
        let script = parse("touch /a\nmkdir -p /b").unwrap();
        assert_eq!(script.text(&script.nodes[1].span), "mkdir -p /b");
    }

    #[test]
    fn test_unterminated_if_is_an_error() {
        assert!(parse("if [ a = b ]; then touch /x").is_err());
    }

    #[test]
    fn test_unterminated_quote_is_an_error() {
        assert!(parse("echo \"oops").is_err());
    }
}
