//! Control flow: `if` guards, `for` unrolling and `&&` / `||` lists
//!
//! Compound nodes arrive as flat part lists with their reserved words kept,
//! so both visitors are small state machines driven by those keywords.

use crate::ast::{ListOp, Node, NodeKind, Script, Word};
use crate::env::ScopeGuard;
use crate::task::Warning;
use crate::translate::Translator;
use std::fmt;

/// Condition attached to the tasks of a branch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Guard {
    /// Outcome of a registered task
    Status { handle: String, succeeded: bool },
    /// Comparison reproduced as written
    Predicate(String),
}

impl Guard {
    pub fn negate(&self) -> Self {
        match self {
            Self::Status { handle, succeeded } => Self::Status {
                handle: handle.clone(),
                succeeded: !succeeded,
            },
            Self::Predicate(predicate) => Self::Predicate(format!("not ({})", predicate)),
        }
    }
}

impl fmt::Display for Guard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Status {
                handle,
                succeeded: true,
            } => write!(f, "{} is succeeded", handle),
            Self::Status {
                handle,
                succeeded: false,
            } => write!(f, "{} is failed", handle),
            Self::Predicate(predicate) => write!(f, "{}", predicate),
        }
    }
}

/// Result of reading a two-operand test
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestOutcome {
    /// One operand was `$?`
    pub is_exit_status_test: bool,
    /// Lexical comparison of the operand values
    pub result: bool,
    /// `<lhs> <op> <rhs>` from the operands as written
    pub predicate: String,
}

/// An operand: text as written (quotes removed) and its current value
#[derive(Debug, Clone)]
pub struct Operand {
    pub written: String,
    pub value: String,
}

const EXIT_STATUS: &str = "$?";

/// Evaluate `LHS OP RHS`. `None` for anything else.
pub fn evaluate_test(operands: &[Operand]) -> Option<TestOutcome> {
    let [lhs, op, rhs] = operands else {
        return None;
    };

    let is_exit_status_test = lhs.written == EXIT_STATUS || rhs.written == EXIT_STATUS;
    let value = |operand: &Operand| {
        if operand.written == EXIT_STATUS {
            "0".to_string()
        } else {
            operand.value.clone()
        }
    };
    let ordering = value(lhs).cmp(&value(rhs));

    let (symbol, result) = match op.written.as_str() {
        "-eq" | "=" | "==" => ("==", ordering.is_eq()),
        "-ne" | "!=" => ("!=", ordering.is_ne()),
        "-lt" => ("<", ordering.is_lt()),
        "-le" => ("<=", ordering.is_le()),
        "-gt" => (">", ordering.is_gt()),
        "-ge" => (">=", ordering.is_ge()),
        _ => return None,
    };

    Some(TestOutcome {
        is_exit_status_test,
        result,
        predicate: format!("{} {} {}", lhs.written, symbol, rhs.written),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IfState {
    Before,
    SeenKeyword,
    SeenTest,
    SeenThen,
    SeenElse,
    SeenFi,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ForState {
    Before,
    SeenKeyword,
    SeenVar,
    SeenIn,
    SeenDo,
    SeenDone,
}

impl Translator {
    /// `if`/`elif`/`else`: each branch's tasks get the negations of all
    /// earlier branch guards followed by the branch's own guard.
    pub(crate) fn visit_if(&mut self, parts: &[Node], script: &Script) {
        let mut state = IfState::Before;
        let mut previous: Vec<Option<Guard>> = Vec::new();
        let mut current: Option<Guard> = None;
        let mut branch_start = 0;

        for part in parts {
            match (state, part.reserved()) {
                (IfState::Before, Some("if")) => state = IfState::SeenKeyword,
                (IfState::SeenKeyword, None) => {
                    // An elif condition only runs when every earlier branch
                    // was skipped
                    let condition_start = self.state.container.tasks.len();
                    current = self.condition_guard(part, script);
                    self.close_branch(condition_start, &previous, None);
                    state = IfState::SeenTest;
                }
                (IfState::SeenTest, Some("then")) => {
                    branch_start = self.state.container.tasks.len();
                    state = IfState::SeenThen;
                }
                (IfState::SeenThen, Some("elif")) => {
                    self.close_branch(branch_start, &previous, current.as_ref());
                    previous.push(current.take());
                    state = IfState::SeenKeyword;
                }
                (IfState::SeenThen, Some("else")) => {
                    self.close_branch(branch_start, &previous, current.as_ref());
                    previous.push(current.take());
                    branch_start = self.state.container.tasks.len();
                    state = IfState::SeenElse;
                }
                (IfState::SeenThen | IfState::SeenElse, Some("fi")) => {
                    self.close_branch(branch_start, &previous, current.as_ref());
                    state = IfState::SeenFi;
                }
                (IfState::SeenThen | IfState::SeenElse, _) => self.visit_node(part, script),
                (state, keyword) => {
                    tracing::debug!(?state, ?keyword, "unexpected part in if clause");
                }
            }
        }

        if state != IfState::SeenFi {
            tracing::debug!(?state, "if clause ended early");
        }
    }

    /// Prepend guards to every task emitted since `start`
    fn close_branch(&mut self, start: usize, previous: &[Option<Guard>], own: Option<&Guard>) {
        let guards: Vec<String> = previous
            .iter()
            .flatten()
            .map(Guard::negate)
            .chain(own.cloned())
            .map(|guard| guard.to_string())
            .collect();
        if guards.is_empty() {
            return;
        }
        for task in &mut self.state.container.tasks[start..] {
            let mut when = guards.clone();
            when.append(&mut task.when);
            task.when = when;
        }
    }

    /// Guard for an `if` condition. Test commands become predicates or
    /// status checks; any other command is emitted with `ignore_errors` and
    /// its register is checked.
    fn condition_guard(&mut self, condition: &Node, script: &Script) -> Option<Guard> {
        if let Some(operands) = self.test_operands(condition) {
            let test = script.text(&condition.span);
            let Some(outcome) = evaluate_test(&operands) else {
                self.warn(Warning::MalformedTest { test });
                return None;
            };
            if !outcome.is_exit_status_test {
                return Some(Guard::Predicate(outcome.predicate));
            }
            return match self.state.last_handle.clone() {
                Some(handle) => Some(Guard::Status {
                    handle,
                    succeeded: outcome.result,
                }),
                None => {
                    self.warn(Warning::MissingHandle { test });
                    None
                }
            };
        }

        let start = self.state.container.tasks.len();
        let before = self.state.last_handle.clone();
        self.visit_node(condition, script);
        for task in &mut self.state.container.tasks[start..] {
            task.keywords.insert("ignore_errors".to_string(), true.into());
        }
        match self.state.last_handle.clone() {
            Some(handle) if self.state.last_handle != before => Some(Guard::Status {
                handle,
                succeeded: true,
            }),
            _ => {
                self.warn(Warning::MissingHandle {
                    test: script.text(&condition.span),
                });
                None
            }
        }
    }

    /// Operands of `[ ... ]`, `[[ ... ]]` or `test ...`, without the
    /// brackets. `None` if `node` is not a test command.
    fn test_operands(&self, node: &Node) -> Option<Vec<Operand>> {
        let NodeKind::Command { parts } = &node.kind else {
            return None;
        };
        let words: Vec<&Word> = parts.iter().filter_map(Node::as_word).collect();
        let (verb, args) = words.split_first()?;
        let closing = match verb.text().as_str() {
            "[" => Some("]"),
            "[[" => Some("]]"),
            "test" => None,
            _ => return None,
        };

        let mut args = args.to_vec();
        if let Some(closing) = closing {
            if args.last().is_some_and(|w| w.text() == closing) {
                args.pop();
            }
        }
        Some(
            args.into_iter()
                .map(|word| Operand {
                    written: word.text(),
                    value: self.bind_value(word),
                })
                .collect(),
        )
    }

    /// `for VAR in VALUES; do BODY; done`: the body is replayed once per
    /// value with VAR bound in a fresh scope.
    pub(crate) fn visit_for(&mut self, parts: &[Node], script: &Script) {
        let mut state = ForState::Before;
        let mut variable = None;
        let mut values: Vec<String> = Vec::new();
        let mut body: Vec<&Node> = Vec::new();

        for part in parts {
            match (state, part.reserved()) {
                (ForState::Before, Some("for")) => state = ForState::SeenKeyword,
                (ForState::SeenKeyword, _) => {
                    variable = part.as_word().map(Word::text);
                    state = ForState::SeenVar;
                }
                (ForState::SeenVar, Some("in")) => state = ForState::SeenIn,
                (ForState::SeenIn, Some("do")) => state = ForState::SeenDo,
                (ForState::SeenIn, _) => {
                    if let Some(word) = part.as_word() {
                        values.extend(self.loop_values(word));
                    }
                }
                (ForState::SeenDo, Some("done")) => state = ForState::SeenDone,
                (ForState::SeenDo, _) => body.push(part),
                (state, keyword) => {
                    tracing::debug!(?state, ?keyword, "unexpected part in for loop");
                }
            }
        }

        let (ForState::SeenDone, Some(variable)) = (state, variable) else {
            tracing::debug!(?state, "for loop not unrolled");
            return;
        };

        tracing::debug!(variable = %variable, iterations = values.len(), "unrolling for loop");
        for value in values {
            let mut scope = ScopeGuard::new(self, [(variable.clone(), value)]);
            for node in &body {
                scope.visit_node(node, script);
            }
        }
    }

    /// Unquoted words split on whitespace after resolving references to
    /// their values. Exported names resolve too, a placeholder cannot be
    /// split.
    fn loop_values(&self, word: &Word) -> Vec<String> {
        let value = self.bind_value(word);
        if word.is_quoted() {
            vec![value]
        } else {
            value.split_whitespace().map(str::to_string).collect()
        }
    }

    /// `a && b || c`: the right side of `&&` runs only if the left side
    /// succeeded, the right side of `||` only if it failed.
    pub(crate) fn visit_list(&mut self, parts: &[Node], script: &Script) {
        let list_start = self.state.container.tasks.len();
        let handle_before = self.state.last_handle.clone();
        let mut op: Option<ListOp> = None;
        // Operator that guarded the element just visited
        let mut left_via: Option<ListOp> = None;

        for part in parts {
            if let NodeKind::Operator(next) = part.kind {
                op = Some(next);
                continue;
            }

            let guard = match op {
                None => {
                    self.visit_node(part, script);
                    continue;
                }
                Some(op) => {
                    if op == ListOp::Or {
                        for task in &mut self.state.container.tasks[list_start..] {
                            task.keywords.insert("ignore_errors".to_string(), true.into());
                        }
                    }
                    // Only a register from inside this list says anything
                    // about the left side
                    self.state
                        .last_handle
                        .clone()
                        .filter(|handle| handle_before.as_ref() != Some(handle))
                        .map(|handle| list_guard(handle, op, left_via))
                }
            };
            left_via = guard.as_ref().and(op);

            let start = self.state.container.tasks.len();
            self.visit_node(part, script);
            if let Some(guard) = guard {
                self.close_branch(start, &[], Some(&guard));
            }
        }
    }
}

/// Guard for the element after `op`, given the left task's handle. A left
/// task skipped by `&&` means the list had already failed there; one skipped
/// by `||` means it had already succeeded, which the engine reports as
/// succeeded anyway.
fn list_guard(handle: String, op: ListOp, left_via: Option<ListOp>) -> Guard {
    match (op, left_via) {
        (ListOp::And, Some(ListOp::And)) => {
            Guard::Predicate(format!("{handle} is succeeded and {handle} is not skipped"))
        }
        (ListOp::Or, Some(ListOp::And)) => {
            Guard::Predicate(format!("{handle} is failed or {handle} is skipped"))
        }
        (op, _) => Guard::Status {
            handle,
            succeeded: op != ListOp::Or,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn operands(parts: &[(&str, &str)]) -> Vec<Operand> {
        parts
            .iter()
            .map(|(written, value)| Operand {
                written: (*written).to_string(),
                value: (*value).to_string(),
            })
            .collect()
    }

    #[test]
    fn test_exit_status_test() {
        let outcome = evaluate_test(&operands(&[("$?", "$?"), ("-eq", "-eq"), ("0", "0")])).unwrap();
        assert!(outcome.is_exit_status_test);
        assert!(outcome.result);

        let outcome = evaluate_test(&operands(&[("$?", "$?"), ("-ne", "-ne"), ("0", "0")])).unwrap();
        assert!(!outcome.result);
    }

    #[test]
    fn test_predicate_uses_written_text() {
        let outcome =
            evaluate_test(&operands(&[("$V", "$V"), ("-ne", "-ne"), ("x", "x")])).unwrap();
        assert!(!outcome.is_exit_status_test);
        assert_eq!(outcome.predicate, "$V != x");
    }

    #[test]
    fn test_comparison_is_lexical() {
        let outcome =
            evaluate_test(&operands(&[("$N", "10"), ("-lt", "-lt"), ("9", "9")])).unwrap();
        // "10" < "9" as strings
        assert!(outcome.result);
        assert_eq!(outcome.predicate, "$N < 9");
    }

    #[test]
    fn test_unsupported_forms() {
        assert!(evaluate_test(&operands(&[("-f", "-f"), ("/etc/x", "/etc/x")])).is_none());
        assert!(evaluate_test(&operands(&[("a", "a"), ("-nt", "-nt"), ("b", "b")])).is_none());
    }

    #[test]
    fn test_guard_negation() {
        let status = Guard::Status {
            handle: "h".to_string(),
            succeeded: true,
        };
        assert_eq!(status.negate().to_string(), "h is failed");
        assert_eq!(
            Guard::Predicate("$A == b".to_string()).negate().to_string(),
            "not ($A == b)"
        );
    }
}
