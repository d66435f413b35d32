//! shdecl - translate imperative shell scripts into declarative Ansible tasks
//!
//! This crate provides:
//! - A front end for the supported sh subset (lexer, parser, [`ast`])
//! - A [`Translator`] that walks the syntax tree, tracks variables, umask and
//!   result handles, and emits one [`Task`] per recognised command
//! - Generators that write the translated containers as a playbook, a task
//!   list or a full role

pub mod ast;
pub mod classify;
pub mod emit;
pub mod env;
pub mod error;
pub mod generate;
pub mod lexer;
pub mod mode;
pub mod parser;
pub mod policy;
pub mod register;
pub mod task;
pub mod translate;
pub mod visit;

pub use error::{ShdeclError, ShdeclResult};
pub use generate::generate;
pub use parser::parse;
pub use task::{Task, TaskContainer, Warning};
pub use translate::Translator;
