//! The macro script language: a line-oriented call language whose only
//! reachable operations are the entries of the action vocabulary.

pub mod interp;
pub mod lexer;
pub mod parser;
pub mod vocab;

use serde::Serialize;
use thiserror::Error;

use crate::control::Stopped;

pub use interp::Interpreter;
pub use parser::{parse, Program};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScriptError {
    #[error("line {line}:{col}: syntax error: {msg}")]
    Syntax { line: usize, col: usize, msg: String },
    #[error("line {line}: name '{name}' is not defined")]
    UnknownName { line: usize, name: String },
    #[error("line {line}: {name}() {msg}")]
    Argument { line: usize, name: String, msg: String },
    #[error("line {line}: type error: {msg}")]
    Type { line: usize, msg: String },
    #[error("line {line}: {msg}")]
    Runtime { line: usize, msg: String },
    #[error("stopped")]
    Stopped,
}

impl From<Stopped> for ScriptError {
    fn from(_: Stopped) -> Self {
        Self::Stopped
    }
}

impl ScriptError {
    pub fn line(&self) -> Option<usize> {
        match self {
            Self::Syntax { line, .. }
            | Self::UnknownName { line, .. }
            | Self::Argument { line, .. }
            | Self::Type { line, .. }
            | Self::Runtime { line, .. } => Some(*line),
            Self::Stopped => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

/// One diagnostic produced by `check`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScriptIssue {
    pub line: usize,
    pub column: usize,
    pub message: String,
    pub severity: Severity,
    pub code: &'static str,
}

/// Static diagnostics for a script body without running it.
pub fn check(src: &str) -> Vec<ScriptIssue> {
    match parse(src) {
        Ok(program) => vocab::check_program(&program),
        Err(ScriptError::Syntax { line, col, msg }) => vec![ScriptIssue {
            line,
            column: col,
            message: msg,
            severity: Severity::Error,
            code: "SYNTAX",
        }],
        Err(other) => vec![ScriptIssue {
            line: other.line().unwrap_or(1),
            column: 1,
            message: other.to_string(),
            severity: Severity::Error,
            code: "PARSE",
        }],
    }
}
