//! Error types for the Lox compiler.

use std::fmt;

use thiserror::Error;

/// Where on the line a compile error was detected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorLocation {
    /// At the end of the input.
    AtEnd,
    /// At the given lexeme.
    At(String),
    /// The scanner rejected the input; there is no lexeme to point at.
    None,
}

impl fmt::Display for ErrorLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorLocation::AtEnd => write!(f, " at end"),
            ErrorLocation::At(lexeme) => write!(f, " at '{lexeme}'"),
            ErrorLocation::None => Ok(()),
        }
    }
}

/// A syntax or static resolution error.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("[line {line}] Error{location}: {message}")]
pub struct CompileError {
    pub line: u32,
    pub location: ErrorLocation,
    pub message: String,
}
