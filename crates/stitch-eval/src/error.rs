//! Error types for the Stitch interpreter.

use stitch_parser::ParseError;

use crate::value::Value;

/// Errors that can occur while compiling or running a routine.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// The routine text did not parse.
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),
    /// A runtime error occurred.
    #[error("Runtime error: {0}")]
    Runtime(String),
    /// A script exception was raised (via `raise`).
    /// This propagates up the call stack using Rust's `?` operator.
    #[error("Exception: {}", .0.to_string_value())]
    Exception(Value),
}

impl Error {
    pub(crate) fn runtime(message: impl Into<String>) -> Self {
        Error::Runtime(message.into())
    }
}
