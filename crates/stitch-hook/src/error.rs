//! Error types for registering, patching and invoking targets.

use stitch_parser::ParseError;

/// A routine's declaration text could not be located.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CaptureError {
    #[error("source of `{name}` is not available in {unit}")]
    SourceUnavailable { name: String, unit: String },
}

/// An insertion was rejected. A rejected insertion leaves the target
/// exactly as it was.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InsertionError {
    #[error("no target named `{name}` is registered")]
    TargetNotFound { name: String },
    #[error("anchor must be an integer, got {found}")]
    InvalidAnchorType { found: String },
    #[error("anchor {anchor} is outside the {line_count} body line(s) of the target")]
    AnchorOutOfRange { anchor: i64, line_count: usize },
    #[error("patch for `{target}` does not parse")]
    InvalidPatch {
        target: String,
        #[source]
        source: ParseError,
    },
}

/// A target could not be run.
#[derive(Debug, Clone, thiserror::Error)]
pub enum InvocationError {
    #[error("no target named `{name}` is registered")]
    TargetNotFound { name: String },
    #[error("composed source of `{name}` does not compile")]
    Compile {
        name: String,
        #[source]
        source: stitch_eval::Error,
    },
    #[error("`{name}` is not bound after compiling its composed source")]
    BindingNotFound { name: String },
    #[error("`{name}` is async and must be invoked asynchronously")]
    AsyncTarget { name: String },
    /// The routine itself failed; the inner error is what it raised.
    #[error(transparent)]
    Routine(#[from] stitch_eval::Error),
}

/// Errors surfaced by [`crate::Hooks`].
#[derive(Debug, thiserror::Error)]
pub enum HookError {
    #[error(transparent)]
    Capture(#[from] CaptureError),
    #[error(transparent)]
    Insertion(#[from] InsertionError),
    #[error("{unit} does not parse")]
    Parse {
        unit: String,
        #[source]
        source: ParseError,
    },
    #[error("line {line}: {message}")]
    InvalidDecorator { line: usize, message: String },
}

pub type Result<T, E = HookError> = std::result::Result<T, E>;
