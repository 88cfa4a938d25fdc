//! Stitch interpreter.
//!
//! Compiles Stitch script text into a unit of routines and runs them,
//! either to completion on the calling thread or as a single async
//! operation that suspends only at the routine's own `await` points.
//! Exceptions raised by scripts are modeled as `Error::Exception(Value)`
//! and propagate using Rust's `?` operator.

mod environment;
mod error;
mod eval;
mod interpreter;
mod value;

pub use environment::Environment;
pub use error::Error;
pub use interpreter::{compile, run_sync, Interpreter, MAX_CALL_DEPTH};
pub use value::{BoxFuture, Function, NativeFn, Value};

/// Result type for interpreter operations.
pub type Result<T> = std::result::Result<T, Error>;
