//! Position-addressed routine patching.
//!
//! A *target* routine is registered by name together with its declaration
//! text. *Patches* splice their bodies into that text after a given body
//! line, and every invocation compiles the composed text afresh and calls
//! the result.
//!
//! ```text
//! capture -> Registry::register -> Registry::insert ... -> Registry::invoke
//! ```

pub mod capture;
pub mod error;
pub mod hooks;
pub mod insert;
pub mod pipeline;
pub mod registry;

pub use capture::{capture, dedent, SourceUnit};
pub use error::{CaptureError, HookError, InsertionError, InvocationError, Result};
pub use hooks::{AppliedPatch, Hooks, LoadReport};
pub use insert::{anchor_from_value, Splice};
pub use registry::{Registry, TargetEntry, TargetSnapshot};

pub use stitch_eval::{Environment, Value};
