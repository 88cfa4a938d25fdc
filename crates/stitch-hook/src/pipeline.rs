//! Compile & invoke: turning a target's composed source back into a
//! routine and calling it.
//!
//! Nothing is cached. Every call compiles the text that is current at that
//! moment in a fresh interpreter, so a patch applied between two calls is
//! visible to the second one.

use stitch_eval::{Interpreter, Value};

use crate::capture::dedent;
use crate::error::InvocationError;
use crate::registry::Registry;

/// A compiled target, ready to be called.
struct Prepared {
    interpreter: Interpreter,
    routine: Value,
    is_async: bool,
}

impl Registry {
    fn prepare(&self, name: &str) -> Result<Prepared, InvocationError> {
        let entry = self
            .entry(name)
            .ok_or_else(|| InvocationError::TargetNotFound {
                name: name.to_string(),
            })?;
        // Hold the entry lock only long enough to copy what compilation needs
        let (source, callable, context, is_async) = {
            let entry = entry.read();
            (
                entry.source.clone(),
                entry.callable.clone(),
                entry.context.clone(),
                entry.is_async,
            )
        };

        let mut interpreter = Interpreter::new(context);
        interpreter
            .compile(&dedent(&source))
            .map_err(|source| InvocationError::Compile {
                name: name.to_string(),
                source,
            })?;

        let routine = interpreter
            .unit_binding(name)
            .or_else(|| interpreter.global(name))
            .cloned()
            .or(callable)
            .ok_or_else(|| InvocationError::BindingNotFound {
                name: name.to_string(),
            })?;
        tracing::trace!(target_name = name, "compiled composed source");

        Ok(Prepared {
            interpreter,
            routine,
            is_async,
        })
    }

    /// Run a synchronous target to completion.
    ///
    /// Async targets are rejected with [`InvocationError::AsyncTarget`];
    /// use [`Registry::invoke_async`] for those.
    pub fn invoke(&self, name: &str, args: Vec<Value>) -> Result<Value, InvocationError> {
        let prepared = self.prepare(name)?;
        if prepared.is_async {
            return Err(InvocationError::AsyncTarget {
                name: name.to_string(),
            });
        }
        Ok(prepared.interpreter.call_sync(prepared.routine, args)?)
    }

    /// Run any target, awaiting it if it is async.
    pub async fn invoke_async(
        &self,
        name: &str,
        args: Vec<Value>,
    ) -> Result<Value, InvocationError> {
        let prepared = self.prepare(name)?;
        Ok(prepared
            .interpreter
            .call(prepared.routine, args)
            .await?)
    }
}
