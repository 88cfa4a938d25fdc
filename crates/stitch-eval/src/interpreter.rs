//! The Stitch interpreter.
//!
//! An [`Interpreter`] owns one compiled unit: the routines defined by a
//! piece of script text, bound in a scope of their own and seeded with an
//! [`Environment`] that resolves everything the unit does not define.
//! A fresh interpreter is built per compilation, so no state leaks between
//! two compilations of the same text.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll, Waker};

use stitch_parser::Module;

use crate::environment::Environment;
use crate::error::Error;
use crate::eval::{Flow, Frame};
use crate::value::{BoxFuture, Function, Value};
use crate::Result;

/// Parse `source` and drop framework decorators, producing a module that
/// can be loaded into an interpreter.
pub fn compile(source: &str) -> Result<Module> {
    let mut module = stitch_parser::parse(source)?;
    module.strip_framework_decorators();
    Ok(module)
}

/// Drive a future that is expected to finish without suspending.
///
/// Synchronous routines cannot contain `await`, so their evaluation never
/// returns `Pending`; if it does, the routine tried to suspend in a context
/// that cannot wait for it.
pub fn run_sync<T>(future: impl Future<Output = Result<T>>) -> Result<T> {
    let mut future = std::pin::pin!(future);
    let mut cx = Context::from_waker(Waker::noop());
    match future.as_mut().poll(&mut cx) {
        Poll::Ready(result) => result,
        Poll::Pending => Err(Error::runtime(
            "routine suspended during a synchronous call",
        )),
    }
}

/// Nesting of script routine calls past which a call fails instead of
/// exhausting the native stack.
pub const MAX_CALL_DEPTH: usize = 64;

pub struct Interpreter {
    globals: Arc<Environment>,
    unit: HashMap<String, Value>,
    depth: AtomicUsize,
}

/// Holds one level of call depth until dropped.
struct DepthGuard<'a>(&'a AtomicUsize);

impl<'a> DepthGuard<'a> {
    fn enter(depth: &'a AtomicUsize) -> Result<Self> {
        if depth.fetch_add(1, Ordering::Relaxed) >= MAX_CALL_DEPTH {
            depth.fetch_sub(1, Ordering::Relaxed);
            return Err(Error::runtime("maximum recursion depth exceeded"));
        }
        Ok(Self(depth))
    }
}

impl Drop for DepthGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}

impl Interpreter {
    /// Create an interpreter with an empty unit scope.
    pub fn new(globals: Arc<Environment>) -> Self {
        Self {
            globals,
            unit: HashMap::new(),
            depth: AtomicUsize::new(0),
        }
    }

    /// Compile `source` into the unit scope, returning the names it defined.
    pub fn compile(&mut self, source: &str) -> Result<Vec<String>> {
        let module = compile(source)?;
        Ok(self.load(module))
    }

    /// Bind every routine of `module` in the unit scope.
    pub fn load(&mut self, module: Module) -> Vec<String> {
        let mut names = Vec::with_capacity(module.routines.len());
        for decl in module.routines {
            names.push(decl.name.clone());
            let func = Function::new(decl);
            self.unit
                .insert(func.name().to_string(), Value::Function(Arc::new(func)));
        }
        tracing::debug!(routines = names.len(), "compiled unit");
        names
    }

    /// A binding defined by the compiled unit itself.
    pub fn unit_binding(&self, name: &str) -> Option<&Value> {
        self.unit.get(name)
    }

    /// A binding of the seeding environment.
    pub fn global(&self, name: &str) -> Option<&Value> {
        self.globals.get(name)
    }

    pub fn globals(&self) -> &Arc<Environment> {
        &self.globals
    }

    /// Call a routine value with already evaluated arguments.
    ///
    /// Unlike a call written in script, this does not check the calling
    /// convention; the caller decides whether to await or drive it with
    /// [`run_sync`].
    pub fn call(&self, callee: Value, args: Vec<Value>) -> BoxFuture<'_, Result<Value>> {
        Box::pin(async move {
            match callee {
                Value::Function(func) => {
                    let params = &func.decl.params;
                    if params.len() != args.len() {
                        return Err(Error::runtime(format!(
                            "{}() takes {} argument(s), got {}",
                            func.name(),
                            params.len(),
                            args.len()
                        )));
                    }
                    let _depth = DepthGuard::enter(&self.depth)?;
                    let mut frame = Frame::new(func.captured.clone());
                    for (param, arg) in params.iter().zip(args) {
                        frame.bind(param, arg);
                    }
                    match self.eval_block(&mut frame, &func.decl.body).await? {
                        Flow::Return(value) => Ok(value),
                        _ => Ok(Value::Null),
                    }
                }
                Value::Native(native) => native.call(args).await,
                other => Err(Error::runtime(format!(
                    "{} is not callable",
                    other.type_name()
                ))),
            }
        })
    }

    /// Call a routine to completion on the current thread.
    pub fn call_sync(&self, callee: Value, args: Vec<Value>) -> Result<Value> {
        run_sync(self.call(callee, args))
    }
}
