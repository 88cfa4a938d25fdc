//! Name bindings that seed a compiled unit.
//!
//! An [`Environment`] plays the role of a module's globals: whatever a
//! routine references but does not define itself is resolved here.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use crate::error::Error;
use crate::value::{NativeFn, Value};
use crate::Result;

#[derive(Debug, Clone, Default)]
pub struct Environment {
    bindings: HashMap<String, Value>,
}

impl Environment {
    /// An environment with no bindings at all.
    pub fn empty() -> Self {
        Self::default()
    }

    /// An environment holding the builtin natives.
    pub fn with_builtins() -> Self {
        let mut env = Self::empty();
        install_builtins(&mut env);
        env
    }

    pub fn define(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.bindings.insert(name.into(), value.into());
    }

    pub fn define_native<F>(&mut self, name: &str, f: F)
    where
        F: Fn(Vec<Value>) -> Result<Value> + Send + Sync + 'static,
    {
        self.define(name, Value::Native(NativeFn::new(name, f)));
    }

    pub fn define_async_native<F, Fut>(&mut self, name: &str, f: F)
    where
        F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        self.define(name, Value::Native(NativeFn::new_async(name, f)));
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.bindings.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.bindings.contains_key(name)
    }

    /// Copy every binding of `other` into this environment, overriding
    /// bindings with the same name.
    pub fn extend(&mut self, other: &Environment) {
        self.bindings
            .extend(other.bindings.iter().map(|(k, v)| (k.clone(), v.clone())));
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.bindings.keys().map(String::as_str)
    }
}

fn expect_arity(name: &str, args: &[Value], arity: usize) -> Result<()> {
    if args.len() == arity {
        Ok(())
    } else {
        Err(Error::runtime(format!(
            "{}() takes {} argument(s), got {}",
            name,
            arity,
            args.len()
        )))
    }
}

fn expect_number(name: &str, value: &Value) -> Result<f64> {
    match value {
        Value::Number(n) => Ok(*n),
        other => Err(Error::runtime(format!(
            "{}() expects a number, got {}",
            name,
            other.type_name()
        ))),
    }
}

fn install_builtins(env: &mut Environment) {
    env.define_native("print", |args| {
        let line: Vec<String> = args.iter().map(Value::to_string_value).collect();
        println!("{}", line.join(" "));
        Ok(Value::Null)
    });

    env.define_native("len", |args| {
        expect_arity("len", &args, 1)?;
        let len = match &args[0] {
            Value::String(s) => s.chars().count(),
            Value::Array(items) => items.len(),
            Value::Object(map) => map.len(),
            other => {
                return Err(Error::runtime(format!(
                    "len() is not defined for {}",
                    other.type_name()
                )));
            }
        };
        Ok(Value::Number(len as f64))
    });

    env.define_native("str", |args| {
        expect_arity("str", &args, 1)?;
        Ok(Value::String(args[0].to_string_value()))
    });

    env.define_native("num", |args| {
        expect_arity("num", &args, 1)?;
        match &args[0] {
            Value::Number(n) => Ok(Value::Number(*n)),
            Value::Boolean(b) => Ok(Value::Number(if *b { 1.0 } else { 0.0 })),
            Value::String(s) => s
                .trim()
                .parse::<f64>()
                .map(Value::Number)
                .map_err(|_| Error::runtime(format!("num() cannot parse {:?}", s))),
            other => Err(Error::runtime(format!(
                "num() is not defined for {}",
                other.type_name()
            ))),
        }
    });

    env.define_native("range", |args| {
        let (start, end) = match args.as_slice() {
            [end] => (0.0, expect_number("range", end)?),
            [start, end] => (expect_number("range", start)?, expect_number("range", end)?),
            _ => return Err(Error::runtime("range() takes 1 or 2 arguments")),
        };
        let mut items = Vec::new();
        let mut i = start;
        while i < end {
            items.push(Value::Number(i));
            i += 1.0;
        }
        Ok(Value::Array(items))
    });

    env.define_native("append", |mut args| {
        expect_arity("append", &args, 2)?;
        let item = args.pop().unwrap_or_default();
        match args.pop() {
            Some(Value::Array(mut items)) => {
                items.push(item);
                Ok(Value::Array(items))
            }
            other => Err(Error::runtime(format!(
                "append() expects a list, got {}",
                other.map(|v| v.type_name()).unwrap_or("nothing")
            ))),
        }
    });

    env.define_native("keys", |args| {
        expect_arity("keys", &args, 1)?;
        match &args[0] {
            Value::Object(map) => Ok(Value::Array(
                map.keys().map(|k| Value::String(k.clone())).collect(),
            )),
            other => Err(Error::runtime(format!(
                "keys() expects a map, got {}",
                other.type_name()
            ))),
        }
    });

    env.define_native("abs", |args| {
        expect_arity("abs", &args, 1)?;
        Ok(Value::Number(expect_number("abs", &args[0])?.abs()))
    });

    env.define_native("min", |args| fold_numbers("min", &args, f64::min));
    env.define_native("max", |args| fold_numbers("max", &args, f64::max));

    // Suspension points for async routines. They need a tokio runtime.
    env.define_async_native("sleep", |args| async move {
        expect_arity("sleep", &args, 1)?;
        let ms = expect_number("sleep", &args[0])?;
        if ms > 0.0 {
            tokio::time::sleep(Duration::from_millis(ms as u64)).await;
        }
        Ok::<_, Error>(Value::Null)
    });

    env.define_async_native("yield_now", |args| async move {
        expect_arity("yield_now", &args, 0)?;
        tokio::task::yield_now().await;
        Ok::<_, Error>(Value::Null)
    });
}

fn fold_numbers(name: &str, args: &[Value], f: fn(f64, f64) -> f64) -> Result<Value> {
    let Some((first, rest)) = args.split_first() else {
        return Err(Error::runtime(format!("{}() needs at least one argument", name)));
    };
    let mut acc = expect_number(name, first)?;
    for value in rest {
        acc = f(acc, expect_number(name, value)?);
    }
    Ok(Value::Number(acc))
}
