//! Runtime values for the Stitch interpreter.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use stitch_parser::RoutineDecl;

/// Boxed future returned by async natives and by the evaluator.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

type SyncFn = dyn Fn(Vec<Value>) -> crate::Result<Value> + Send + Sync;
type AsyncFn = dyn Fn(Vec<Value>) -> BoxFuture<'static, crate::Result<Value>> + Send + Sync;

/// A runtime value in the Stitch language.
#[derive(Debug, Clone)]
pub enum Value {
    /// The null value.
    Null,
    /// A string value.
    String(String),
    /// A numeric value (always f64).
    Number(f64),
    /// A boolean value.
    Boolean(bool),
    /// A list of values.
    Array(Vec<Value>),
    /// A map with string keys, iterated in key order.
    Object(BTreeMap<String, Value>),
    /// A routine declared in script.
    Function(Arc<Function>),
    /// A routine provided by the host.
    Native(NativeFn),
}

/// A script routine together with the locals it closed over.
#[derive(Debug)]
pub struct Function {
    pub decl: Arc<RoutineDecl>,
    pub captured: Arc<HashMap<String, Value>>,
}

impl Function {
    pub fn new(decl: Arc<RoutineDecl>) -> Self {
        Self {
            decl,
            captured: Arc::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.decl.name
    }

    pub fn is_async(&self) -> bool {
        self.decl.is_async
    }
}

/// A host routine. Natives have no script source, so they can be called
/// but never registered as patch targets.
#[derive(Clone)]
pub struct NativeFn {
    name: Arc<str>,
    kind: NativeKind,
}

#[derive(Clone)]
enum NativeKind {
    Sync(Arc<SyncFn>),
    Async(Arc<AsyncFn>),
}

impl NativeFn {
    pub fn new<F>(name: &str, f: F) -> Self
    where
        F: Fn(Vec<Value>) -> crate::Result<Value> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            kind: NativeKind::Sync(Arc::new(f)),
        }
    }

    pub fn new_async<F, Fut>(name: &str, f: F) -> Self
    where
        F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = crate::Result<Value>> + Send + 'static,
    {
        Self {
            name: name.into(),
            kind: NativeKind::Async(Arc::new(
                move |args| -> BoxFuture<'static, crate::Result<Value>> { Box::pin(f(args)) },
            )),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_async(&self) -> bool {
        matches!(self.kind, NativeKind::Async(_))
    }

    /// Call the native. Sync natives complete without suspending.
    pub fn call(&self, args: Vec<Value>) -> BoxFuture<'static, crate::Result<Value>> {
        match &self.kind {
            NativeKind::Sync(f) => {
                let result = f(args);
                Box::pin(async move { result })
            }
            NativeKind::Async(f) => f(args),
        }
    }

    fn ptr_eq(&self, other: &NativeFn) -> bool {
        match (&self.kind, &other.kind) {
            (NativeKind::Sync(a), NativeKind::Sync(b)) => Arc::ptr_eq(a, b),
            (NativeKind::Async(a), NativeKind::Async(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for NativeFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeFn")
            .field("name", &self.name)
            .field("async", &self.is_async())
            .finish()
    }
}

impl Value {
    /// Coerce this value to a string.
    pub fn to_string_value(&self) -> String {
        match self {
            Value::Null => "null".to_string(),
            Value::String(s) => s.clone(),
            Value::Number(n) => {
                if n.is_nan() {
                    "NaN".to_string()
                } else if n.is_infinite() {
                    if *n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
                } else if *n == n.trunc() && n.abs() < 1e15 {
                    // Integer-like numbers without decimal point
                    format!("{}", *n as i64)
                } else {
                    format!("{}", n)
                }
            }
            Value::Boolean(b) => if *b { "true" } else { "false" }.to_string(),
            Value::Array(arr) => {
                let items: Vec<String> = arr.iter().map(|v| v.repr()).collect();
                format!("[{}]", items.join(", "))
            }
            Value::Object(map) => {
                let items: Vec<String> = map
                    .iter()
                    .map(|(k, v)| format!("{:?}: {}", k, v.repr()))
                    .collect();
                format!("{{{}}}", items.join(", "))
            }
            Value::Function(func) => format!("<routine {}>", func.name()),
            Value::Native(native) => format!("<native {}>", native.name()),
        }
    }

    /// Like `to_string_value`, but strings are quoted (used inside collections).
    fn repr(&self) -> String {
        match self {
            Value::String(s) => format!("{:?}", s),
            other => other.to_string_value(),
        }
    }

    /// Coerce this value to a boolean.
    pub fn to_bool(&self) -> bool {
        match self {
            Value::Null => false,
            Value::String(s) => !s.is_empty(),
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::Boolean(b) => *b,
            Value::Array(arr) => !arr.is_empty(),
            Value::Object(map) => !map.is_empty(),
            Value::Function(_) | Value::Native(_) => true,
        }
    }

    /// Check if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// The value as an integer, if it is a number without a fractional part.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            // i64::MAX as f64 rounds up to 2^63, which is out of range
            Value::Number(n)
                if *n == n.trunc() && *n >= i64::MIN as f64 && *n < i64::MAX as f64 =>
            {
                Some(*n as i64)
            }
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::String(_) => "string",
            Value::Number(_) => "number",
            Value::Boolean(_) => "boolean",
            Value::Array(_) => "list",
            Value::Object(_) => "map",
            Value::Function(_) | Value::Native(_) => "routine",
        }
    }

    /// Convert to JSON. Routines have no JSON form and render as strings.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Number(n) => match self.as_integer() {
                Some(i) => serde_json::Value::from(i),
                None => serde_json::Number::from_f64(*n)
                    .map(serde_json::Value::Number)
                    .unwrap_or(serde_json::Value::Null),
            },
            Value::Boolean(b) => serde_json::Value::Bool(*b),
            Value::Array(arr) => serde_json::Value::Array(arr.iter().map(Value::to_json).collect()),
            Value::Object(map) => serde_json::Value::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
            Value::Function(_) | Value::Native(_) => {
                serde_json::Value::String(self.to_string_value())
            }
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a == b,
            (Value::Function(a), Value::Function(b)) => Arc::ptr_eq(a, b),
            (Value::Native(a), Value::Native(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_string_value())
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::Null
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(items)
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Boolean(b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::Array(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => Value::Object(
                map.into_iter().map(|(k, v)| (k, Value::from(v))).collect(),
            ),
        }
    }
}
