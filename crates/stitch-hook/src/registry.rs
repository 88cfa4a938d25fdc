//! The target registry.
//!
//! Every registered target owns its composed source and an offset table
//! recording how many lines were spliced in after each logical anchor.
//! Entries sit behind their own lock, so patching one target never
//! contends with invoking another.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use stitch_eval::{Environment, Value};

use crate::capture::{count_lines, header_len};

/// Registry state for one patchable routine.
#[derive(Debug)]
pub struct TargetEntry {
    pub(crate) name: String,
    /// Original text with every accepted insertion spliced in.
    pub(crate) source: String,
    /// Decorator and signature lines preceding the body.
    pub(crate) header_len: usize,
    /// Line count of the text as first registered.
    pub(crate) base_line_count: usize,
    /// Logical anchor -> total lines inserted after it.
    pub(crate) offsets: BTreeMap<i64, usize>,
    /// The routine as declared, used when compilation does not bind the name.
    pub(crate) callable: Option<Value>,
    pub(crate) is_async: bool,
    /// Names the composed source resolves against when compiled.
    pub(crate) context: Arc<Environment>,
}

impl TargetEntry {
    fn new(
        name: &str,
        source: String,
        callable: Option<Value>,
        is_async: bool,
        context: Arc<Environment>,
    ) -> Self {
        Self {
            name: name.to_string(),
            header_len: header_len(&source),
            base_line_count: count_lines(&source),
            source,
            offsets: BTreeMap::new(),
            callable,
            is_async,
            context,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn offsets(&self) -> &BTreeMap<i64, usize> {
        &self.offsets
    }

    pub fn is_async(&self) -> bool {
        self.is_async
    }

    pub fn line_count(&self) -> usize {
        count_lines(&self.source)
    }

    /// Lines inserted so far, over every anchor.
    pub fn inserted_lines(&self) -> usize {
        self.offsets.values().sum()
    }

    /// Body lines of the original declaration plus every inserted line.
    /// Anchors are valid from -1 up to one less than this.
    pub fn logical_line_count(&self) -> usize {
        self.base_line_count.saturating_sub(self.header_len) + self.inserted_lines()
    }

    pub fn snapshot(&self) -> TargetSnapshot {
        TargetSnapshot {
            name: self.name.clone(),
            is_async: self.is_async,
            header_lines: self.header_len,
            base_line_count: self.base_line_count,
            line_count: self.line_count(),
            logical_line_count: self.logical_line_count(),
            offsets: self.offsets.clone(),
            source: self.source.clone(),
        }
    }
}

/// A point-in-time copy of a target's bookkeeping, for diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TargetSnapshot {
    pub name: String,
    pub is_async: bool,
    pub header_lines: usize,
    pub base_line_count: usize,
    pub line_count: usize,
    pub logical_line_count: usize,
    pub offsets: BTreeMap<i64, usize>,
    pub source: String,
}

pub(crate) type EntryRef = Arc<RwLock<TargetEntry>>;

#[derive(Debug, Default)]
pub struct Registry {
    targets: RwLock<HashMap<String, EntryRef>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `name` with its captured declaration text.
    ///
    /// Registering a name again replaces the previous entry, discarding
    /// every insertion applied to it.
    pub fn register(
        &self,
        name: &str,
        source: String,
        callable: Option<Value>,
        context: Arc<Environment>,
    ) {
        let is_async = match &callable {
            Some(Value::Function(func)) => func.is_async(),
            Some(Value::Native(native)) => native.is_async(),
            _ => false,
        };
        self.register_entry(TargetEntry::new(name, source, callable, is_async, context));
    }

    pub(crate) fn register_entry(&self, entry: TargetEntry) {
        let name = entry.name.clone();
        let previous = self
            .targets
            .write()
            .insert(name.clone(), Arc::new(RwLock::new(entry)));
        if previous.is_some() {
            tracing::debug!(target_name = %name, "replaced registered target");
        } else {
            tracing::debug!(target_name = %name, "registered target");
        }
    }

    pub(crate) fn entry(&self, name: &str) -> Option<EntryRef> {
        self.targets.read().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.targets.read().contains_key(name)
    }

    /// Run `f` against the entry for `name` under its read lock.
    pub fn lookup<R>(&self, name: &str, f: impl FnOnce(&TargetEntry) -> R) -> Option<R> {
        let entry = self.entry(name)?;
        let guard = entry.read();
        Some(f(&guard))
    }

    pub fn snapshot(&self, name: &str) -> Option<TargetSnapshot> {
        self.lookup(name, TargetEntry::snapshot)
    }

    pub fn composed_source(&self, name: &str) -> Option<String> {
        self.lookup(name, |entry| entry.source.clone())
    }

    pub fn line_count(&self, name: &str) -> Option<usize> {
        self.lookup(name, TargetEntry::line_count)
    }

    /// Registered target names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.targets.read().keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ADD: &str = "@target\ndef add(a, b):\n    c = a + b\n    return c";

    fn registry() -> Registry {
        let registry = Registry::new();
        registry.register("add", ADD.to_string(), None, Arc::new(Environment::empty()));
        registry
    }

    #[test]
    fn test_register_records_counts() {
        let registry = registry();
        let snapshot = registry.snapshot("add").unwrap();
        assert_eq!(snapshot.header_lines, 2);
        assert_eq!(snapshot.base_line_count, 4);
        assert_eq!(snapshot.logical_line_count, 2);
        assert!(snapshot.offsets.is_empty());
        assert_eq!(registry.composed_source("add").as_deref(), Some(ADD));
    }

    #[test]
    fn test_lookup_missing() {
        let registry = registry();
        assert!(registry.snapshot("sub").is_none());
        assert!(registry.line_count("sub").is_none());
        assert!(!registry.contains("sub"));
    }

    #[test]
    fn test_reregistration_replaces_entry() {
        let registry = registry();
        let entry = registry.entry("add").unwrap();
        entry.write().offsets.insert(0, 3);
        registry.register("add", ADD.to_string(), None, Arc::new(Environment::empty()));
        assert!(registry.snapshot("add").unwrap().offsets.is_empty());
        assert_eq!(registry.names(), vec!["add".to_string()]);
    }

    #[test]
    fn test_async_flag_follows_callable() {
        let registry = Registry::new();
        let module = stitch_eval::compile("async def go():\n    return 1\n").unwrap();
        let callable = Value::Function(Arc::new(stitch_eval::Function::new(
            module.routines[0].clone(),
        )));
        registry.register(
            "go",
            "async def go():\n    return 1".to_string(),
            Some(callable),
            Arc::new(Environment::empty()),
        );
        assert!(registry.lookup("go", TargetEntry::is_async).unwrap());
    }

    #[test]
    fn test_snapshot_serializes() {
        let registry = registry();
        registry.entry("add").unwrap().write().offsets.insert(-1, 2);
        let json = serde_json::to_value(registry.snapshot("add").unwrap()).unwrap();
        assert_eq!(json["name"], "add");
        assert_eq!(json["offsets"]["-1"], 2);
    }
}
