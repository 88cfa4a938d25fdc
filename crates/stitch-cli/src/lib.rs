//! Stitch runner
//!
//! Loads a host unit and any number of mod units, applying their `@target`
//! and `@patch` decorators in file order, then optionally invokes a target.

use std::path::PathBuf;

use anyhow::Context;
use stitch_hook::{Environment, Hooks, LoadReport, SourceUnit, Value};

/// What to load and what to do afterwards.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub files: Vec<PathBuf>,
    pub call: Option<String>,
    pub args: Vec<serde_json::Value>,
    pub show: bool,
}

impl RunOptions {
    pub fn new(file: impl Into<PathBuf>) -> Self {
        Self {
            files: vec![file.into()],
            call: None,
            args: Vec::new(),
            show: false,
        }
    }

    /// Load another unit after the ones already listed.
    pub fn file(mut self, file: impl Into<PathBuf>) -> Self {
        self.files.push(file.into());
        self
    }

    pub fn call(mut self, target: impl Into<String>) -> Self {
        self.call = Some(target.into());
        self
    }

    pub fn args(mut self, args: Vec<serde_json::Value>) -> Self {
        self.args = args;
        self
    }

    pub fn show(mut self, show: bool) -> Self {
        self.show = show;
        self
    }
}

#[derive(Debug)]
pub struct RunOutput {
    /// One report per loaded unit, in load order.
    pub reports: Vec<(PathBuf, LoadReport)>,
    /// Composed source of every target, sorted by name, when requested.
    pub composed: Vec<(String, String)>,
    /// Value returned by the invoked target.
    pub result: Option<serde_json::Value>,
}

pub struct Runner {
    options: RunOptions,
    hooks: Hooks,
}

impl Runner {
    pub fn new(options: RunOptions) -> Self {
        Self {
            options,
            hooks: Hooks::new(),
        }
    }

    pub fn hooks(&self) -> &Hooks {
        &self.hooks
    }

    pub async fn run(&self) -> anyhow::Result<RunOutput> {
        let context = Environment::with_builtins();

        let mut reports = Vec::with_capacity(self.options.files.len());
        for path in &self.options.files {
            let unit = SourceUnit::from_path(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            let report = self
                .hooks
                .load(&unit, &context)
                .with_context(|| format!("failed to load {}", path.display()))?;
            for name in &report.unavailable {
                tracing::warn!(target_name = %name, unit = unit.name(), "target skipped");
            }
            reports.push((path.clone(), report));
        }

        let composed = if self.options.show {
            self.hooks
                .registry()
                .names()
                .into_iter()
                .filter_map(|name| {
                    let source = self.hooks.composed_source(&name)?;
                    Some((name, source))
                })
                .collect()
        } else {
            Vec::new()
        };

        let result = match &self.options.call {
            Some(target) => {
                let args = self.options.args.iter().cloned().map(Value::from).collect();
                tracing::debug!(target_name = %target, "invoking target");
                let value = self
                    .hooks
                    .invoke_async(target, args)
                    .await
                    .with_context(|| format!("invoking `{}` failed", target))?;
                Some(value.to_json())
            }
            None => None,
        };

        Ok(RunOutput {
            reports,
            composed,
            result,
        })
    }
}
