//! The registration and patching surface.
//!
//! [`Hooks`] ties source capture to the registry: it captures a routine's
//! declaration from a [`SourceUnit`], registers it as a target or splices
//! it into one, and can process the `@target` and `@patch(...)` decorators
//! of a whole unit in one go.

use std::sync::Arc;

use serde::Serialize;
use stitch_eval::{Environment, Function, Value};
use stitch_parser::{Decorator, Expr, UnaryOp};

use crate::capture::{capture, SourceUnit};
use crate::error::{HookError, InsertionError, InvocationError, Result};
use crate::insert::{anchor_from_value, Splice};
use crate::registry::Registry;

/// What [`Hooks::load`] did with a unit.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LoadReport {
    /// Targets registered, in declaration order.
    pub targets: Vec<String>,
    /// Patches applied, in declaration order.
    pub patches: Vec<AppliedPatch>,
    /// Targets whose source could not be captured.
    pub unavailable: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppliedPatch {
    pub patch: String,
    pub target: String,
    pub anchor: i64,
    pub lines: usize,
}

#[derive(Debug, Default)]
pub struct Hooks {
    registry: Registry,
}

impl Hooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Register routine `name` of `unit` as a patch target.
    ///
    /// `context` supplies every name the routine uses but does not define;
    /// it is captured now and reused for every later invocation. If the
    /// unit has no declaration for `name`, a warning is logged and nothing
    /// is registered.
    pub fn register_target(
        &self,
        unit: &SourceUnit,
        name: &str,
        context: Arc<Environment>,
    ) -> Result<()> {
        let source = capture(unit, name).inspect_err(|_| {
            tracing::warn!(
                target_name = name,
                unit = unit.name(),
                "routine source is unavailable, it cannot be patched"
            );
        })?;
        let module = stitch_parser::parse(&source).map_err(|source| HookError::Parse {
            unit: unit.name().to_string(),
            source,
        })?;
        let callable = module
            .routine(name)
            .map(|decl| Value::Function(Arc::new(Function::new(decl.clone()))));

        self.registry.register(name, source, callable, context);
        Ok(())
    }

    /// Splice routine `patch` of `unit` into `target` after logical line
    /// `anchor`. The patch routine itself is never bound anywhere.
    pub fn apply_patch(
        &self,
        unit: &SourceUnit,
        patch: &str,
        target: &str,
        anchor: i64,
    ) -> Result<Splice> {
        let source = capture(unit, patch)?;
        Ok(self.registry.insert(target, anchor, &source)?)
    }

    /// Process every framework decorator in `unit`.
    ///
    /// All `@target` routines are registered first, then `@patch(target,
    /// anchor)` routines are applied in declaration order, so a unit may
    /// patch targets it declares further down. Targets resolve names
    /// against `context` plus the unit's own undecorated routines.
    ///
    /// Malformed `@patch` arguments are reported before anything is
    /// registered. A patch that fails later, for instance on an anchor out
    /// of range, leaves the unit's targets and its earlier patches in place.
    pub fn load(&self, unit: &SourceUnit, context: &Environment) -> Result<LoadReport> {
        let module = stitch_parser::parse(unit.text()).map_err(|source| HookError::Parse {
            unit: unit.name().to_string(),
            source,
        })?;

        let patches = module
            .routines
            .iter()
            .filter_map(|decl| decl.decorator("patch").map(|d| (decl, d)))
            .map(|(decl, decorator)| {
                let (target, anchor) = patch_arguments(decorator)?;
                Ok((decl.name.clone(), target, anchor))
            })
            .collect::<Result<Vec<_>>>()?;

        let mut env = context.clone();
        for decl in &module.routines {
            if !decl.decorators.iter().any(|d| d.framework) {
                env.define(
                    decl.name.clone(),
                    Value::Function(Arc::new(Function::new(decl.clone()))),
                );
            }
        }
        let env = Arc::new(env);

        let mut report = LoadReport::default();
        for decl in &module.routines {
            if decl.decorator("target").is_none() {
                continue;
            }
            match self.register_target(unit, &decl.name, env.clone()) {
                Ok(()) => report.targets.push(decl.name.clone()),
                Err(HookError::Capture(_)) => report.unavailable.push(decl.name.clone()),
                Err(err) => return Err(err),
            }
        }

        for (patch, target, anchor) in patches {
            let splice = self.apply_patch(unit, &patch, &target, anchor)?;
            report.patches.push(AppliedPatch {
                patch,
                target,
                anchor,
                lines: splice.lines,
            });
        }

        tracing::info!(
            unit = unit.name(),
            targets = report.targets.len(),
            patches = report.patches.len(),
            "loaded unit"
        );
        Ok(report)
    }

    pub fn composed_source(&self, target: &str) -> Option<String> {
        self.registry.composed_source(target)
    }

    pub fn line_count(&self, target: &str) -> Option<usize> {
        self.registry.line_count(target)
    }

    pub fn invoke(&self, target: &str, args: Vec<Value>) -> Result<Value, InvocationError> {
        self.registry.invoke(target, args)
    }

    pub async fn invoke_async(
        &self,
        target: &str,
        args: Vec<Value>,
    ) -> Result<Value, InvocationError> {
        self.registry.invoke_async(target, args).await
    }
}

/// `@patch("target", anchor)`
fn patch_arguments(decorator: &Decorator) -> Result<(String, i64)> {
    let [Expr::String(target), anchor] = decorator.args.as_slice() else {
        return Err(HookError::InvalidDecorator {
            line: decorator.line,
            message: "@patch takes a target name and an anchor line".to_string(),
        });
    };
    let anchor = match literal(anchor) {
        Some(value) => anchor_from_value(&value)?,
        None => {
            return Err(InsertionError::InvalidAnchorType {
                found: "expression".to_string(),
            }
            .into());
        }
    };
    Ok((target.clone(), anchor))
}

fn literal(expr: &Expr) -> Option<Value> {
    match expr {
        Expr::Number(n) => Some(Value::Number(*n)),
        Expr::String(s) => Some(Value::String(s.clone())),
        Expr::Boolean(b) => Some(Value::Boolean(*b)),
        Expr::Null => Some(Value::Null),
        Expr::Unary {
            op: UnaryOp::Neg,
            operand,
        } => match **operand {
            Expr::Number(n) => Some(Value::Number(-n)),
            _ => None,
        },
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const UNIT: &str = r#"
def bonus():
    return 7

@target
def add(a, b):
    c = a + b
    return c

@patch("add", 0)
def add_bonus():
    c = c + bonus()
"#;

    fn unit(text: &str) -> SourceUnit {
        SourceUnit::new("mods/test.st", text)
    }

    #[test]
    fn test_load_registers_and_patches() {
        let hooks = Hooks::new();
        let report = hooks.load(&unit(UNIT), &Environment::with_builtins()).unwrap();
        assert_eq!(report.targets, vec!["add"]);
        assert_eq!(
            report.patches,
            vec![AppliedPatch {
                patch: "add_bonus".to_string(),
                target: "add".to_string(),
                anchor: 0,
                lines: 1,
            }]
        );
        let result = hooks
            .invoke("add", vec![Value::from(1i64), Value::from(2i64)])
            .unwrap();
        assert_eq!(result, Value::from(10i64));
    }

    #[test]
    fn test_patch_routine_is_not_bound() {
        let hooks = Hooks::new();
        hooks.load(&unit(UNIT), &Environment::empty()).unwrap();
        assert!(!hooks.registry().contains("add_bonus"));
        let source = hooks.composed_source("add").unwrap();
        assert!(!source.contains("def add_bonus"));
        assert!(!source.contains("@patch"));
    }

    #[test]
    fn test_register_target_without_source() {
        let hooks = Hooks::new();
        let err = hooks
            .register_target(&unit(UNIT), "print", Arc::new(Environment::with_builtins()))
            .unwrap_err();
        assert!(matches!(err, HookError::Capture(_)));
        assert!(hooks.registry().names().is_empty());
    }

    #[test]
    fn test_apply_patch_to_unknown_target() {
        let hooks = Hooks::new();
        let err = hooks
            .apply_patch(&unit(UNIT), "add_bonus", "sub", 0)
            .unwrap_err();
        assert!(matches!(
            err,
            HookError::Insertion(InsertionError::TargetNotFound { ref name }) if name == "sub"
        ));
    }

    #[test]
    fn test_non_integer_anchor() {
        let text = "@target\ndef f():\n    return 1\n\n@patch(\"f\", \"0\")\ndef p():\n    pass\n";
        let hooks = Hooks::new();
        let err = hooks.load(&unit(text), &Environment::empty()).unwrap_err();
        assert!(matches!(
            err,
            HookError::Insertion(InsertionError::InvalidAnchorType { .. })
        ));
        assert!(hooks.composed_source("f").is_none());
    }

    #[test]
    fn test_huge_anchor_literal() {
        let text = "@target\ndef f():\n    return 1\n\n@patch(\"f\", 99999999999999999999)\ndef p():\n    pass\n";
        let hooks = Hooks::new();
        let err = hooks.load(&unit(text), &Environment::empty()).unwrap_err();
        assert!(matches!(
            err,
            HookError::Insertion(InsertionError::InvalidAnchorType { .. })
        ));
        assert!(hooks.registry().names().is_empty());
    }

    #[test]
    fn test_bad_second_patch_registers_nothing() {
        let text = "@target\ndef f():\n    return x\n\n@patch(\"f\", -1)\ndef p():\n    x = 3\n\n@patch(\"f\")\ndef q():\n    pass\n";
        let hooks = Hooks::new();
        assert!(hooks.load(&unit(text), &Environment::empty()).is_err());
        assert!(!hooks.registry().contains("f"));
    }

    #[test]
    fn test_out_of_range_patch_keeps_earlier_work() {
        let text = "@target\ndef f():\n    return x\n\n@patch(\"f\", -1)\ndef p():\n    x = 3\n\n@patch(\"f\", 5)\ndef q():\n    pass\n";
        let hooks = Hooks::new();
        let err = hooks.load(&unit(text), &Environment::empty()).unwrap_err();
        assert!(matches!(
            err,
            HookError::Insertion(InsertionError::AnchorOutOfRange { anchor: 5, line_count: 2 })
        ));
        assert_eq!(hooks.invoke("f", vec![]).unwrap(), Value::from(3i64));
    }

    #[test]
    fn test_negative_anchor_literal() {
        let text = "@target\ndef f():\n    return x\n\n@patch(\"f\", -1)\ndef p():\n    x = 3\n";
        let hooks = Hooks::new();
        hooks.load(&unit(text), &Environment::empty()).unwrap();
        assert_eq!(hooks.invoke("f", vec![]).unwrap(), Value::from(3i64));
    }

    #[test]
    fn test_malformed_patch_decorator() {
        let text = "@target\ndef f():\n    return 1\n\n@patch(\"f\")\ndef p():\n    pass\n";
        let err = Hooks::new().load(&unit(text), &Environment::empty()).unwrap_err();
        assert!(matches!(err, HookError::InvalidDecorator { line: 5, .. }));
    }

    #[test]
    fn test_load_report_serializes() {
        let hooks = Hooks::new();
        let report = hooks.load(&unit(UNIT), &Environment::empty()).unwrap();
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["patches"][0]["target"], "add");
        assert_eq!(json["unavailable"], serde_json::json!([]));
    }
}
