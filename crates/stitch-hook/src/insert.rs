//! The insertion engine.
//!
//! Callers address insertions by *logical* anchor: the index of a body line
//! in the numbering they believe is in effect, where `-1` means "before the
//! first body line". The offset table of a target translates that anchor
//! into a physical line index of the composed source: every block spliced
//! in after an anchor `<= k` sits in front of the insertion point for `k`.

use stitch_eval::Value;
use stitch_lexer::{indent_width, is_trivia};

use crate::capture::{header_len, strip_indent};
use crate::error::InsertionError;
use crate::registry::{Registry, TargetEntry};

/// Indentation step assumed for a block that has no lines yet.
const BLOCK_INDENT: usize = 4;

/// Where a patch ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Splice {
    /// Line index of the first inserted line in the composed source.
    pub index: usize,
    /// Number of lines inserted.
    pub lines: usize,
    /// Header lines removed from the patch before splicing.
    pub header_lines_stripped: usize,
}

/// A patch declaration reduced to the lines it contributes.
#[derive(Debug)]
struct PatchBody {
    /// Body lines with their shared indentation removed; blank lines are empty.
    lines: Vec<String>,
    header_lines_stripped: usize,
}

impl PatchBody {
    fn new(target: &str, source: &str) -> Result<Self, InsertionError> {
        let header = header_len(source);
        if header > 0 {
            stitch_parser::parse(source).map_err(|source| InsertionError::InvalidPatch {
                target: target.to_string(),
                source,
            })?;
        }

        let mut body: Vec<&str> = source.split('\n').skip(header).collect();
        while body.last().is_some_and(|line| line.trim().is_empty()) {
            body.pop();
        }
        let margin = body
            .iter()
            .filter(|line| !is_trivia(line))
            .map(|line| indent_width(line))
            .min()
            .unwrap_or(0);

        let lines = body
            .into_iter()
            .map(|line| {
                if line.trim().is_empty() {
                    String::new()
                } else {
                    strip_indent(line, margin).to_string()
                }
            })
            .collect();
        Ok(Self {
            lines,
            header_lines_stripped: header,
        })
    }
}

/// Convert an anchor supplied as a script value.
pub fn anchor_from_value(value: &Value) -> Result<i64, InsertionError> {
    value
        .as_integer()
        .ok_or_else(|| InsertionError::InvalidAnchorType {
            found: match value {
                Value::Number(n) => format!("number {}", n),
                other => other.type_name().to_string(),
            },
        })
}

impl TargetEntry {
    /// Splice `patch` in after logical line `anchor`.
    fn splice(&mut self, anchor: i64, patch: &PatchBody) -> Result<Splice, InsertionError> {
        let logical = self.logical_line_count();
        if anchor < -1 || anchor >= logical as i64 {
            return Err(InsertionError::AnchorOutOfRange {
                anchor,
                line_count: logical,
            });
        }

        let prior: usize = self.offsets.range(..=anchor).map(|(_, n)| n).sum();
        let mut lines: Vec<String> = self.source.split('\n').map(str::to_string).collect();
        // Anchors past the original body address lines appended at the end
        let index = (self.header_len + (anchor + 1) as usize + prior).min(lines.len());

        let indent = block_indent(&lines, index);
        let block = patch.lines.iter().map(|line| {
            if line.is_empty() {
                String::new()
            } else {
                format!("{}{}", " ".repeat(indent), line)
            }
        });
        lines.splice(index..index, block);

        self.source = lines.join("\n");
        *self.offsets.entry(anchor).or_insert(0) += patch.lines.len();

        Ok(Splice {
            index,
            lines: patch.lines.len(),
            header_lines_stripped: patch.header_lines_stripped,
        })
    }
}

/// Indentation of the block a line inserted at `index` belongs to.
///
/// That is the indentation of the nearest code line above, unless that line
/// opens a block, in which case the new line goes inside it.
fn block_indent(lines: &[String], index: usize) -> usize {
    let before = lines[..index].iter().rev().find(|line| !is_trivia(line));
    let after = lines[index..].iter().find(|line| !is_trivia(line));
    match before {
        Some(line) if opens_block(line) => {
            let outer = indent_width(line);
            after
                .map(|next| indent_width(next))
                .filter(|&inner| inner > outer)
                .unwrap_or(outer + BLOCK_INDENT)
        }
        Some(line) => indent_width(line),
        None => after.map(|next| indent_width(next)).unwrap_or(0),
    }
}

/// True if the code part of `line` (ignoring a trailing comment) ends in `:`.
fn opens_block(line: &str) -> bool {
    let mut quote = None;
    let mut escaped = false;
    let mut code_end = line.len();
    for (idx, c) in line.char_indices() {
        match quote {
            Some(q) => {
                if escaped {
                    escaped = false;
                } else if c == '\\' {
                    escaped = true;
                } else if c == q {
                    quote = None;
                }
            }
            None if c == '"' || c == '\'' => quote = Some(c),
            None if c == '#' => {
                code_end = idx;
                break;
            }
            None => {}
        }
    }
    line[..code_end].trim_end().ends_with(':')
}

impl Registry {
    /// Splice the body of `patch_source` into `target` after logical line
    /// `anchor`.
    ///
    /// `patch_source` is normally a captured patch declaration; its
    /// decorator and signature lines are dropped. Text without a signature
    /// is spliced as it is. A rejected insertion leaves the target untouched.
    pub fn insert(
        &self,
        target: &str,
        anchor: i64,
        patch_source: &str,
    ) -> Result<Splice, InsertionError> {
        let entry = self
            .entry(target)
            .ok_or_else(|| InsertionError::TargetNotFound {
                name: target.to_string(),
            })?;
        let patch = PatchBody::new(target, patch_source)?;

        let splice = entry.write().splice(anchor, &patch)?;
        tracing::debug!(
            target_name = target,
            anchor,
            index = splice.index,
            lines = splice.lines,
            "spliced patch"
        );
        Ok(splice)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use stitch_eval::Environment;

    use super::*;

    const BODY: &str = "def f():\n    x0 = 0\n    x1 = 1\n    x2 = 2\n    return x2";

    fn registry_with(source: &str) -> Registry {
        let registry = Registry::new();
        registry.register("f", source.to_string(), None, Arc::new(Environment::empty()));
        registry
    }

    fn body_lines(registry: &Registry) -> Vec<String> {
        registry
            .composed_source("f")
            .unwrap()
            .split('\n')
            .skip(1)
            .map(|line| line.trim().to_string())
            .collect()
    }

    fn patch(line: &str) -> String {
        format!("@patch(\"f\", 0)\ndef p():\n    {}", line)
    }

    #[test]
    fn test_anchor_before_first_line() {
        let registry = registry_with(BODY);
        registry.insert("f", 2, &patch("a = 1")).unwrap();
        let splice = registry.insert("f", -1, &patch("b = 1")).unwrap();
        assert_eq!(splice.index, 1);
        assert_eq!(splice.header_lines_stripped, 2);
        assert_eq!(body_lines(&registry)[0], "b = 1");
    }

    #[test]
    fn test_every_anchor_interleaves() {
        let registry = registry_with(BODY);
        // 4 body lines: anchors -1..=3
        for anchor in -1..4 {
            registry.insert("f", anchor, &patch(&format!("p{} = 0", anchor + 1))).unwrap();
        }
        assert_eq!(
            body_lines(&registry),
            vec![
                "p0 = 0", "x0 = 0", "p1 = 0", "x1 = 1", "p2 = 0", "x2 = 2", "p3 = 0", "return x2",
                "p4 = 0"
            ]
        );
        // N + 1 anchors on an N-line body: 2N + 1 body lines after the header
        assert_eq!(registry.line_count("f"), Some(1 + 2 * 4 + 1));
        assert_eq!(registry.snapshot("f").unwrap().logical_line_count, 9);
    }

    #[test]
    fn test_earlier_anchor_after_later_one() {
        let registry = registry_with(BODY);
        registry.insert("f", 2, &patch("late = 0")).unwrap();
        registry.insert("f", 0, &patch("early = 0")).unwrap();
        assert_eq!(
            body_lines(&registry),
            vec!["x0 = 0", "early = 0", "x1 = 1", "x2 = 2", "late = 0", "return x2"]
        );
        // A third insertion at the later anchor still lands after its line
        registry.insert("f", 2, &patch("later = 0")).unwrap();
        assert_eq!(body_lines(&registry)[4..6], ["late = 0", "later = 0"]);
    }

    #[test]
    fn test_same_anchor_accumulates_in_call_order() {
        let registry = registry_with(BODY);
        registry.insert("f", 1, &patch("first = 0")).unwrap();
        registry.insert("f", 1, &patch("second = 0")).unwrap();
        assert_eq!(body_lines(&registry)[2..4], ["first = 0", "second = 0"]);
        let snapshot = registry.snapshot("f").unwrap();
        assert_eq!(snapshot.offsets.get(&1), Some(&2));
    }

    #[test]
    fn test_anchor_out_of_range() {
        let registry = registry_with(BODY);
        for anchor in [4, -2] {
            let err = registry.insert("f", anchor, &patch("x = 0")).unwrap_err();
            assert_eq!(err, InsertionError::AnchorOutOfRange { anchor, line_count: 4 });
        }
        assert_eq!(registry.composed_source("f").as_deref(), Some(BODY));
        assert!(registry.snapshot("f").unwrap().offsets.is_empty());
    }

    #[test]
    fn test_extreme_anchors_are_rejected() {
        let registry = registry_with(BODY);
        for anchor in [i64::MAX, i64::MIN] {
            let err = registry.insert("f", anchor, &patch("x = 0")).unwrap_err();
            assert_eq!(err, InsertionError::AnchorOutOfRange { anchor, line_count: 4 });
        }
        assert_eq!(registry.composed_source("f").as_deref(), Some(BODY));
    }

    #[test]
    fn test_range_grows_with_insertions() {
        let registry = registry_with(BODY);
        registry.insert("f", 3, &patch("y = 0")).unwrap();
        registry.insert("f", 4, &patch("z = 0")).unwrap();
        assert_eq!(body_lines(&registry).last().map(String::as_str), Some("z = 0"));
    }

    #[test]
    fn test_unknown_target() {
        let registry = registry_with(BODY);
        let err = registry.insert("g", 0, &patch("x = 0")).unwrap_err();
        assert_eq!(err, InsertionError::TargetNotFound { name: "g".to_string() });
    }

    #[test]
    fn test_invalid_patch_is_rejected() {
        let registry = registry_with(BODY);
        let err = registry.insert("f", 0, "def p():\n    x = (1\n").unwrap_err();
        assert!(matches!(err, InsertionError::InvalidPatch { .. }));
        assert_eq!(registry.composed_source("f").as_deref(), Some(BODY));
    }

    #[test]
    fn test_patch_reindented_into_nested_block() {
        let source = "def f(x):\n    if x:\n        y = 1\n    return y";
        let registry = registry_with(source);
        let p = "@patch(\"f\", 1)\ndef p():\n    if y:\n        y += 1";
        registry.insert("f", 1, p).unwrap();
        assert_eq!(
            registry.composed_source("f").unwrap(),
            "def f(x):\n    if x:\n        y = 1\n        if y:\n            y += 1\n    return y"
        );
    }

    #[test]
    fn test_patch_after_block_opener_goes_inside() {
        let source = "def f(x):\n    if x: # check\n        y = 1\n    return y";
        let registry = registry_with(source);
        registry.insert("f", 0, &patch("y = 0")).unwrap();
        assert_eq!(body_lines(&registry)[1], "y = 0");
        let composed = registry.composed_source("f").unwrap();
        assert_eq!(composed.split('\n').nth(2), Some("        y = 0"));
    }

    #[test]
    fn test_bare_text_is_spliced_as_is() {
        let registry = registry_with(BODY);
        let splice = registry.insert("f", 0, "w = 0\n\nv = 0\n").unwrap();
        assert_eq!(splice.lines, 3);
        assert_eq!(splice.header_lines_stripped, 0);
        assert_eq!(body_lines(&registry)[1..4], ["w = 0", "", "v = 0"]);
    }

    #[test]
    fn test_anchor_from_value() {
        assert_eq!(anchor_from_value(&Value::from(6i64)), Ok(6));
        assert_eq!(anchor_from_value(&Value::from(-1i64)), Ok(-1));
        assert!(matches!(
            anchor_from_value(&Value::from("6")),
            Err(InsertionError::InvalidAnchorType { found }) if found == "string"
        ));
        assert!(anchor_from_value(&Value::from(2.5)).is_err());
        assert!(matches!(
            anchor_from_value(&Value::from(1e20)),
            Err(InsertionError::InvalidAnchorType { .. })
        ));
    }

    #[test]
    fn test_opens_block() {
        assert!(opens_block("def f(): # Line -1"));
        assert!(opens_block("    while x:"));
        assert!(!opens_block("    s = \"a:\""));
        assert!(!opens_block("    m = {\"a\": 1} # b:"));
    }
}
