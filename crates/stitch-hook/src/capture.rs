//! Source capture: pulling a routine's declaration text out of a unit.

use std::fs;
use std::io;
use std::path::Path;

use stitch_lexer::{indent_width, is_trivia};

use crate::error::CaptureError;

/// A piece of script text routines can be captured from, such as a mod file.
#[derive(Debug, Clone)]
pub struct SourceUnit {
    name: String,
    text: String,
}

impl SourceUnit {
    pub fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            text: text.into(),
        }
    }

    pub fn from_path(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        Ok(Self::new(path.display().to_string(), text))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

/// Capture the declaration of `routine` from `unit`: its decorator lines,
/// its signature and its indented body, dedented to the left margin.
///
/// When the unit declares the name more than once, the least indented
/// declaration wins, so a top-level routine shadows nested ones.
pub fn capture(unit: &SourceUnit, routine: &str) -> Result<String, CaptureError> {
    let lines: Vec<&str> = unit.text.lines().collect();

    let def_idx = lines
        .iter()
        .enumerate()
        .filter(|(_, line)| declares(line, routine))
        .min_by_key(|(idx, line)| (indent_width(line), *idx))
        .map(|(idx, _)| idx)
        .ok_or_else(|| CaptureError::SourceUnavailable {
            name: routine.to_string(),
            unit: unit.name.clone(),
        })?;
    let indent = indent_width(lines[def_idx]);

    // Decorators sit directly above the signature at the same indentation
    let mut start = def_idx;
    while start > 0 {
        let prev = lines[start - 1];
        if indent_width(prev) == indent && prev.trim_start().starts_with('@') {
            start -= 1;
        } else {
            break;
        }
    }

    let mut end = def_idx + 1;
    while end < lines.len() && (is_trivia(lines[end]) || indent_width(lines[end]) > indent) {
        end += 1;
    }
    // Trailing blank lines and outdented comments belong to what follows
    while end > def_idx + 1 && is_trivia(lines[end - 1]) && indent_width(lines[end - 1]) <= indent {
        end -= 1;
    }

    Ok(dedent(&lines[start..end].join("\n")))
}

/// The text after `def` if `line` is a routine signature.
fn signature_rest(line: &str) -> Option<&str> {
    let trimmed = line.trim_start();
    let rest = match trimmed.strip_prefix("async") {
        Some(rest) => after_keyword(rest)?,
        None => trimmed,
    };
    after_keyword(rest.strip_prefix("def")?)
}

/// The text following a keyword, which must be separated from it.
fn after_keyword(rest: &str) -> Option<&str> {
    rest.starts_with([' ', '\t']).then(|| rest.trim_start())
}

/// True if `line` is the signature of a routine called `name`.
fn declares(line: &str, name: &str) -> bool {
    signature_rest(line)
        .and_then(|rest| rest.strip_prefix(name))
        .is_some_and(|after| after.trim_start().starts_with('('))
}

/// Strip the indentation shared by every line that carries code.
///
/// Blank and comment lines do not constrain the margin; they lose at most
/// the shared amount of leading whitespace. Text that already touches the
/// left margin is returned unchanged.
pub fn dedent(text: &str) -> String {
    let margin = text
        .split('\n')
        .filter(|line| !is_trivia(line))
        .map(indent_width)
        .min()
        .unwrap_or(0);
    if margin == 0 {
        return text.to_string();
    }
    text.split('\n')
        .map(|line| strip_indent(line, margin))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Remove up to `width` leading whitespace characters.
pub(crate) fn strip_indent(line: &str, width: usize) -> &str {
    let strip = indent_width(line).min(width);
    // Indentation is made of single-byte characters
    &line[strip..]
}

/// Number of text lines in `text`.
pub fn count_lines(text: &str) -> usize {
    if text.is_empty() {
        0
    } else {
        text.split('\n').count()
    }
}

/// Number of lines before the first body line: decorator lines (and any
/// comments between them) up to and including the signature line.
pub fn header_len(text: &str) -> usize {
    text.split('\n')
        .position(|line| signature_rest(line).is_some())
        .map(|idx| idx + 1)
        .unwrap_or(0)
}
