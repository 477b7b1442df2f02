//! Structural JSON diff with exclusion paths
//!
//! Exclusion paths are anchored at the document root and written as dotted or
//! bracketed locators: `updatedAt`, `order.items[0].sku`, `items[*].id`,
//! `["odd.key"]`. A `*` segment matches any key or index. A key segment that
//! meets an array passes through it, so `updatedAt` against a table dump
//! excludes that column on every row, while `[2].updatedAt` excludes it on
//! the third row only. Excluding a location excludes everything below it.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// One step into a concrete document
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Segment {
    Key(String),
    Index(usize),
}

/// Concrete location inside a document
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct JsonPath(Vec<Segment>);

impl JsonPath {
    pub fn root() -> Self {
        Self(Vec::new())
    }

    pub fn key(&self, key: &str) -> Self {
        let mut segments = self.0.clone();
        segments.push(Segment::Key(key.to_string()));
        Self(segments)
    }

    pub fn index(&self, index: usize) -> Self {
        let mut segments = self.0.clone();
        segments.push(Segment::Index(index));
        Self(segments)
    }

    pub fn segments(&self) -> &[Segment] {
        &self.0
    }
}

impl fmt::Display for JsonPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("$");
        }
        for (i, segment) in self.0.iter().enumerate() {
            match segment {
                Segment::Index(index) => write!(f, "[{}]", index)?,
                Segment::Key(key) if needs_brackets(key) => {
                    write!(f, "[{}]", serde_json::Value::String(key.clone()))?
                }
                Segment::Key(key) if i == 0 => f.write_str(key)?,
                Segment::Key(key) => write!(f, ".{}", key)?,
            }
        }
        Ok(())
    }
}

fn needs_brackets(key: &str) -> bool {
    key.is_empty() || key == "*" || key.contains(|c: char| matches!(c, '.' | '[' | ']' | '"'))
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Pattern {
    Key(String),
    Index(usize),
    Any,
}

/// Exclusion path parse failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExcludePathError {
    pub path: String,
    pub reason: String,
}

impl fmt::Display for ExcludePathError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid exclude path {:?}: {}", self.path, self.reason)
    }
}

impl std::error::Error for ExcludePathError {}

/// A field locator ignored during comparison
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ExcludePath {
    raw: String,
    pattern: Vec<Pattern>,
}

impl ExcludePath {
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// True if `path` is the excluded location or lies below it
    pub fn matches(&self, path: &JsonPath) -> bool {
        matches_from(&self.pattern, path.segments())
    }
}

fn matches_from(pattern: &[Pattern], path: &[Segment]) -> bool {
    let Some((head, pattern_rest)) = pattern.split_first() else {
        return true;
    };
    let Some((segment, path_rest)) = path.split_first() else {
        return false;
    };

    match (head, segment) {
        (Pattern::Any, _) => matches_from(pattern_rest, path_rest),
        (Pattern::Index(want), Segment::Index(got)) => {
            want == got && matches_from(pattern_rest, path_rest)
        }
        (Pattern::Index(_), Segment::Key(_)) => false,
        (Pattern::Key(want), Segment::Key(got)) => want == got && matches_from(pattern_rest, path_rest),
        // Implicit traversal of array elements
        (Pattern::Key(_), Segment::Index(_)) => matches_from(pattern, path_rest),
    }
}

impl FromStr for ExcludePath {
    type Err = ExcludePathError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let fail = |reason: &str| ExcludePathError {
            path: raw.to_string(),
            reason: reason.to_string(),
        };

        let mut rest = raw.trim();
        if let Some(stripped) = rest.strip_prefix('$') {
            rest = stripped.strip_prefix('.').unwrap_or(stripped);
        }

        let mut pattern = Vec::new();
        let mut first = true;
        while !rest.is_empty() {
            if let Some(after) = rest.strip_prefix('[') {
                let end = after.find(']').ok_or_else(|| fail("unclosed '['"))?;
                pattern.push(parse_bracket(after[..end].trim()).ok_or_else(|| {
                    fail("brackets must hold an index, '*' or a quoted key")
                })?);
                rest = &after[end + 1..];
            } else {
                if !first {
                    rest = rest.strip_prefix('.').ok_or_else(|| fail("expected '.' or '['"))?;
                }
                let end = rest.find(|c: char| c == '.' || c == '[').unwrap_or(rest.len());
                let key = &rest[..end];
                if key.is_empty() {
                    return Err(fail("empty key"));
                }
                pattern.push(if key == "*" {
                    Pattern::Any
                } else {
                    Pattern::Key(key.to_string())
                });
                rest = &rest[end..];
            }
            first = false;
        }

        Ok(Self {
            raw: raw.to_string(),
            pattern,
        })
    }
}

fn parse_bracket(inner: &str) -> Option<Pattern> {
    if inner == "*" {
        return Some(Pattern::Any);
    }
    if let Ok(index) = inner.parse::<usize>() {
        return Some(Pattern::Index(index));
    }
    for quote in ['"', '\''] {
        if inner.len() >= 2 && inner.starts_with(quote) && inner.ends_with(quote) {
            return Some(Pattern::Key(inner[1..inner.len() - 1].to_string()));
        }
    }
    None
}

impl TryFrom<String> for ExcludePath {
    type Error = ExcludePathError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ExcludePath> for String {
    fn from(path: ExcludePath) -> Self {
        path.raw
    }
}

impl fmt::Display for ExcludePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MismatchKind {
    TypeMismatch,
    ValueMismatch,
    MissingKey,
    ExtraKey,
    MissingElement,
    ExtraElement,
}

impl fmt::Display for MismatchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MismatchKind::TypeMismatch => "type mismatch",
            MismatchKind::ValueMismatch => "value mismatch",
            MismatchKind::MissingKey => "missing key",
            MismatchKind::ExtraKey => "unexpected key",
            MismatchKind::MissingElement => "missing element",
            MismatchKind::ExtraElement => "unexpected element",
        })
    }
}

/// One difference between the golden document and the actual value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mismatch {
    pub path: String,
    pub kind: MismatchKind,
    pub expected: Option<Value>,
    pub actual: Option<Value>,
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} (expected: {}, actual: {})",
            self.path,
            self.kind,
            render(&self.expected),
            render(&self.actual)
        )
    }
}

fn render(value: &Option<Value>) -> String {
    match value {
        Some(value) => value.to_string(),
        None => "<absent>".to_string(),
    }
}

/// Every difference between `expected` and `actual` outside `excludes`
pub fn diff(expected: &Value, actual: &Value, excludes: &[ExcludePath]) -> Vec<Mismatch> {
    let mut out = Vec::new();
    Walker { excludes }.walk(&JsonPath::root(), Some(expected), Some(actual), &mut out);
    out
}

struct Walker<'a> {
    excludes: &'a [ExcludePath],
}

impl Walker<'_> {
    fn excluded(&self, path: &JsonPath) -> bool {
        self.excludes.iter().any(|e| e.matches(path))
    }

    fn walk(
        &self,
        path: &JsonPath,
        expected: Option<&Value>,
        actual: Option<&Value>,
        out: &mut Vec<Mismatch>,
    ) {
        if self.excluded(path) {
            return;
        }

        let (expected, actual) = match (expected, actual) {
            (Some(e), Some(a)) => (e, a),
            (Some(e), None) => {
                let kind = match path.segments().last() {
                    Some(Segment::Index(_)) => MismatchKind::MissingElement,
                    _ => MismatchKind::MissingKey,
                };
                out.push(mismatch(path, kind, Some(e), None));
                return;
            }
            (None, Some(a)) => {
                let kind = match path.segments().last() {
                    Some(Segment::Index(_)) => MismatchKind::ExtraElement,
                    _ => MismatchKind::ExtraKey,
                };
                out.push(mismatch(path, kind, None, Some(a)));
                return;
            }
            (None, None) => return,
        };

        match (expected, actual) {
            (Value::Object(e), Value::Object(a)) => {
                for (key, value) in e {
                    self.walk(&path.key(key), Some(value), a.get(key), out);
                }
                for (key, value) in a {
                    if !e.contains_key(key) {
                        self.walk(&path.key(key), None, Some(value), out);
                    }
                }
            }
            (Value::Array(e), Value::Array(a)) => {
                for i in 0..e.len().max(a.len()) {
                    self.walk(&path.index(i), e.get(i), a.get(i), out);
                }
            }
            (Value::Number(_), Value::Number(_)) => {
                if !numbers_equal(expected, actual) {
                    out.push(mismatch(path, MismatchKind::ValueMismatch, Some(expected), Some(actual)));
                }
            }
            _ if same_type(expected, actual) => {
                if expected != actual {
                    out.push(mismatch(path, MismatchKind::ValueMismatch, Some(expected), Some(actual)));
                }
            }
            _ => out.push(mismatch(path, MismatchKind::TypeMismatch, Some(expected), Some(actual))),
        }
    }
}

fn mismatch(path: &JsonPath, kind: MismatchKind, expected: Option<&Value>, actual: Option<&Value>) -> Mismatch {
    Mismatch {
        path: path.to_string(),
        kind,
        expected: expected.cloned(),
        actual: actual.cloned(),
    }
}

fn same_type(a: &Value, b: &Value) -> bool {
    std::mem::discriminant(a) == std::mem::discriminant(b)
}

/// `1` and `1.0` are the same number; two integers compare exactly
fn numbers_equal(a: &Value, b: &Value) -> bool {
    if a == b {
        return true;
    }
    let is_float = |v: &Value| v.as_i64().is_none() && v.as_u64().is_none();
    if !is_float(a) && !is_float(b) {
        return false;
    }
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => false,
    }
}
