use std::fmt::{self, Display};

use serde_json::Value;

/// A single validation finding, located by a dotted/indexed path into the
/// candidate value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Issue {
    pub path: String,
    pub message: String,
}

impl Issue {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "{}: {}", self.path, self.message)
        }
    }
}

/// Format a list of issues the way they are reported back to the agent.
pub fn format_issues(issues: &[Issue]) -> String {
    issues
        .iter()
        .map(|issue| issue.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

pub trait SchemaField: Send + Sync {
    /// Returns the name of the field.
    fn name(&self) -> &str;

    fn description(&self) -> Option<&str>;

    fn required(&self) -> bool;

    fn type_name(&self) -> &str;

    /// JSON-Schema representation of this field, used both in the prompt
    /// and in the cache key.
    fn to_json_schema(&self) -> Value;

    fn to_plain_description(&self) -> String;

    /// Check `value` against this descriptor, appending findings to
    /// `issues`. Presence of required fields is the parent's job; `check`
    /// only sees values that exist.
    fn check(&self, path: &str, value: &Value, issues: &mut Vec<Issue>);

    fn clone_box(&self) -> Box<dyn SchemaField>;
}

pub(crate) fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

pub(crate) fn child_path(path: &str, name: &str) -> String {
    if path.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", path, name)
    }
}

/// Indent every line of a nested description by `spaces`.
pub(crate) fn indent(text: &str, spaces: usize) -> String {
    let pad = " ".repeat(spaces);
    text.lines()
        .map(|line| format!("{pad}{line}"))
        .collect::<Vec<_>>()
        .join("\n")
}
