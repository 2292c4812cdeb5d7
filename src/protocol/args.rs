//! Host command arguments.
//!
//! The controller sends `args` as a single JSON value, an array of
//! positional values, or nothing at all. [`CommandArgs`] keeps those three
//! shapes apart so that the dispatcher can spread arrays and still pass an
//! explicit [`CommandArg::Undefined`] when `args` was omitted.

// ============================================================================
// Imports
// ============================================================================

use serde_json::Value;
use url::Url;

// ============================================================================
// CommandArg
// ============================================================================

/// One positional argument handed to the host's command API.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandArg {
    /// Explicit "no argument" marker.
    ///
    /// Differs from passing zero arguments: the host sees one argument slot
    /// whose value is undefined.
    Undefined,

    /// Plain JSON value.
    Value(Value),

    /// File resource rewritten from a path string.
    Uri(Url),
}

impl CommandArg {
    /// Returns the JSON rendering of the argument.
    ///
    /// `Undefined` renders as `null`, URIs as their string form.
    #[must_use]
    pub fn to_json(&self) -> Value {
        match self {
            Self::Undefined => Value::Null,
            Self::Value(value) => value.clone(),
            Self::Uri(uri) => Value::String(uri.to_string()),
        }
    }

    /// Returns the URI if this argument is one.
    #[inline]
    #[must_use]
    pub fn as_uri(&self) -> Option<&Url> {
        match self {
            Self::Uri(uri) => Some(uri),
            _ => None,
        }
    }
}

impl From<Value> for CommandArg {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

// ============================================================================
// CommandArgs
// ============================================================================

/// The `args` field of a server-role frame.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum CommandArgs {
    /// `args` was not present.
    #[default]
    Absent,

    /// `args` was a single non-array value (including `null`).
    Single(Value),

    /// `args` was an array; each element is one positional argument.
    Positional(Vec<Value>),
}

impl CommandArgs {
    /// Returns the first argument, if any.
    ///
    /// A single value counts as the first argument.
    #[must_use]
    pub fn first(&self) -> Option<&Value> {
        match self {
            Self::Absent => None,
            Self::Single(value) => Some(value),
            Self::Positional(values) => values.first(),
        }
    }

    /// Spreads the arguments into host arguments.
    ///
    /// Arrays are spread positionally, a single value becomes one argument
    /// and absent args become one [`CommandArg::Undefined`].
    #[must_use]
    pub fn into_host_args(self) -> Vec<CommandArg> {
        match self {
            Self::Absent => vec![CommandArg::Undefined],
            Self::Single(value) => vec![CommandArg::Value(value)],
            Self::Positional(values) => values.into_iter().map(CommandArg::Value).collect(),
        }
    }

    /// Renders the arguments as terminal input.
    ///
    /// Returns `None` when there is nothing worth sending.
    #[must_use]
    pub fn to_terminal_text(&self) -> Option<String> {
        match self {
            Self::Absent => None,
            Self::Single(value) if !is_truthy(value) => None,
            Self::Single(value) => Some(value_text(value)),
            Self::Positional(values) if values.is_empty() => None,
            Self::Positional(values) => Some(
                values
                    .iter()
                    .map(value_text)
                    .collect::<Vec<_>>()
                    .join(" "),
            ),
        }
    }
}

impl From<Option<Value>> for CommandArgs {
    fn from(value: Option<Value>) -> Self {
        match value {
            None => Self::Absent,
            Some(Value::Array(values)) => Self::Positional(values),
            Some(value) => Self::Single(value),
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Strings render verbatim, everything else as JSON text.
fn value_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Returns `true` unless the value is `null`, `false`, zero or `""`.
///
/// Arrays and objects are truthy even when empty.
#[must_use]
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0 && !n.is_nan()),
        Value::String(text) => !text.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Converts a filesystem path into a `file://` URI.
///
/// Backslashes become forward slashes and relative paths are rooted at
/// `/`. Returns `None` for an empty path.
#[must_use]
pub fn file_uri(path: &str) -> Option<Url> {
    if path.is_empty() {
        return None;
    }

    let normalized = path.replace('\\', "/");
    let rooted = if normalized.starts_with('/') {
        normalized
    } else {
        format!("/{normalized}")
    };

    let mut uri = Url::parse("file:///").ok()?;
    uri.set_path(&rooted);
    Some(uri)
}

// ============================================================================
// Tests
// ============================================================================
