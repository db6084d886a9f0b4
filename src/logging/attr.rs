//! Key/value attributes attached to log records and application errors.

use std::error::Error;
use std::fmt;
use std::time::Duration;

use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::apperr::{self, StackTrace};

/// Well-known attribute keys.
///
/// Trace and span keys follow the OpenTelemetry naming conventions.
pub mod keys {
    pub const TIME: &str = "time";
    pub const LEVEL: &str = "level";
    pub const MESSAGE: &str = "msg";
    pub const ERROR: &str = "error";
    pub const TRACE_ID: &str = "trace_id";
    pub const SPAN_ID: &str = "span_id";
    pub const PROCEDURE: &str = "procedure";
    pub const METHOD: &str = "method";
    pub const STATUS: &str = "status";
    pub const DURATION_MS: &str = "duration_ms";
    pub const USER_AGENT: &str = "user_agent";
    pub const REMOTE_ADDR: &str = "remote_addr";
    pub const STACKTRACE: &str = "stacktrace";
}

/// A single structured key/value pair.
#[derive(Debug, Clone, PartialEq)]
pub struct Attr {
    pub key: String,
    pub value: AttrValue,
}

/// Value half of an [`Attr`].
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    String(String),
    Int(i64),
    Uint(u64),
    Float(f64),
    Bool(bool),
    Duration(Duration),
    /// Nested attributes, rendered as an object in JSON and as dotted keys in text.
    Group(Vec<Attr>),
    /// A captured call stack, rendered as text when the record is written.
    Stack(StackTrace),
}

impl Attr {
    pub fn new(key: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn string(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(key, AttrValue::String(value.into()))
    }

    pub fn int(key: impl Into<String>, value: i64) -> Self {
        Self::new(key, AttrValue::Int(value))
    }

    pub fn uint(key: impl Into<String>, value: u64) -> Self {
        Self::new(key, AttrValue::Uint(value))
    }

    pub fn float(key: impl Into<String>, value: f64) -> Self {
        Self::new(key, AttrValue::Float(value))
    }

    pub fn bool(key: impl Into<String>, value: bool) -> Self {
        Self::new(key, AttrValue::Bool(value))
    }

    pub fn duration(key: impl Into<String>, value: Duration) -> Self {
        Self::new(key, AttrValue::Duration(value))
    }

    pub fn group(key: impl Into<String>, attrs: Vec<Attr>) -> Self {
        Self::new(key, AttrValue::Group(attrs))
    }

    /// Builds the `error` attribute for an error-level record.
    ///
    /// Application errors anywhere in the chain contribute their structured
    /// representation; anything else is logged by its display text.
    pub fn error(err: &(dyn Error + 'static)) -> Self {
        match apperr::find_app_error(err) {
            Some(app) => Self::new(keys::ERROR, app.log_value()),
            None => Self::string(keys::ERROR, err.to_string()),
        }
    }
}

impl AttrValue {
    /// Returns `true` for groups with no members; such groups are not rendered.
    pub fn is_empty_group(&self) -> bool {
        matches!(self, AttrValue::Group(attrs) if attrs.is_empty())
    }
}

impl From<&str> for AttrValue {
    fn from(value: &str) -> Self {
        AttrValue::String(value.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(value: String) -> Self {
        AttrValue::String(value)
    }
}

impl From<i64> for AttrValue {
    fn from(value: i64) -> Self {
        AttrValue::Int(value)
    }
}

impl From<i32> for AttrValue {
    fn from(value: i32) -> Self {
        AttrValue::Int(i64::from(value))
    }
}

impl From<u64> for AttrValue {
    fn from(value: u64) -> Self {
        AttrValue::Uint(value)
    }
}

impl From<u32> for AttrValue {
    fn from(value: u32) -> Self {
        AttrValue::Uint(u64::from(value))
    }
}

impl From<f64> for AttrValue {
    fn from(value: f64) -> Self {
        AttrValue::Float(value)
    }
}

impl From<bool> for AttrValue {
    fn from(value: bool) -> Self {
        AttrValue::Bool(value)
    }
}

impl From<Duration> for AttrValue {
    fn from(value: Duration) -> Self {
        AttrValue::Duration(value)
    }
}

impl From<StackTrace> for AttrValue {
    fn from(value: StackTrace) -> Self {
        AttrValue::Stack(value)
    }
}

impl From<Vec<Attr>> for AttrValue {
    fn from(value: Vec<Attr>) -> Self {
        AttrValue::Group(value)
    }
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrValue::String(s) => f.write_str(s),
            AttrValue::Int(n) => write!(f, "{n}"),
            AttrValue::Uint(n) => write!(f, "{n}"),
            AttrValue::Float(n) => write!(f, "{n}"),
            AttrValue::Bool(b) => write!(f, "{b}"),
            AttrValue::Duration(d) => write!(f, "{d:?}"),
            AttrValue::Stack(stack) => f.write_str(stack.as_str()),
            AttrValue::Group(attrs) => {
                f.write_str("[")?;
                for (i, attr) in attrs.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{attr}")?;
                }
                f.write_str("]")
            }
        }
    }
}

impl fmt::Display for Attr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.key, self.value)
    }
}

/// Serializes attributes as a map in their original order.
///
/// Duplicate keys are written as they occur.
pub(crate) struct AttrMap<'a>(pub &'a [Attr]);

impl Serialize for AttrMap<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for attr in self.0 {
            map.serialize_entry(&attr.key, &attr.value)?;
        }
        map.end()
    }
}

/// Durations serialize as integer nanoseconds; non-finite floats as strings.
impl Serialize for AttrValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            AttrValue::String(s) => serializer.serialize_str(s),
            AttrValue::Int(n) => serializer.serialize_i64(*n),
            AttrValue::Uint(n) => serializer.serialize_u64(*n),
            AttrValue::Float(n) if n.is_finite() => serializer.serialize_f64(*n),
            AttrValue::Float(n) => serializer.collect_str(n),
            AttrValue::Bool(b) => serializer.serialize_bool(*b),
            AttrValue::Duration(d) => {
                serializer.serialize_u64(u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
            }
            AttrValue::Group(attrs) => AttrMap(attrs).serialize(serializer),
            AttrValue::Stack(stack) => serializer.serialize_str(stack.as_str()),
        }
    }
}
