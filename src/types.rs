//! Core types shared by the mapping components.

use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

/// Reserved external name of the identity attribute.
pub const ID: &str = "id";

/// Returns the JSON type name for error messages.
pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Renders an identifier the way documents carry it: always as a string.
pub fn id_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Semantic type of an attribute slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ValueType {
    String,
    Bytes,
    Integer,
    Float,
    Bool,
    /// Opaque list, passed through untouched.
    List,
    /// Opaque mapping, passed through untouched.
    Map,
    /// Reference to another message type by name.
    Relationship(String),
}

impl ValueType {
    /// Parse a scalar, list or map type name as used in definition files.
    ///
    /// Returns `None` for unknown names (caller should error).
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "string" => Some(ValueType::String),
            "bytes" => Some(ValueType::Bytes),
            "integer" => Some(ValueType::Integer),
            "float" => Some(ValueType::Float),
            "boolean" => Some(ValueType::Bool),
            "list" => Some(ValueType::List),
            "map" => Some(ValueType::Map),
            _ => None,
        }
    }

    /// Name used in describe output and error messages.
    pub fn name(&self) -> &str {
        match self {
            ValueType::String => "string",
            ValueType::Bytes => "bytes",
            ValueType::Integer => "integer",
            ValueType::Float => "float",
            ValueType::Bool => "boolean",
            ValueType::List => "list",
            ValueType::Map => "map",
            ValueType::Relationship(target) => target,
        }
    }

    pub fn is_relationship(&self) -> bool {
        matches!(self, ValueType::Relationship(_))
    }

    /// Target message type of a relationship.
    pub fn target(&self) -> Option<&str> {
        match self {
            ValueType::Relationship(target) => Some(target),
            _ => None,
        }
    }

    /// Strict runtime check used when reading backend objects.
    ///
    /// Bytes may be a string or an array of byte values. Floats accept any number.
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            ValueType::String => value.is_string(),
            ValueType::Bytes => value.is_string() || is_byte_array(value),
            ValueType::Integer => value.is_i64() || value.is_u64(),
            ValueType::Float => value.is_number(),
            ValueType::Bool => value.is_boolean(),
            ValueType::List => value.is_array(),
            ValueType::Map => value.is_object(),
            ValueType::Relationship(_) => false,
        }
    }

    /// Convert a value arriving from a document into this type.
    ///
    /// `null` always passes. Returns `None` when no sensible conversion exists.
    pub fn coerce(&self, value: Value) -> Option<Value> {
        if value.is_null() {
            return Some(value);
        }
        match self {
            ValueType::String => match value {
                Value::String(_) => Some(value),
                Value::Number(n) => Some(Value::String(n.to_string())),
                Value::Bool(b) => Some(Value::String(b.to_string())),
                Value::Array(_) if is_byte_array(&value) => bytes_to_string(&value),
                _ => None,
            },
            ValueType::Bytes => (value.is_string() || is_byte_array(&value)).then_some(value),
            ValueType::Integer => match &value {
                Value::Number(n) if n.is_i64() || n.is_u64() => Some(value),
                Value::Number(n) => n
                    .as_f64()
                    .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                    .map(|f| Value::from(f as i64)),
                Value::String(s) => s.trim().parse::<i64>().ok().map(Value::from),
                Value::Bool(b) => Some(Value::from(i64::from(*b))),
                _ => None,
            },
            ValueType::Float => match &value {
                Value::Number(n) => n.as_f64().and_then(Number::from_f64).map(Value::Number),
                Value::String(s) => s
                    .trim()
                    .parse::<f64>()
                    .ok()
                    .and_then(Number::from_f64)
                    .map(Value::Number),
                Value::Bool(b) => Number::from_f64(if *b { 1.0 } else { 0.0 }).map(Value::Number),
                _ => None,
            },
            ValueType::Bool => match &value {
                Value::Bool(_) => Some(value),
                Value::Number(n) => n.as_f64().map(|f| Value::Bool(f != 0.0)),
                Value::String(s) => match s.as_str() {
                    "true" => Some(Value::Bool(true)),
                    "false" => Some(Value::Bool(false)),
                    _ => None,
                },
                _ => None,
            },
            ValueType::List => value.is_array().then_some(value),
            ValueType::Map => value.is_object().then_some(value),
            ValueType::Relationship(_) => Some(value),
        }
    }
}

fn is_byte_array(value: &Value) -> bool {
    value.as_array().map_or(false, |items| {
        items
            .iter()
            .all(|item| item.as_u64().map_or(false, |b| b <= u64::from(u8::MAX)))
    })
}

fn bytes_to_string(value: &Value) -> Option<Value> {
    let bytes = value
        .as_array()?
        .iter()
        .map(|item| item.as_u64().and_then(|b| u8::try_from(b).ok()))
        .collect::<Option<Vec<u8>>>()?;
    String::from_utf8(bytes).ok().map(Value::String)
}

/// Options for mapping backend objects into messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapOptions {
    /// Resolve relationship keys into relationship stubs.
    pub include_relationships: bool,
    /// Render attributes marked nested as embedded documents instead of stubs.
    pub nesting: bool,
}

impl Default for MapOptions {
    fn default() -> Self {
        Self {
            include_relationships: true,
            nesting: false,
        }
    }
}

impl MapOptions {
    /// Create options with relationships included and nesting disabled.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn include_relationships(mut self, include: bool) -> Self {
        self.include_relationships = include;
        self
    }

    pub fn nesting(mut self, nesting: bool) -> Self {
        self.nesting = nesting;
        self
    }
}
