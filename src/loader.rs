//! Loading message type definitions and JSON payloads.
//!
//! Definitions are JSON files describing message types declaratively. They are
//! loaded from files, strings or HTTP URLs and turned into a [`Registry`] whose
//! types operate on `serde_json::Value` backend objects.

use std::path::Path;

use serde::Deserialize;
use serde_json::Value;

use crate::error::SchemaError;
use crate::registry::Registry;
use crate::schema::{AttributeSchema, MessageType, NestedType};
use crate::types::ValueType;

#[cfg(feature = "remote")]
use std::time::Duration;

/// Default timeout for HTTP requests (10 seconds).
#[cfg(feature = "remote")]
const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Top-level definition file.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Definitions {
    pub types: Vec<TypeDefinition>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TypeDefinition {
    pub name: String,
    pub attributes: Vec<AttributeDefinition>,
}

/// One attribute. Exactly one of `type` and `relationship` must be given.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AttributeDefinition {
    pub name: String,
    #[serde(rename = "type")]
    pub value_type: Option<String>,
    pub relationship: Option<String>,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub read_only: bool,
    #[serde(default)]
    pub write_only: bool,
    pub source: Option<String>,
    pub key_source: Option<String>,
    #[serde(default)]
    pub nested: bool,
    pub nested_type: Option<String>,
}

impl Definitions {
    /// Build and validate a registry from these definitions.
    pub fn into_registry(self) -> Result<Registry, SchemaError> {
        let mut builder = Registry::builder();
        for definition in self.types {
            builder = builder.message_type(definition.into_message_type()?);
        }
        builder.build()
    }
}

impl TypeDefinition {
    fn into_message_type(self) -> Result<MessageType, SchemaError> {
        let mut builder = MessageType::builder(self.name.clone());
        for attribute in self.attributes {
            builder = builder.attribute(attribute.into_schema(&self.name)?);
        }
        builder.build()
    }
}

impl AttributeDefinition {
    fn into_schema(self, message_type: &str) -> Result<AttributeSchema, SchemaError> {
        let value_type = match (self.value_type, self.relationship) {
            (Some(name), None) => {
                ValueType::parse(&name).ok_or_else(|| SchemaError::UnknownValueType {
                    message_type: message_type.to_string(),
                    attribute: self.name.clone(),
                    value: name,
                })?
            }
            (None, Some(target)) => ValueType::Relationship(target),
            _ => {
                return Err(SchemaError::InvalidDefinition {
                    message: format!(
                        "{}.{} must declare exactly one of 'type' and 'relationship'",
                        message_type, self.name
                    ),
                })
            }
        };

        let mut schema = AttributeSchema::attribute(self.name, value_type)
            .required(self.required)
            .read_only(self.read_only)
            .write_only(self.write_only);
        if let Some(source) = &self.source {
            schema = schema.source(source);
        }
        if let Some(key_source) = &self.key_source {
            schema = schema.key_source(key_source);
        }
        if self.nested {
            schema.nested = true;
            schema.nested_type = self.nested_type.map(NestedType::json_object);
        }
        Ok(schema)
    }
}

fn registry_from_value(value: Value) -> Result<Registry, SchemaError> {
    let definitions: Definitions =
        serde_json::from_value(value).map_err(|e| SchemaError::InvalidDefinition {
            message: e.to_string(),
        })?;
    definitions.into_registry()
}

/// Load a JSON document from a file path.
///
/// # Errors
///
/// Returns `SchemaError::FileNotFound` if the file doesn't exist,
/// or `SchemaError::InvalidJson` if the file isn't valid JSON.
pub fn load_json(path: &Path) -> Result<Value, SchemaError> {
    let content = read_file(path)?;
    load_json_str(&content)
}

/// Parse a JSON document from a string.
pub fn load_json_str(content: &str) -> Result<Value, SchemaError> {
    serde_json::from_str(content).map_err(|source| SchemaError::InvalidJson { source })
}

/// Read a file to a string, distinguishing a missing file from other IO errors.
pub fn read_file(path: &Path) -> Result<String, SchemaError> {
    if !path.exists() {
        return Err(SchemaError::FileNotFound {
            path: path.to_path_buf(),
        });
    }

    std::fs::read_to_string(path).map_err(|source| SchemaError::ReadError {
        path: path.to_path_buf(),
        source,
    })
}

/// Load a JSON document from an HTTP/HTTPS URL.
///
/// Requires the `remote` feature (enabled by default).
///
/// # Errors
///
/// Returns `SchemaError::NetworkError` if the request fails or the response
/// isn't valid JSON.
#[cfg(feature = "remote")]
pub fn load_json_url(url: &str) -> Result<Value, SchemaError> {
    let network = |source| SchemaError::NetworkError {
        url: url.to_string(),
        source,
    };

    let client = reqwest::blocking::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .map_err(network)?;

    tracing::debug!(url, "fetching definitions");
    client
        .get(url)
        .send()
        .and_then(|response| response.error_for_status())
        .and_then(|response| response.json())
        .map_err(network)
}

/// Load a JSON document from a file path or URL.
///
/// URL loading requires the `remote` feature.
pub fn load_json_auto(source: &str) -> Result<Value, SchemaError> {
    if is_url(source) {
        #[cfg(feature = "remote")]
        {
            load_json_url(source)
        }
        #[cfg(not(feature = "remote"))]
        {
            Err(SchemaError::FileNotFound {
                path: std::path::PathBuf::from(source),
            })
        }
    } else {
        load_json(Path::new(source))
    }
}

/// Load a registry from a definition file.
pub fn load_registry(path: &Path) -> Result<Registry, SchemaError> {
    registry_from_value(load_json(path)?)
}

/// Load a registry from a definition string.
pub fn load_registry_str(content: &str) -> Result<Registry, SchemaError> {
    registry_from_value(load_json_str(content)?)
}

/// Load a registry from a definition URL.
#[cfg(feature = "remote")]
pub fn load_registry_url(url: &str) -> Result<Registry, SchemaError> {
    registry_from_value(load_json_url(url)?)
}

/// Load a registry from a file path or URL.
pub fn load_registry_auto(source: &str) -> Result<Registry, SchemaError> {
    registry_from_value(load_json_auto(source)?)
}

/// Check if a string looks like a URL (starts with http:// or https://).
pub fn is_url(s: &str) -> bool {
    s.starts_with("http://") || s.starts_with("https://")
}
