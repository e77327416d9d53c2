//! Declarative message type schemas.
//!
//! A [`MessageType`] is an ordered list of [`AttributeSchema`] values built once
//! and shared by every message instance of that type. Schemas carry no runtime
//! state; values live in the message instance.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::backend::{read_path, split_path, Backend, Node};
use crate::error::SchemaError;
use crate::types::{ValueType, ID};

/// Closure reading a value from a backend object.
pub type ResolverFn = dyn Fn(&dyn Backend) -> Option<Node> + Send + Sync;

/// Closure creating a fresh backend object for nested writes.
pub type FactoryFn = dyn Fn() -> Box<dyn Backend> + Send + Sync;

/// Where an attribute's value comes from on a backend object.
#[derive(Clone)]
pub enum Source {
    /// Dot-delimited path, readable and writable.
    Path(Vec<String>),
    /// Integrator-supplied reader. Read-only: writes skip it.
    Resolver(Arc<ResolverFn>),
}

impl Source {
    /// Build a path source from a dot-delimited string.
    pub fn path(path: &str) -> Self {
        Source::Path(split_path(path))
    }

    /// Read the value from a backend object.
    pub fn read(&self, object: &dyn Backend) -> Option<Node> {
        match self {
            Source::Path(segments) => read_path(object, segments),
            Source::Resolver(resolver) => resolver(object),
        }
    }

    /// Path segments, if this source can be written to.
    pub fn segments(&self) -> Option<&[String]> {
        match self {
            Source::Path(segments) => Some(segments),
            Source::Resolver(_) => None,
        }
    }
}

impl fmt::Debug for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Path(segments) => write!(f, "Path({})", segments.join(".")),
            Source::Resolver(_) => f.write_str("Resolver(..)"),
        }
    }
}

/// Backend type instantiated when nested data is written back.
#[derive(Clone)]
pub struct NestedType {
    name: String,
    factory: Arc<FactoryFn>,
}

impl NestedType {
    pub fn new<F>(name: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> Box<dyn Backend> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            factory: Arc::new(factory),
        }
    }

    /// Nested objects created as empty JSON objects.
    pub fn json_object(name: impl Into<String>) -> Self {
        Self::new(name, || Box::new(Value::Object(serde_json::Map::new())))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Create a fresh backend object.
    pub fn instantiate(&self) -> Box<dyn Backend> {
        (self.factory)()
    }
}

impl fmt::Debug for NestedType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("NestedType").field(&self.name).finish()
    }
}

/// One field or relationship slot of a message type.
#[derive(Debug, Clone)]
pub struct AttributeSchema {
    /// External name in the rendered document.
    pub name: String,
    pub value_type: ValueType,
    /// Absence fails the mapping.
    pub required: bool,
    /// Never applied to backend objects.
    pub read_only: bool,
    /// Never rendered into documents.
    pub write_only: bool,
    pub source: Option<Source>,
    /// Relationships only: resolves the related identifier(s) directly.
    pub key_source: Option<Source>,
    /// Relationships only: render the related object(s) embedded.
    pub nested: bool,
    pub nested_type: Option<NestedType>,
}

impl AttributeSchema {
    /// Declare a plain attribute.
    pub fn attribute(name: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            name: name.into(),
            value_type,
            required: false,
            read_only: false,
            write_only: false,
            source: None,
            key_source: None,
            nested: false,
            nested_type: None,
        }
    }

    /// Declare a relationship to another message type.
    pub fn relationship(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self::attribute(name, ValueType::Relationship(target.into()))
    }

    /// Read (and write) the value at a dot-delimited path.
    pub fn source(mut self, path: &str) -> Self {
        self.source = Some(Source::path(path));
        self
    }

    /// Read the value through a closure. Such attributes are never written back.
    pub fn resolver<F>(mut self, resolver: F) -> Self
    where
        F: Fn(&dyn Backend) -> Option<Node> + Send + Sync + 'static,
    {
        self.source = Some(Source::Resolver(Arc::new(resolver)));
        self
    }

    /// Path resolving to the related identifier(s).
    pub fn key_source(mut self, path: &str) -> Self {
        self.key_source = Some(Source::path(path));
        self
    }

    /// Closure resolving to the related identifier(s).
    pub fn key_resolver<F>(mut self, resolver: F) -> Self
    where
        F: Fn(&dyn Backend) -> Option<Node> + Send + Sync + 'static,
    {
        self.key_source = Some(Source::Resolver(Arc::new(resolver)));
        self
    }

    pub fn required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    pub fn write_only(mut self, write_only: bool) -> Self {
        self.write_only = write_only;
        self
    }

    /// Embed the related object(s), creating `nested_type` objects on write.
    pub fn nested(mut self, nested_type: NestedType) -> Self {
        self.nested = true;
        self.nested_type = Some(nested_type);
        self
    }

    pub fn is_relationship(&self) -> bool {
        self.value_type.is_relationship()
    }

    pub fn is_id(&self) -> bool {
        self.name == ID
    }
}

/// A named schema composed of attribute schemas.
#[derive(Debug, Clone)]
pub struct MessageType {
    name: String,
    attributes: Vec<AttributeSchema>,
    id_index: usize,
}

impl MessageType {
    pub fn builder(name: impl Into<String>) -> MessageTypeBuilder {
        MessageTypeBuilder {
            name: name.into(),
            attributes: Vec::new(),
        }
    }

    /// Rendered `type` of every resource of this message type.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Attribute schemas in declaration order.
    pub fn attributes(&self) -> &[AttributeSchema] {
        &self.attributes
    }

    pub fn id_attribute(&self) -> &AttributeSchema {
        &self.attributes[self.id_index]
    }

    pub(crate) fn id_index(&self) -> usize {
        self.id_index
    }

    /// Position of the attribute with the given external name.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.attributes.iter().position(|a| a.name == name)
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeSchema> {
        self.position(name).map(|i| &self.attributes[i])
    }
}

/// Collects attribute schemas and checks the type's invariants on build.
#[derive(Debug)]
pub struct MessageTypeBuilder {
    name: String,
    attributes: Vec<AttributeSchema>,
}

impl MessageTypeBuilder {
    pub fn attribute(mut self, attribute: AttributeSchema) -> Self {
        self.attributes.push(attribute);
        self
    }

    /// Validate the schema and freeze it.
    ///
    /// # Errors
    ///
    /// Returns `SchemaError` when `id` is missing, duplicated or a relationship,
    /// when two attributes share a name, or when relationship-only settings are
    /// used on a plain attribute.
    pub fn build(self) -> Result<MessageType, SchemaError> {
        let mut seen = HashSet::new();
        let mut id_index = None;

        for (index, attribute) in self.attributes.iter().enumerate() {
            if attribute.is_id() {
                if id_index.is_some() {
                    return Err(SchemaError::DuplicateId {
                        message_type: self.name,
                    });
                }
                if attribute.is_relationship() {
                    return Err(SchemaError::RelationshipId {
                        message_type: self.name,
                    });
                }
                id_index = Some(index);
            } else if !seen.insert(attribute.name.as_str()) {
                return Err(SchemaError::DuplicateAttribute {
                    attribute: attribute.name.clone(),
                    message_type: self.name.clone(),
                });
            }

            if !attribute.is_relationship() {
                let setting = if attribute.nested {
                    Some("nested")
                } else if attribute.key_source.is_some() {
                    Some("key_source")
                } else {
                    None
                };
                if let Some(setting) = setting {
                    return Err(SchemaError::NotARelationship {
                        attribute: attribute.name.clone(),
                        message_type: self.name.clone(),
                        setting,
                    });
                }
            }

            if attribute.nested && attribute.nested_type.is_none() {
                return Err(SchemaError::NestedWithoutType {
                    attribute: attribute.name.clone(),
                    message_type: self.name.clone(),
                });
            }
        }

        let Some(id_index) = id_index else {
            return Err(SchemaError::MissingId {
                message_type: self.name,
            });
        };

        Ok(MessageType {
            name: self.name,
            attributes: self.attributes,
            id_index,
        })
    }
}
