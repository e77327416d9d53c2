//! Backend object to message mapping.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use jsonapi_mapper::{map_object, AttributeSchema, MapOptions, MessageType, ObjectRef, Registry, ValueType};
//! use serde_json::json;
//!
//! let registry = Registry::builder()
//!     .message_type(
//!         MessageType::builder("Author")
//!             .attribute(AttributeSchema::attribute("id", ValueType::Integer).source("id"))
//!             .attribute(AttributeSchema::attribute("name", ValueType::String).source("name"))
//!             .build()?,
//!     )
//!     .build()?;
//!
//! let author: ObjectRef = Arc::new(json!({"id": 3, "name": "Frank"}));
//! let message = map_object(&registry, &author, "Author", &MapOptions::new())?;
//! assert_eq!(message.value("name"), Some(&json!("Frank")));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use serde_json::{json, Value};

use crate::backend::{Node, ObjectRef, Related};
use crate::error::{ApiError, MappingError};
use crate::message::{Mapped, Message, SlotValue};
use crate::registry::Registry;
use crate::schema::{AttributeSchema, MessageType};
use crate::types::{id_string, json_type_name, MapOptions};

/// Map one backend object into a message of the named type.
///
/// Plain attributes are read strictly: a present value of the wrong type fails
/// with a type mismatch, and an absent required value fails.
pub fn map_object(
    registry: &Registry,
    object: &ObjectRef,
    type_name: &str,
    options: &MapOptions,
) -> Result<Message, MappingError> {
    let message_type = registry.lookup(type_name)?;
    let mut message = Message::new(message_type.clone());
    message.set_source(object);

    for (index, attribute) in message_type.attributes().iter().enumerate() {
        if attribute.write_only {
            continue;
        }
        let value = if !attribute.is_relationship() {
            map_attribute(message_type, attribute, object)?
        } else if attribute.nested && options.nesting {
            map_nested(registry, message_type, attribute, object, options)?
        } else if options.include_relationships {
            map_relationship(registry, message_type, attribute, object)?
        } else {
            None
        };

        if let Some((value, key_value)) = value {
            let slot = message.slot_mut(index);
            slot.key_value = key_value;
            slot.assign(value);
        }
    }

    tracing::debug!(
        message_type = message.type_name(),
        id = ?message.id(),
        "mapped object to message"
    );
    Ok(message)
}

/// Map a sequence of backend objects, preserving order.
pub fn map_objects(
    registry: &Registry,
    objects: &[ObjectRef],
    type_name: &str,
    options: &MapOptions,
) -> Result<Vec<Message>, MappingError> {
    objects
        .iter()
        .map(|object| map_object(registry, object, type_name, options))
        .collect()
}

/// Map a sequence of backend objects with one rayon task per object.
///
/// Results come back in input order. When several objects fail, the error of
/// the earliest one is returned.
#[cfg(feature = "parallel")]
pub fn map_objects_parallel(
    registry: &Registry,
    objects: &[ObjectRef],
    type_name: &str,
    options: &MapOptions,
) -> Result<Vec<Message>, MappingError> {
    use rayon::prelude::*;

    let results: Vec<Result<Message, MappingError>> = objects
        .par_iter()
        .map(|object| map_object(registry, object, type_name, options))
        .collect();
    results.into_iter().collect()
}

/// Map related backend object(s) into messages of the target type.
pub fn map_related(
    registry: &Registry,
    related: &Related,
    target: &str,
    options: &MapOptions,
) -> Result<Mapped, MappingError> {
    match related {
        Related::One(object) => Ok(Mapped::One(map_object(registry, object, target, options)?)),
        Related::Many(objects) => Ok(Mapped::Many(map_objects(
            registry, objects, target, options,
        )?)),
    }
}

type Mapping = Option<(SlotValue, Option<Value>)>;

fn map_attribute(
    message_type: &MessageType,
    attribute: &AttributeSchema,
    object: &ObjectRef,
) -> Result<Mapping, MappingError> {
    let Some(source) = &attribute.source else {
        return Ok(None);
    };
    let value = match source.read(object.as_ref()) {
        None => Value::Null,
        Some(node) => node
            .into_value()
            .ok_or_else(|| type_mismatch(message_type, attribute, "object"))?,
    };

    if value.is_null() {
        if attribute.required {
            return Err(missing_required(message_type, attribute));
        }
        return Ok(None);
    }
    if !attribute.value_type.accepts(&value) {
        return Err(type_mismatch(message_type, attribute, json_type_name(&value)));
    }
    Ok(Some((SlotValue::Value(value), None)))
}

/// Nested relationships are mapped eagerly into nested messages. The linkage
/// is kept as well so the message can still be rendered without nesting.
fn map_nested(
    registry: &Registry,
    message_type: &MessageType,
    attribute: &AttributeSchema,
    object: &ObjectRef,
    options: &MapOptions,
) -> Result<Mapping, MappingError> {
    let (Some(source), Some(target)) = (&attribute.source, attribute.value_type.target()) else {
        return Ok(None);
    };
    let Some(node) = source.read(object.as_ref()) else {
        if attribute.required {
            return Err(missing_required(message_type, attribute));
        }
        return Ok(None);
    };
    let related = node
        .into_related()
        .map_err(|actual| type_mismatch(message_type, attribute, actual))?;
    let mapped = map_related(registry, &related, target, options)?;
    let linkage = mapped.linkage();
    Ok(Some((SlotValue::Messages(mapped), Some(linkage))))
}

fn map_relationship(
    registry: &Registry,
    message_type: &MessageType,
    attribute: &AttributeSchema,
    object: &ObjectRef,
) -> Result<Mapping, MappingError> {
    let Some(key_source) = &attribute.key_source else {
        return Ok(None);
    };
    let Some(target) = attribute.value_type.target() else {
        return Ok(None);
    };

    let keys = match key_source.read(object.as_ref()) {
        Some(Node::Value(keys)) => keys,
        Some(_) => return Err(type_mismatch(message_type, attribute, "object")),
        None if attribute.required => {
            return Err(ApiError::internal(format!(
                "key path of {}.{} returned nothing",
                message_type.name(),
                attribute.name
            ))
            .into());
        }
        None => return Ok(None),
    };

    let type_name = registry.lookup(target)?.name();
    let identifier = |key: &Value| json!({ "type": type_name, "id": id_string(key) });
    let key_value = match &keys {
        Value::Array(items) => json!({ "data": items.iter().map(identifier).collect::<Vec<_>>() }),
        key => json!({ "data": identifier(key) }),
    };
    Ok(Some((SlotValue::Keys(keys), Some(key_value))))
}

fn missing_required(message_type: &MessageType, attribute: &AttributeSchema) -> MappingError {
    MappingError::MissingRequired {
        message_type: message_type.name().to_string(),
        field: attribute.name.clone(),
    }
}

fn type_mismatch(
    message_type: &MessageType,
    attribute: &AttributeSchema,
    actual: &str,
) -> MappingError {
    MappingError::TypeMismatch {
        message_type: message_type.name().to_string(),
        field: attribute.name.clone(),
        expected: attribute.value_type.name().to_string(),
        actual: actual.to_string(),
    }
}
