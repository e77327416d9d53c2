//! Writing message updates back onto backend objects.

use std::sync::Arc;

use serde_json::Value;

use crate::backend::{parent_mut, Backend, Node, ObjectRef};
use crate::error::{ApiError, MappingError};
use crate::message::{Mapped, Message, SlotValue};
use crate::schema::AttributeSchema;

/// Apply every updated, writable field of `message` to `object`.
///
/// Plain attributes are written first, then nested relationships, then plain
/// relationships. Nested relationships are rebuilt from fresh objects of the
/// declared nested type, or get their ids written to the key path when only
/// ids are known. Plain relationships write only the related ids to their key
/// path. Attributes read through a resolver closure are skipped.
///
/// Nothing is persisted; the caller owns the object afterwards.
pub fn apply_updates(message: &Message, object: &mut dyn Backend) -> Result<(), MappingError> {
    let schemas = message.message_type().attributes();
    let fields: Vec<(&AttributeSchema, &SlotValue)> = schemas
        .iter()
        .zip(message.slots())
        .filter(|(attribute, slot)| slot.updated && !attribute.read_only)
        .map(|(attribute, slot)| (attribute, &slot.value))
        .collect();

    for (attribute, value) in fields.iter().filter(|(a, _)| !a.is_relationship()) {
        let SlotValue::Value(value) = value else {
            continue;
        };
        write(message, attribute, object, Node::Value(value.clone()), false)?;
    }

    for (attribute, value) in fields.iter().filter(|(a, _)| a.is_relationship() && a.nested) {
        // mapped without nesting: only the ids are known
        if let SlotValue::Keys(keys) = value {
            write(message, attribute, object, Node::Value(keys.clone()), true)?;
            continue;
        }
        if let Some(node) = nested_node(message, attribute, value)? {
            write(message, attribute, object, node, false)?;
        }
    }

    for (attribute, value) in fields.iter().filter(|(a, _)| a.is_relationship() && !a.nested) {
        let ids = match value {
            SlotValue::Keys(keys) => keys.clone(),
            SlotValue::Messages(Mapped::One(stub)) => stub.id().cloned().unwrap_or(Value::Null),
            SlotValue::Messages(Mapped::Many(stubs)) => Value::Array(
                stubs
                    .iter()
                    .map(|stub| stub.id().cloned().unwrap_or(Value::Null))
                    .collect(),
            ),
            SlotValue::Value(Value::Null) => Value::Null,
            _ => continue,
        };
        write(message, attribute, object, Node::Value(ids), true)?;
    }

    tracing::debug!(
        message_type = message.type_name(),
        fields = fields.len(),
        "applied message updates"
    );
    Ok(())
}

/// Apply updates to an owned object and hand it back.
pub fn update_object<B: Backend>(message: &Message, mut object: B) -> Result<B, MappingError> {
    apply_updates(message, &mut object)?;
    Ok(object)
}

fn nested_node(
    message: &Message,
    attribute: &AttributeSchema,
    value: &SlotValue,
) -> Result<Option<Node>, MappingError> {
    let mapped = match value {
        SlotValue::Messages(mapped) => mapped,
        SlotValue::Value(Value::Null) => return Ok(Some(Node::Value(Value::Null))),
        _ => return Ok(None),
    };
    let nested_type = attribute.nested_type.as_ref().ok_or_else(|| {
        ApiError::developer(
            "Schema misuse",
            format!(
                "{}.{} is nested but has no nested type",
                message.type_name(),
                attribute.name
            ),
        )
    })?;

    let build = |nested: &Message| -> Result<ObjectRef, MappingError> {
        let mut object = nested_type.instantiate();
        apply_updates(nested, object.as_mut())?;
        Ok(Arc::from(object))
    };
    Ok(Some(match mapped {
        Mapped::One(nested) => Node::Object(build(nested)?),
        Mapped::Many(nested) => Node::List(nested.iter().map(build).collect::<Result<_, _>>()?),
    }))
}

fn write(
    message: &Message,
    attribute: &AttributeSchema,
    object: &mut dyn Backend,
    node: Node,
    key: bool,
) -> Result<(), MappingError> {
    let source = if key {
        &attribute.key_source
    } else {
        &attribute.source
    };
    let Some(path) = source.as_ref().and_then(|s| s.segments()) else {
        return Ok(());
    };
    let unresolved = || MappingError::UnresolvedPath {
        message_type: message.type_name().to_string(),
        field: attribute.name.clone(),
        path: path.join("."),
    };

    let (last, _) = path.split_last().ok_or_else(unresolved)?;
    let parent = parent_mut(object, path).ok_or_else(unresolved)?;
    parent.set(last, node)
}
