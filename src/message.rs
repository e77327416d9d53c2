//! Message instances.
//!
//! A message is the per-object view of a backend object under one
//! [`MessageType`]. Runtime state lives in a slot arena indexed by attribute
//! position, so instances of the same type never share values.

use std::sync::{Arc, Weak};

use serde_json::{json, Value};

use crate::backend::{Backend, ObjectRef};
use crate::error::MappingError;
use crate::schema::{AttributeSchema, MessageType};
use crate::types::id_string;

/// One or more messages held by a relationship slot.
#[derive(Debug, Clone)]
pub enum Mapped {
    One(Message),
    Many(Vec<Message>),
}

impl Mapped {
    /// Iterate over the held messages.
    pub fn iter(&self) -> std::slice::Iter<'_, Message> {
        match self {
            Mapped::One(message) => std::slice::from_ref(message).iter(),
            Mapped::Many(messages) => messages.iter(),
        }
    }

    /// Resource linkage: `{"data": {type, id}}`, a list of those, or `{"data": null}`
    /// for a cleared relationship.
    pub fn linkage(&self) -> Value {
        let identifier = |m: &Message| {
            json!({
                "type": m.type_name(),
                "id": m.id().map(id_string),
            })
        };
        match self {
            Mapped::One(m) if m.id().is_none() => json!({ "data": null }),
            Mapped::One(m) => json!({ "data": identifier(m) }),
            Mapped::Many(ms) => json!({ "data": ms.iter().map(identifier).collect::<Vec<_>>() }),
        }
    }
}

/// Runtime content of one attribute slot.
#[derive(Debug, Clone, Default)]
pub(crate) enum SlotValue {
    #[default]
    Empty,
    /// Plain attribute value (or an explicit null).
    Value(Value),
    /// Raw relationship identifier(s) resolved from a key source.
    Keys(Value),
    /// Nested, parsed or assigned related messages.
    Messages(Mapped),
}

#[derive(Debug, Clone, Default)]
pub(crate) struct Slot {
    pub value: SlotValue,
    pub key_value: Option<Value>,
    pub updated: bool,
}

impl Slot {
    pub fn assign(&mut self, value: SlotValue) {
        self.value = value;
        self.updated = true;
    }
}

/// A populated instance of a message type.
#[derive(Debug, Clone)]
pub struct Message {
    message_type: Arc<MessageType>,
    slots: Vec<Slot>,
    source: Option<Weak<dyn Backend>>,
}

impl Message {
    /// Create an empty instance with nothing marked updated.
    pub fn new(message_type: Arc<MessageType>) -> Self {
        let slots = vec![Slot::default(); message_type.attributes().len()];
        Self {
            message_type,
            slots,
            source: None,
        }
    }

    pub fn message_type(&self) -> &Arc<MessageType> {
        &self.message_type
    }

    /// Rendered `type` of this message.
    pub fn type_name(&self) -> &str {
        self.message_type.name()
    }

    /// Identity value, `None` when unset or explicitly null.
    pub fn id(&self) -> Option<&Value> {
        match &self.slots[self.message_type.id_index()].value {
            SlotValue::Value(Value::Null) => None,
            SlotValue::Value(value) => Some(value),
            _ => None,
        }
    }

    /// Assign the identity, converting it to the declared id type.
    pub fn set_id(&mut self, value: Value) -> Result<(), MappingError> {
        let index = self.message_type.id_index();
        let value = self.coerce(&self.message_type.attributes()[index], value)?;
        self.slots[index].assign(SlotValue::Value(value));
        Ok(())
    }

    /// Assign a plain attribute, converting it to the declared type.
    ///
    /// # Errors
    ///
    /// Fails for unknown names, relationship names, and values that cannot be
    /// converted.
    pub fn set(&mut self, name: &str, value: Value) -> Result<(), MappingError> {
        let index = self.plain_index(name)?;
        let value = self.coerce(&self.message_type.attributes()[index], value)?;
        self.slots[index].assign(SlotValue::Value(value));
        Ok(())
    }

    /// Assign related messages to a relationship and record their linkage.
    pub fn set_related(&mut self, name: &str, related: Mapped) -> Result<(), MappingError> {
        let index = self.relationship_index(name)?;
        let slot = &mut self.slots[index];
        slot.key_value = Some(related.linkage());
        slot.assign(SlotValue::Messages(related));
        Ok(())
    }

    /// Current value of a plain attribute.
    pub fn value(&self, name: &str) -> Option<&Value> {
        match &self.slot(name)?.value {
            SlotValue::Value(value) => Some(value),
            _ => None,
        }
    }

    /// Single related message of a parsed or nested relationship.
    pub fn one(&self, name: &str) -> Option<&Message> {
        match &self.slot(name)?.value {
            SlotValue::Messages(Mapped::One(message)) => Some(message),
            _ => None,
        }
    }

    /// Related messages of a parsed or nested to-many relationship.
    pub fn many(&self, name: &str) -> Option<&[Message]> {
        match &self.slot(name)?.value {
            SlotValue::Messages(Mapped::Many(messages)) => Some(messages),
            _ => None,
        }
    }

    /// Raw identifier(s) of a relationship resolved from its key source.
    pub fn keys(&self, name: &str) -> Option<&Value> {
        match &self.slot(name)?.value {
            SlotValue::Keys(keys) => Some(keys),
            _ => None,
        }
    }

    /// Rendered relationship linkage.
    pub fn key_value(&self, name: &str) -> Option<&Value> {
        self.slot(name)?.key_value.as_ref()
    }

    /// Whether the field was assigned since construction.
    pub fn is_updated(&self, name: &str) -> bool {
        self.slot(name).map_or(false, |slot| slot.updated)
    }

    /// Whether a relationship was explicitly cleared (`"data": null`).
    pub fn is_cleared(&self, name: &str) -> bool {
        let Some(index) = self.relationship_index(name).ok() else {
            return false;
        };
        match &self.slots[index].value {
            SlotValue::Messages(Mapped::One(stub)) => {
                stub.id().is_none() && stub.updated_fields().is_empty()
            }
            SlotValue::Value(Value::Null) => true,
            _ => false,
        }
    }

    /// Mark a nested relationship as explicitly emptied.
    pub(crate) fn clear_nested(&mut self, index: usize) {
        let slot = &mut self.slots[index];
        slot.key_value = Some(json!({ "data": null }));
        slot.assign(SlotValue::Value(Value::Null));
    }

    /// Names of all fields marked updated, in declaration order.
    pub fn updated_fields(&self) -> Vec<&str> {
        self.message_type
            .attributes()
            .iter()
            .zip(&self.slots)
            .filter(|(_, slot)| slot.updated)
            .map(|(attribute, _)| attribute.name.as_str())
            .collect()
    }

    /// Backend object this message was mapped from, if it is still alive.
    pub fn source(&self) -> Option<ObjectRef> {
        self.source.as_ref()?.upgrade()
    }

    pub(crate) fn set_source(&mut self, object: &ObjectRef) {
        self.source = Some(Arc::downgrade(object));
    }

    pub(crate) fn slots(&self) -> &[Slot] {
        &self.slots
    }

    pub(crate) fn slot_mut(&mut self, index: usize) -> &mut Slot {
        &mut self.slots[index]
    }

    fn slot(&self, name: &str) -> Option<&Slot> {
        self.message_type.position(name).map(|i| &self.slots[i])
    }

    fn plain_index(&self, name: &str) -> Result<usize, MappingError> {
        match self.message_type.position(name) {
            Some(i) if !self.message_type.attributes()[i].is_relationship() => Ok(i),
            _ => Err(self.unknown_field(name)),
        }
    }

    fn relationship_index(&self, name: &str) -> Result<usize, MappingError> {
        match self.message_type.position(name) {
            Some(i) if self.message_type.attributes()[i].is_relationship() => Ok(i),
            _ => Err(self.unknown_field(name)),
        }
    }

    fn unknown_field(&self, name: &str) -> MappingError {
        MappingError::UnknownField {
            message_type: self.type_name().to_string(),
            field: name.to_string(),
        }
    }

    fn coerce(&self, attribute: &AttributeSchema, value: Value) -> Result<Value, MappingError> {
        let shown = value.to_string();
        attribute
            .value_type
            .coerce(value)
            .ok_or_else(|| MappingError::Conversion {
                message_type: self.type_name().to_string(),
                field: attribute.name.clone(),
                expected: attribute.value_type.name().to_string(),
                value: shown,
            })
    }
}
