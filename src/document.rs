//! Rendering messages into resource objects and parsing them back.
//!
//! Rendering follows the resource object layout: `id` and `type`, then an
//! `attributes` block and a `relationships` block, each omitted when empty.
//! Parsing tracks exactly which fields the incoming document mentioned so
//! partial updates only touch those.

use serde_json::{json, Map, Value};

use crate::error::{ApiError, DocumentError, MappingError, ValidateError};
use crate::fragment::ErrorFragment;
use crate::message::{Mapped, Message, SlotValue};
use crate::registry::Registry;
use crate::schema::AttributeSchema;
use crate::types::{id_string, ID};
use crate::validator::validate_document;

/// Render a message as a resource object.
///
/// With `nesting`, nested relationships are rendered as embedded resources,
/// recursively. Otherwise they render as relationship stubs like any other
/// relationship.
pub fn render(registry: &Registry, message: &Message, nesting: bool) -> Result<Value, MappingError> {
    let mut resource = Map::new();
    resource.insert(
        ID.to_string(),
        message.id().map_or(Value::Null, |id| Value::String(id_string(id))),
    );
    resource.insert("type".to_string(), Value::String(message.type_name().to_string()));

    let mut attributes = Map::new();
    let mut relationships = Map::new();

    let schemas = message.message_type().attributes();
    for (attribute, slot) in schemas.iter().zip(message.slots()) {
        if attribute.write_only || attribute.is_id() {
            continue;
        }
        if !attribute.is_relationship() {
            if let SlotValue::Value(value) = &slot.value {
                if !value.is_null() {
                    attributes.insert(attribute.name.clone(), value.clone());
                }
            }
            continue;
        }

        let rendered = if attribute.nested && nesting {
            render_nested(&slot.value, registry)?.or_else(|| slot.key_value.clone())
        } else {
            slot.key_value.clone()
        };
        if let Some(rendered) = rendered {
            relationships.insert(attribute.name.clone(), rendered);
        }
    }

    if !attributes.is_empty() {
        resource.insert("attributes".to_string(), Value::Object(attributes));
    }
    if !relationships.is_empty() {
        resource.insert("relationships".to_string(), Value::Object(relationships));
    }

    tracing::trace!(message_type = message.type_name(), "rendered message");
    Ok(Value::Object(resource))
}

/// Render several messages, preserving order.
pub fn render_all(
    registry: &Registry,
    messages: &[Message],
    nesting: bool,
) -> Result<Vec<Value>, MappingError> {
    messages
        .iter()
        .map(|message| render(registry, message, nesting))
        .collect()
}

fn render_nested(value: &SlotValue, registry: &Registry) -> Result<Option<Value>, MappingError> {
    let rendered = match value {
        SlotValue::Messages(mapped) => render_mapped(registry, mapped)?,
        SlotValue::Value(Value::Null) => Value::Null,
        _ => return Ok(None),
    };
    Ok(Some(json!({ "data": rendered })))
}

fn render_mapped(registry: &Registry, mapped: &Mapped) -> Result<Value, MappingError> {
    match mapped {
        Mapped::One(message) => render(registry, message, true),
        Mapped::Many(messages) => render_all(registry, messages, true).map(Value::Array),
    }
}

/// Parse a raw document into a message of the named type.
///
/// A `null` body (or `null` primary data) yields `Ok(None)`. Malformed JSON,
/// structural violations, a missing `data` member and collections as primary
/// data are rejected as bad requests.
pub fn parse_document(
    registry: &Registry,
    raw: &str,
    type_name: &str,
) -> Result<Option<Message>, MappingError> {
    let document: Value = serde_json::from_str(raw)
        .map_err(|e| ApiError::bad_request(format!("document is not valid JSON: {}", e)))?;
    if document.is_null() {
        return Ok(None);
    }

    validate_document(&document).map_err(|e| match e {
        ValidateError::Invalid { violations } => {
            let mut meta = Map::new();
            meta.insert("violations".to_string(), json!(violations));
            MappingError::from(ApiError::bad_request("document is malformed").with_meta(meta))
        }
        ValidateError::Schema { message } => MappingError::from(ApiError::internal(message)),
    })?;

    let data = match document.get("data") {
        None => return Err(ApiError::bad_request("document is missing data").into()),
        Some(Value::Null) => return Ok(None),
        Some(Value::Array(_)) => {
            return Err(ApiError::bad_request("expected a single resource as primary data").into())
        }
        Some(data) => data,
    };

    let message = parse_resource(registry, data, type_name)?;
    tracing::debug!(
        message_type = message.type_name(),
        updated = ?message.updated_fields(),
        "parsed document"
    );
    Ok(Some(message))
}

/// Parse one resource object into a message of the named type.
///
/// Every field present in the resource is assigned and marked updated. Fields
/// not mentioned stay untouched. A relationship with `"data": null` is stored
/// as a cleared stub, distinct from an absent relationship.
pub fn parse_resource(
    registry: &Registry,
    resource: &Value,
    type_name: &str,
) -> Result<Message, MappingError> {
    let message_type = registry.lookup(type_name)?.clone();
    let Some(resource) = resource.as_object() else {
        return Err(ApiError::bad_request(format!("{} resource must be an object", type_name)).into());
    };
    let mut message = Message::new(message_type.clone());

    if let Some(id) = resource.get(ID) {
        message.set_id(id.clone())?;
    }

    if let Some(attributes) = resource.get("attributes").and_then(Value::as_object) {
        for attribute in message_type.attributes() {
            if attribute.is_relationship() || attribute.is_id() || attribute.source.is_none() {
                continue;
            }
            match attributes.get(&attribute.name) {
                Some(value) => message.set(&attribute.name, value.clone())?,
                None if attribute.required => return Err(missing_required(type_name, attribute)),
                None => {}
            }
        }
    }

    if let Some(relationships) = resource.get("relationships").and_then(Value::as_object) {
        for (index, attribute) in message_type.attributes().iter().enumerate() {
            let Some(target) = attribute.value_type.target() else {
                continue;
            };
            let Some(entry) = relationships.get(&attribute.name) else {
                if attribute.required {
                    return Err(missing_required(type_name, attribute));
                }
                continue;
            };
            let Some(data) = entry.get("data") else {
                return Err(ApiError::bad_request(format!(
                    "relationship {} of {} has no data",
                    attribute.name, type_name
                ))
                .into());
            };

            let related = if attribute.nested {
                match data {
                    Value::Null => {
                        message.clear_nested(index);
                        continue;
                    }
                    Value::Array(items) => Mapped::Many(
                        items
                            .iter()
                            .map(|item| parse_resource(registry, item, target))
                            .collect::<Result<_, _>>()?,
                    ),
                    item => Mapped::One(parse_resource(registry, item, target)?),
                }
            } else {
                match data {
                    Value::Array(items) => Mapped::Many(
                        items
                            .iter()
                            .map(|item| stub(registry, item, target))
                            .collect::<Result<_, _>>()?,
                    ),
                    item => Mapped::One(stub(registry, item, target)?),
                }
            };
            message.set_related(&attribute.name, related)?;
        }
    }

    Ok(message)
}

/// Message holding only the referenced id. A `null` identifier yields the
/// cleared sentinel.
fn stub(registry: &Registry, identifier: &Value, target: &str) -> Result<Message, MappingError> {
    let mut message = Message::new(registry.lookup(target)?.clone());
    if let Some(id) = identifier.get(ID).filter(|id| !id.is_null()) {
        message.set_id(id.clone())?;
    }
    Ok(message)
}

fn missing_required(type_name: &str, attribute: &AttributeSchema) -> MappingError {
    MappingError::MissingRequired {
        message_type: type_name.to_string(),
        field: attribute.name.clone(),
    }
}

/// Primary data of a document.
#[derive(Debug, Clone, PartialEq)]
pub enum PrimaryData {
    One(Value),
    Many(Vec<Value>),
}

impl PrimaryData {
    fn to_value(&self) -> Value {
        match self {
            PrimaryData::One(resource) => resource.clone(),
            PrimaryData::Many(resources) => Value::Array(resources.clone()),
        }
    }
}

/// A top-level document.
///
/// Holds data or errors but never both, and at least one of data, errors and
/// meta.
#[derive(Debug, Clone)]
pub struct Document {
    data: Option<PrimaryData>,
    errors: Option<Vec<ErrorFragment>>,
    included: Option<Vec<Value>>,
    meta: Option<Map<String, Value>>,
}

impl Document {
    pub fn new(
        data: Option<PrimaryData>,
        errors: Option<Vec<ErrorFragment>>,
        meta: Option<Map<String, Value>>,
    ) -> Result<Self, DocumentError> {
        if data.is_some() && errors.is_some() {
            return Err(DocumentError::DataAndErrors);
        }
        if data.is_none() && errors.is_none() && meta.is_none() {
            return Err(DocumentError::Empty);
        }
        Ok(Self {
            data,
            errors,
            included: None,
            meta,
        })
    }

    pub fn with_data(data: PrimaryData) -> Self {
        Self {
            data: Some(data),
            errors: None,
            included: None,
            meta: None,
        }
    }

    pub fn with_errors(errors: Vec<ErrorFragment>) -> Self {
        Self {
            data: None,
            errors: Some(errors),
            included: None,
            meta: None,
        }
    }

    pub fn with_meta(meta: Map<String, Value>) -> Self {
        Self {
            data: None,
            errors: None,
            included: None,
            meta: Some(meta),
        }
    }

    /// Attach included resources. Empty lists are not rendered.
    pub fn included(mut self, included: Vec<Value>) -> Self {
        self.included = Some(included);
        self
    }

    /// Replace the meta member. An empty map is not rendered.
    pub fn meta(mut self, meta: Map<String, Value>) -> Self {
        self.meta = Some(meta);
        self
    }

    pub fn data(&self) -> Option<&PrimaryData> {
        self.data.as_ref()
    }

    pub fn errors(&self) -> Option<&[ErrorFragment]> {
        self.errors.as_deref()
    }

    pub fn to_value(&self) -> Value {
        let mut document = Map::new();
        if let Some(data) = &self.data {
            document.insert("data".to_string(), data.to_value());
        }
        if let Some(errors) = &self.errors {
            let errors = errors.iter().map(ErrorFragment::to_value).collect();
            document.insert("errors".to_string(), Value::Array(errors));
        }
        if let Some(included) = self.included.as_ref().filter(|i| !i.is_empty()) {
            document.insert("included".to_string(), Value::Array(included.clone()));
        }
        match &self.meta {
            Some(meta) if !meta.is_empty() || document.is_empty() => {
                document.insert("meta".to_string(), Value::Object(meta.clone()));
            }
            _ => {}
        }
        Value::Object(document)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::ObjectRef;
    use crate::error::ErrorKind;
    use crate::mapper::map_object;
    use crate::schema::{MessageType, NestedType};
    use crate::types::{MapOptions, ValueType};
    use std::sync::Arc;

    fn registry() -> Registry {
        let author = MessageType::builder("Author")
            .attribute(AttributeSchema::attribute("id", ValueType::Integer).source("id"))
            .attribute(AttributeSchema::attribute("name", ValueType::String).source("name"))
            .build()
            .unwrap();
        let chapter = MessageType::builder("Chapter")
            .attribute(AttributeSchema::attribute("id", ValueType::Integer).source("id"))
            .attribute(AttributeSchema::attribute("title", ValueType::String).source("title"))
            .build()
            .unwrap();
        let book = MessageType::builder("Book")
            .attribute(AttributeSchema::attribute("id", ValueType::Integer).source("id"))
            .attribute(AttributeSchema::attribute("title", ValueType::String).source("title"))
            .attribute(
                AttributeSchema::attribute("isbn", ValueType::String)
                    .source("isbn")
                    .write_only(true),
            )
            .attribute(
                AttributeSchema::relationship("author", "Author")
                    .source("author")
                    .key_source("author.id"),
            )
            .attribute(
                AttributeSchema::relationship("chapters", "Chapter")
                    .source("chapters")
                    .key_source("chapter_ids")
                    .nested(NestedType::json_object("Chapter")),
            )
            .build()
            .unwrap();
        Registry::builder()
            .message_type(author)
            .message_type(chapter)
            .message_type(book)
            .build()
            .unwrap()
    }

    fn dune() -> ObjectRef {
        Arc::new(json!({
            "id": 7,
            "title": "Dune",
            "isbn": "978-0441013593",
            "author": {"id": 3, "name": "Frank"},
            "chapter_ids": [1],
            "chapters": [{"id": 1, "title": "Prologue"}]
        }))
    }

    #[test]
    fn render_book_with_stubs() {
        let registry = registry();
        let book = dune();
        let message = map_object(&registry, &book, "Book", &MapOptions::new()).unwrap();
        let rendered = render(&registry, &message, false).unwrap();
        assert_eq!(
            rendered,
            json!({
                "id": "7",
                "type": "Book",
                "attributes": {"title": "Dune"},
                "relationships": {
                    "author": {"data": {"type": "Author", "id": "3"}},
                    "chapters": {"data": [{"type": "Chapter", "id": "1"}]}
                }
            })
        );
    }

    #[test]
    fn render_nested_embeds_resources() {
        let registry = registry();
        let book = dune();
        let options = MapOptions::new().nesting(true);
        let message = map_object(&registry, &book, "Book", &options).unwrap();
        let rendered = render(&registry, &message, true).unwrap();
        assert_eq!(
            rendered["relationships"]["chapters"],
            json!({"data": [{"id": "1", "type": "Chapter", "attributes": {"title": "Prologue"}}]})
        );
        assert_eq!(
            rendered["relationships"]["author"],
            json!({"data": {"type": "Author", "id": "3"}})
        );
    }

    #[test]
    fn render_omits_empty_blocks() {
        let registry = registry();
        let author: ObjectRef = Arc::new(json!({"id": 3}));
        let message = map_object(&registry, &author, "Author", &MapOptions::new()).unwrap();
        assert_eq!(
            render(&registry, &message, false).unwrap(),
            json!({"id": "3", "type": "Author"})
        );
    }

    #[test]
    fn parse_partial_document() {
        let registry = registry();
        let message = parse_document(&registry, r#"{"data":{"attributes":{"title":"Dune 2"}}}"#, "Book")
            .unwrap()
            .unwrap();
        assert_eq!(message.value("title"), Some(&json!("Dune 2")));
        assert_eq!(message.updated_fields(), vec!["title"]);
        assert!(message.id().is_none());
    }

    #[test]
    fn parse_relationship_sentinel() {
        let registry = registry();
        let raw = r#"{"data":{"id":"7","type":"Book","relationships":{"author":{"data":null}}}}"#;
        let message = parse_document(&registry, raw, "Book").unwrap().unwrap();
        assert_eq!(message.id(), Some(&json!(7)));
        assert!(message.is_updated("author"));
        assert!(message.is_cleared("author"));
        assert!(!message.is_updated("chapters"));
        assert!(!message.is_cleared("chapters"));

        let rendered = render(&registry, &message, false).unwrap();
        assert_eq!(rendered["relationships"]["author"], json!({"data": null}));
    }

    #[test]
    fn parse_stub_ids_are_coerced() {
        let registry = registry();
        let raw = r#"{"data":{"relationships":{"author":{"data":{"type":"Author","id":"3"}}}}}"#;
        let message = parse_document(&registry, raw, "Book").unwrap().unwrap();
        assert_eq!(message.one("author").unwrap().id(), Some(&json!(3)));
    }

    #[test]
    fn parse_nested_resources() {
        let registry = registry();
        let raw = r#"{"data":{"relationships":{"chapters":{"data":[
            {"id":"1","type":"Chapter","attributes":{"title":"Prologue"}},
            {"id":"2","type":"Chapter","attributes":{"title":"Arrakis"}}
        ]}}}}"#;
        let message = parse_document(&registry, raw, "Book").unwrap().unwrap();
        let chapters = message.many("chapters").unwrap();
        assert_eq!(chapters.len(), 2);
        assert_eq!(chapters[1].value("title"), Some(&json!("Arrakis")));
        assert!(message.is_updated("chapters"));
    }

    #[test]
    fn relationship_without_data_is_bad_request() {
        let registry = registry();
        let resource = json!({"relationships": {"author": {"meta": {}}}});
        let err = parse_resource(&registry, &resource, "Book").unwrap_err();
        assert_eq!(err.as_api().unwrap().kind(), ErrorKind::BadRequest);
    }

    #[test]
    fn nested_message_renders_stubs_without_nesting() {
        let registry = registry();
        let book = dune();
        let options = MapOptions::new().nesting(true);
        let message = map_object(&registry, &book, "Book", &options).unwrap();
        let rendered = render(&registry, &message, false).unwrap();
        assert_eq!(
            rendered["relationships"]["chapters"],
            json!({"data": [{"type": "Chapter", "id": "1"}]})
        );
    }

    #[test]
    fn parse_null_body() {
        let registry = registry();
        assert!(parse_document(&registry, "null", "Book").unwrap().is_none());
    }

    #[test]
    fn parse_rejects_missing_data() {
        let registry = registry();
        let err = parse_document(&registry, r#"{"meta":{}}"#, "Book").unwrap_err();
        assert_eq!(err.as_api().unwrap().kind(), ErrorKind::BadRequest);
    }

    #[test]
    fn parse_rejects_invalid_json() {
        let registry = registry();
        let err = parse_document(&registry, "{not json", "Book").unwrap_err();
        assert_eq!(err.status(), 400);
    }

    #[test]
    fn parse_rejects_malformed_structure() {
        let registry = registry();
        let err = parse_document(&registry, r#"{"data":{"attributes":[1,2]}}"#, "Book").unwrap_err();
        let api = err.as_api().unwrap();
        assert_eq!(api.kind(), ErrorKind::BadRequest);
        assert!(api.meta().unwrap().contains_key("violations"));
    }

    #[test]
    fn parse_unconvertible_attribute() {
        let registry = registry();
        let raw = r#"{"data":{"id":"seven"}}"#;
        let err = parse_document(&registry, raw, "Book").unwrap_err();
        assert!(matches!(err, MappingError::Conversion { .. }));
    }

    #[test]
    fn document_invariants() {
        assert_eq!(
            Document::new(None, None, None).unwrap_err(),
            DocumentError::Empty
        );
        let fragment = ErrorFragment::from_api_error(&ApiError::not_found("book 9"));
        assert_eq!(
            Document::new(Some(PrimaryData::Many(vec![])), Some(vec![fragment]), None).unwrap_err(),
            DocumentError::DataAndErrors
        );
    }

    #[test]
    fn document_member_order() {
        let mut meta = Map::new();
        meta.insert("count".to_string(), json!(1));
        let document = Document::with_data(PrimaryData::Many(vec![json!({"id": "1", "type": "Author"})]))
            .included(vec![json!({"id": "7", "type": "Book"})])
            .meta(meta);
        let text = serde_json::to_string(&document.to_value()).unwrap();
        assert_eq!(
            text,
            r#"{"data":[{"id":"1","type":"Author"}],"included":[{"id":"7","type":"Book"}],"meta":{"count":1}}"#
        );
    }

    #[test]
    fn document_omits_empty_included() {
        let document = Document::with_data(PrimaryData::One(json!({"id": "1", "type": "Author"})))
            .included(vec![]);
        assert!(document.to_value().get("included").is_none());
    }
}
