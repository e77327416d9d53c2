//! Collection of included resources.
//!
//! Walks the relationship graph of mapped messages and returns the flattened
//! set of related resource objects. Entries are compared structurally, so a
//! resource referenced from several roots appears once.

use serde_json::Value;

use crate::document::render;
use crate::error::{ApiError, MappingError};
use crate::mapper::map_related;
use crate::message::{Message, SlotValue};
use crate::registry::Registry;
use crate::types::MapOptions;

/// Resolve the included resources of the given root messages.
///
/// Every root must have been mapped from a backend object that is still alive.
/// With `nesting`, resources embedded through nested relationships are
/// included as well, at every depth.
pub fn resolve_included(
    registry: &Registry,
    roots: &[Message],
    nesting: bool,
) -> Result<Vec<Value>, MappingError> {
    let mut included = Included::default();
    for root in roots {
        collect_related(registry, root, nesting, &mut included)?;
        if nesting {
            collect_nested(registry, root, &mut included)?;
        }
    }
    tracing::debug!(count = included.items.len(), "collected included resources");
    Ok(included.items)
}

#[derive(Default)]
struct Included {
    items: Vec<Value>,
}

impl Included {
    fn push(&mut self, resource: Value) {
        if !self.items.contains(&resource) {
            self.items.push(resource);
        }
    }
}

/// Plain relationships of one message: every related object, mapped unnested.
fn collect_related(
    registry: &Registry,
    message: &Message,
    nesting: bool,
    included: &mut Included,
) -> Result<(), MappingError> {
    let object = message.source().ok_or_else(|| MappingError::SourceUnavailable {
        message_type: message.type_name().to_string(),
    })?;

    for attribute in message.message_type().attributes() {
        let Some(target) = attribute.value_type.target() else {
            continue;
        };
        if attribute.write_only || (attribute.nested && nesting) {
            continue;
        }
        let Some(source) = &attribute.source else {
            continue;
        };

        let Some(node) = source.read(object.as_ref()) else {
            if attribute.required {
                return Err(ApiError::internal(format!(
                    "path of {}.{} returned nothing",
                    message.type_name(),
                    attribute.name
                ))
                .into());
            }
            continue;
        };
        let related = node.into_related().map_err(|actual| MappingError::TypeMismatch {
            message_type: message.type_name().to_string(),
            field: attribute.name.clone(),
            expected: target.to_string(),
            actual: actual.to_string(),
        })?;

        let mapped = map_related(registry, &related, target, &MapOptions::new())?;
        for related in mapped.iter() {
            included.push(render(registry, related, false)?);
        }
    }
    Ok(())
}

/// Nested relationships of one message, recursively.
fn collect_nested(
    registry: &Registry,
    message: &Message,
    included: &mut Included,
) -> Result<(), MappingError> {
    for (attribute, slot) in message.message_type().attributes().iter().zip(message.slots()) {
        if !attribute.nested {
            continue;
        }
        let SlotValue::Messages(mapped) = &slot.value else {
            continue;
        };

        for nested in mapped.iter() {
            included.push(render(registry, nested, true)?);
            collect_nested(registry, nested, included)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::ObjectRef;
    use crate::mapper::{map_object, map_objects};
    use crate::schema::{AttributeSchema, MessageType, NestedType};
    use crate::types::ValueType;
    use serde_json::json;
    use std::sync::Arc;

    fn registry() -> Registry {
        let author = MessageType::builder("Author")
            .attribute(AttributeSchema::attribute("id", ValueType::Integer).source("id"))
            .attribute(AttributeSchema::attribute("name", ValueType::String).source("name"))
            .build()
            .unwrap();
        let note = MessageType::builder("Note")
            .attribute(AttributeSchema::attribute("id", ValueType::Integer).source("id"))
            .attribute(AttributeSchema::attribute("text", ValueType::String).source("text"))
            .build()
            .unwrap();
        let chapter = MessageType::builder("Chapter")
            .attribute(AttributeSchema::attribute("id", ValueType::Integer).source("id"))
            .attribute(
                AttributeSchema::relationship("notes", "Note")
                    .source("notes")
                    .key_source("note_ids")
                    .nested(NestedType::json_object("Note")),
            )
            .build()
            .unwrap();
        let book = MessageType::builder("Book")
            .attribute(AttributeSchema::attribute("id", ValueType::Integer).source("id"))
            .attribute(AttributeSchema::attribute("title", ValueType::String).source("title"))
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
            .message_type(note)
            .message_type(chapter)
            .message_type(book)
            .build()
            .unwrap()
    }

    fn book(id: i64, title: &str) -> ObjectRef {
        Arc::new(json!({
            "id": id,
            "title": title,
            "author": {"id": 3, "name": "Frank"},
            "chapter_ids": [1],
            "chapters": [{"id": 1, "note_ids": [5], "notes": [{"id": 5, "text": "spice"}]}]
        }))
    }

    #[test]
    fn includes_related_author_once() {
        let registry = registry();
        let books = vec![book(7, "Dune"), book(8, "Dune Messiah")];
        let messages = map_objects(&registry, &books, "Book", &MapOptions::new()).unwrap();
        let included = resolve_included(&registry, &messages, false).unwrap();

        let authors: Vec<&Value> = included.iter().filter(|r| r["type"] == "Author").collect();
        assert_eq!(authors.len(), 1);
        assert_eq!(
            authors[0],
            &json!({"id": "3", "type": "Author", "attributes": {"name": "Frank"}})
        );
        // without nesting, chapters are ordinary relationships
        assert_eq!(included.iter().filter(|r| r["type"] == "Chapter").count(), 1);
    }

    #[test]
    fn nesting_includes_every_depth() {
        let registry = registry();
        let object = book(7, "Dune");
        let options = MapOptions::new().nesting(true);
        let message = map_object(&registry, &object, "Book", &options).unwrap();
        let included = resolve_included(&registry, &[message], true).unwrap();

        let types: Vec<&str> = included.iter().filter_map(|r| r["type"].as_str()).collect();
        assert_eq!(types, vec!["Author", "Chapter", "Note"]);
        assert_eq!(
            included[1]["relationships"]["notes"]["data"][0]["attributes"]["text"],
            "spice"
        );
    }

    #[test]
    fn dropped_source_is_reported() {
        let registry = registry();
        let object = book(7, "Dune");
        let message = map_object(&registry, &object, "Book", &MapOptions::new()).unwrap();
        drop(object);
        let err = resolve_included(&registry, &[message], false).unwrap_err();
        assert!(matches!(err, MappingError::SourceUnavailable { .. }));
    }

    #[test]
    fn missing_optional_relationship_is_skipped() {
        let registry = registry();
        let object: ObjectRef = Arc::new(json!({"id": 9, "title": "Untitled"}));
        let message = map_object(&registry, &object, "Book", &MapOptions::new()).unwrap();
        assert!(resolve_included(&registry, &[message], false).unwrap().is_empty());
    }
}
