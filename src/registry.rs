//! Registry of message types.
//!
//! Relationships name their target type; the registry is what resolves those
//! names. Building a registry checks that every target exists and that nested
//! relationships never form a cycle, so nested rendering always terminates.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde_json::{json, Value};

use crate::error::{MappingError, SchemaError};
use crate::schema::{AttributeSchema, MessageType};

/// Read-only collection of message types, shared across threads.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    types: Vec<Arc<MessageType>>,
    index: HashMap<String, usize>,
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    pub fn get(&self, name: &str) -> Option<&Arc<MessageType>> {
        self.index.get(name).map(|&i| &self.types[i])
    }

    /// Look up a type, failing when it is not registered.
    pub fn lookup(&self, name: &str) -> Result<&Arc<MessageType>, MappingError> {
        self.get(name).ok_or_else(|| MappingError::UnknownType {
            name: name.to_string(),
        })
    }

    /// Registered types in registration order.
    pub fn types(&self) -> impl Iterator<Item = &Arc<MessageType>> {
        self.types.iter()
    }

    /// Describe the named types, or every type when `names` is empty.
    ///
    /// The output is an array with one entry per type listing its attributes
    /// and relationships, meant for client-side code generation.
    pub fn describe(&self, names: &[String]) -> Result<Value, MappingError> {
        let selected: Vec<&Arc<MessageType>> = if names.is_empty() {
            self.types.iter().collect()
        } else {
            names
                .iter()
                .map(|name| self.lookup(name))
                .collect::<Result<_, _>>()?
        };

        let described = selected
            .into_iter()
            .map(|message_type| {
                let attributes: Vec<Value> = message_type
                    .attributes()
                    .iter()
                    .filter(|a| !a.is_relationship() && !a.is_id() && a.source.is_some())
                    .map(describe_attribute)
                    .collect();
                let relationships: Vec<Value> = message_type
                    .attributes()
                    .iter()
                    .filter(|a| a.is_relationship())
                    .map(describe_attribute)
                    .collect();
                json!({
                    "type": message_type.name(),
                    "attributes": attributes,
                    "relationships": relationships,
                })
            })
            .collect();

        Ok(Value::Array(described))
    }
}

fn describe_attribute(attribute: &AttributeSchema) -> Value {
    json!({
        "name": attribute.name,
        "value-type": attribute.value_type.name(),
        "is-required": attribute.required,
        "is-read-only": attribute.read_only,
        "is-write-only": attribute.write_only,
    })
}

/// Collects message types and validates the graph between them.
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    types: Vec<MessageType>,
}

impl RegistryBuilder {
    pub fn message_type(mut self, message_type: MessageType) -> Self {
        self.types.push(message_type);
        self
    }

    /// Freeze the registry.
    ///
    /// # Errors
    ///
    /// Returns `SchemaError` on duplicate type names, relationships targeting
    /// unregistered types, or cyclic nested relationships.
    pub fn build(self) -> Result<Registry, SchemaError> {
        let mut index = HashMap::new();
        for (i, message_type) in self.types.iter().enumerate() {
            if index.insert(message_type.name().to_string(), i).is_some() {
                return Err(SchemaError::DuplicateType {
                    name: message_type.name().to_string(),
                });
            }
        }

        for message_type in &self.types {
            for attribute in message_type.attributes() {
                if let Some(target) = attribute.value_type.target() {
                    if !index.contains_key(target) {
                        return Err(SchemaError::UnknownTarget {
                            message_type: message_type.name().to_string(),
                            attribute: attribute.name.clone(),
                            target: target.to_string(),
                        });
                    }
                }
            }
        }

        check_nested_cycles(&self.types)?;

        tracing::debug!(types = self.types.len(), "registry built");
        Ok(Registry {
            types: self.types.into_iter().map(Arc::new).collect(),
            index,
        })
    }
}

#[derive(Clone, Copy, PartialEq)]
enum Mark {
    Visiting,
    Done,
}

/// Depth-first search over nested edges only.
fn check_nested_cycles(types: &[MessageType]) -> Result<(), SchemaError> {
    let edges: BTreeMap<&str, Vec<&str>> = types
        .iter()
        .map(|t| {
            let targets = t
                .attributes()
                .iter()
                .filter(|a| a.nested)
                .filter_map(|a| a.value_type.target())
                .collect();
            (t.name(), targets)
        })
        .collect();

    let mut marks: HashMap<&str, Mark> = HashMap::new();
    let mut stack: Vec<&str> = Vec::new();
    for name in edges.keys() {
        visit(*name, &edges, &mut marks, &mut stack)?;
    }
    Ok(())
}

fn visit<'a>(
    name: &'a str,
    edges: &BTreeMap<&'a str, Vec<&'a str>>,
    marks: &mut HashMap<&'a str, Mark>,
    stack: &mut Vec<&'a str>,
) -> Result<(), SchemaError> {
    match marks.get(name) {
        Some(Mark::Done) => return Ok(()),
        Some(Mark::Visiting) => {
            let start = stack.iter().position(|n| *n == name).unwrap_or(0);
            let mut cycle: Vec<String> = stack[start..].iter().map(|n| n.to_string()).collect();
            cycle.push(name.to_string());
            return Err(SchemaError::NestedCycle { cycle });
        }
        None => {}
    }

    marks.insert(name, Mark::Visiting);
    stack.push(name);
    for target in edges.get(name).into_iter().flatten() {
        visit(*target, edges, marks, stack)?;
    }
    stack.pop();
    marks.insert(name, Mark::Done);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::NestedType;
    use crate::types::ValueType;

    fn id() -> AttributeSchema {
        AttributeSchema::attribute("id", ValueType::Integer).source("id")
    }

    fn author() -> MessageType {
        MessageType::builder("Author")
            .attribute(id())
            .attribute(
                AttributeSchema::attribute("name", ValueType::String)
                    .source("name")
                    .required(true),
            )
            .attribute(
                AttributeSchema::attribute("password", ValueType::String)
                    .source("password")
                    .write_only(true),
            )
            .attribute(AttributeSchema::relationship("books", "Book").key_source("book_ids"))
            .build()
            .unwrap()
    }

    fn book() -> MessageType {
        MessageType::builder("Book")
            .attribute(id())
            .attribute(AttributeSchema::attribute("title", ValueType::String).source("title"))
            .attribute(
                AttributeSchema::relationship("author", "Author")
                    .source("author")
                    .key_source("author.id"),
            )
            .build()
            .unwrap()
    }

    fn nested_to(name: &str, target: &str) -> MessageType {
        MessageType::builder(name)
            .attribute(id())
            .attribute(
                AttributeSchema::relationship("child", target)
                    .source("child")
                    .nested(NestedType::json_object(target)),
            )
            .build()
            .unwrap()
    }

    #[test]
    fn lookup_registered_types() {
        let registry = Registry::builder()
            .message_type(author())
            .message_type(book())
            .build()
            .unwrap();
        assert_eq!(registry.lookup("Book").unwrap().name(), "Book");
        assert!(matches!(
            registry.lookup("Chapter"),
            Err(MappingError::UnknownType { name }) if name == "Chapter"
        ));
        let names: Vec<&str> = registry.types().map(|t| t.name()).collect();
        assert_eq!(names, vec!["Author", "Book"]);
    }

    #[test]
    fn duplicate_type_rejected() {
        let result = Registry::builder()
            .message_type(book())
            .message_type(book())
            .message_type(author())
            .build();
        assert!(matches!(result, Err(SchemaError::DuplicateType { name }) if name == "Book"));
    }

    #[test]
    fn unknown_target_rejected() {
        let result = Registry::builder().message_type(book()).build();
        assert!(matches!(
            result,
            Err(SchemaError::UnknownTarget { target, .. }) if target == "Author"
        ));
    }

    #[test]
    fn plain_relationship_cycles_are_allowed() {
        let result = Registry::builder()
            .message_type(author())
            .message_type(book())
            .build();
        assert!(result.is_ok());
    }

    #[test]
    fn nested_cycle_rejected() {
        let result = Registry::builder()
            .message_type(nested_to("A", "B"))
            .message_type(nested_to("B", "A"))
            .build();
        match result {
            Err(SchemaError::NestedCycle { cycle }) => {
                assert_eq!(cycle, vec!["A", "B", "A"]);
            }
            other => panic!("expected cycle, got {:?}", other),
        }
    }

    #[test]
    fn nested_self_reference_rejected() {
        let result = Registry::builder().message_type(nested_to("A", "A")).build();
        assert!(matches!(result, Err(SchemaError::NestedCycle { .. })));
    }

    #[test]
    fn describe_lists_attributes_and_relationships() {
        let registry = Registry::builder()
            .message_type(author())
            .message_type(book())
            .build()
            .unwrap();
        let described = registry.describe(&["Author".to_string()]).unwrap();
        assert_eq!(
            described,
            json!([{
                "type": "Author",
                "attributes": [
                    {"name": "name", "value-type": "string", "is-required": true,
                     "is-read-only": false, "is-write-only": false},
                    {"name": "password", "value-type": "string", "is-required": false,
                     "is-read-only": false, "is-write-only": true}
                ],
                "relationships": [
                    {"name": "books", "value-type": "Book", "is-required": false,
                     "is-read-only": false, "is-write-only": false}
                ]
            }])
        );
    }

    #[test]
    fn describe_all_and_unknown() {
        let registry = Registry::builder()
            .message_type(author())
            .message_type(book())
            .build()
            .unwrap();
        let all = registry.describe(&[]).unwrap();
        assert_eq!(all.as_array().unwrap().len(), 2);
        assert!(registry.describe(&["Chapter".to_string()]).is_err());
    }
}
