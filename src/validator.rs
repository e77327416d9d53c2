//! Structural validation of incoming documents.

use serde_json::{json, Value};

use crate::error::{ValidateError, Violation};

/// Shape every incoming top-level document must have.
///
/// Only structure is checked here. Field-level rules (required attributes,
/// value types) are enforced while parsing against a message type.
pub fn document_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "data": {
                "oneOf": [
                    { "type": "null" },
                    { "$ref": "#/$defs/resource" },
                    { "type": "array", "items": { "$ref": "#/$defs/resource" } }
                ]
            },
            "errors": { "type": "array", "items": { "type": "object" } },
            "included": { "type": "array", "items": { "$ref": "#/$defs/resource" } },
            "meta": { "type": "object" }
        },
        "not": { "required": ["data", "errors"] },
        "$defs": {
            "identifier": { "type": ["string", "integer", "null"] },
            "resource": {
                "type": "object",
                "properties": {
                    "id": { "$ref": "#/$defs/identifier" },
                    "type": { "type": "string" },
                    "attributes": { "type": "object" },
                    "relationships": {
                        "type": "object",
                        "additionalProperties": { "$ref": "#/$defs/relationship" }
                    }
                }
            },
            "relationship": {
                "type": "object",
                "required": ["data"],
                "properties": {
                    "data": {
                        "oneOf": [
                            { "type": "null" },
                            { "type": "object" },
                            { "type": "array", "items": { "type": "object" } }
                        ]
                    }
                }
            }
        }
    })
}

/// Validate a document against [`document_schema`].
///
/// # Errors
///
/// Returns `ValidateError::Invalid` listing every violation.
pub fn validate_document(document: &Value) -> Result<(), ValidateError> {
    validate_against_schema(&document_schema(), document)
}

/// Validate a payload against an arbitrary JSON Schema.
pub fn validate_against_schema(schema: &Value, payload: &Value) -> Result<(), ValidateError> {
    let validator = jsonschema::validator_for(schema).map_err(|e| ValidateError::Schema {
        message: e.to_string(),
    })?;

    let violations: Vec<Violation> = validator
        .iter_errors(payload)
        .map(|e| Violation {
            path: e.instance_path.to_string(),
            message: e.to_string(),
        })
        .collect();

    if violations.is_empty() {
        Ok(())
    } else {
        Err(ValidateError::Invalid { violations })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_single_resource() {
        let document = json!({
            "data": {
                "id": "7",
                "type": "Book",
                "attributes": { "title": "Dune" },
                "relationships": { "author": { "data": { "type": "Author", "id": "3" } } }
            }
        });
        assert!(validate_document(&document).is_ok());
    }

    #[test]
    fn validate_partial_resource_without_type() {
        let document = json!({ "data": { "attributes": { "title": "Dune 2" } } });
        assert!(validate_document(&document).is_ok());
    }

    #[test]
    fn validate_cleared_relationship() {
        let document = json!({ "data": { "relationships": { "author": { "data": null } } } });
        assert!(validate_document(&document).is_ok());
    }

    #[test]
    fn validate_rejects_data_with_errors() {
        let document = json!({ "data": null, "errors": [] });
        assert!(matches!(
            validate_document(&document),
            Err(ValidateError::Invalid { .. })
        ));
    }

    #[test]
    fn validate_rejects_relationship_without_data() {
        let document = json!({ "data": { "relationships": { "author": { "id": "3" } } } });
        match validate_document(&document) {
            Err(ValidateError::Invalid { violations }) => {
                assert!(!violations.is_empty());
                assert!(violations[0].path.starts_with("/data"));
            }
            other => panic!("expected violations, got {:?}", other),
        }
    }

    #[test]
    fn validate_wrong_attribute_shape() {
        let document = json!({ "data": { "attributes": "title" } });
        assert!(matches!(
            validate_document(&document),
            Err(ValidateError::Invalid { .. })
        ));
    }

    #[test]
    fn invalid_schema_reported() {
        let schema = json!({ "type": 12 });
        let result = validate_against_schema(&schema, &json!({}));
        assert!(matches!(result, Err(ValidateError::Schema { .. })));
    }
}
