//! JSON:API Mapper
//!
//! Bidirectional mapping between backend objects and JSON:API documents.
//!
//! Message types are declared once as ordered lists of attribute schemas.
//! Backend objects are read through the [`Backend`] trait, mapped into
//! [`Message`] instances, and rendered as resource objects with relationship
//! stubs, embedded (nested) resources and a de-duplicated `included` set.
//! In the other direction, incoming documents are parsed into messages that
//! remember which fields were sent, so only those are written back.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use jsonapi_mapper::{
//!     map_object, parse_document, render, resolve_included, update_object, AttributeSchema,
//!     MapOptions, MessageType, ObjectRef, Registry, ValueType,
//! };
//! use serde_json::json;
//!
//! let registry = Registry::builder()
//!     .message_type(
//!         MessageType::builder("Author")
//!             .attribute(AttributeSchema::attribute("id", ValueType::Integer).source("id"))
//!             .attribute(AttributeSchema::attribute("name", ValueType::String).source("name"))
//!             .build()?,
//!     )
//!     .message_type(
//!         MessageType::builder("Book")
//!             .attribute(AttributeSchema::attribute("id", ValueType::Integer).source("id"))
//!             .attribute(AttributeSchema::attribute("title", ValueType::String).source("title"))
//!             .attribute(
//!                 AttributeSchema::relationship("author", "Author")
//!                     .source("author")
//!                     .key_source("author.id"),
//!             )
//!             .build()?,
//!     )
//!     .build()?;
//!
//! let book: ObjectRef = Arc::new(json!({"id": 7, "title": "Dune", "author": {"id": 3, "name": "Frank"}}));
//! let message = map_object(&registry, &book, "Book", &MapOptions::new())?;
//!
//! let data = render(&registry, &message, false)?;
//! assert_eq!(data["relationships"]["author"], json!({"data": {"type": "Author", "id": "3"}}));
//!
//! let included = resolve_included(&registry, &[message], false)?;
//! assert_eq!(included[0]["attributes"]["name"], "Frank");
//!
//! // Partial update: only the title is written back.
//! let patch = parse_document(&registry, r#"{"data":{"attributes":{"title":"Dune 2"}}}"#, "Book")?
//!     .expect("document has data");
//! let updated = update_object(&patch, json!({"id": 7, "title": "Dune", "author": {"id": 3}}))?;
//! assert_eq!(updated, json!({"id": 7, "title": "Dune 2", "author": {"id": 3}}));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Visibility Rules
//!
//! | Flag | Rendering | Writing back |
//! |------|-----------|--------------|
//! | `read_only` | Rendered | Never written |
//! | `write_only` | Never rendered | Written when updated |
//! | (none) | Rendered | Written when updated |

mod backend;
mod document;
mod error;
mod fragment;
mod included;
mod loader;
mod mapper;
mod message;
mod registry;
mod responder;
mod schema;
mod types;
mod validator;
mod writer;

pub use backend::{parent_mut, read_path, split_path, Backend, Node, ObjectRef, Related};
pub use document::{parse_document, parse_resource, render, render_all, Document, PrimaryData};
pub use error::{
    ApiError, DocumentError, ErrorKind, MappingError, SchemaError, ValidateError, Violation,
    INTERNAL_ERROR_CODE,
};
pub use fragment::ErrorFragment;
pub use included::resolve_included;
pub use loader::{
    is_url, load_json, load_json_auto, load_json_str, load_registry, load_registry_auto,
    load_registry_str, read_file, AttributeDefinition, Definitions, TypeDefinition,
};
pub use mapper::{map_object, map_objects, map_related};
pub use message::{Mapped, Message};
pub use registry::{Registry, RegistryBuilder};
pub use responder::{
    error_chain, Reply, Responder, ResponderConfig, Response, ResponseData,
};
pub use schema::{AttributeSchema, MessageType, MessageTypeBuilder, NestedType, Source};
pub use types::{id_string, json_type_name, MapOptions, ValueType, ID};
pub use validator::{document_schema, validate_against_schema, validate_document};
pub use writer::{apply_updates, update_object};

#[cfg(feature = "remote")]
pub use loader::{load_json_url, load_registry_url};

#[cfg(feature = "parallel")]
pub use mapper::map_objects_parallel;
