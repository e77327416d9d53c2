//! Boundary layer turning handler results into reply documents.
//!
//! A [`Responder`] wraps a handler that returns backend objects, maps and
//! renders them, and converts failures into error documents. Transport
//! concerns stay outside: integrators observe replies through hooks.

use std::error::Error;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::backend::ObjectRef;
use crate::document::{render, render_all, Document, PrimaryData};
use crate::error::MappingError;
use crate::fragment::ErrorFragment;
use crate::included::resolve_included;
use crate::mapper::{map_object, map_objects};
use crate::registry::Registry;
use crate::types::MapOptions;

/// Backend object(s) a handler wants to send.
#[derive(Debug, Clone)]
pub enum ResponseData {
    One(ObjectRef),
    Many(Vec<ObjectRef>),
}

/// Successful handler result.
#[derive(Debug, Clone)]
pub struct Response {
    pub data: ResponseData,
    /// Message type the data is mapped with.
    pub message_type: String,
    /// Merged over the configured meta.
    pub meta: Option<Map<String, Value>>,
    /// Overrides [`ResponderConfig::include_relationships`] for this response.
    pub include_relationships: Option<bool>,
}

impl Response {
    pub fn one(object: ObjectRef, message_type: impl Into<String>) -> Self {
        Self::new(ResponseData::One(object), message_type)
    }

    pub fn many(objects: Vec<ObjectRef>, message_type: impl Into<String>) -> Self {
        Self::new(ResponseData::Many(objects), message_type)
    }

    fn new(data: ResponseData, message_type: impl Into<String>) -> Self {
        Self {
            data,
            message_type: message_type.into(),
            meta: None,
            include_relationships: None,
        }
    }

    pub fn meta(mut self, meta: Map<String, Value>) -> Self {
        self.meta = Some(meta);
        self
    }

    pub fn include_relationships(mut self, include: bool) -> Self {
        self.include_relationships = Some(include);
        self
    }
}

/// Responder settings, loadable from a JSON config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResponderConfig {
    /// Status reported for successful replies with a body.
    pub success_status: u16,
    pub include_relationships: bool,
    pub nesting: bool,
    /// Attach the error chain to error fragments. Leave off in production.
    pub include_traceback: bool,
    /// Meta sent with every reply.
    pub meta: Option<Map<String, Value>>,
}

impl Default for ResponderConfig {
    fn default() -> Self {
        Self {
            success_status: 200,
            include_relationships: false,
            nesting: false,
            include_traceback: false,
            meta: None,
        }
    }
}

/// Status and body handed back to the transport layer.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub status: u16,
    /// `None` for 204 replies.
    pub body: Option<Value>,
}

type BeforeSendHook = Box<dyn Fn(u16, Option<&Value>, Option<&Response>) + Send + Sync>;
type ErrorHook = Box<dyn Fn(u16, &ErrorFragment, &str) + Send + Sync>;
type CacheReadHook = Box<dyn Fn(&Response) -> Option<Value> + Send + Sync>;
type CacheWriteHook = Box<dyn Fn(&Response, &Value) + Send + Sync>;

/// Maps handler results into documents and invokes the configured hooks.
pub struct Responder {
    registry: Arc<Registry>,
    config: ResponderConfig,
    before_send: Option<BeforeSendHook>,
    error: Option<ErrorHook>,
    cache_read: Option<CacheReadHook>,
    cache_write: Option<CacheWriteHook>,
}

impl fmt::Debug for Responder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Responder")
            .field("config", &self.config)
            .field("before_send", &self.before_send.is_some())
            .field("error", &self.error.is_some())
            .field("cache_read", &self.cache_read.is_some())
            .field("cache_write", &self.cache_write.is_some())
            .finish()
    }
}

impl Responder {
    pub fn new(registry: Arc<Registry>, config: ResponderConfig) -> Self {
        Self {
            registry,
            config,
            before_send: None,
            error: None,
            cache_read: None,
            cache_write: None,
        }
    }

    /// Called with `(status, document, response)` right before a reply leaves.
    pub fn on_before_send<F>(mut self, hook: F) -> Self
    where
        F: Fn(u16, Option<&Value>, Option<&Response>) + Send + Sync + 'static,
    {
        self.before_send = Some(Box::new(hook));
        self
    }

    /// Called with `(status, fragment, trace)` for every failure.
    pub fn on_error<F>(mut self, hook: F) -> Self
    where
        F: Fn(u16, &ErrorFragment, &str) + Send + Sync + 'static,
    {
        self.error = Some(Box::new(hook));
        self
    }

    /// May return a previously rendered document, skipping mapping entirely.
    pub fn on_cache_read<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Response) -> Option<Value> + Send + Sync + 'static,
    {
        self.cache_read = Some(Box::new(hook));
        self
    }

    /// Called with every freshly rendered document.
    pub fn on_cache_write<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Response, &Value) + Send + Sync + 'static,
    {
        self.cache_write = Some(Box::new(hook));
        self
    }

    pub fn config(&self) -> &ResponderConfig {
        &self.config
    }

    /// Run a handler and turn its result into a reply.
    ///
    /// `Ok(None)` becomes an empty 204 reply. Errors never escape: they are
    /// rendered as an error document carrying the fragment's status.
    pub fn respond<F, E>(&self, handler: F) -> Reply
    where
        F: FnOnce() -> Result<Option<Response>, E>,
        E: Error + 'static,
    {
        match handler() {
            Ok(None) => {
                tracing::debug!("handler returned nothing to map");
                self.before_send(204, None, None);
                Reply {
                    status: 204,
                    body: None,
                }
            }
            Ok(Some(response)) => match self.render(&response) {
                Ok(document) => {
                    let status = self.config.success_status;
                    self.before_send(status, Some(&document), Some(&response));
                    Reply {
                        status,
                        body: Some(document),
                    }
                }
                Err(e) => self.error_reply(&e),
            },
            Err(e) => self.error_reply(&e),
        }
    }

    /// Map and render a response, consulting the cache hooks.
    pub fn render(&self, response: &Response) -> Result<Value, MappingError> {
        if let Some(cached) = self.cache_read.as_ref().and_then(|hook| hook(response)) {
            tracing::debug!(message_type = %response.message_type, "returning cached document");
            return Ok(cached);
        }

        let include = response
            .include_relationships
            .unwrap_or(self.config.include_relationships);
        let nesting = self.config.nesting;
        let options = MapOptions::new().nesting(nesting);
        let registry = &self.registry;
        let type_name = response.message_type.as_str();

        let (data, messages) = match &response.data {
            ResponseData::One(object) => {
                let message = map_object(registry, object, type_name, &options)?;
                (PrimaryData::One(render(registry, &message, nesting)?), vec![message])
            }
            ResponseData::Many(objects) => {
                let messages = map_objects(registry, objects, type_name, &options)?;
                (PrimaryData::Many(render_all(registry, &messages, nesting)?), messages)
            }
        };

        let mut document = Document::with_data(data);
        if include {
            document = document.included(resolve_included(registry, &messages, nesting)?);
        }
        let meta = self.merged_meta(response.meta.as_ref());
        if !meta.is_empty() {
            document = document.meta(meta);
        }

        let rendered = document.to_value();
        if let Some(hook) = &self.cache_write {
            hook(response, &rendered);
        }
        tracing::debug!(message_type = type_name, "rendered response document");
        Ok(rendered)
    }

    /// Reply describing the named message types, or all of them.
    pub fn describe(&self, names: &[String]) -> Reply {
        match self.registry.describe(names) {
            Ok(described) => {
                let mut meta = Map::new();
                meta.insert("message-types".to_string(), described);
                let document = Document::with_meta(meta).to_value();
                let status = self.config.success_status;
                self.before_send(status, Some(&document), None);
                Reply {
                    status,
                    body: Some(document),
                }
            }
            Err(e) => self.error_reply(&e),
        }
    }

    fn merged_meta(&self, extra: Option<&Map<String, Value>>) -> Map<String, Value> {
        let mut meta = self.config.meta.clone().unwrap_or_default();
        if let Some(extra) = extra {
            meta.extend(extra.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        meta
    }

    fn error_reply(&self, error: &(dyn Error + 'static)) -> Reply {
        let trace = error_chain(error);
        let mut fragment = ErrorFragment::from_error(error);
        if self.config.include_traceback {
            fragment = fragment.with_traceback(trace.clone());
        }
        let status = fragment.status();
        tracing::error!(status, id = %fragment.id, error = %trace, "request failed");

        if let Some(hook) = &self.error {
            hook(status, &fragment, &trace);
        }

        let mut document = Document::with_errors(vec![fragment]);
        if let Some(meta) = self.config.meta.clone() {
            document = document.meta(meta);
        }
        Reply {
            status,
            body: Some(document.to_value()),
        }
    }

    fn before_send(&self, status: u16, document: Option<&Value>, response: Option<&Response>) {
        if let Some(hook) = &self.before_send {
            hook(status, document, response);
        }
    }
}

/// Render an error and its sources, one per line.
pub fn error_chain(error: &(dyn Error + 'static)) -> String {
    let mut trace = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        trace.push_str("\ncaused by: ");
        trace.push_str(&cause.to_string());
        source = cause.source();
    }
    trace
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ApiError;
    use crate::schema::{AttributeSchema, MessageType};
    use crate::types::ValueType;
    use serde_json::json;
    use std::sync::Mutex;

    fn registry() -> Arc<Registry> {
        let author = MessageType::builder("Author")
            .attribute(AttributeSchema::attribute("id", ValueType::Integer).source("id"))
            .attribute(
                AttributeSchema::attribute("name", ValueType::String)
                    .source("name")
                    .required(true),
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
            .build()
            .unwrap();
        Arc::new(
            Registry::builder()
                .message_type(author)
                .message_type(book)
                .build()
                .unwrap(),
        )
    }

    fn dune() -> ObjectRef {
        Arc::new(json!({"id": 7, "title": "Dune", "author": {"id": 3, "name": "Frank"}}))
    }

    #[test]
    fn no_content_reply() {
        let statuses = Arc::new(Mutex::new(Vec::new()));
        let seen = statuses.clone();
        let responder = Responder::new(registry(), ResponderConfig::default()).on_before_send(
            move |status, document, response| {
                assert!(document.is_none() && response.is_none());
                seen.lock().unwrap().push(status);
            },
        );
        let reply = responder.respond(|| Ok::<_, ApiError>(None));
        assert_eq!(reply, Reply { status: 204, body: None });
        assert_eq!(*statuses.lock().unwrap(), vec![204]);
    }

    #[test]
    fn renders_data_included_and_meta() {
        let mut config_meta = Map::new();
        config_meta.insert("version".to_string(), json!("1"));
        let config = ResponderConfig {
            include_relationships: true,
            meta: Some(config_meta),
            ..ResponderConfig::default()
        };
        let responder = Responder::new(registry(), config);

        let book = dune();
        let mut meta = Map::new();
        meta.insert("count".to_string(), json!(1));
        let reply = responder.respond(|| Ok::<_, ApiError>(Some(Response::one(book.clone(), "Book").meta(meta))));

        assert_eq!(reply.status, 200);
        let body = reply.body.unwrap();
        assert_eq!(body["data"]["id"], "7");
        assert_eq!(body["included"][0]["attributes"]["name"], "Frank");
        assert_eq!(body["meta"], json!({"version": "1", "count": 1}));
        // configured meta is left alone
        assert_eq!(responder.config().meta.as_ref().unwrap().len(), 1);
    }

    #[test]
    fn response_can_disable_included() {
        let config = ResponderConfig {
            include_relationships: true,
            ..ResponderConfig::default()
        };
        let responder = Responder::new(registry(), config);
        let book = dune();
        let reply = responder.respond(|| {
            Ok::<_, ApiError>(Some(Response::one(book.clone(), "Book").include_relationships(false)))
        });
        assert!(reply.body.unwrap().get("included").is_none());
    }

    #[test]
    fn cache_hooks() {
        let writes = Arc::new(Mutex::new(0));
        let counter = writes.clone();
        let responder = Responder::new(registry(), ResponderConfig::default())
            .on_cache_read(|response| {
                (response.message_type == "Author").then(|| json!({"data": "cached"}))
            })
            .on_cache_write(move |_, _| *counter.lock().unwrap() += 1);

        let book = dune();
        responder.respond(|| Ok::<_, ApiError>(Some(Response::one(book.clone(), "Book"))));
        assert_eq!(*writes.lock().unwrap(), 1);

        let author: ObjectRef = Arc::new(json!({"id": 3, "name": "Frank"}));
        let reply = responder.respond(|| Ok::<_, ApiError>(Some(Response::one(author.clone(), "Author"))));
        assert_eq!(reply.body.unwrap(), json!({"data": "cached"}));
        assert_eq!(*writes.lock().unwrap(), 1);
    }

    #[test]
    fn handler_error_becomes_error_document() {
        let hooked = Arc::new(Mutex::new(None));
        let seen = hooked.clone();
        let responder = Responder::new(registry(), ResponderConfig::default())
            .on_error(move |status, fragment, _| {
                *seen.lock().unwrap() = Some((status, fragment.code.clone()));
            });
        let reply = responder.respond(|| Err::<Option<Response>, _>(ApiError::not_found("book 9")));

        assert_eq!(reply.status, 404);
        let body = reply.body.unwrap();
        assert_eq!(body["errors"][0]["status"], "404");
        assert!(body["errors"][0].get("meta").is_none());
        assert_eq!(*hooked.lock().unwrap(), Some((404, "404".to_string())));
    }

    #[test]
    fn mapping_failure_is_generic_500() {
        let responder = Responder::new(registry(), ResponderConfig::default());
        let author: ObjectRef = Arc::new(json!({"id": 3}));
        let reply = responder.respond(|| Ok::<_, ApiError>(Some(Response::one(author.clone(), "Author"))));
        assert_eq!(reply.status, 500);
        let body = reply.body.unwrap();
        assert_eq!(body["errors"][0]["title"], "Internal Server Error");
        assert_eq!(body["errors"][0]["detail"], "missing required field name of Author");
    }

    #[test]
    fn traceback_only_when_enabled() {
        let config = ResponderConfig {
            include_traceback: true,
            ..ResponderConfig::default()
        };
        let responder = Responder::new(registry(), config);
        let reply = responder.respond(|| Err::<Option<Response>, _>(ApiError::forbidden("no")));
        let body = reply.body.unwrap();
        assert!(body["errors"][0]["meta"]["traceback"]
            .as_str()
            .unwrap()
            .contains("no"));
    }

    #[test]
    fn describe_reply() {
        let responder = Responder::new(registry(), ResponderConfig::default());
        let reply = responder.describe(&["Author".to_string()]);
        assert_eq!(reply.status, 200);
        let body = reply.body.unwrap();
        assert_eq!(body["meta"]["message-types"][0]["type"], "Author");

        let reply = responder.describe(&["Magazine".to_string()]);
        assert_eq!(reply.status, 500);
        assert!(reply.body.unwrap()["errors"].is_array());
    }

    #[test]
    fn config_from_json_uses_defaults() {
        let config: ResponderConfig = serde_json::from_str(r#"{"nesting": true}"#).unwrap();
        assert!(config.nesting);
        assert_eq!(config.success_status, 200);
        assert!(!config.include_traceback);
    }

    #[test]
    fn error_chain_lists_sources() {
        let err = crate::error::SchemaError::ReadError {
            path: "types.json".into(),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        let chain = error_chain(&err);
        assert!(chain.starts_with("cannot read types.json"));
        assert!(chain.ends_with("caused by: denied"));
    }
}
