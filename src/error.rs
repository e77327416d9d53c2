//! Error types for schema definition, object mapping and document handling.

use std::path::PathBuf;

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Application code used for every [`ErrorKind::Internal`] error.
///
/// These conditions should never happen in production, so they share one code.
pub const INTERNAL_ERROR_CODE: &str = "42";

/// Errors raised while declaring or loading message type schemas.
#[derive(Debug, Error)]
pub enum SchemaError {
    // IO errors (exit code 3)
    #[error("file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("cannot read {path}: {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[cfg(feature = "remote")]
    #[error("failed to fetch {url}: {source}")]
    NetworkError {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    // Definition errors (exit code 2)
    #[error("invalid JSON: {source}")]
    InvalidJson {
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid definition: {message}")]
    InvalidDefinition { message: String },

    #[error("unknown value type \"{value}\" for {message_type}.{attribute}")]
    UnknownValueType {
        message_type: String,
        attribute: String,
        value: String,
    },

    #[error("{message_type} is missing attribute 'id'")]
    MissingId { message_type: String },

    #[error("{message_type} declares attribute 'id' more than once")]
    DuplicateId { message_type: String },

    #[error("{message_type} declares attribute '{attribute}' more than once")]
    DuplicateAttribute {
        message_type: String,
        attribute: String,
    },

    #[error("{message_type}.id cannot be a relationship")]
    RelationshipId { message_type: String },

    #[error("{message_type}.{attribute} is nested but has no nested type")]
    NestedWithoutType {
        message_type: String,
        attribute: String,
    },

    #[error("{message_type}.{attribute} is not a relationship but declares {setting}")]
    NotARelationship {
        message_type: String,
        attribute: String,
        setting: &'static str,
    },

    #[error("message type '{name}' is registered more than once")]
    DuplicateType { name: String },

    #[error("{message_type}.{attribute} references unknown message type '{target}'")]
    UnknownTarget {
        message_type: String,
        attribute: String,
        target: String,
    },

    #[error("nested schema cycle: {}", cycle.join(" -> "))]
    NestedCycle { cycle: Vec<String> },
}

impl SchemaError {
    /// Returns the exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            SchemaError::FileNotFound { .. } | SchemaError::ReadError { .. } => 3,
            #[cfg(feature = "remote")]
            SchemaError::NetworkError { .. } => 3,
            _ => 2,
        }
    }
}

/// Errors raised while mapping between backend objects, messages and documents.
#[derive(Debug, Error)]
pub enum MappingError {
    #[error("missing required field {field} of {message_type}")]
    MissingRequired { message_type: String, field: String },

    #[error("expected {expected} got {actual} for {field} of {message_type}")]
    TypeMismatch {
        message_type: String,
        field: String,
        expected: String,
        actual: String,
    },

    #[error("failed to convert {value} to {expected} for {field} of {message_type}")]
    Conversion {
        message_type: String,
        field: String,
        expected: String,
        value: String,
    },

    #[error("unknown message type '{name}'")]
    UnknownType { name: String },

    #[error("{message_type} has no field '{field}'")]
    UnknownField { message_type: String, field: String },

    #[error("path '{path}' of {message_type}.{field} does not resolve on the target object")]
    UnresolvedPath {
        message_type: String,
        field: String,
        path: String,
    },

    #[error("cannot assign '{segment}': {reason}")]
    Unassignable { segment: String, reason: String },

    #[error("backend object of {message_type} is no longer available")]
    SourceUnavailable { message_type: String },

    #[error(transparent)]
    Api(#[from] ApiError),
}

impl MappingError {
    /// Returns the recognized domain error, if this is one.
    pub fn as_api(&self) -> Option<&ApiError> {
        match self {
            MappingError::Api(api) => Some(api),
            _ => None,
        }
    }

    /// Returns the status a transport layer should report for this error.
    pub fn status(&self) -> u16 {
        self.as_api().map_or(500, ApiError::status)
    }

    /// Returns the exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        1
    }
}

/// Violations of the top-level document invariants.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DocumentError {
    #[error("a document may only contain data or errors, not both")]
    DataAndErrors,

    #[error("a document has to contain at least one of these members: data, errors, meta")]
    Empty,
}

/// Errors during structural validation of an incoming document.
#[derive(Debug, Error)]
pub enum ValidateError {
    #[error("document schema is invalid: {message}")]
    Schema { message: String },

    #[error("document is malformed with {} violation(s)", violations.len())]
    Invalid { violations: Vec<Violation> },
}

/// Single structural violation with path context.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Violation {
    /// JSON Pointer (RFC 6901) to the offending member.
    pub path: String,
    /// Human-readable error message.
    pub message: String,
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// Classes of recognized domain errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    BadRequest,
    Unauthorized,
    Forbidden,
    NotFound,
    /// Unexpected engine fault; always carries [`INTERNAL_ERROR_CODE`].
    Internal,
    /// Misuse of the mapping API by the integrating developer.
    Developer,
}

impl ErrorKind {
    /// HTTP-style status class of this kind.
    pub fn status(self) -> u16 {
        match self {
            ErrorKind::BadRequest => 400,
            ErrorKind::Unauthorized => 401,
            ErrorKind::Forbidden => 403,
            ErrorKind::NotFound => 404,
            ErrorKind::Internal | ErrorKind::Developer => 500,
        }
    }

    /// Default human-readable summary of this kind.
    pub fn title(self) -> &'static str {
        match self {
            ErrorKind::BadRequest => {
                "The web server was unable to understand the request and process it."
            }
            ErrorKind::Unauthorized => {
                "The request can not be processed, because authorization is missing."
            }
            ErrorKind::Forbidden => "You are not allowed to access this resource.",
            ErrorKind::NotFound => "The requested resource could not be found.",
            ErrorKind::Internal => "Internal Server Error",
            ErrorKind::Developer => "Developer Error",
        }
    }
}

/// A recognized domain error carrying everything an error fragment needs.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{title}: {detail}")]
pub struct ApiError {
    kind: ErrorKind,
    id: String,
    title: String,
    detail: String,
    code: String,
    meta: Option<Map<String, Value>>,
}

impl ApiError {
    /// Create an error of the given kind with its default title.
    pub fn new(kind: ErrorKind, detail: impl Into<String>) -> Self {
        let code = match kind {
            ErrorKind::Internal => INTERNAL_ERROR_CODE.to_string(),
            other => other.status().to_string(),
        };
        let mut error = Self {
            kind,
            id: String::new(),
            title: kind.title().to_string(),
            detail: detail.into(),
            code,
            meta: None,
        };
        error.refresh_id();
        error
    }

    pub fn bad_request(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::BadRequest, detail)
    }

    pub fn unauthorized(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unauthorized, detail)
    }

    pub fn forbidden(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::Forbidden, detail)
    }

    pub fn not_found(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, detail)
    }

    pub fn internal(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, detail)
    }

    /// Developer errors take a custom title.
    pub fn developer(title: impl Into<String>, detail: impl Into<String>) -> Self {
        let mut error = Self::new(ErrorKind::Developer, detail);
        error.title = title.into();
        error.refresh_id();
        error
    }

    /// Override the application-specific code.
    ///
    /// Internal errors keep their fixed code.
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        if self.kind != ErrorKind::Internal {
            self.code = code.into();
            self.refresh_id();
        }
        self
    }

    /// Attach non-standard meta information.
    pub fn with_meta(mut self, meta: Map<String, Value>) -> Self {
        self.meta = Some(meta);
        self.refresh_id();
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn status(&self) -> u16 {
        self.kind.status()
    }

    /// Unique identifier of this occurrence, for log correlation.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn detail(&self) -> &str {
        &self.detail
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn meta(&self) -> Option<&Map<String, Value>> {
        self.meta.as_ref()
    }

    fn refresh_id(&mut self) {
        let meta = self
            .meta
            .as_ref()
            .map(|m| Value::Object(m.clone()).to_string())
            .unwrap_or_default();
        let status = self.status().to_string();
        self.id = occurrence_id(&[&self.title, &self.detail, &status, &self.code, &meta]);
    }
}

/// Hash of the current timestamp and the given content.
///
/// Unique per occurrence so errors can be found again in logs.
pub(crate) fn occurrence_id(parts: &[&str]) -> String {
    let now = chrono::Utc::now();
    let nanos = now
        .timestamp_nanos_opt()
        .unwrap_or_else(|| now.timestamp_micros());

    let mut hasher = Sha256::new();
    hasher.update(nanos.to_le_bytes());
    for part in parts {
        hasher.update(part.as_bytes());
        hasher.update([0u8]);
    }
    hex::encode(hasher.finalize())
}
