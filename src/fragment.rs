//! Error fragments for the `errors` member of a document.

use std::error::Error;

use serde_json::{Map, Value};

use crate::error::{occurrence_id, ApiError, MappingError};

const GENERIC_TITLE: &str = "Internal Server Error";

/// One rendered error object.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorFragment {
    pub id: String,
    pub status: u16,
    pub code: String,
    pub title: String,
    pub detail: String,
    pub meta: Option<Map<String, Value>>,
    /// Diagnostic trace, only set when the caller opts in.
    pub traceback: Option<String>,
}

impl ErrorFragment {
    /// Build a fragment from any error.
    ///
    /// Recognized domain errors keep their fields and occurrence id. Anything
    /// else becomes a generic 500 whose detail is the error's message.
    pub fn from_error(error: &(dyn Error + 'static)) -> Self {
        if let Some(api) = error.downcast_ref::<ApiError>() {
            return Self::from_api_error(api);
        }
        if let Some(api) = error.downcast_ref::<MappingError>().and_then(MappingError::as_api) {
            return Self::from_api_error(api);
        }

        let detail = error.to_string();
        Self {
            id: occurrence_id(&[GENERIC_TITLE, &detail]),
            status: 500,
            code: "500".to_string(),
            title: GENERIC_TITLE.to_string(),
            detail,
            meta: None,
            traceback: None,
        }
    }

    pub fn from_api_error(error: &ApiError) -> Self {
        Self {
            id: error.id().to_string(),
            status: error.status(),
            code: error.code().to_string(),
            title: error.title().to_string(),
            detail: error.detail().to_string(),
            meta: error.meta().cloned(),
            traceback: None,
        }
    }

    pub fn with_traceback(mut self, traceback: impl Into<String>) -> Self {
        self.traceback = Some(traceback.into());
        self
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    /// Render as an error object. The traceback, if any, goes under `meta`.
    pub fn to_value(&self) -> Value {
        let mut fragment = Map::new();
        fragment.insert("id".to_string(), Value::String(self.id.clone()));
        fragment.insert("status".to_string(), Value::String(self.status.to_string()));
        fragment.insert("code".to_string(), Value::String(self.code.clone()));
        fragment.insert("title".to_string(), Value::String(self.title.clone()));
        fragment.insert("detail".to_string(), Value::String(self.detail.clone()));

        let mut meta = self.meta.clone();
        if let Some(traceback) = &self.traceback {
            meta.get_or_insert_with(Map::new)
                .insert("traceback".to_string(), Value::String(traceback.clone()));
        }
        if let Some(meta) = meta {
            fragment.insert("meta".to_string(), Value::Object(meta));
        }
        Value::Object(fragment)
    }
}

impl From<&ApiError> for ErrorFragment {
    fn from(error: &ApiError) -> Self {
        Self::from_api_error(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn recognized_error_keeps_fields() {
        let api = ApiError::not_found("book 9 does not exist").with_code("B404");
        let fragment = ErrorFragment::from_error(&api);
        assert_eq!(fragment.id, api.id());
        assert_eq!(fragment.status, 404);
        assert_eq!(fragment.code, "B404");
        assert_eq!(fragment.title, "The requested resource could not be found.");
    }

    #[test]
    fn wrapped_api_error_is_recognized() {
        let api = ApiError::internal("key path returned nothing");
        let err = MappingError::from(api.clone());
        let fragment = ErrorFragment::from_error(&err);
        assert_eq!(fragment.id, api.id());
        assert_eq!(fragment.code, "42");
    }

    #[test]
    fn unknown_error_becomes_generic() {
        let err = MappingError::MissingRequired {
            message_type: "Book".into(),
            field: "title".into(),
        };
        let fragment = ErrorFragment::from_error(&err);
        assert_eq!(fragment.status, 500);
        assert_eq!(fragment.code, "500");
        assert_eq!(fragment.title, "Internal Server Error");
        assert_eq!(fragment.detail, "missing required field title of Book");
        assert_eq!(fragment.id.len(), 64);
    }

    #[test]
    fn io_error_becomes_generic() {
        let err = std::io::Error::new(std::io::ErrorKind::Other, "disk on fire");
        let fragment = ErrorFragment::from_error(&err);
        assert_eq!(fragment.detail, "disk on fire");
    }

    #[test]
    fn render_with_traceback_under_meta() {
        let mut meta = Map::new();
        meta.insert("book".to_string(), json!(9));
        let api = ApiError::bad_request("bad title").with_meta(meta);
        let fragment = ErrorFragment::from_api_error(&api).with_traceback("bad title");
        let rendered = fragment.to_value();
        assert_eq!(rendered["status"], "400");
        assert_eq!(rendered["code"], "400");
        assert_eq!(rendered["meta"], json!({"book": 9, "traceback": "bad title"}));
    }

    #[test]
    fn render_without_meta() {
        let fragment = ErrorFragment::from_api_error(&ApiError::forbidden("no"));
        assert!(fragment.to_value().get("meta").is_none());
    }
}
