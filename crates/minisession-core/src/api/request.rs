//! Outbound call descriptions.
//!
//! A `RequestSpec` or `UploadSpec` is built per call by the caller and
//! dropped when the call completes. Neither carries a credential; the
//! transport attaches whatever the session manager hands it.

use std::path::PathBuf;

use reqwest::Method;
use serde_json::{Map, Value};

pub const CONTENT_TYPE_JSON: &str = "application/json";
pub const CONTENT_TYPE_FORM: &str = "application/x-www-form-urlencoded";
pub const CONTENT_TYPE_MULTIPART: &str = "multipart/form-data";

/// Key/value payload sent with a request.
pub type Payload = Map<String, Value>;

#[derive(Debug, Clone)]
pub struct RequestSpec {
    pub url: String,
    pub method: Method,
    pub content_type: String,
    pub data: Payload,
}

impl RequestSpec {
    /// A GET with a JSON content type and no payload.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: Method::GET,
            content_type: CONTENT_TYPE_JSON.to_string(),
            data: Payload::new(),
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(url).method(Method::POST)
    }

    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }

    /// Replace the whole payload.
    pub fn data(mut self, data: Payload) -> Self {
        self.data = data;
        self
    }

    /// Add one payload field, overwriting an existing one with the same key.
    pub fn field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }
}

/// A local file plus auxiliary form fields, sent as multipart.
#[derive(Debug, Clone)]
pub struct UploadSpec {
    pub url: String,
    pub file_path: PathBuf,
    /// Multipart field name the file is sent under.
    pub name: String,
    pub content_type: String,
    pub form_data: Payload,
}

impl UploadSpec {
    pub fn new(
        url: impl Into<String>,
        file_path: impl Into<PathBuf>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            file_path: file_path.into(),
            name: name.into(),
            content_type: CONTENT_TYPE_MULTIPART.to_string(),
            form_data: Payload::new(),
        }
    }

    pub fn field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.form_data.insert(key.into(), value.into());
        self
    }
}

/// Render a payload value the way it appears in a query string or form.
/// Strings are sent bare, everything else as compact JSON.
pub(crate) fn value_to_param(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
