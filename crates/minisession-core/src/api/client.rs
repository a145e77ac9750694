//! Transport for outbound API calls.
//!
//! `Transport` resolves URLs against the configured API host, attaches the
//! credential header, encodes the payload and classifies the host response:
//! status 200 is success, everything else is an `ApiError`. It never reads
//! or writes the credential store.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Method;
use serde_json::Value;
use tracing::{debug, warn};

use crate::auth::Credential;

use super::backend::{HttpBackend, RawRequest, RawResponse, RawUpload, RequestBody};
use super::request::{value_to_param, Payload, RequestSpec, UploadSpec};
use super::ApiError;

// ============================================================================
// Constants
// ============================================================================

/// Header the credential is sent under.
pub const TOKEN_HEADER: &str = "token";

/// The only host status treated as success.
const SUCCESS_STATUS: u16 = 200;

/// Retries for rate-limited (429) requests. Off unless configured, so a 429
/// rejects like any other non-200 status.
pub const DEFAULT_MAX_RATE_LIMIT_RETRIES: u32 = 0;

/// Initial backoff delay in milliseconds for rate limiting.
pub(crate) const INITIAL_BACKOFF_MS: u64 = 1000;

#[derive(Clone)]
pub struct Transport {
    backend: Arc<dyn HttpBackend>,
    api_host: String,
    max_rate_limit_retries: u32,
    initial_backoff: Duration,
}

impl Transport {
    pub fn new(backend: Arc<dyn HttpBackend>, api_host: impl Into<String>) -> Self {
        Self {
            backend,
            api_host: api_host.into(),
            max_rate_limit_retries: DEFAULT_MAX_RATE_LIMIT_RETRIES,
            initial_backoff: Duration::from_millis(INITIAL_BACKOFF_MS),
        }
    }

    /// Opt in to retrying 429 responses with exponential backoff.
    pub fn with_rate_limit(mut self, max_retries: u32, initial_backoff: Duration) -> Self {
        self.max_rate_limit_retries = max_retries;
        self.initial_backoff = initial_backoff;
        self
    }

    /// Absolute URLs are used as-is; anything without a scheme is appended
    /// to the API host.
    pub fn resolve_url(&self, url: &str) -> String {
        if url.contains("://") {
            url.to_string()
        } else {
            format!("{}{}", self.api_host, url)
        }
    }

    fn headers(content_type: &str, credential: Option<&Credential>) -> Vec<(String, String)> {
        vec![
            ("content-type".to_string(), content_type.to_string()),
            (
                TOKEN_HEADER.to_string(),
                credential.map(|c| c.as_str().to_string()).unwrap_or_default(),
            ),
        ]
    }

    fn encode_body(method: &Method, content_type: &str, data: &Payload) -> RequestBody {
        let sends_query = matches!(*method, Method::GET | Method::HEAD | Method::DELETE);
        if sends_query {
            if data.is_empty() {
                RequestBody::Empty
            } else {
                RequestBody::Query(to_params(data))
            }
        } else if content_type.starts_with("application/x-www-form-urlencoded") {
            RequestBody::Form(to_params(data))
        } else {
            RequestBody::Json(Value::Object(data.clone()))
        }
    }

    /// Perform one call. Resolves with the response body when the host
    /// status is 200.
    pub async fn send(
        &self,
        spec: &RequestSpec,
        credential: Option<&Credential>,
    ) -> Result<Value, ApiError> {
        let request = RawRequest {
            url: self.resolve_url(&spec.url),
            method: spec.method.clone(),
            headers: Self::headers(&spec.content_type, credential),
            body: Self::encode_body(&spec.method, &spec.content_type, &spec.data),
        };

        let mut retries = 0;
        let mut backoff = self.initial_backoff;

        loop {
            let response = self.backend.send(request.clone()).await?;
            if response.status == 429 && retries < self.max_rate_limit_retries {
                retries += 1;
                warn!(
                    url = %request.url,
                    retry = retries,
                    backoff_ms = backoff.as_millis() as u64,
                    "Rate limited, backing off"
                );
                tokio::time::sleep(backoff).await;
                backoff *= 2; // Exponential backoff
                continue;
            }
            return Self::classify(&request.url, response);
        }
    }

    /// Send a local file as multipart with auxiliary form fields.
    pub async fn upload(
        &self,
        spec: &UploadSpec,
        credential: Option<&Credential>,
    ) -> Result<Value, ApiError> {
        if spec.name.is_empty() {
            return Err(ApiError::InvalidRequest(
                "upload field name must not be empty".to_string(),
            ));
        }

        let upload = RawUpload {
            url: self.resolve_url(&spec.url),
            file_path: spec.file_path.clone(),
            field_name: spec.name.clone(),
            headers: Self::headers(&spec.content_type, credential),
            form_fields: to_params(&spec.form_data),
        };
        let url = upload.url.clone();

        let response = self.backend.upload(upload).await?;
        Self::classify(&url, response)
    }

    fn classify(url: &str, response: RawResponse) -> Result<Value, ApiError> {
        if response.status == SUCCESS_STATUS {
            debug!(url = url, "Request succeeded");
            Ok(parse_body(&response.body))
        } else {
            debug!(url = url, status = response.status, "Request failed");
            Err(ApiError::from_status(response.status, &response.body))
        }
    }
}

fn to_params(data: &Payload) -> Vec<(String, String)> {
    data.iter()
        .map(|(k, v)| (k.clone(), value_to_param(v)))
        .collect()
}

/// Parse a response body as JSON. Bodies that are not JSON are passed
/// through as a string; an empty body is null.
fn parse_body(body: &str) -> Value {
    if body.trim().is_empty() {
        return Value::Null;
    }
    serde_json::from_str(body).unwrap_or_else(|_| Value::String(body.to_string()))
}
