//! Raw network primitives.
//!
//! `HttpBackend` is the seam between the transport and the network. It
//! performs exactly one exchange and reports the host-level status and body
//! without interpreting them. `ReqwestBackend` is the production
//! implementation; tests substitute scripted backends.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, multipart, Client, Method};
use tracing::debug;

use super::ApiError;

/// Encoded request body.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Empty,
    Query(Vec<(String, String)>),
    Json(serde_json::Value),
    Form(Vec<(String, String)>),
}

#[derive(Debug, Clone)]
pub struct RawRequest {
    pub url: String,
    pub method: Method,
    pub headers: Vec<(String, String)>,
    pub body: RequestBody,
}

impl RawRequest {
    /// First header with the given name, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }
}

#[derive(Debug, Clone)]
pub struct RawUpload {
    pub url: String,
    pub file_path: PathBuf,
    pub field_name: String,
    pub headers: Vec<(String, String)>,
    pub form_fields: Vec<(String, String)>,
}

impl RawUpload {
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }
}

fn find_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

/// Host-level outcome of one exchange, before classification.
#[derive(Debug, Clone, PartialEq)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
}

impl RawResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn json(status: u16, body: &serde_json::Value) -> Self {
        Self::new(status, body.to_string())
    }
}

#[async_trait]
pub trait HttpBackend: Send + Sync {
    async fn send(&self, request: RawRequest) -> Result<RawResponse, ApiError>;

    async fn upload(&self, upload: RawUpload) -> Result<RawResponse, ApiError>;
}

/// Backend over a pooled reqwest client.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ReqwestBackend {
    client: Client,
}

impl ReqwestBackend {
    pub fn new(timeout: Duration) -> Result<Self, ApiError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    async fn finish(response: reqwest::Response) -> Result<RawResponse, ApiError> {
        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok(RawResponse { status, body })
    }
}

#[async_trait]
impl HttpBackend for ReqwestBackend {
    async fn send(&self, request: RawRequest) -> Result<RawResponse, ApiError> {
        debug!(method = %request.method, url = %request.url, "Sending request");

        let mut builder = self.client.request(request.method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        builder = match request.body {
            RequestBody::Empty => builder,
            RequestBody::Query(params) => builder.query(&params),
            RequestBody::Json(value) => builder.body(value.to_string()),
            RequestBody::Form(params) => builder.form(&params),
        };

        let response = builder.send().await?;
        Self::finish(response).await
    }

    async fn upload(&self, upload: RawUpload) -> Result<RawResponse, ApiError> {
        debug!(url = %upload.url, path = %upload.file_path.display(), "Uploading file");

        let bytes = tokio::fs::read(&upload.file_path).await?;
        let file_name = upload
            .file_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| upload.field_name.clone());

        let mut form = multipart::Form::new()
            .part(upload.field_name, multipart::Part::bytes(bytes).file_name(file_name));
        for (key, value) in upload.form_fields {
            form = form.text(key, value);
        }

        // reqwest writes its own multipart content-type with the boundary
        let mut builder = self.client.post(&upload.url);
        for (name, value) in &upload.headers {
            if name.eq_ignore_ascii_case(header::CONTENT_TYPE.as_str())
                && value.starts_with("multipart/")
            {
                continue;
            }
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder.multipart(form).send().await?;
        Self::finish(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let request = RawRequest {
            url: "https://api.example.com/orders".to_string(),
            method: Method::GET,
            headers: vec![
                ("content-type".to_string(), "application/json".to_string()),
                ("token".to_string(), "T1".to_string()),
            ],
            body: RequestBody::Empty,
        };
        assert_eq!(request.header("Content-Type"), Some("application/json"));
        assert_eq!(request.header("TOKEN"), Some("T1"));
        assert_eq!(request.header("authorization"), None);
    }
}
