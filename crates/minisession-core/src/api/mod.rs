//! Outbound transport.
//!
//! This module provides the `Transport` that performs one network call per
//! request, attaches the session credential as a `token` header, and turns
//! the host response into success (status 200) or an `ApiError`.
//!
//! The network itself sits behind `HttpBackend`; `ReqwestBackend` is the
//! implementation used outside of tests.

pub mod backend;
pub mod client;
pub mod error;
pub mod request;

pub use backend::{HttpBackend, RawRequest, RawResponse, RawUpload, ReqwestBackend, RequestBody};
pub use client::{Transport, TOKEN_HEADER};
pub use error::ApiError;
pub use request::{
    Payload, RequestSpec, UploadSpec, CONTENT_TYPE_FORM, CONTENT_TYPE_JSON, CONTENT_TYPE_MULTIPART,
};
