//! minisession - session lifecycle for platform-code login flows.
//!
//! A host platform issues a one-time code, the remote server exchanges it
//! for a token, and every later request carries that token. This crate owns
//! that token: it logs in on demand, persists the result, and retries a
//! request once with a fresh login when the server rejects it as
//! unauthorized.

pub mod api;
pub mod auth;
pub mod config;

pub use api::{ApiError, RequestSpec, Transport, UploadSpec};
pub use auth::{Credential, LoginError, SessionManager, SessionState};
pub use config::{Config, LoginConfig, SuccessCheck};
