//! Authentication module for managing the session credential.
//!
//! This module provides:
//! - `SessionManager`: login exchange, credential ownership and the
//!   single-retry re-authentication around authenticated calls
//! - `KeyValueStore`: persistence for the credential (memory, JSON file or
//!   OS keychain)
//! - `Platform`: the host primitives that issue one-time codes and report
//!   whether the platform session is still live

pub mod credential;
pub mod platform;
pub mod session;
pub mod store;

pub use credential::Credential;
pub use platform::{Platform, PlatformError, StaticPlatform};
pub use session::{LoginError, SessionManager, SessionState};
pub use store::{JsonFileStore, KeyValueStore, KeyringStore, MemoryStore, StoreError, TOKEN_KEY};
