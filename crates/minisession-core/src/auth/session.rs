//! Session lifecycle.
//!
//! `SessionManager` owns the credential. It exchanges a platform-issued
//! one-time code for a server token, persists the token, and wraps the
//! transport so that a call rejected as unauthorized is retried once after a
//! fresh login.
//!
//! Login failures inside `ensure_session` are not escalated: the session
//! drops to `Unauthenticated` and the next call starts over. The failure is
//! still returned as a `LoginError` for callers that want to log it.

use std::future::Future;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::api::client::INITIAL_BACKOFF_MS;
use crate::api::{
    ApiError, HttpBackend, Payload, RequestSpec, ReqwestBackend, Transport, UploadSpec,
};
use crate::config::{Config, LoginConfig};

use super::credential::Credential;
use super::platform::{Platform, PlatformError};
use super::store::{KeyValueStore, StoreError, TOKEN_KEY};

/// Longest slice of a rejected login body kept in the error.
const MAX_REJECTED_BODY_LENGTH: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No credential known yet.
    NoCredential,
    /// A login exchange is in flight.
    LoggingIn,
    /// A credential is available for requests.
    Authenticated,
    /// The last login attempt failed.
    Unauthenticated,
}

#[derive(Error, Debug)]
pub enum LoginError {
    #[error("Platform could not issue a login code: {0}")]
    CodeIssuance(#[from] PlatformError),

    #[error("Platform call timed out after {0:?}")]
    PlatformTimeout(Duration),

    #[error("Login exchange failed: {0}")]
    Exchange(#[from] ApiError),

    #[error("Login rejected by server: {0}")]
    Rejected(String),

    #[error("Login response has no token at {0}")]
    MissingToken(String),

    #[error("Invalid login configuration: {0}")]
    InvalidConfig(String),

    /// The exchange succeeded and the credential is held in memory, but it
    /// could not be written to the store.
    #[error("Failed to persist credential: {0}")]
    Storage(#[from] StoreError),
}

struct Inner {
    credential: Option<Credential>,
    /// Bumped every time a login installs a new credential.
    generation: u64,
    state: SessionState,
}

pub struct SessionManager {
    login: LoginConfig,
    login_extras: Payload,
    platform_timeout: Duration,
    transport: Transport,
    platform: Arc<dyn Platform>,
    store: Arc<dyn KeyValueStore>,
    inner: RwLock<Inner>,
    // one login exchange at a time
    login_lock: tokio::sync::Mutex<()>,
}

impl SessionManager {
    /// Build a manager and pick up any credential already in the store.
    pub fn new(
        config: Config,
        backend: Arc<dyn HttpBackend>,
        platform: Arc<dyn Platform>,
        store: Arc<dyn KeyValueStore>,
    ) -> Self {
        let transport = Transport::new(backend, config.api_host.clone()).with_rate_limit(
            config.max_rate_limit_retries,
            Duration::from_millis(INITIAL_BACKOFF_MS),
        );

        let credential = match store.get(TOKEN_KEY) {
            Ok(value) => value.filter(|v| !v.is_empty()).map(Credential::new),
            Err(e) => {
                warn!(error = %e, "Failed to read stored credential");
                None
            }
        };
        let state = if credential.is_some() {
            SessionState::Authenticated
        } else {
            SessionState::NoCredential
        };
        debug!(?state, "Session manager created");

        Self {
            platform_timeout: config.platform_timeout(),
            login: config.login,
            login_extras: Payload::new(),
            transport,
            platform,
            store,
            inner: RwLock::new(Inner {
                credential,
                generation: 0,
                state,
            }),
            login_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Build a manager over a reqwest backend using the configured timeout.
    pub fn with_reqwest(
        config: Config,
        platform: Arc<dyn Platform>,
        store: Arc<dyn KeyValueStore>,
    ) -> Result<Self, ApiError> {
        let backend = ReqwestBackend::new(config.request_timeout())?;
        Ok(Self::new(config, Arc::new(backend), platform, store))
    }

    /// Extra fields sent with every login exchange next to the code.
    pub fn with_login_extras(mut self, extras: Payload) -> Self {
        self.login_extras = extras;
        self
    }

    pub fn with_platform_timeout(mut self, timeout: Duration) -> Self {
        self.platform_timeout = timeout;
        self
    }

    pub fn credential(&self) -> Option<Credential> {
        self.read().credential.clone()
    }

    pub fn state(&self) -> SessionState {
        self.read().state
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }

    fn snapshot(&self) -> (Option<Credential>, u64) {
        let inner = self.read();
        (inner.credential.clone(), inner.generation)
    }

    fn set_state(&self, state: SessionState) {
        let mut inner = self.write();
        if inner.state != state {
            debug!(from = ?inner.state, to = ?state, "Session state change");
            inner.state = state;
        }
    }

    // ===== Session lifecycle =====

    /// Make sure a session exists, logging in when needed.
    pub async fn ensure_session(&self) -> Result<(), LoginError> {
        self.ensure_session_with(|| {}).await
    }

    /// Like [`ensure_session`](Self::ensure_session), invoking `on_ready`
    /// once the session is usable. `on_ready` is not called when the login
    /// cycle fails.
    pub async fn ensure_session_with<F>(&self, on_ready: F) -> Result<(), LoginError>
    where
        F: FnOnce(),
    {
        let (credential, generation) = self.snapshot();

        if credential.is_some() {
            match self.probe_session().await {
                Ok(true) => {
                    self.set_state(SessionState::Authenticated);
                    on_ready();
                    return Ok(());
                }
                Ok(false) => debug!("Platform session expired, logging in again"),
                Err(e) => warn!(error = %e, "Session validity check failed, logging in again"),
            }
        }

        self.login_cycle(Some(generation), &Payload::new()).await?;
        on_ready();
        Ok(())
    }

    /// Run a login exchange now, regardless of the cached credential.
    pub async fn login(&self, extras: &Payload) -> Result<Credential, LoginError> {
        self.login_cycle(None, extras).await
    }

    async fn probe_session(&self) -> Result<bool, LoginError> {
        let valid = tokio::time::timeout(
            self.platform_timeout,
            self.platform.probe_session_validity(),
        )
        .await
        .map_err(|_| LoginError::PlatformTimeout(self.platform_timeout))??;
        Ok(valid)
    }

    /// Serialized login. With `observed` set, the exchange is skipped when
    /// another task installed a newer credential since that generation.
    async fn login_cycle(
        &self,
        observed: Option<u64>,
        extras: &Payload,
    ) -> Result<Credential, LoginError> {
        let _guard = self.login_lock.lock().await;

        if let Some(observed) = observed {
            let inner = self.read();
            if inner.generation != observed {
                if let Some(credential) = inner.credential.clone() {
                    debug!("Login already completed by another task");
                    return Ok(credential);
                }
            }
        }

        self.set_state(SessionState::LoggingIn);
        match self.exchange(extras).await {
            Ok(credential) => {
                self.set_state(SessionState::Authenticated);
                info!("Session established");
                Ok(credential)
            }
            Err(e) => {
                self.set_state(SessionState::Unauthenticated);
                warn!(error = %e, "Login failed");
                Err(e)
            }
        }
    }

    async fn exchange(&self, extras: &Payload) -> Result<Credential, LoginError> {
        let method = self.login.http_method().ok_or_else(|| {
            LoginError::InvalidConfig(format!("unknown HTTP method {:?}", self.login.method))
        })?;

        let code = tokio::time::timeout(self.platform_timeout, self.platform.issue_one_time_code())
            .await
            .map_err(|_| LoginError::PlatformTimeout(self.platform_timeout))??;

        let mut data = Payload::new();
        data.insert(self.login.code_field.clone(), Value::String(code));
        data.extend(self.login_extras.clone());
        data.extend(extras.clone());

        let spec = RequestSpec::new(self.login.url.clone())
            .method(method)
            .content_type(self.login.content_type.clone())
            .data(data);

        let current = self.credential();
        let body = self.transport.send(&spec, current.as_ref()).await?;

        if !self.login.success.accepts(&body) {
            return Err(LoginError::Rejected(truncate(&body.to_string())));
        }

        let token = body
            .pointer(&self.login.token_pointer)
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| LoginError::MissingToken(self.login.token_pointer.clone()))?;
        let credential = Credential::new(token);

        {
            let mut inner = self.write();
            inner.credential = Some(credential.clone());
            inner.generation += 1;
        }

        // The in-memory credential stays installed even if this fails, so
        // memory can be ahead of storage until the next successful login.
        self.store.set(TOKEN_KEY, credential.as_str())?;

        Ok(credential)
    }

    // ===== Authenticated calls =====

    /// Send a request with the session credential. An unauthorized
    /// rejection, or any failure while no credential was cached, triggers
    /// one login and one retry.
    pub async fn request_authenticated(&self, spec: &RequestSpec) -> Result<Value, ApiError> {
        self.with_reauth(|credential| async move {
            self.transport.send(spec, credential.as_ref()).await
        })
        .await
    }

    /// Upload a file with the same single re-authentication retry as
    /// [`request_authenticated`](Self::request_authenticated).
    pub async fn upload_authenticated(&self, spec: &UploadSpec) -> Result<Value, ApiError> {
        self.with_reauth(|credential| async move {
            self.transport.upload(spec, credential.as_ref()).await
        })
        .await
    }

    async fn with_reauth<F, Fut>(&self, call: F) -> Result<Value, ApiError>
    where
        F: Fn(Option<Credential>) -> Fut,
        Fut: Future<Output = Result<Value, ApiError>>,
    {
        let (credential, generation) = self.snapshot();
        let had_credential = credential.is_some();

        let first = match call(credential).await {
            Ok(body) => return Ok(body),
            Err(e) => e,
        };
        if had_credential && !first.is_unauthorized() {
            return Err(first);
        }

        debug!(error = %first, had_credential, "Re-authenticating before retry");
        if let Err(e) = self.login_cycle(Some(generation), &Payload::new()).await {
            warn!(error = %e, "Re-authentication failed");
        }

        let (credential, current) = self.snapshot();
        if current == generation {
            return Err(first);
        }
        call(credential).await
    }
}

fn truncate(body: &str) -> String {
    if body.len() <= MAX_REJECTED_BODY_LENGTH {
        return body.to_string();
    }
    let mut end = MAX_REJECTED_BODY_LENGTH;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &body[..end])
}
