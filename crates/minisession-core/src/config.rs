//! Library configuration.
//!
//! `Config` names the API host, how the login exchange is performed and the
//! timeouts wrapped around host calls. It is stored at
//! `~/.config/minisession/config.json`; a missing file yields the defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::api::{CONTENT_TYPE_FORM, client::DEFAULT_MAX_RATE_LIMIT_RETRIES};

/// Application name used for config/cache directory paths
const APP_NAME: &str = "minisession";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// HTTP request timeout in seconds.
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Upper bound on a single platform call (code issuance, session validity check).
const DEFAULT_PLATFORM_TIMEOUT_SECS: u64 = 10;

/// How the login exchange response signals success, on top of status 200.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SuccessCheck {
    /// Status 200 alone is success.
    StatusOnly,
    /// The body's `field` must be a number equal to `value`.
    BodyCode { field: String, value: i64 },
}

impl Default for SuccessCheck {
    fn default() -> Self {
        SuccessCheck::BodyCode {
            field: "code".to_string(),
            value: 0,
        }
    }
}

impl SuccessCheck {
    pub fn accepts(&self, body: &Value) -> bool {
        match self {
            SuccessCheck::StatusOnly => true,
            SuccessCheck::BodyCode { field, value } => {
                body.get(field).and_then(Value::as_i64) == Some(*value)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoginConfig {
    /// Exchange endpoint, absolute or relative to the API host.
    pub url: String,
    pub method: String,
    pub content_type: String,
    /// Payload field the one-time code is sent under.
    pub code_field: String,
    pub success: SuccessCheck,
    /// JSON pointer to the token in the exchange response.
    pub token_pointer: String,
}

impl Default for LoginConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            method: "GET".to_string(),
            content_type: CONTENT_TYPE_FORM.to_string(),
            code_field: "code".to_string(),
            success: SuccessCheck::default(),
            token_pointer: "/data/token".to_string(),
        }
    }
}

impl LoginConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Parsed HTTP method; unknown names are rejected.
    pub fn http_method(&self) -> Option<Method> {
        Method::from_bytes(self.method.trim().to_ascii_uppercase().as_bytes()).ok()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_host: String,
    pub login: LoginConfig,
    pub request_timeout_secs: u64,
    pub platform_timeout_secs: u64,
    pub max_rate_limit_retries: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_host: String::new(),
            login: LoginConfig::default(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            platform_timeout_secs: DEFAULT_PLATFORM_TIMEOUT_SECS,
            max_rate_limit_retries: DEFAULT_MAX_RATE_LIMIT_RETRIES,
        }
    }
}

impl Config {
    pub fn new(api_host: impl Into<String>, login: LoginConfig) -> Self {
        Self {
            api_host: api_host.into(),
            login,
            ..Self::default()
        }
    }

    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            serde_json::from_str(&contents).context("Failed to parse config file")
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn platform_timeout(&self) -> Duration {
        Duration::from_secs(self.platform_timeout_secs)
    }
}
