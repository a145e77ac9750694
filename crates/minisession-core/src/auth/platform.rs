//! Host platform primitives the session lifecycle depends on.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlatformError {
    #[error("Platform did not issue a login code: {0}")]
    CodeUnavailable(String),

    #[error("Platform call failed: {0}")]
    Failed(String),
}

#[async_trait]
pub trait Platform: Send + Sync {
    /// Ask the platform for a short-lived code to exchange for a token.
    async fn issue_one_time_code(&self) -> Result<String, PlatformError>;

    /// Whether the platform's own session is still live. This says nothing
    /// about the remote server's token.
    async fn probe_session_validity(&self) -> Result<bool, PlatformError>;
}

/// Platform that hands out one fixed code and reports a fixed session validity.
/// Used by the command-line driver, where the code is pasted in by hand.
#[derive(Debug, Clone)]
pub struct StaticPlatform {
    code: Option<String>,
    session_valid: bool,
}

impl StaticPlatform {
    pub fn new(code: Option<String>) -> Self {
        Self {
            code,
            session_valid: true,
        }
    }

    pub fn with_session_valid(mut self, valid: bool) -> Self {
        self.session_valid = valid;
        self
    }
}

#[async_trait]
impl Platform for StaticPlatform {
    async fn issue_one_time_code(&self) -> Result<String, PlatformError> {
        self.code
            .clone()
            .filter(|c| !c.is_empty())
            .ok_or_else(|| PlatformError::CodeUnavailable("no login code configured".to_string()))
    }

    async fn probe_session_validity(&self) -> Result<bool, PlatformError> {
        Ok(self.session_valid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_platform_code() {
        let platform = StaticPlatform::new(Some("abc".to_string()));
        assert_eq!(platform.issue_one_time_code().await.unwrap(), "abc");
        assert!(platform.probe_session_validity().await.unwrap());
    }

    #[tokio::test]
    async fn test_static_platform_without_code() {
        let platform = StaticPlatform::new(None).with_session_valid(false);
        assert!(matches!(
            platform.issue_one_time_code().await,
            Err(PlatformError::CodeUnavailable(_))
        ));
        assert!(!platform.probe_session_validity().await.unwrap());

        let empty = StaticPlatform::new(Some(String::new()));
        assert!(empty.issue_one_time_code().await.is_err());
    }
}
