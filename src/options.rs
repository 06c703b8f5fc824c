//! Transport configuration and credential lookup.

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;

use crate::client::ClientError;

const DEFAULT_CHAT_PATH: &str = "/api/v1/chat/chat";
const DEFAULT_ALERTS_PATH: &str = "/api/v1/alerts/stream";

/// A secret string type for sensitive data like access tokens.
/// Prevents accidental logging or display of secrets.
#[derive(Clone)]
pub struct SecretString(String);

impl SecretString {
    /// Create a new secret string.
    pub fn new(s: String) -> Self {
        Self(s)
    }

    /// Get the underlying secret value.
    pub fn expose_secret(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for SecretString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SecretString([REDACTED])")
    }
}

impl From<String> for SecretString {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for SecretString {
    fn from(s: &str) -> Self {
        Self::new(s.to_string())
    }
}

/// How the credential is attached to outgoing requests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AuthHeader {
    /// `access-token: <token>`
    #[default]
    AccessToken,
    /// `Authorization: Bearer <token>`
    Bearer,
}

/// Reconnection behaviour of the alert stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Wait between a dropped connection and the next attempt
    pub delay: Duration,

    /// Consecutive failed attempts before giving up (`None` retries forever)
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(3),
            max_attempts: None,
        }
    }
}

impl ReconnectPolicy {
    /// Never reconnect.
    pub fn disabled() -> Self {
        Self {
            delay: Duration::ZERO,
            max_attempts: Some(0),
        }
    }
}

/// Transport options for the streaming endpoints.
///
/// # Example
/// ```rust
/// use visionai_stream::options::{AuthHeader, TransportOptions};
/// use std::time::Duration;
///
/// let options = TransportOptions::new("http://vision.local:8000")
///     .with_timeout(Duration::from_secs(120))
///     .with_auth_header(AuthHeader::Bearer);
/// assert_eq!(options.chat_url(), "http://vision.local:8000/api/v1/chat/chat");
/// ```
#[derive(Debug, Clone)]
pub struct TransportOptions {
    /// Backend origin, e.g. `http://vision.local:8000`
    pub base_url: String,

    /// Path of the streaming chat endpoint
    pub chat_path: String,

    /// Path of the alert event stream
    pub alerts_path: String,

    /// Request timeout. Applies to the whole exchange, body included.
    pub timeout: Option<Duration>,

    /// HTTP proxy URL
    pub proxy: Option<String>,

    /// Additional HTTP headers to include in requests
    pub extra_headers: Option<HashMap<String, String>>,

    /// Header used for the credential
    pub auth_header: AuthHeader,

    /// Alert stream reconnection
    pub reconnect: ReconnectPolicy,
}

impl TransportOptions {
    /// Create transport options for the given backend origin.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            chat_path: DEFAULT_CHAT_PATH.to_string(),
            alerts_path: DEFAULT_ALERTS_PATH.to_string(),
            timeout: None,
            proxy: None,
            extra_headers: None,
            auth_header: AuthHeader::default(),
            reconnect: ReconnectPolicy::default(),
        }
    }

    /// Read options from `VISIONAI_BASE_URL`, `VISIONAI_TIMEOUT_SECS` and `VISIONAI_PROXY`.
    pub fn from_env() -> Result<Self, ClientError> {
        let base_url = std::env::var("VISIONAI_BASE_URL")
            .map_err(|_| ClientError::Config("VISIONAI_BASE_URL is not set".to_string()))?;
        let mut options = Self::new(base_url);

        if let Ok(secs) = std::env::var("VISIONAI_TIMEOUT_SECS") {
            let secs: u64 = secs.parse().map_err(|_| {
                ClientError::Config(format!("invalid VISIONAI_TIMEOUT_SECS: {}", secs))
            })?;
            options.timeout = Some(Duration::from_secs(secs));
        }

        if let Ok(proxy) = std::env::var("VISIONAI_PROXY") {
            options.proxy = Some(proxy);
        }

        Ok(options)
    }

    /// Full URL of the chat endpoint.
    pub fn chat_url(&self) -> String {
        format!("{}{}", self.base_url, self.chat_path)
    }

    /// Full URL of the alert stream.
    pub fn alerts_url(&self) -> String {
        format!("{}{}", self.base_url, self.alerts_path)
    }

    /// Set the chat endpoint path.
    pub fn with_chat_path(mut self, path: impl Into<String>) -> Self {
        self.chat_path = path.into();
        self
    }

    /// Set the alert stream path.
    pub fn with_alerts_path(mut self, path: impl Into<String>) -> Self {
        self.alerts_path = path.into();
        self
    }

    /// Set the timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the proxy URL.
    pub fn with_proxy(mut self, proxy: String) -> Self {
        self.proxy = Some(proxy);
        self
    }

    /// Add a single extra header.
    pub fn with_header(mut self, key: String, value: String) -> Self {
        self.extra_headers
            .get_or_insert_with(HashMap::new)
            .insert(key, value);
        self
    }

    /// Choose how the credential is sent.
    pub fn with_auth_header(mut self, auth_header: AuthHeader) -> Self {
        self.auth_header = auth_header;
        self
    }

    /// Set the alert stream reconnection policy.
    pub fn with_reconnect(mut self, reconnect: ReconnectPolicy) -> Self {
        self.reconnect = reconnect;
        self
    }
}

/// Source of the credential attached to each request.
///
/// Consulted once per request, so rotating tokens are picked up.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn credential(&self) -> Option<SecretString>;
}

/// Sends requests without a credential.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCredentials;

#[async_trait]
impl CredentialProvider for NoCredentials {
    async fn credential(&self) -> Option<SecretString> {
        None
    }
}

/// A fixed token.
#[derive(Debug, Clone)]
pub struct StaticCredential(SecretString);

impl StaticCredential {
    pub fn new(token: impl Into<SecretString>) -> Self {
        Self(token.into())
    }
}

#[async_trait]
impl CredentialProvider for StaticCredential {
    async fn credential(&self) -> Option<SecretString> {
        Some(self.0.clone())
    }
}

/// Reads the token from an environment variable on every request.
#[derive(Debug, Clone)]
pub struct EnvCredential {
    var: String,
}

impl EnvCredential {
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }
}

#[async_trait]
impl CredentialProvider for EnvCredential {
    async fn credential(&self) -> Option<SecretString> {
        std::env::var(&self.var)
            .ok()
            .filter(|token| !token.is_empty())
            .map(SecretString::new)
    }
}
