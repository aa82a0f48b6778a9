//! Client configuration.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use reqwest::Url;

use crate::error::ClientError;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(30_000);

/// Built-in deployment targets, each with a fixed origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Environment {
    Production,
    Sandbox,
}

impl Environment {
    pub fn origin(self) -> &'static str {
        match self {
            Environment::Production => "https://api.modelhub.ai",
            Environment::Sandbox => "https://sandbox.api.modelhub.ai",
        }
    }
}

impl FromStr for Environment {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "production" | "prod" => Ok(Environment::Production),
            "sandbox" | "staging" => Ok(Environment::Sandbox),
            other => Err(ClientError::configuration(format!(
                "unknown environment `{other}`; expected production or sandbox"
            ))),
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Environment::Production => "production",
            Environment::Sandbox => "sandbox",
        })
    }
}

/// Everything a [`crate::Client`] needs to reach the platform.
#[derive(Clone, PartialEq)]
pub struct ClientConfig {
    /// Long-lived API key. Used as the bearer identity unless a session
    /// token is set.
    pub credential: String,
    pub environment: Environment,
    /// Replaces the environment origin when present.
    pub endpoint: Option<String>,
    pub timeout: Duration,
    /// Preferred storage backend, passed through to storage operations.
    pub storage_provider: Option<String>,
    /// HTTP proxy URL.
    pub proxy: Option<String>,
    /// Additional HTTP headers to send with every request.
    pub headers: HashMap<String, String>,
}

impl ClientConfig {
    pub fn new(credential: impl Into<String>, environment: Environment) -> Self {
        Self {
            credential: credential.into(),
            environment,
            endpoint: None,
            timeout: DEFAULT_TIMEOUT,
            storage_provider: None,
            proxy: None,
            headers: HashMap::new(),
        }
    }

    /// Build from `MODELHUB_*` environment variables.
    ///
    /// `MODELHUB_API_KEY` and `MODELHUB_ENVIRONMENT` are required;
    /// `MODELHUB_BASE_URL`, `MODELHUB_TIMEOUT_MS` and
    /// `MODELHUB_STORAGE_PROVIDER` are optional.
    pub fn from_env() -> Result<Self, ClientError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ClientError> {
        let credential = lookup("MODELHUB_API_KEY")
            .ok_or_else(|| ClientError::configuration("MODELHUB_API_KEY is not set"))?;
        let environment = lookup("MODELHUB_ENVIRONMENT")
            .ok_or_else(|| ClientError::configuration("MODELHUB_ENVIRONMENT is not set"))?
            .parse()?;

        let mut config = Self::new(credential, environment);
        if let Some(url) = lookup("MODELHUB_BASE_URL") {
            config = config.with_endpoint(url);
        }
        if let Some(ms) = lookup("MODELHUB_TIMEOUT_MS") {
            let ms: u64 = ms.trim().parse().map_err(|_| {
                ClientError::configuration(format!("MODELHUB_TIMEOUT_MS is not a number: `{ms}`"))
            })?;
            config = config.with_timeout(Duration::from_millis(ms));
        }
        if let Some(provider) = lookup("MODELHUB_STORAGE_PROVIDER") {
            config = config.with_storage_provider(provider);
        }
        Ok(config)
    }

    /// Set the endpoint override.
    pub fn with_endpoint(mut self, url: impl Into<String>) -> Self {
        self.endpoint = Some(url.into());
        self
    }

    /// Set the timeout.
    pub fn with_timeout(mut self, duration: Duration) -> Self {
        self.timeout = duration;
        self
    }

    pub fn with_storage_provider(mut self, provider: impl Into<String>) -> Self {
        self.storage_provider = Some(provider.into());
        self
    }

    /// Set the proxy.
    pub fn with_proxy(mut self, proxy_url: impl Into<String>) -> Self {
        self.proxy = Some(proxy_url.into());
        self
    }

    /// Add a header.
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Endpoint override, or the environment's origin. No trailing slash.
    pub fn base_url(&self) -> String {
        match &self.endpoint {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => self.environment.origin().to_string(),
        }
    }

    /// Check the mandatory fields. Called by [`crate::Client::new`].
    pub fn validate(&self) -> Result<(), ClientError> {
        if self.credential.trim().is_empty() {
            return Err(ClientError::configuration("credential is required"));
        }
        if let Some(endpoint) = &self.endpoint {
            Url::parse(endpoint).map_err(|e| {
                ClientError::configuration(format!("invalid endpoint `{endpoint}`: {e}"))
            })?;
        }
        if self.timeout.is_zero() {
            return Err(ClientError::configuration("timeout must be greater than zero"));
        }
        Ok(())
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("credential", &"<redacted>")
            .field("environment", &self.environment)
            .field("endpoint", &self.endpoint)
            .field("timeout", &self.timeout)
            .field("storage_provider", &self.storage_provider)
            .field("proxy", &self.proxy)
            .field("headers", &self.headers.keys().collect::<Vec<_>>())
            .finish()
    }
}
