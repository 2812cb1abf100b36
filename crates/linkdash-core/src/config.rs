//! Client configuration
//!
//! Configuration is resolved once at start-up from, in order:
//! - Default values
//! - Environment variables (a `.env` file is loaded first when present)
//! - Explicit builder calls

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::http::TimeoutConfig;
use crate::{Error, Result};

/// Base URL used when nothing else is configured
pub const DEFAULT_BASE_URL: &str = "http://localhost:8080/api";

/// API client configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Backend base URL; endpoints are joined onto it
    pub base_url: String,

    /// Connection and request timeouts
    pub timeout: TimeoutConfig,

    /// Headers sent with every call
    pub global_headers: BTreeMap<String, String>,

    /// User-Agent override
    pub user_agent: Option<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: TimeoutConfig::default(),
            global_headers: BTreeMap::new(),
            user_agent: Some(format!("linkdash-core/{}", crate::VERSION)),
        }
    }
}

impl ApiConfig {
    pub fn builder() -> ApiConfigBuilder {
        ApiConfigBuilder::new()
    }

    /// Load from `LINKDASH_API_URL` and `LINKDASH_API_TIMEOUT_MS`
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        let mut config = Self::default();
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from a variable lookup
    fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("LINKDASH_API_URL") {
            self.base_url = url;
        }

        if let Some(raw) = lookup("LINKDASH_API_TIMEOUT_MS") {
            let millis = raw.trim().parse::<u64>().map_err(|e| Error::Configuration {
                message: format!("LINKDASH_API_TIMEOUT_MS is not a number: {}", raw),
                source: Some(e.into()),
            })?;
            self.timeout.request_timeout = Duration::from_millis(millis);
        }

        if let Some(agent) = lookup("LINKDASH_USER_AGENT") {
            self.user_agent = Some(agent);
        }

        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.base_url.trim().is_empty() {
            return Err(Error::configuration("Base URL cannot be empty"));
        }

        let parsed = url::Url::parse(&self.base_url).map_err(|e| Error::Configuration {
            message: format!("Invalid base URL: {}", self.base_url),
            source: Some(e.into()),
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(Error::configuration(format!(
                "Base URL must use http or https: {}",
                self.base_url
            )));
        }

        self.timeout.validate()
    }
}

/// Builder for creating configurations programmatically
#[derive(Debug, Default)]
pub struct ApiConfigBuilder {
    config: ApiConfig,
}

impl ApiConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: ApiConfig::default(),
        }
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = url.into();
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout.request_timeout = timeout;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout.connect_timeout = timeout;
        self
    }

    pub fn global_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.global_headers.insert(name.into(), value.into());
        self
    }

    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.config.user_agent = Some(agent.into());
        self
    }

    pub fn build(self) -> ApiConfig {
        self.config
    }
}
