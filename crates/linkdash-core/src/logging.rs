//! Logging setup and redaction helpers
//!
//! The library only emits `tracing` events. Applications embedding it call
//! [`init_logging`] once to install a `tracing-subscriber` formatter.

use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

use crate::{Error, Result};

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter
    pub level: String,
    /// Output format: compact, full, json
    pub format: LogFormat,
    /// Include file and line numbers
    pub source_location: bool,
}

/// Log output format
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Compact,
    Full,
    Json,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Compact,
            source_location: false,
        }
    }
}

impl LoggingConfig {
    /// Apply `LINKDASH_LOG` and `LINKDASH_LOG_FORMAT`
    pub fn merge_with_env(&mut self) {
        self.apply_env(|key| std::env::var(key).ok());
    }

    fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(level) = lookup("LINKDASH_LOG") {
            self.level = level;
        }

        if let Some(format) = lookup("LINKDASH_LOG_FORMAT") {
            match format.to_lowercase().as_str() {
                "compact" => self.format = LogFormat::Compact,
                "full" => self.format = LogFormat::Full,
                "json" => self.format = LogFormat::Json,
                _ => tracing::warn!("Invalid log format: {}, using default", format),
            }
        }
    }
}

/// Initialize the global logging system
///
/// `RUST_LOG` takes precedence over the configured level.
pub fn init_logging(config: LoggingConfig) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_file(config.source_location)
        .with_line_number(config.source_location);

    let installed = match config.format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Full => builder.try_init(),
        LogFormat::Json => builder.with_ansi(false).json().try_init(),
    };

    installed.map_err(|e| Error::Configuration {
        message: format!("Failed to initialize logging: {}", e),
        source: None,
    })?;

    tracing::debug!(config = ?config, "Logging system initialized");
    Ok(())
}

/// Sensitive data redaction utilities
pub mod redaction {
    use regex::Regex;
    use reqwest::header::HeaderMap;
    use std::sync::OnceLock;

    static TOKEN_REGEX: OnceLock<Regex> = OnceLock::new();

    fn token_regex() -> &'static Regex {
        TOKEN_REGEX.get_or_init(|| {
            Regex::new(r#"(?i)(token|bearer|secret)([=:\s]+)['"]?[a-zA-Z0-9_.\-]{8,}['"]?"#)
                .expect("valid redaction pattern")
        })
    }

    /// Check if a header or field name holds credentials
    pub fn is_sensitive_key(key: &str) -> bool {
        let key_lower = key.to_lowercase();
        key_lower.contains("authorization")
            || key_lower.contains("cookie")
            || key_lower.contains("token")
            || key_lower.contains("secret")
            || key_lower.contains("api-key")
    }

    /// Redact token-looking substrings from free text
    pub fn redact_sensitive(input: &str) -> String {
        token_regex().replace_all(input, "$1$2***").to_string()
    }

    /// Header pairs safe to log
    pub fn redact_headers(headers: &HeaderMap) -> Vec<(String, String)> {
        headers
            .iter()
            .map(|(name, value)| {
                let shown = if is_sensitive_key(name.as_str()) || value.is_sensitive() {
                    "***".to_string()
                } else {
                    redact_sensitive(value.to_str().unwrap_or("<binary>"))
                };
                (name.as_str().to_string(), shown)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::redaction::*;
    use super::*;
    use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, COOKIE};

    #[test]
    fn test_default_config() {
        let config = LoggingConfig::default();
        assert_eq!(config.level, "info");
        assert_eq!(config.format, LogFormat::Compact);
    }

    #[test]
    fn test_env_overrides_level_and_format() {
        let mut config = LoggingConfig::default();
        config.apply_env(|key| match key {
            "LINKDASH_LOG" => Some("linkdash_core=debug".to_string()),
            "LINKDASH_LOG_FORMAT" => Some("JSON".to_string()),
            _ => None,
        });
        assert_eq!(config.level, "linkdash_core=debug");
        assert_eq!(config.format, LogFormat::Json);

        config.apply_env(|key| (key == "LINKDASH_LOG_FORMAT").then(|| "fancy".to_string()));
        assert_eq!(config.format, LogFormat::Json);
    }

    #[test]
    fn test_merge_with_env_reads_process_env() {
        std::env::set_var("LINKDASH_LOG_FORMAT", "full");
        let mut config = LoggingConfig::default();
        config.merge_with_env();
        std::env::remove_var("LINKDASH_LOG_FORMAT");

        assert_eq!(config.format, LogFormat::Full);
    }

    #[test]
    fn test_init_logging_only_once() {
        let config = LoggingConfig {
            level: "warn".to_string(),
            ..LoggingConfig::default()
        };
        assert!(init_logging(config.clone()).is_ok());
        assert!(matches!(init_logging(config), Err(Error::Configuration { .. })));
    }

    #[test]
    fn test_log_format_serde() {
        let format: LogFormat = serde_json::from_str("\"json\"").unwrap();
        assert_eq!(format, LogFormat::Json);
    }

    #[test]
    fn test_redact_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abcdefghijkl"));
        headers.insert(COOKIE, HeaderValue::from_static("linkdash.session-token=xyz"));
        headers.insert("x-client", HeaderValue::from_static("dashboard"));

        let redacted = redact_headers(&headers);
        let find = |name: &str| {
            redacted
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, v)| v.clone())
                .unwrap()
        };

        assert_eq!(find("authorization"), "***");
        assert_eq!(find("cookie"), "***");
        assert_eq!(find("x-client"), "dashboard");
    }

    #[test]
    fn test_redact_sensitive_text() {
        let out = redact_sensitive("retrying with token=abcdef123456 now");
        assert_eq!(out, "retrying with token=*** now");
        assert_eq!(redact_sensitive("nothing here"), "nothing here");
    }
}
