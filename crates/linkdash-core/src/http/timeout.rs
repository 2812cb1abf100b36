//! Timeout configuration and the per-request cancellation guard
//!
//! A request runs inside [`with_timeout`]. When the deadline passes first the
//! request future is dropped, which aborts the in-flight exchange, and the
//! call fails with [`Error::Timeout`].

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

use crate::{Error, Result};

/// Timeout configuration for HTTP requests
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeoutConfig {
    /// Connection timeout - time to establish a connection
    pub connect_timeout: Duration,
    /// Request timeout - total time for sending and reading the response
    pub request_timeout: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl TimeoutConfig {
    pub fn new(connect_timeout: Duration, request_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            request_timeout,
        }
    }

    /// Override only the total request timeout
    pub fn with_request_timeout(&self, timeout: Duration) -> Self {
        let mut config = self.clone();
        config.request_timeout = timeout;
        config
    }

    /// Limit in milliseconds for a timeout that fired while connecting or after
    pub fn limit_ms(&self, connecting: bool) -> u64 {
        let limit = if connecting {
            self.connect_timeout
        } else {
            self.request_timeout
        };
        limit.as_millis() as u64
    }

    /// Validate timeout configuration
    pub fn validate(&self) -> Result<()> {
        if self.connect_timeout.is_zero() {
            return Err(Error::configuration("Connect timeout cannot be zero"));
        }

        if self.request_timeout.is_zero() {
            return Err(Error::configuration("Request timeout cannot be zero"));
        }

        Ok(())
    }
}

/// Run `future` under `timeout`, mapping expiry to [`Error::Timeout`]
pub async fn with_timeout<F, T>(timeout: Duration, future: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(timeout, future).await {
        Ok(result) => result,
        Err(_) => Err(Error::Timeout {
            timeout_ms: timeout.as_millis() as u64,
        }),
    }
}
