//! Post-login redirect target
//!
//! A single record in [`SessionStorage`] remembers where to send the user
//! once they have signed in again. The record is only ever handed out while
//! it is younger than the max age and still points at the current origin;
//! anything else is deleted on the read that notices it.

use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use url::Url;

use super::storage::SessionStorage;
use crate::{Error, Result};

/// Storage key of the redirect record
pub const REDIRECT_KEY: &str = "linkdash.redirect_url";

/// Records older than this are discarded
pub const REDIRECT_MAX_AGE_MINUTES: i64 = 30;

/// How far a record's timestamp may lie ahead of the local clock
const MAX_CLOCK_SKEW_MS: i64 = 60_000;

const DANGEROUS_SCHEMES: [&str; 3] = ["javascript:", "data:", "vbscript:"];

/// Why the redirect target was recorded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RedirectReason {
    SessionExpired,
    Unauthorized,
    Manual,
}

/// Stored redirect target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RedirectRecord {
    pub url: String,
    /// Epoch milliseconds when the record was written
    pub timestamp: i64,
    pub origin: String,
    pub reason: RedirectReason,
}

/// Whether `url` is a safe place to send the user on `origin`
///
/// Relative paths and absolute URLs on the same origin pass. Script-bearing
/// schemes and anything resolving to another scheme, host or port do not.
pub fn is_safe_redirect(url: &str, origin: &Url) -> bool {
    let candidate = url.trim();
    if candidate.is_empty() {
        return false;
    }

    let normalized: String = candidate
        .chars()
        .filter(|c| !c.is_whitespace() && !c.is_control())
        .collect::<String>()
        .to_ascii_lowercase();
    if DANGEROUS_SCHEMES.iter().any(|scheme| normalized.starts_with(scheme)) {
        return false;
    }

    match origin.join(candidate) {
        Ok(resolved) => {
            matches!(resolved.scheme(), "http" | "https") && resolved.origin() == origin.origin()
        }
        Err(_) => false,
    }
}

/// Session-scoped "return here after login" slot
pub struct RedirectStore {
    storage: Arc<dyn SessionStorage>,
    origin: Url,
    max_age: Duration,
}

impl std::fmt::Debug for RedirectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedirectStore")
            .field("origin", &self.origin.as_str())
            .field("max_age", &self.max_age)
            .finish()
    }
}

impl RedirectStore {
    /// Create a store for pages served from `origin`
    pub fn new(storage: Arc<dyn SessionStorage>, origin: &str) -> Result<Self> {
        let origin = Url::parse(origin).map_err(|e| Error::Configuration {
            message: format!("Invalid redirect origin: {}", origin),
            source: Some(e.into()),
        })?;
        if !matches!(origin.scheme(), "http" | "https") {
            return Err(Error::configuration(format!(
                "Redirect origin must use http or https: {}",
                origin
            )));
        }

        Ok(Self {
            storage,
            origin,
            max_age: Duration::minutes(REDIRECT_MAX_AGE_MINUTES),
        })
    }

    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }

    pub fn origin(&self) -> &Url {
        &self.origin
    }

    /// Remember `url`; returns false and writes nothing when it is unsafe
    pub fn set(&self, url: &str, reason: RedirectReason) -> bool {
        if !is_safe_redirect(url, &self.origin) {
            tracing::warn!(url = %url, "rejected unsafe redirect target");
            return false;
        }

        let record = RedirectRecord {
            url: url.trim().to_string(),
            timestamp: Utc::now().timestamp_millis(),
            origin: self.origin.origin().ascii_serialization(),
            reason,
        };

        let written = serde_json::to_string(&record)
            .map_err(Error::from)
            .and_then(|raw| self.storage.set(REDIRECT_KEY, &raw));

        match written {
            Ok(()) => {
                tracing::debug!(url = %record.url, reason = ?reason, "stored redirect target");
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to store redirect target");
                false
            }
        }
    }

    /// The stored record, if present, unexpired and still safe
    pub fn record(&self) -> Option<RedirectRecord> {
        let raw = match self.storage.get(REDIRECT_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(error = %e, "failed to read redirect target");
                return None;
            }
        };

        let record: RedirectRecord = match serde_json::from_str(&raw) {
            Ok(record) => record,
            Err(e) => {
                tracing::debug!(error = %e, "discarding unreadable redirect record");
                self.reset();
                return None;
            }
        };

        let age_ms = Utc::now().timestamp_millis() - record.timestamp;
        if age_ms >= self.max_age.num_milliseconds() || age_ms < -MAX_CLOCK_SKEW_MS {
            tracing::debug!(age_ms, "discarding expired redirect record");
            self.reset();
            return None;
        }

        if !is_safe_redirect(&record.url, &self.origin) {
            tracing::debug!(url = %record.url, "discarding redirect record for foreign origin");
            self.reset();
            return None;
        }

        Some(record)
    }

    /// Stored URL, evicting the record if it has expired or become invalid
    pub fn get(&self) -> Option<String> {
        self.record().map(|record| record.url)
    }

    /// Read the URL and clear the slot
    pub fn take(&self) -> Option<String> {
        let url = self.get();
        if url.is_some() {
            self.reset();
        }
        url
    }

    pub fn has_valid(&self) -> bool {
        self.get().is_some()
    }

    /// Delete the record; idempotent
    pub fn reset(&self) {
        if let Err(e) = self.storage.remove(REDIRECT_KEY) {
            tracing::warn!(error = %e, "failed to clear redirect target");
        }
    }

    /// Evict a stale record now; returns true when one was removed
    pub fn sweep(&self) -> bool {
        let present = matches!(self.storage.get(REDIRECT_KEY), Ok(Some(_)));
        present && self.record().is_none()
    }

    /// Run [`sweep`](Self::sweep) once after `delay` on the tokio runtime
    pub fn spawn_initial_sweep(self: &Arc<Self>, delay: std::time::Duration) -> tokio::task::JoinHandle<bool> {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let evicted = store.sweep();
            if evicted {
                tracing::debug!("initial sweep evicted a stale redirect record");
            }
            evicted
        })
    }
}
