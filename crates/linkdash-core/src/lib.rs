//! linkdash core - API client layer of the linkdash link-shortening dashboard
//!
//! # Main Components
//!
//! - **HTTP client**: [`ApiClient`] issues JSON and multipart calls against the
//!   backend with bearer auth, timeouts and normalized errors
//! - **Token sources**: [`ServerTokenSource`] for server-rendered requests,
//!   [`ClientTokenSource`] for the in-process session
//! - **Redirect store**: [`RedirectStore`] remembers where to go after login
//! - **Error Handling**: one [`Error`] type using `thiserror` and `anyhow`
//!
//! # Example
//!
//! ```no_run
//! use linkdash_core::{ApiClient, ApiConfig, ClientSession, ClientTokenSource, Result, Session};
//! use std::sync::Arc;
//!
//! async fn example() -> Result<()> {
//!     let session = ClientSession::new();
//!     session.sign_in(Session::new("access-token"));
//!
//!     let client = ApiClient::new(ApiConfig::from_env()?)?
//!         .with_token_source(Arc::new(ClientTokenSource::new(session)));
//!
//!     let links: serde_json::Value = client.get("/links", None).await?;
//!     println!("{}", links);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod http;
pub mod logging;
pub mod session;

// Re-export main types for convenience
pub use config::{ApiConfig, ApiConfigBuilder};
pub use error::{Error, Result};
pub use http::{
    ApiClient, ApiError, ClientSession, ClientTokenSource, RequestContext, ResponseBody,
    ServerAuthConfig, ServerTokenSource, Session, SessionUser, TimeoutConfig, TokenSource,
};
pub use session::{FileStorage, MemoryStorage, RedirectReason, RedirectStore, SessionStorage};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_version() {
        assert!(!VERSION.is_empty());
    }
}
