//! HTTP client for the linkdash backend API
//!
//! This module provides:
//! - URL joining and header composition
//! - Bearer token resolution from server cookies or the client session
//! - Per-request timeouts that abort the in-flight call
//! - Uniform decoding of JSON, text and empty bodies
//! - Normalization of non-2xx responses into one typed error

pub mod builder;
pub mod auth;
pub mod error;
pub mod timeout;
pub mod client;

pub use builder::{join_url, RequestBuilder, RequestDescriptor};
pub use auth::{
    AuthError, ClientSession, ClientTokenSource, RequestContext, ServerAuthConfig,
    ServerTokenSource, Session, SessionUser, TokenSource,
};
pub use error::{ApiError, ResponseBody};
pub use timeout::{with_timeout, TimeoutConfig};
pub use client::ApiClient;

// Re-export commonly used types
pub use reqwest::multipart;
pub use reqwest::{header, Method, StatusCode};
