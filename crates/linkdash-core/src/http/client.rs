//! Typed API client for the linkdash backend
//!
//! One [`ApiClient`] owns its base URL, global headers, timeout and token
//! source. Calls are independent: nothing is queued, retried or de-duplicated.

use reqwest::header::{HeaderMap, CONTENT_TYPE};
use reqwest::multipart::Form;
use reqwest::{Client as ReqwestClient, Method, RequestBuilder as ReqwestRequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{field, Instrument, Span};

use crate::config::ApiConfig;
use crate::http::auth::{RequestContext, TokenSource};
use crate::http::builder::{parse_header, RequestBuilder, RequestDescriptor};
use crate::http::error::{decode_body, is_bodiless, ApiError, ResponseBody};
use crate::http::timeout::{with_timeout, TimeoutConfig};
use crate::logging::redaction::redact_headers;
use crate::{Error, Result};

/// Unified HTTP client for the dashboard API
#[derive(Clone)]
pub struct ApiClient {
    /// Underlying reqwest client
    client: ReqwestClient,
    /// URL and header composition
    request_builder: RequestBuilder,
    /// Where bearer tokens come from; `None` sends every call anonymously
    token_source: Option<Arc<dyn TokenSource>>,
    /// Client configuration
    config: ApiConfig,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.config.base_url)
            .field("timeout", &self.config.timeout)
            .field("has_token_source", &self.token_source.is_some())
            .finish()
    }
}

impl ApiClient {
    /// Create a new client from configuration
    pub fn new(config: ApiConfig) -> Result<Self> {
        config.validate()?;

        let mut global_headers = HeaderMap::new();
        for (name, value) in &config.global_headers {
            let (name, value) = parse_header(name, value)?;
            global_headers.insert(name, value);
        }

        let mut builder = ReqwestClient::builder().connect_timeout(config.timeout.connect_timeout);
        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }
        let client = builder.build().map_err(|e| Error::HttpRequest {
            message: format!("Failed to create HTTP client: {}", e),
            source: Some(Box::new(e)),
        })?;

        let request_builder = RequestBuilder::new(config.base_url.clone(), global_headers);

        Ok(Self {
            client,
            request_builder,
            token_source: None,
            config,
        })
    }

    /// Create from `LINKDASH_*` environment variables
    pub fn from_env() -> Result<Self> {
        Self::new(ApiConfig::from_env()?)
    }

    /// Attach the token strategy used for every call
    pub fn with_token_source(mut self, source: Arc<dyn TokenSource>) -> Self {
        self.token_source = Some(source);
        self
    }

    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    pub fn base_url(&self) -> &str {
        self.request_builder.base_url()
    }

    pub fn global_headers(&self) -> &HeaderMap {
        self.request_builder.global_headers()
    }

    /// Set a header sent with every later call
    pub fn set_global_header(&mut self, name: &str, value: &str) -> Result<()> {
        self.request_builder.set_global_header(name, value)?;
        self.config.global_headers.insert(name.to_string(), value.to_string());
        Ok(())
    }

    /// Stop sending a global header; returns true when it was set
    pub fn remove_global_header(&mut self, name: &str) -> bool {
        self.config
            .global_headers
            .retain(|key, _| !key.eq_ignore_ascii_case(name));
        self.request_builder.remove_global_header(name)
    }

    fn resolve_token(&self, context: Option<&RequestContext>) -> Option<String> {
        self.token_source.as_ref().and_then(|source| source.token(context))
    }

    /// Issue one call and deserialize the decoded body into `T`
    ///
    /// Empty bodies decode from `{}`, text bodies from a JSON string.
    pub async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<Value>,
        headers: Option<HeaderMap>,
        context: Option<&RequestContext>,
    ) -> Result<T> {
        let mut descriptor = RequestDescriptor::new(method, endpoint);
        if let Some(body) = body {
            descriptor = descriptor.with_body(body);
        }
        if let Some(headers) = headers {
            descriptor = descriptor.with_headers(headers);
        }

        let body = self.execute(descriptor, context).await?;
        into_typed(body)
    }

    /// Issue one call and return the decoded body untyped
    pub async fn execute(
        &self,
        descriptor: RequestDescriptor,
        context: Option<&RequestContext>,
    ) -> Result<ResponseBody> {
        let url = self.request_builder.build_url(&descriptor.endpoint)?;
        let token = self.resolve_token(context);
        let headers = self
            .request_builder
            .compose_headers(&descriptor.headers, token.as_deref())?;

        let span = tracing::debug_span!(
            "api_request",
            method = %descriptor.method,
            url = %url,
            status = field::Empty,
        );
        tracing::debug!(parent: &span, headers = ?redact_headers(&headers), "sending request");

        let mut request = self.client.request(descriptor.method, url).headers(headers);
        if let Some(body) = &descriptor.body {
            request = request.json(body);
        }

        self.send(request).instrument(span).await
    }

    pub async fn get<T: DeserializeOwned>(&self, endpoint: &str, context: Option<&RequestContext>) -> Result<T> {
        self.request(Method::GET, endpoint, None, None, context).await
    }

    pub async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        endpoint: &str,
        body: &B,
        context: Option<&RequestContext>,
    ) -> Result<T> {
        let body = serde_json::to_value(body)?;
        self.request(Method::POST, endpoint, Some(body), None, context).await
    }

    pub async fn put<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        endpoint: &str,
        body: &B,
        context: Option<&RequestContext>,
    ) -> Result<T> {
        let body = serde_json::to_value(body)?;
        self.request(Method::PUT, endpoint, Some(body), None, context).await
    }

    pub async fn patch<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        endpoint: &str,
        body: &B,
        context: Option<&RequestContext>,
    ) -> Result<T> {
        let body = serde_json::to_value(body)?;
        self.request(Method::PATCH, endpoint, Some(body), None, context).await
    }

    pub async fn delete<T: DeserializeOwned>(&self, endpoint: &str, context: Option<&RequestContext>) -> Result<T> {
        self.request(Method::DELETE, endpoint, None, None, context).await
    }

    /// POST a multipart form
    ///
    /// Global and caller headers apply, minus any `Content-Type`: reqwest
    /// writes that one with the boundary.
    pub async fn upload<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        form: Form,
        headers: Option<HeaderMap>,
        context: Option<&RequestContext>,
    ) -> Result<T> {
        let url = self.request_builder.build_url(endpoint)?;
        let token = self.resolve_token(context);
        let headers = self
            .request_builder
            .compose_upload_headers(&headers.unwrap_or_default(), token.as_deref())?;

        let span = tracing::debug_span!(
            "api_upload",
            method = %Method::POST,
            url = %url,
            status = field::Empty,
        );
        tracing::debug!(parent: &span, headers = ?redact_headers(&headers), "sending upload");

        let request = self.client.post(url).headers(headers).multipart(form);
        let body = self.send(request).instrument(span).await?;
        into_typed(body)
    }

    /// Send under the request timeout and decode the response
    async fn send(&self, request: ReqwestRequestBuilder) -> Result<ResponseBody> {
        let timeouts = &self.config.timeout;
        let result = with_timeout(timeouts.request_timeout, async {
            let response = request.send().await.map_err(|e| transport_error(e, timeouts))?;
            self.read_response(response, timeouts).await
        })
        .await;

        if let Err(Error::Timeout { timeout_ms }) = &result {
            tracing::warn!(timeout_ms, "request timed out");
        }
        result
    }

    async fn read_response(&self, response: Response, timeouts: &TimeoutConfig) -> Result<ResponseBody> {
        let status = response.status();
        Span::current().record("status", status.as_u16());

        if !status.is_success() {
            let error = ApiError::from_response(response).await;
            tracing::debug!(status = error.status, message = %error.message, "request failed");

            if error.is_unauthorized() {
                if let Some(source) = &self.token_source {
                    source.invalidate();
                }
            }
            return Err(Error::Api(error));
        }

        if is_bodiless(status, response.headers()) {
            return Ok(ResponseBody::Empty);
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());
        let bytes = response
            .bytes()
            .await
            .map_err(|e| transport_error(e, timeouts))?;

        decode_body(content_type.as_deref(), &bytes)
    }
}

/// Map a reqwest failure onto timeout vs. network errors
///
/// A timeout while connecting reports the connect limit, any other the
/// request limit.
fn transport_error(error: reqwest::Error, timeouts: &TimeoutConfig) -> Error {
    if error.is_timeout() {
        Error::Timeout {
            timeout_ms: timeouts.limit_ms(error.is_connect()),
        }
    } else {
        Error::Network {
            message: error.to_string(),
            source: error,
        }
    }
}

fn into_typed<T: DeserializeOwned>(body: ResponseBody) -> Result<T> {
    serde_json::from_value(body.into_value()).map_err(|e| Error::Decode {
        message: format!("unexpected response shape: {}", e),
        source: Some(e.into()),
    })
}
