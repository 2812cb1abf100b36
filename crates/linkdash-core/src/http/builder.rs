//! Request construction: URL joining and header composition
//!
//! Headers are merged in a fixed order: JSON defaults, the client's global
//! headers, the caller's headers, then `Authorization` when a token resolved.
//! A later source replaces every value an earlier one set for the same name.

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Method, Url};
use serde_json::Value;

use crate::{Error, Result};

/// One outgoing call, built per request and never stored
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    pub method: Method,
    pub endpoint: String,
    pub body: Option<Value>,
    pub headers: HeaderMap,
}

impl RequestDescriptor {
    pub fn new(method: Method, endpoint: impl Into<String>) -> Self {
        Self {
            method,
            endpoint: endpoint.into(),
            body: None,
            headers: HeaderMap::new(),
        }
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }
}

/// Join a base URL and an endpoint with exactly one slash between them
pub fn join_url(base_url: &str, endpoint: &str) -> String {
    let base = base_url.trim_end_matches('/');
    let path = endpoint.trim_start_matches('/');

    if path.is_empty() {
        base.to_string()
    } else {
        format!("{}/{}", base, path)
    }
}

/// Headers every JSON call starts from
pub fn default_json_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
    headers
}

/// Overlay `source` onto `target`; names present in `source` replace all earlier values
fn overlay(target: &mut HeaderMap, source: &HeaderMap) {
    for name in source.keys() {
        target.remove(name);
        for value in source.get_all(name) {
            target.append(name.clone(), value.clone());
        }
    }
}

/// `Authorization: Bearer <token>` as a header value
pub fn bearer_value(token: &str) -> Result<HeaderValue> {
    let mut value = HeaderValue::from_str(&format!("Bearer {}", token)).map_err(|e| Error::HttpRequest {
        message: "Session token is not a valid header value".to_string(),
        source: Some(Box::new(e)),
    })?;
    value.set_sensitive(true);
    Ok(value)
}

/// Parse a header name/value pair supplied as strings
pub fn parse_header(name: &str, value: &str) -> Result<(HeaderName, HeaderValue)> {
    let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| Error::HttpRequest {
        message: format!("Invalid header name: {}", name),
        source: Some(Box::new(e)),
    })?;
    let header_value = HeaderValue::from_str(value).map_err(|e| Error::HttpRequest {
        message: format!("Invalid value for header {}", name),
        source: Some(Box::new(e)),
    })?;
    Ok((header_name, header_value))
}

/// Builds URLs and header sets for one client instance
#[derive(Debug, Clone)]
pub struct RequestBuilder {
    base_url: String,
    global_headers: HeaderMap,
}

impl RequestBuilder {
    pub fn new(base_url: impl Into<String>, global_headers: HeaderMap) -> Self {
        Self {
            base_url: base_url.into(),
            global_headers,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn global_headers(&self) -> &HeaderMap {
        &self.global_headers
    }

    pub fn set_global_header(&mut self, name: &str, value: &str) -> Result<()> {
        let (name, value) = parse_header(name, value)?;
        self.global_headers.insert(name, value);
        Ok(())
    }

    /// Returns true when the header was present
    pub fn remove_global_header(&mut self, name: &str) -> bool {
        self.global_headers.remove(name).is_some()
    }

    /// Full URL for an endpoint
    pub fn build_url(&self, endpoint: &str) -> Result<Url> {
        let joined = join_url(&self.base_url, endpoint);
        Url::parse(&joined).map_err(|e| Error::HttpRequest {
            message: format!("Invalid request URL: {}", joined),
            source: Some(Box::new(e)),
        })
    }

    /// Header set for a JSON call
    pub fn compose_headers(&self, custom: &HeaderMap, token: Option<&str>) -> Result<HeaderMap> {
        let mut headers = default_json_headers();
        overlay(&mut headers, &self.global_headers);
        overlay(&mut headers, custom);

        if let Some(token) = token {
            headers.insert(AUTHORIZATION, bearer_value(token)?);
        }

        Ok(headers)
    }

    /// Header set for a multipart upload
    ///
    /// `Content-Type` is always stripped so the transport writes the boundary.
    pub fn compose_upload_headers(&self, custom: &HeaderMap, token: Option<&str>) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        overlay(&mut headers, &self.global_headers);
        overlay(&mut headers, custom);
        headers.remove(CONTENT_TYPE);

        if let Some(token) = token {
            headers.insert(AUTHORIZATION, bearer_value(token)?);
        }

        Ok(headers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_builder() -> RequestBuilder {
        let mut global = HeaderMap::new();
        global.insert("x-workspace", HeaderValue::from_static("acme"));
        RequestBuilder::new("https://api.linkdash.test/v1", global)
    }

    #[test]
    fn test_join_url_slashes() {
        assert_eq!(join_url("https://a.test/api", "links"), "https://a.test/api/links");
        assert_eq!(join_url("https://a.test/api/", "/links"), "https://a.test/api/links");
        assert_eq!(join_url("https://a.test/api//", "//links/7"), "https://a.test/api/links/7");
        assert_eq!(join_url("https://a.test/api", ""), "https://a.test/api");
        assert_eq!(join_url("https://a.test/api", "/"), "https://a.test/api");
    }

    #[test]
    fn test_build_url() {
        let builder = create_test_builder();
        let url = builder.build_url("/links?page=2").unwrap();
        assert_eq!(url.as_str(), "https://api.linkdash.test/v1/links?page=2");

        let broken = RequestBuilder::new("not a url", HeaderMap::new());
        assert!(matches!(broken.build_url("links"), Err(Error::HttpRequest { .. })));
    }

    #[test]
    fn test_compose_headers_with_token() {
        let builder = create_test_builder();
        let headers = builder.compose_headers(&HeaderMap::new(), Some("abc.def")).unwrap();

        assert_eq!(headers.get(CONTENT_TYPE).unwrap(), "application/json");
        assert_eq!(headers.get(ACCEPT).unwrap(), "application/json");
        assert_eq!(headers.get("x-workspace").unwrap(), "acme");
        assert_eq!(headers.get(AUTHORIZATION).unwrap(), "Bearer abc.def");
    }

    #[test]
    fn test_compose_headers_without_token() {
        let builder = create_test_builder();
        let headers = builder.compose_headers(&HeaderMap::new(), None).unwrap();
        assert!(headers.get(AUTHORIZATION).is_none());
    }

    #[test]
    fn test_later_sources_override() {
        let mut builder = create_test_builder();
        builder.set_global_header("Accept", "text/csv").unwrap();

        let mut custom = HeaderMap::new();
        custom.insert("x-workspace", HeaderValue::from_static("globex"));

        let headers = builder.compose_headers(&custom, None).unwrap();
        assert_eq!(headers.get(ACCEPT).unwrap(), "text/csv");
        assert_eq!(headers.get_all("x-workspace").iter().count(), 1);
        assert_eq!(headers.get("x-workspace").unwrap(), "globex");
    }

    #[test]
    fn test_token_overrides_custom_authorization() {
        let builder = create_test_builder();
        let mut custom = HeaderMap::new();
        custom.insert(AUTHORIZATION, HeaderValue::from_static("Basic Zm9vOmJhcg=="));

        let headers = builder.compose_headers(&custom, Some("tok")).unwrap();
        assert_eq!(headers.get(AUTHORIZATION).unwrap(), "Bearer tok");
    }

    #[test]
    fn test_upload_headers_drop_content_type() {
        let mut builder = create_test_builder();
        builder.set_global_header("Content-Type", "application/json").unwrap();

        let mut custom = HeaderMap::new();
        custom.insert(CONTENT_TYPE, HeaderValue::from_static("multipart/form-data"));

        let headers = builder.compose_upload_headers(&custom, Some("tok")).unwrap();
        assert!(headers.get(CONTENT_TYPE).is_none());
        assert_eq!(headers.get(AUTHORIZATION).unwrap(), "Bearer tok");
        assert_eq!(headers.get("x-workspace").unwrap(), "acme");
    }

    #[test]
    fn test_global_header_setters() {
        let mut builder = create_test_builder();
        assert!(builder.set_global_header("bad header", "x").is_err());
        assert!(builder.set_global_header("X-Locale", "bad\nvalue").is_err());

        builder.set_global_header("X-Locale", "en-GB").unwrap();
        assert_eq!(builder.global_headers().get("x-locale").unwrap(), "en-GB");
        assert!(builder.remove_global_header("x-locale"));
        assert!(!builder.remove_global_header("x-locale"));
    }

    #[test]
    fn test_invalid_token_is_rejected() {
        let builder = create_test_builder();
        let result = builder.compose_headers(&HeaderMap::new(), Some("line\nbreak"));
        assert!(matches!(result, Err(Error::HttpRequest { .. })));
    }
}
