//! Response decoding and HTTP error normalization
//!
//! Any non-2xx response is turned into one [`ApiError`] carrying the status,
//! the decoded body and a best-effort human readable message.

use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::{Error, Result};

/// Decoded response body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ResponseBody {
    /// Body parsed as JSON
    Json(Value),
    /// Body kept as raw text
    Text(String),
    /// No body (204, zero length)
    Empty,
}

impl ResponseBody {
    /// Convert into a JSON value; `Empty` becomes `{}`
    pub fn into_value(self) -> Value {
        match self {
            ResponseBody::Json(value) => value,
            ResponseBody::Text(text) => Value::String(text),
            ResponseBody::Empty => Value::Object(Map::new()),
        }
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            ResponseBody::Json(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ResponseBody::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, ResponseBody::Empty)
    }
}

/// Whether a `Content-Type` value announces a JSON body
pub fn is_json_content_type(content_type: Option<&str>) -> bool {
    content_type
        .map(|ct| ct.to_ascii_lowercase().contains("application/json"))
        .unwrap_or(false)
}

/// Whether a response carries no body according to its status and headers
pub fn is_bodiless(status: StatusCode, headers: &reqwest::header::HeaderMap) -> bool {
    if status == StatusCode::NO_CONTENT {
        return true;
    }

    headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        == Some(0)
}

/// Decode the body of a successful response
///
/// JSON content types must parse; anything else is returned as text.
pub fn decode_body(content_type: Option<&str>, bytes: &[u8]) -> Result<ResponseBody> {
    if bytes.is_empty() {
        return Ok(ResponseBody::Empty);
    }

    if is_json_content_type(content_type) {
        let value = serde_json::from_slice::<Value>(bytes).map_err(|e| Error::Decode {
            message: format!("invalid JSON body: {}", e),
            source: Some(e.into()),
        })?;
        return Ok(ResponseBody::Json(value));
    }

    Ok(ResponseBody::Text(String::from_utf8_lossy(bytes).into_owned()))
}

/// Decode the body of an error response, never failing
///
/// A JSON body that does not parse falls back to text.
fn decode_error_body(content_type: Option<&str>, bytes: &[u8]) -> ResponseBody {
    if bytes.is_empty() {
        return ResponseBody::Empty;
    }

    if is_json_content_type(content_type) {
        if let Ok(value) = serde_json::from_slice::<Value>(bytes) {
            return ResponseBody::Json(value);
        }
    }

    ResponseBody::Text(String::from_utf8_lossy(bytes).into_owned())
}

/// Normalized error for a non-2xx response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiError {
    /// HTTP status code
    pub status: u16,
    /// Canonical reason phrase for the status, empty when unknown
    pub status_text: String,
    /// Decoded response body
    pub data: ResponseBody,
    /// Message from the body's `message`/`error` field or the status line
    pub message: String,
}

impl ApiError {
    /// Build from a reqwest Response, consuming its body
    pub async fn from_response(response: reqwest::Response) -> Self {
        let status = response.status();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        let body = match response.bytes().await {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                tracing::debug!(status = status.as_u16(), error = %e, "failed to read error body");
                None
            }
        };

        Self::from_parts(status, content_type.as_deref(), body.as_deref())
    }

    /// Build from already-read response parts; `None` body means the read failed
    pub fn from_parts(status: StatusCode, content_type: Option<&str>, body: Option<&[u8]>) -> Self {
        let status_text = status.canonical_reason().unwrap_or("").to_string();
        let fallback = format!("HTTP {}: {}", status.as_u16(), status_text);

        let data = body
            .map(|bytes| decode_error_body(content_type, bytes))
            .unwrap_or(ResponseBody::Empty);
        let message = Self::extract_message(&data).unwrap_or(fallback);

        Self {
            status: status.as_u16(),
            status_text,
            data,
            message,
        }
    }

    /// Pull `message`, then `error`, from a JSON object body
    fn extract_message(data: &ResponseBody) -> Option<String> {
        let object = data.as_json()?.as_object()?;
        ["message", "error"]
            .iter()
            .filter_map(|key| object.get(*key).and_then(|v| v.as_str()))
            .find(|s| !s.is_empty())
            .map(|s| s.to_string())
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status == StatusCode::UNAUTHORIZED.as_u16()
    }

    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status)
    }

    pub fn is_server_error(&self) -> bool {
        (500..600).contains(&self.status)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ApiError {}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::{HeaderMap, HeaderValue};
    use serde_json::json;

    #[test]
    fn test_message_from_json_message_field() {
        let body = br#"{"message":"Slug already taken","code":"conflict"}"#;
        let err = ApiError::from_parts(StatusCode::CONFLICT, Some("application/json"), Some(body));

        assert_eq!(err.status, 409);
        assert_eq!(err.message, "Slug already taken");
        assert_eq!(err.data.as_json().unwrap()["code"], "conflict");
    }

    #[test]
    fn test_message_from_json_error_field() {
        let body = br#"{"error":"invalid_token"}"#;
        let err = ApiError::from_parts(
            StatusCode::UNAUTHORIZED,
            Some("application/json; charset=utf-8"),
            Some(body),
        );

        assert_eq!(err.message, "invalid_token");
        assert!(err.is_unauthorized());
        assert!(err.is_client_error());
    }

    #[test]
    fn test_message_prefers_message_over_error() {
        let body = br#"{"error":"bad_request","message":"URL is required"}"#;
        let err = ApiError::from_parts(StatusCode::BAD_REQUEST, Some("application/json"), Some(body));
        assert_eq!(err.message, "URL is required");
    }

    #[test]
    fn test_invalid_json_falls_back_to_text() {
        let body = b"<html>gateway exploded</html>";
        let err = ApiError::from_parts(StatusCode::BAD_GATEWAY, Some("application/json"), Some(body));

        assert_eq!(err.data, ResponseBody::Text("<html>gateway exploded</html>".to_string()));
        assert_eq!(err.message, "HTTP 502: Bad Gateway");
        assert!(err.is_server_error());
    }

    #[test]
    fn test_text_body_keeps_status_line_message() {
        let err = ApiError::from_parts(StatusCode::NOT_FOUND, Some("text/plain"), Some(b"nope"));
        assert_eq!(err.data.as_text(), Some("nope"));
        assert_eq!(err.message, "HTTP 404: Not Found");
    }

    #[test]
    fn test_unreadable_body() {
        let err = ApiError::from_parts(StatusCode::INTERNAL_SERVER_ERROR, Some("application/json"), None);
        assert!(err.data.is_empty());
        assert_eq!(err.message, "HTTP 500: Internal Server Error");
        assert_eq!(err.to_string(), "HTTP 500: Internal Server Error");
    }

    #[test]
    fn test_non_string_message_ignored() {
        let body = br#"{"message":{"nested":true}}"#;
        let err = ApiError::from_parts(StatusCode::UNPROCESSABLE_ENTITY, Some("application/json"), Some(body));
        assert_eq!(err.message, "HTTP 422: Unprocessable Entity");
    }

    #[test]
    fn test_decode_body_variants() {
        assert_eq!(
            decode_body(Some("application/json"), br#"{"clicks":3}"#).unwrap(),
            ResponseBody::Json(json!({"clicks": 3}))
        );
        assert_eq!(
            decode_body(Some("text/csv"), b"a,b").unwrap(),
            ResponseBody::Text("a,b".to_string())
        );
        assert_eq!(decode_body(None, b"").unwrap(), ResponseBody::Empty);
        assert!(matches!(
            decode_body(Some("application/json"), b"{oops"),
            Err(Error::Decode { .. })
        ));
    }

    #[test]
    fn test_into_value() {
        assert_eq!(ResponseBody::Empty.into_value(), json!({}));
        assert_eq!(ResponseBody::Text("ok".into()).into_value(), json!("ok"));
        assert_eq!(ResponseBody::Json(json!([1, 2])).into_value(), json!([1, 2]));
    }

    #[test]
    fn test_is_bodiless() {
        let mut headers = HeaderMap::new();
        assert!(is_bodiless(StatusCode::NO_CONTENT, &headers));
        assert!(!is_bodiless(StatusCode::OK, &headers));

        headers.insert(CONTENT_LENGTH, HeaderValue::from_static("0"));
        assert!(is_bodiless(StatusCode::OK, &headers));

        headers.insert(CONTENT_LENGTH, HeaderValue::from_static("12"));
        assert!(!is_bodiless(StatusCode::OK, &headers));
    }
}
