//! Bearer token resolution
//!
//! Two token sources are supported and picked explicitly by the caller:
//! - [`ServerTokenSource`]: verifies the signed session cookie of an incoming
//!   request and reads the access token claim from it
//! - [`ClientTokenSource`]: reads the access token of the signed-in
//!   [`ClientSession`]
//!
//! A missing or invalid session is never an error; the request is simply
//! sent without an `Authorization` header.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use reqwest::header::{HeaderMap, COOKIE};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use sha2::Sha256;
use std::sync::{Arc, PoisonError, RwLock};

use crate::{Error, Result};

type HmacSha256 = Hmac<Sha256>;

/// Default name of the session cookie
pub const SESSION_COOKIE: &str = "linkdash.session-token";
/// Cookie name used when the session is served over HTTPS
pub const SECURE_SESSION_COOKIE: &str = "__Secure-linkdash.session-token";
/// Claim holding the backend access token
pub const ACCESS_TOKEN_CLAIM: &str = "accessToken";

/// Session token verification failures
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Malformed session token: {0}")]
    Malformed(String),

    #[error("Unsupported signing algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("Session token signature mismatch")]
    BadSignature,

    #[error("Session token expired")]
    Expired,

    #[error("Session token has no {0} claim")]
    MissingClaim(String),
}

/// Incoming request data available to server-side token resolution
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    headers: HeaderMap,
}

impl RequestContext {
    pub fn new(headers: HeaderMap) -> Self {
        Self { headers }
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Value of one cookie from the `Cookie` header(s)
    pub fn cookie(&self, name: &str) -> Option<String> {
        self.headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|header| header.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value.trim_matches('"').to_string())
    }

    /// Session cookie value, reassembling `name.0`, `name.1`, ... chunks
    pub fn session_cookie(&self, name: &str) -> Option<String> {
        if let Some(value) = self.cookie(name) {
            return Some(value);
        }

        let chunks: Vec<String> = (0..)
            .map(|i| self.cookie(&format!("{}.{}", name, i)))
            .take_while(|chunk| chunk.is_some())
            .flatten()
            .collect();

        if chunks.is_empty() {
            None
        } else {
            Some(chunks.concat())
        }
    }
}

/// Strategy for obtaining the bearer token of the current session
pub trait TokenSource: Send + Sync {
    /// Token for this call, `None` when there is no valid session
    fn token(&self, context: Option<&RequestContext>) -> Option<String>;

    /// Drop the session after the backend rejected its token
    fn invalidate(&self) {}
}

/// Server-side session settings
#[derive(Debug, Clone)]
pub struct ServerAuthConfig {
    /// HMAC secret the session cookie is signed with
    pub secret: Vec<u8>,
    /// Cookie names to look for, in order
    pub cookie_names: Vec<String>,
    /// Claim that carries the access token
    pub token_claim: String,
}

impl ServerAuthConfig {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: secret.into(),
            cookie_names: vec![SESSION_COOKIE.to_string(), SECURE_SESSION_COOKIE.to_string()],
            token_claim: ACCESS_TOKEN_CLAIM.to_string(),
        }
    }

    /// Read `LINKDASH_AUTH_SECRET` and optional `LINKDASH_SESSION_COOKIE`
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        let secret = std::env::var("LINKDASH_AUTH_SECRET")
            .map_err(|_| Error::configuration("LINKDASH_AUTH_SECRET is not set"))?;
        if secret.is_empty() {
            return Err(Error::configuration("LINKDASH_AUTH_SECRET is empty"));
        }

        let mut config = Self::new(secret);
        if let Ok(cookie) = std::env::var("LINKDASH_SESSION_COOKIE") {
            config.cookie_names = vec![cookie];
        }
        Ok(config)
    }
}

/// Sign `claims` into an HS256 session token
pub fn encode_session_token(claims: &Value, secret: &[u8]) -> Result<String> {
    let header = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&json!({"alg": "HS256", "typ": "JWT"}))?);
    let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(claims)?);
    let signing_input = format!("{}.{}", header, payload);

    let mut mac = HmacSha256::new_from_slice(secret).map_err(|e| Error::Configuration {
        message: "Invalid session secret".to_string(),
        source: Some(anyhow::anyhow!("{}", e)),
    })?;
    mac.update(signing_input.as_bytes());
    let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

    Ok(format!("{}.{}", signing_input, signature))
}

/// Verify an HS256 session token and return its claims
pub fn decode_session_token(token: &str, secret: &[u8]) -> std::result::Result<Map<String, Value>, AuthError> {
    let mut parts = token.split('.');
    let (header, payload, signature) = match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(h), Some(p), Some(s), None) => (h, p, s),
        _ => return Err(AuthError::Malformed("expected three segments".to_string())),
    };

    let header_json: Value = decode_segment(header)?;
    let alg = header_json.get("alg").and_then(|a| a.as_str()).unwrap_or("none");
    if alg != "HS256" {
        return Err(AuthError::UnsupportedAlgorithm(alg.to_string()));
    }

    let signature = URL_SAFE_NO_PAD
        .decode(signature)
        .map_err(|e| AuthError::Malformed(format!("signature: {}", e)))?;
    let mut mac = HmacSha256::new_from_slice(secret).map_err(|_| AuthError::BadSignature)?;
    mac.update(header.as_bytes());
    mac.update(b".");
    mac.update(payload.as_bytes());
    mac.verify_slice(&signature).map_err(|_| AuthError::BadSignature)?;

    let claims = match decode_segment(payload)? {
        Value::Object(map) => map,
        _ => return Err(AuthError::Malformed("payload is not an object".to_string())),
    };

    if let Some(exp) = claims.get("exp").and_then(|e| e.as_f64()) {
        if exp <= Utc::now().timestamp() as f64 {
            return Err(AuthError::Expired);
        }
    }

    Ok(claims)
}

fn decode_segment(segment: &str) -> std::result::Result<Value, AuthError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|e| AuthError::Malformed(e.to_string()))?;
    serde_json::from_slice(&bytes).map_err(|e| AuthError::Malformed(e.to_string()))
}

/// Resolves tokens from the session cookie of an incoming request
#[derive(Debug, Clone)]
pub struct ServerTokenSource {
    config: ServerAuthConfig,
}

impl ServerTokenSource {
    pub fn new(config: ServerAuthConfig) -> Self {
        Self { config }
    }

    fn resolve(&self, context: &RequestContext) -> std::result::Result<Option<String>, AuthError> {
        let cookie = match self
            .config
            .cookie_names
            .iter()
            .find_map(|name| context.session_cookie(name))
        {
            Some(cookie) => cookie,
            None => return Ok(None),
        };

        let claims = decode_session_token(&cookie, &self.config.secret)?;
        claims
            .get(&self.config.token_claim)
            .and_then(|v| v.as_str())
            .map(|s| Some(s.to_string()))
            .ok_or_else(|| AuthError::MissingClaim(self.config.token_claim.clone()))
    }
}

impl TokenSource for ServerTokenSource {
    fn token(&self, context: Option<&RequestContext>) -> Option<String> {
        let context = context?;
        match self.resolve(context) {
            Ok(token) => token,
            Err(e) => {
                tracing::debug!(error = %e, "ignoring session cookie");
                None
            }
        }
    }
}

/// Signed-in user details kept alongside the token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionUser {
    pub id: String,
    pub email: Option<String>,
    pub name: Option<String>,
}

/// Client-side session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub user: Option<SessionUser>,
}

impl Session {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            expires_at: None,
            user: None,
        }
    }

    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    pub fn with_user(mut self, user: SessionUser) -> Self {
        self.user = Some(user);
        self
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at.map(|at| at <= Utc::now()).unwrap_or(false)
    }
}

/// Shared handle to the active client session
#[derive(Debug, Clone, Default)]
pub struct ClientSession {
    inner: Arc<RwLock<Option<Session>>>,
}

impl ClientSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sign_in(&self, session: Session) {
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = Some(session);
    }

    /// Returns true when a session was active
    pub fn sign_out(&self) -> bool {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .is_some()
    }

    pub fn current(&self) -> Option<Session> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Access token of an unexpired session
    pub fn access_token(&self) -> Option<String> {
        let guard = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        guard
            .as_ref()
            .filter(|session| !session.is_expired())
            .map(|session| session.access_token.clone())
    }
}

/// Resolves tokens from the in-process client session
#[derive(Debug, Clone)]
pub struct ClientTokenSource {
    session: ClientSession,
}

impl ClientTokenSource {
    pub fn new(session: ClientSession) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &ClientSession {
        &self.session
    }
}

impl TokenSource for ClientTokenSource {
    fn token(&self, _context: Option<&RequestContext>) -> Option<String> {
        self.session.access_token()
    }

    fn invalidate(&self) {
        if self.session.sign_out() {
            tracing::info!("client session cleared after unauthorized response");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use reqwest::header::HeaderValue;

    const SECRET: &[u8] = b"test-secret";

    fn context_with_cookie(cookie: &str) -> RequestContext {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_str(cookie).unwrap());
        RequestContext::new(headers)
    }

    fn future_exp() -> i64 {
        (Utc::now() + Duration::hours(1)).timestamp()
    }

    #[test]
    fn test_cookie_lookup() {
        let ctx = context_with_cookie("theme=dark; linkdash.session-token=abc; other=\"q\"");
        assert_eq!(ctx.cookie("theme").as_deref(), Some("dark"));
        assert_eq!(ctx.cookie(SESSION_COOKIE).as_deref(), Some("abc"));
        assert_eq!(ctx.cookie("other").as_deref(), Some("q"));
        assert_eq!(ctx.cookie("missing"), None);
    }

    #[test]
    fn test_chunked_session_cookie() {
        let ctx = context_with_cookie("linkdash.session-token.0=aaa; linkdash.session-token.1=bbb");
        assert_eq!(ctx.session_cookie(SESSION_COOKIE).as_deref(), Some("aaabbb"));
        assert_eq!(RequestContext::default().session_cookie(SESSION_COOKIE), None);
    }

    #[test]
    fn test_session_token_roundtrip_claims() {
        let token = encode_session_token(&json!({"accessToken": "api-123", "exp": future_exp()}), SECRET).unwrap();
        let claims = decode_session_token(&token, SECRET).unwrap();
        assert_eq!(claims["accessToken"], "api-123");
    }

    #[test]
    fn test_session_token_rejections() {
        let token = encode_session_token(&json!({"accessToken": "x"}), SECRET).unwrap();
        assert!(matches!(decode_session_token(&token, b"other"), Err(AuthError::BadSignature)));

        let expired = encode_session_token(&json!({"accessToken": "x", "exp": 1}), SECRET).unwrap();
        assert!(matches!(decode_session_token(&expired, SECRET), Err(AuthError::Expired)));

        assert!(matches!(decode_session_token("a.b", SECRET), Err(AuthError::Malformed(_))));

        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none"}"#);
        let payload = URL_SAFE_NO_PAD.encode(br#"{"accessToken":"x"}"#);
        let unsigned = format!("{}.{}.", header, payload);
        assert!(matches!(
            decode_session_token(&unsigned, SECRET),
            Err(AuthError::UnsupportedAlgorithm(_))
        ));
    }

    #[test]
    fn test_server_source_resolves_cookie() {
        let token = encode_session_token(&json!({"accessToken": "api-123", "exp": future_exp()}), SECRET).unwrap();
        let ctx = context_with_cookie(&format!("{}={}", SECURE_SESSION_COOKIE, token));
        let source = ServerTokenSource::new(ServerAuthConfig::new(SECRET));

        assert_eq!(source.token(Some(&ctx)).as_deref(), Some("api-123"));
        assert_eq!(source.token(None), None);
    }

    #[test]
    fn test_server_source_swallows_bad_sessions() {
        let source = ServerTokenSource::new(ServerAuthConfig::new(SECRET));

        let forged = encode_session_token(&json!({"accessToken": "api-123"}), b"attacker").unwrap();
        let ctx = context_with_cookie(&format!("{}={}", SESSION_COOKIE, forged));
        assert_eq!(source.token(Some(&ctx)), None);

        let no_claim = encode_session_token(&json!({"sub": "u1"}), SECRET).unwrap();
        let ctx = context_with_cookie(&format!("{}={}", SESSION_COOKIE, no_claim));
        assert_eq!(source.token(Some(&ctx)), None);

        let ctx = context_with_cookie("unrelated=1");
        assert_eq!(source.token(Some(&ctx)), None);
    }

    #[test]
    fn test_client_session_lifecycle() {
        let session = ClientSession::new();
        let source = ClientTokenSource::new(session.clone());
        assert_eq!(source.token(None), None);

        session.sign_in(Session::new("tok-1").with_user(SessionUser {
            id: "u1".to_string(),
            email: Some("ada@example.com".to_string()),
            name: None,
        }));
        assert_eq!(source.token(None).as_deref(), Some("tok-1"));

        source.invalidate();
        assert_eq!(source.token(None), None);
        assert!(session.current().is_none());
        assert!(!session.sign_out());
    }

    #[test]
    fn test_expired_client_session_has_no_token() {
        let session = ClientSession::new();
        session.sign_in(Session::new("old").with_expiry(Utc::now() - Duration::minutes(1)));

        assert_eq!(session.access_token(), None);
        assert!(session.current().is_some());
    }
}
