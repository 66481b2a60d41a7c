//! Authorization header value builders

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

/// `Authorization` value for a bearer token.
#[must_use]
pub fn bearer(token: &str) -> String {
    format!("Bearer {token}")
}

/// `Authorization` value for HTTP basic auth.
#[must_use]
pub fn basic(login: &str, password: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{login}:{password}")))
}
