//! Authorization header parsing.

use axum::http::{HeaderMap, header};

/// Literal prefix of a bearer credential, including the trailing space.
pub const BEARER_PREFIX: &str = "Bearer ";

/// Extract the bearer token from the Authorization header.
///
/// Returns `None` when the header is absent, not valid UTF-8, lacks the
/// `Bearer ` prefix, or carries an empty token.
pub fn resolve_bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix(BEARER_PREFIX)?.trim();
    if token.is_empty() {
        return None;
    }
    Some(token)
}
