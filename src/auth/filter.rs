//! Per-request bearer token authenticator.
//!
//! Runs as an axum middleware in front of every route. Requests under an
//! exempt prefix pass through untouched; all others must carry a valid
//! `Authorization: Bearer <token>` header. On success the caller's
//! [`Principal`] is attached to the request extensions for downstream
//! handlers. Rejections are written inline as 403 JSON responses.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::debug;

use super::errors::ErrorBody;
use super::header::resolve_bearer_token;
use super::types::Principal;
use crate::jwt::{TokenCodec, TokenStatus};

/// Path prefixes that bypass authentication by default.
pub const DEFAULT_EXEMPT_PREFIXES: &[&str] = &[
    "/auth",
    "/v3/api-docs",
    "/swagger-ui",
    "/swagger-resources",
    "/configuration",
    "/webjars",
    "/favicon.ico",
];

/// Set of path prefixes that skip the authenticator.
#[derive(Debug, Clone)]
pub struct ExemptPaths {
    prefixes: Vec<String>,
}

impl ExemptPaths {
    pub fn new<I, S>(prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let prefixes = prefixes
            .into_iter()
            .map(Into::into)
            .map(|p: String| p.trim_end_matches('/').to_string())
            .filter(|p| !p.is_empty())
            .collect();
        Self { prefixes }
    }

    /// Whether `path` equals a prefix or continues it with a `/` segment.
    pub fn matches(&self, path: &str) -> bool {
        self.prefixes.iter().any(|prefix| {
            path.strip_prefix(prefix.as_str())
                .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
        })
    }
}

impl Default for ExemptPaths {
    fn default() -> Self {
        Self::new(DEFAULT_EXEMPT_PREFIXES.iter().copied())
    }
}

/// Where a single request ended up after inspection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateState {
    Passthrough,
    TokenMissing,
    TokenValid(Principal),
    TokenExpired,
    TokenInvalid,
}

/// Marker left in the request extensions once the authenticator has run.
#[derive(Debug, Clone, Copy)]
pub struct AuthenticationDone;

/// Shared state for the authenticator middleware.
#[derive(Clone)]
pub struct AuthGate {
    codec: Arc<TokenCodec>,
    exempt: Arc<ExemptPaths>,
}

impl AuthGate {
    pub fn new(codec: Arc<TokenCodec>, exempt: ExemptPaths) -> Self {
        Self {
            codec,
            exempt: Arc::new(exempt),
        }
    }

    /// Decide what to do with a request without touching it.
    pub fn evaluate(&self, path: &str, headers: &HeaderMap) -> GateState {
        if self.exempt.matches(path) {
            return GateState::Passthrough;
        }

        let Some(token) = resolve_bearer_token(headers) else {
            return GateState::TokenMissing;
        };

        match self.codec.validate_token(token) {
            TokenStatus::Valid => match self.codec.get_authentication(token) {
                Ok(principal) => GateState::TokenValid(principal),
                Err(e) => {
                    debug!(error = %e, "Valid token without usable authorities");
                    GateState::TokenInvalid
                }
            },
            TokenStatus::Expired => GateState::TokenExpired,
            TokenStatus::Invalid(_) => GateState::TokenInvalid,
        }
    }
}

/// Terminal failures written directly by the authenticator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateRejection {
    EmptyToken,
    AccessTokenExpired,
    BadToken,
}

impl GateRejection {
    pub fn code(&self) -> &'static str {
        match self {
            Self::EmptyToken => "EMPTY_TOKEN",
            Self::AccessTokenExpired => "ACCESS_TOKEN_EXPIRED",
            Self::BadToken => "BAD_TOKEN",
        }
    }

    fn message(&self) -> &'static str {
        match self {
            Self::EmptyToken => "Token is empty",
            Self::AccessTokenExpired => "Access token has expired",
            Self::BadToken => "Token is invalid",
        }
    }
}

impl IntoResponse for GateRejection {
    fn into_response(self) -> Response {
        (
            StatusCode::FORBIDDEN,
            Json(ErrorBody::new(self.code(), self.message())),
        )
            .into_response()
    }
}

/// Middleware entry point. Use with `axum::middleware::from_fn_with_state`.
pub async fn authenticate(
    State(gate): State<AuthGate>,
    mut request: Request,
    next: Next,
) -> Response {
    if request.extensions().get::<AuthenticationDone>().is_some() {
        return next.run(request).await;
    }

    let state = gate.evaluate(request.uri().path(), request.headers());
    debug!(
        path = %request.uri().path(),
        state = %state_name(&state),
        "Authenticator decision"
    );

    let rejection = match state {
        GateState::Passthrough => None,
        GateState::TokenValid(principal) => {
            request.extensions_mut().insert(principal);
            None
        }
        GateState::TokenMissing => Some(GateRejection::EmptyToken),
        GateState::TokenExpired => Some(GateRejection::AccessTokenExpired),
        GateState::TokenInvalid => Some(GateRejection::BadToken),
    };

    if let Some(rejection) = rejection {
        return rejection.into_response();
    }

    request.extensions_mut().insert(AuthenticationDone);
    next.run(request).await
}

fn state_name(state: &GateState) -> &'static str {
    match state {
        GateState::Passthrough => "passthrough",
        GateState::TokenMissing => "token_missing",
        GateState::TokenValid(_) => "token_valid",
        GateState::TokenExpired => "token_expired",
        GateState::TokenInvalid => "token_invalid",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Authority;
    use crate::jwt::{TokenClaims, TokenTtl};
    use axum::http::{HeaderValue, header};
    use std::collections::BTreeSet;
    use uuid::Uuid;

    fn gate() -> AuthGate {
        AuthGate::new(
            Arc::new(TokenCodec::new(b"filter-secret", TokenTtl::default())),
            ExemptPaths::default(),
        )
    }

    fn bearer(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", token)).unwrap(),
        );
        headers
    }

    #[test]
    fn test_exempt_prefix_matching() {
        let exempt = ExemptPaths::default();
        assert!(exempt.matches("/auth"));
        assert!(exempt.matches("/auth/login"));
        assert!(exempt.matches("/swagger-ui/index.html"));
        assert!(exempt.matches("/favicon.ico"));
        assert!(!exempt.matches("/authors"));
        assert!(!exempt.matches("/member"));
        assert!(!exempt.matches("/"));
    }

    #[test]
    fn test_exempt_prefix_trailing_slash_ignored() {
        let exempt = ExemptPaths::new(["/public/", "/"]);
        assert!(exempt.matches("/public"));
        assert!(exempt.matches("/public/x"));
        assert!(!exempt.matches("/member"));
    }

    #[test]
    fn test_exempt_path_ignores_header() {
        let gate = gate();
        assert_eq!(
            gate.evaluate("/auth/login", &bearer("garbage")),
            GateState::Passthrough
        );
        assert_eq!(
            gate.evaluate("/auth/login", &HeaderMap::new()),
            GateState::Passthrough
        );
    }

    #[test]
    fn test_missing_token() {
        assert_eq!(
            gate().evaluate("/member", &HeaderMap::new()),
            GateState::TokenMissing
        );
    }

    #[test]
    fn test_valid_token() {
        let gate = gate();
        let authorities = BTreeSet::from([Authority::User]);
        let token = gate
            .codec
            .create_access_token("user@x.com", &authorities)
            .unwrap()
            .token;

        assert_eq!(
            gate.evaluate("/member", &bearer(&token)),
            GateState::TokenValid(Principal::new("user@x.com", authorities))
        );
    }

    #[test]
    fn test_expired_and_invalid_tokens() {
        let gate = gate();
        let claims = TokenClaims {
            sub: "user@x.com".into(),
            jti: Uuid::new_v4().to_string(),
            auth: Some("ROLE_USER".into()),
            iat: 1_000,
            exp: 2_000,
        };
        let expired = gate.codec.encode(&claims).unwrap();

        assert_eq!(
            gate.evaluate("/member", &bearer(&expired)),
            GateState::TokenExpired
        );
        assert_eq!(
            gate.evaluate("/member", &bearer("not-a-jwt")),
            GateState::TokenInvalid
        );
    }

    #[test]
    fn test_valid_token_without_authority_is_invalid() {
        let gate = gate();
        let claims = TokenClaims {
            sub: "user@x.com".into(),
            jti: Uuid::new_v4().to_string(),
            auth: None,
            iat: 1_000,
            exp: 4_000_000_000,
        };
        let token = gate.codec.encode(&claims).unwrap();

        assert_eq!(
            gate.evaluate("/member", &bearer(&token)),
            GateState::TokenInvalid
        );
    }

    #[test]
    fn test_rejection_codes() {
        assert_eq!(GateRejection::EmptyToken.code(), "EMPTY_TOKEN");
        assert_eq!(GateRejection::AccessTokenExpired.code(), "ACCESS_TOKEN_EXPIRED");
        assert_eq!(GateRejection::BadToken.code(), "BAD_TOKEN");
        assert_eq!(
            GateRejection::BadToken.into_response().status(),
            StatusCode::FORBIDDEN
        );
    }
}
