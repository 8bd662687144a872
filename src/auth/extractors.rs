//! Axum extractors for the authenticated context.

use axum::{extract::FromRequestParts, http::request::Parts};

use super::errors::AuthError;
use super::types::{Authority, Principal};

/// Principal attached by the authenticator for the current request.
///
/// Rejects with `EMPTY_TOKEN` when the route was reached without passing
/// authentication (for instance through an exempt prefix).
pub struct Authenticated(pub Principal);

impl<S> FromRequestParts<S> for Authenticated
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Principal>()
            .cloned()
            .map(Authenticated)
            .ok_or(AuthError::MissingToken)
    }
}

/// Extractor for endpoints restricted to `ROLE_ADMIN`.
pub struct AdminOnly(pub Principal);

impl<S> FromRequestParts<S> for AdminOnly
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Authenticated(principal) = Authenticated::from_request_parts(parts, state).await?;
        if !principal.has_authority(Authority::Admin) {
            tracing::debug!(subject = %principal.subject, "Admin authority required");
            return Err(AuthError::InsufficientAuthority);
        }
        Ok(AdminOnly(principal))
    }
}
