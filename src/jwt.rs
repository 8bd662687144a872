//! JWT token generation and validation.
//!
//! Access and refresh tokens share one claim shape and differ only in
//! lifetime. Both are signed with HS512 using a single key derived from the
//! configured secret at startup.

use std::collections::BTreeSet;
use std::time::{SystemTime, UNIX_EPOCH};

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::auth::{AuthError, Authority, Principal};

/// Grant type reported alongside every token pair.
pub const GRANT_TYPE: &str = "Bearer";

/// Default access token lifetime: 30 minutes
pub const DEFAULT_ACCESS_TOKEN_TTL_SECS: u64 = 30 * 60;

/// Default refresh token lifetime: 7 days
pub const DEFAULT_REFRESH_TOKEN_TTL_SECS: u64 = 7 * 24 * 60 * 60;

const ALGORITHM: Algorithm = Algorithm::HS512;

/// Claims carried by both access and refresh tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject (member email)
    pub sub: String,
    /// Unique token ID, so two tokens minted in the same second still differ
    pub jti: String,
    /// Comma-joined authority names
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<String>,
    /// Issued at (Unix timestamp)
    pub iat: u64,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
}

/// Outcome of verifying a token's signature and expiry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenStatus {
    Valid,
    Expired,
    Invalid(InvalidReason),
}

/// Why a token failed verification for a reason other than expiry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidReason {
    /// Signature does not match the signing key
    Signature,
    /// Not a well-formed compact JWT, or claims could not be decoded
    Malformed,
    /// Signed with an unexpected algorithm
    Algorithm,
}

/// Access/refresh pair returned from login and reissue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub grant_type: String,
    pub access_token: String,
    pub refresh_token: String,
}

/// A freshly minted token with its timing.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    /// The JWT token string
    pub token: String,
    /// Issued at timestamp (Unix seconds)
    pub issued_at: u64,
    /// Expiration timestamp (Unix seconds)
    pub expires_at: u64,
}

/// Token lifetimes, in seconds.
#[derive(Debug, Clone, Copy)]
pub struct TokenTtl {
    pub access: u64,
    pub refresh: u64,
}

impl Default for TokenTtl {
    fn default() -> Self {
        Self {
            access: DEFAULT_ACCESS_TOKEN_TTL_SECS,
            refresh: DEFAULT_REFRESH_TOKEN_TTL_SECS,
        }
    }
}

/// Signs and verifies tokens with one immutable key.
#[derive(Clone)]
pub struct TokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    ttl: TokenTtl,
}

impl std::fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCodec").field("ttl", &self.ttl).finish()
    }
}

impl TokenCodec {
    /// Create a codec from the raw secret bytes and token lifetimes.
    pub fn new(secret: &[u8], ttl: TokenTtl) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            ttl,
        }
    }

    /// Create a short-lived access token.
    pub fn create_access_token(
        &self,
        subject: &str,
        authorities: &BTreeSet<Authority>,
    ) -> Result<IssuedToken, JwtError> {
        self.create_token(subject, authorities, self.ttl.access)
    }

    /// Create a long-lived refresh token.
    pub fn create_refresh_token(
        &self,
        subject: &str,
        authorities: &BTreeSet<Authority>,
    ) -> Result<IssuedToken, JwtError> {
        self.create_token(subject, authorities, self.ttl.refresh)
    }

    fn create_token(
        &self,
        subject: &str,
        authorities: &BTreeSet<Authority>,
        ttl: u64,
    ) -> Result<IssuedToken, JwtError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|_| JwtError::TimeError)?
            .as_secs();

        let exp = now
            .checked_add(ttl)
            .filter(|exp| i64::try_from(*exp).is_ok())
            .ok_or(JwtError::TtlOverflow(ttl))?;

        let claims = TokenClaims {
            sub: subject.to_string(),
            jti: Uuid::new_v4().to_string(),
            auth: Some(Authority::join(authorities)),
            iat: now,
            exp,
        };

        let token = self.encode(&claims)?;

        Ok(IssuedToken {
            token,
            issued_at: now,
            expires_at: exp,
        })
    }

    /// Sign arbitrary claims with the codec's key.
    pub fn encode(&self, claims: &TokenClaims) -> Result<String, JwtError> {
        jsonwebtoken::encode(&Header::new(ALGORITHM), claims, &self.encoding_key)
            .map_err(JwtError::Encoding)
    }

    /// Mint an access + refresh pair for the given principal.
    pub fn create_token_pair(
        &self,
        principal: &Principal,
    ) -> Result<(TokenPair, IssuedToken), JwtError> {
        let access = self.create_access_token(&principal.subject, &principal.authorities)?;
        let refresh = self.create_refresh_token(&principal.subject, &principal.authorities)?;

        let pair = TokenPair {
            grant_type: GRANT_TYPE.to_string(),
            access_token: access.token,
            refresh_token: refresh.token.clone(),
        };
        Ok((pair, refresh))
    }

    /// Verify signature and expiry together.
    /// Expiry is reported separately from every other failure.
    pub fn validate_token(&self, token: &str) -> TokenStatus {
        match self.decode(token, true) {
            Ok(_) => TokenStatus::Valid,
            Err(e) => match e.kind() {
                ErrorKind::ExpiredSignature => {
                    info!("Expired JWT token");
                    TokenStatus::Expired
                }
                kind => {
                    let reason = invalid_reason(kind);
                    info!(reason = ?reason, "Invalid JWT token");
                    TokenStatus::Invalid(reason)
                }
            },
        }
    }

    /// Decode the claims of a correctly signed token, even if it has expired.
    pub fn parse_claims(&self, token: &str) -> Result<TokenClaims, AuthError> {
        self.decode(token, false).map_err(|e| {
            debug!(error = %e, "Failed to parse token claims");
            AuthError::MalformedToken
        })
    }

    /// Build the principal described by a token's claims.
    ///
    /// Fails with `MissingAuthority` when the `auth` claim is absent, blank, or
    /// names no known authority.
    pub fn get_authentication(&self, token: &str) -> Result<Principal, AuthError> {
        let claims = self.parse_claims(token)?;
        principal_from_claims(&claims)
    }

    fn decode(
        &self,
        token: &str,
        validate_exp: bool,
    ) -> Result<TokenClaims, jsonwebtoken::errors::Error> {
        let mut validation = Validation::new(ALGORITHM);
        validation.leeway = 0;
        validation.validate_exp = validate_exp;

        jsonwebtoken::decode::<TokenClaims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
    }
}

/// Split the `auth` claim into authorities.
pub fn principal_from_claims(claims: &TokenClaims) -> Result<Principal, AuthError> {
    let auth = claims
        .auth
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or(AuthError::MissingAuthority)?;

    let mut authorities = BTreeSet::new();
    for name in auth.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        match Authority::from_name(name) {
            Some(authority) => {
                authorities.insert(authority);
            }
            None => debug!(authority = %name, "Ignoring unknown authority in token"),
        }
    }

    if authorities.is_empty() {
        return Err(AuthError::MissingAuthority);
    }

    Ok(Principal::new(claims.sub.clone(), authorities))
}

fn invalid_reason(kind: &ErrorKind) -> InvalidReason {
    match kind {
        ErrorKind::InvalidSignature => InvalidReason::Signature,
        ErrorKind::InvalidAlgorithm => InvalidReason::Algorithm,
        _ => InvalidReason::Malformed,
    }
}

/// Errors that can occur while minting tokens.
#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    /// Error encoding the token
    #[error("Failed to encode token: {0}")]
    Encoding(jsonwebtoken::errors::Error),
    /// System time error
    #[error("System time error")]
    TimeError,
    /// Expiry would not fit in a Unix timestamp
    #[error("Token lifetime of {0} seconds is out of range")]
    TtlOverflow(u64),
}
