//! Email/password verification against stored members.

use async_trait::async_trait;
use tracing::debug;

use crate::auth::{AuthError, Principal};
use crate::db::Database;
use crate::password::verify_password;

/// Checks an email/password pair and yields the matching principal.
#[async_trait]
pub trait CredentialVerifier: Send + Sync {
    /// Fails with `BadCredentials` when the pair does not match a member.
    async fn authenticate(&self, email: &str, password: &str) -> Result<Principal, AuthError>;
}

/// Verifier backed by the member table and Argon2 password hashes.
#[derive(Clone)]
pub struct DbCredentialVerifier {
    db: Database,
}

impl DbCredentialVerifier {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl CredentialVerifier for DbCredentialVerifier {
    async fn authenticate(&self, email: &str, password: &str) -> Result<Principal, AuthError> {
        let member = self
            .db
            .members()
            .get_by_email(email)
            .await
            .map_err(|e| AuthError::internal("Failed to get member", e))?
            .ok_or_else(|| {
                debug!(email = %email, "Login for unknown member");
                AuthError::BadCredentials
            })?;

        let matches = verify_password(password, &member.password_hash)
            .map_err(|e| AuthError::internal("Failed to verify password", e))?;
        if !matches {
            debug!(email = %email, "Password mismatch");
            return Err(AuthError::BadCredentials);
        }

        let authorities = self
            .db
            .members()
            .authorities(member.id)
            .await
            .map_err(|e| AuthError::internal("Failed to load authorities", e))?;

        Ok(Principal::new(member.email, authorities))
    }
}
