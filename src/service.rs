//! Login, signup and refresh token rotation.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{info, warn};

use crate::auth::{AuthError, Authority, Principal};
use crate::credentials::CredentialVerifier;
use crate::db::Database;
use crate::jwt::{TokenCodec, TokenPair, TokenStatus};
use crate::password::hash_password;

/// Per-subject async locks serializing refresh token rotation.
#[derive(Default)]
pub struct SubjectLocks {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl SubjectLocks {
    /// Wait for exclusive access to `subject`.
    pub async fn acquire(&self, subject: &str) -> SubjectGuard<'_> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            locks
                .entry(subject.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        let guard = lock.lock_owned().await;
        SubjectGuard {
            locks: self,
            subject: subject.to_string(),
            guard: Some(guard),
        }
    }

    fn release(&self, subject: &str) {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        // Only the map still holds the lock: nobody is waiting on it.
        if locks
            .get(subject)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(subject);
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.locks.lock().unwrap().len()
    }
}

/// Held while a subject's refresh record is being rotated.
pub struct SubjectGuard<'a> {
    locks: &'a SubjectLocks,
    subject: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for SubjectGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.locks.release(&self.subject);
    }
}

/// New member registration data.
#[derive(Debug, Clone)]
pub struct Signup {
    pub email: String,
    pub password: String,
    pub username: String,
}

/// Composes credential verification, token minting and the refresh store.
#[derive(Clone)]
pub struct AuthService {
    db: Database,
    codec: Arc<TokenCodec>,
    verifier: Arc<dyn CredentialVerifier>,
    locks: Arc<SubjectLocks>,
}

impl AuthService {
    pub fn new(db: Database, codec: Arc<TokenCodec>, verifier: Arc<dyn CredentialVerifier>) -> Self {
        Self {
            db,
            codec,
            verifier,
            locks: Arc::new(SubjectLocks::default()),
        }
    }

    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    /// Register a member with `ROLE_USER`. Returns the member's email.
    pub async fn signup(&self, signup: Signup) -> Result<String, AuthError> {
        let email = signup.email.trim();
        let username = signup.username.trim();

        if email.is_empty() || !email.contains('@') {
            return Err(AuthError::InvalidRequest("A valid email is required".into()));
        }
        if signup.password.trim().is_empty() {
            return Err(AuthError::InvalidRequest("Password cannot be empty".into()));
        }
        if username.is_empty() {
            return Err(AuthError::InvalidRequest("Username cannot be empty".into()));
        }

        let members = self.db.members();
        if members
            .exists(email)
            .await
            .map_err(|e| AuthError::internal("Failed to check member", e))?
        {
            return Err(AuthError::MemberExists);
        }

        let hash = hash_password(&signup.password)
            .map_err(|e| AuthError::internal("Failed to hash password", e))?;

        members
            .create(email, username, &hash, &BTreeSet::from([Authority::User]))
            .await
            .map_err(member_create_error)?;

        info!(email = %email, "Member registered");
        Ok(email.to_string())
    }

    /// Verify credentials, mint a token pair and store the refresh token.
    pub async fn login(&self, email: &str, password: &str) -> Result<TokenPair, AuthError> {
        let principal = self.verifier.authenticate(email, password).await?;

        let (pair, refresh) = self
            .codec
            .create_token_pair(&principal)
            .map_err(|e| AuthError::internal("Failed to create tokens", e))?;

        self.db
            .refresh_tokens()
            .save(&principal.subject, &refresh.token, refresh.expires_at)
            .await
            .map_err(|e| AuthError::internal("Failed to save refresh token", e))?;

        info!(subject = %principal.subject, "Login succeeded");
        Ok(pair)
    }

    /// Exchange a (possibly expired) access token and the current refresh
    /// token for a new pair, rotating the stored refresh token.
    pub async fn reissue(
        &self,
        access_token: &str,
        refresh_token: &str,
    ) -> Result<TokenPair, AuthError> {
        match self.codec.validate_token(refresh_token) {
            TokenStatus::Valid => {}
            TokenStatus::Expired => return Err(AuthError::ExpiredToken),
            TokenStatus::Invalid(_) => return Err(AuthError::MalformedToken),
        }

        // Access token expiry is expected here; only the signature matters.
        let claims = self.codec.parse_claims(access_token)?;
        let principal: Principal = crate::jwt::principal_from_claims(&claims)?;

        let _guard = self.locks.acquire(&principal.subject).await;

        let store = self.db.refresh_tokens();
        let record = store
            .find(&principal.subject)
            .await
            .map_err(|e| AuthError::internal("Failed to load refresh token", e))?
            .ok_or(AuthError::SubjectNotFound)?;

        if record.value != refresh_token {
            warn!(subject = %principal.subject, "Refresh token does not match stored value");
            return Err(AuthError::RefreshTokenMismatch);
        }

        let (pair, refresh) = self
            .codec
            .create_token_pair(&principal)
            .map_err(|e| AuthError::internal("Failed to create tokens", e))?;

        let rotated = store
            .compare_and_replace(
                &principal.subject,
                refresh_token,
                &refresh.token,
                refresh.expires_at,
            )
            .await
            .map_err(|e| AuthError::internal("Failed to rotate refresh token", e))?;
        if !rotated {
            warn!(subject = %principal.subject, "Refresh token superseded during rotation");
            return Err(AuthError::RefreshTokenMismatch);
        }

        info!(subject = %principal.subject, "Tokens reissued");
        Ok(pair)
    }
}

/// A concurrent signup can win the race past the `exists` check.
fn member_create_error(e: sqlx::Error) -> AuthError {
    match &e {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => AuthError::MemberExists,
        _ => AuthError::internal("Failed to create member", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::DbCredentialVerifier;
    use crate::jwt::{TokenClaims, TokenTtl};
    use std::time::{SystemTime, UNIX_EPOCH};
    use uuid::Uuid;

    async fn service() -> AuthService {
        let db = Database::open(":memory:").await.unwrap();
        let codec = Arc::new(TokenCodec::new(b"service-secret", TokenTtl::default()));
        let verifier = Arc::new(DbCredentialVerifier::new(db.clone()));
        AuthService::new(db, codec, verifier)
    }

    async fn signed_up(service: &AuthService) {
        service
            .signup(Signup {
                email: "user@x.com".into(),
                password: "correctpw".into(),
                username: "user".into(),
            })
            .await
            .unwrap();
    }

    fn now() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs()
    }

    #[tokio::test]
    async fn test_login_issues_pair_for_member() {
        let service = service().await;
        signed_up(&service).await;

        let pair = service.login("user@x.com", "correctpw").await.unwrap();
        assert_eq!(pair.grant_type, "Bearer");

        let principal = service.codec().get_authentication(&pair.access_token).unwrap();
        assert_eq!(principal.subject, "user@x.com");
        assert_eq!(principal.authorities, BTreeSet::from([Authority::User]));

        let record = service
            .db
            .refresh_tokens()
            .find("user@x.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.value, pair.refresh_token);
    }

    #[tokio::test]
    async fn test_login_bad_credentials() {
        let service = service().await;
        signed_up(&service).await;

        assert!(matches!(
            service.login("user@x.com", "wrongpw").await,
            Err(AuthError::BadCredentials)
        ));
    }

    #[tokio::test]
    async fn test_signup_validation() {
        let service = service().await;
        signed_up(&service).await;

        let duplicate = service
            .signup(Signup {
                email: "user@x.com".into(),
                password: "pw".into(),
                username: "other".into(),
            })
            .await;
        assert!(matches!(duplicate, Err(AuthError::MemberExists)));

        let bad_email = service
            .signup(Signup {
                email: "not-an-email".into(),
                password: "pw".into(),
                username: "other".into(),
            })
            .await;
        assert!(matches!(bad_email, Err(AuthError::InvalidRequest(_))));

        let blank_password = service
            .signup(Signup {
                email: "other@x.com".into(),
                password: "  ".into(),
                username: "other".into(),
            })
            .await;
        assert!(matches!(blank_password, Err(AuthError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn test_reissue_rotates_and_rejects_replay() {
        let service = service().await;
        signed_up(&service).await;

        let first = service.login("user@x.com", "correctpw").await.unwrap();
        let second = service
            .reissue(&first.access_token, &first.refresh_token)
            .await
            .unwrap();
        assert_ne!(second.refresh_token, first.refresh_token);

        let replay = service
            .reissue(&first.access_token, &first.refresh_token)
            .await;
        assert!(matches!(replay, Err(AuthError::RefreshTokenMismatch)));

        service
            .reissue(&second.access_token, &second.refresh_token)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_reissue_with_expired_access_token() {
        let service = service().await;
        signed_up(&service).await;
        let pair = service.login("user@x.com", "correctpw").await.unwrap();

        let expired_access = service
            .codec()
            .encode(&TokenClaims {
                sub: "user@x.com".into(),
                jti: Uuid::new_v4().to_string(),
                auth: Some("ROLE_USER".into()),
                iat: now() - 100,
                exp: now() - 50,
            })
            .unwrap();

        let reissued = service
            .reissue(&expired_access, &pair.refresh_token)
            .await
            .unwrap();
        let principal = service
            .codec()
            .get_authentication(&reissued.access_token)
            .unwrap();
        assert_eq!(principal.subject, "user@x.com");
    }

    #[tokio::test]
    async fn test_reissue_rejects_bad_refresh_tokens() {
        let service = service().await;
        signed_up(&service).await;
        let pair = service.login("user@x.com", "correctpw").await.unwrap();

        let expired_refresh = service
            .codec()
            .encode(&TokenClaims {
                sub: "user@x.com".into(),
                jti: Uuid::new_v4().to_string(),
                auth: Some("ROLE_USER".into()),
                iat: now() - 100,
                exp: now() - 50,
            })
            .unwrap();

        assert!(matches!(
            service.reissue(&pair.access_token, &expired_refresh).await,
            Err(AuthError::ExpiredToken)
        ));
        assert!(matches!(
            service.reissue(&pair.access_token, "garbage").await,
            Err(AuthError::MalformedToken)
        ));
        assert!(matches!(
            service.reissue("garbage", &pair.refresh_token).await,
            Err(AuthError::MalformedToken)
        ));
    }

    #[tokio::test]
    async fn test_reissue_without_record() {
        let service = service().await;
        let principal = Principal::new("ghost@x.com", BTreeSet::from([Authority::User]));
        let (pair, _) = service.codec().create_token_pair(&principal).unwrap();

        assert!(matches!(
            service.reissue(&pair.access_token, &pair.refresh_token).await,
            Err(AuthError::SubjectNotFound)
        ));
    }

    #[tokio::test]
    async fn test_concurrent_reissue_only_one_wins() {
        let service = service().await;
        signed_up(&service).await;
        let pair = service.login("user@x.com", "correctpw").await.unwrap();

        let (a, b) = tokio::join!(
            service.reissue(&pair.access_token, &pair.refresh_token),
            service.reissue(&pair.access_token, &pair.refresh_token),
        );

        let successes = [a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count();
        assert_eq!(successes, 1);
        assert!(matches!(
            a.err().or(b.err()),
            Some(AuthError::RefreshTokenMismatch)
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_parallel_reissue_tasks_only_one_wins() {
        let service = service().await;
        signed_up(&service).await;
        let pair = service.login("user@x.com", "correctpw").await.unwrap();

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let service = service.clone();
                let pair = pair.clone();
                tokio::spawn(async move {
                    service
                        .reissue(&pair.access_token, &pair.refresh_token)
                        .await
                })
            })
            .collect();

        let mut successes = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(_) => successes += 1,
                Err(e) => assert!(matches!(e, AuthError::RefreshTokenMismatch)),
            }
        }
        assert_eq!(successes, 1);
    }

    #[tokio::test]
    async fn test_racing_signup_maps_to_member_exists() {
        let db = Database::open(":memory:").await.unwrap();
        let authorities = BTreeSet::from([Authority::User]);
        db.members()
            .create("dup@x.com", "first", "hash", &authorities)
            .await
            .unwrap();

        let err = db
            .members()
            .create("dup@x.com", "second", "hash", &authorities)
            .await
            .unwrap_err();
        assert!(matches!(member_create_error(err), AuthError::MemberExists));

        assert!(matches!(
            member_create_error(sqlx::Error::RowNotFound),
            AuthError::Internal(_)
        ));
    }

    #[tokio::test]
    async fn test_subject_locks_are_released() {
        let locks = SubjectLocks::default();
        {
            let _a = locks.acquire("a@x.com").await;
            let _b = locks.acquire("b@x.com").await;
            assert_eq!(locks.len(), 2);
        }
        assert_eq!(locks.len(), 0);
    }
}
