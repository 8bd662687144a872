//! Refresh token storage.
//!
//! Exactly one record exists per subject, holding the most recently issued
//! refresh token. Access tokens are stateless and never stored.

use sqlx::sqlite::SqlitePool;

/// Current refresh token for a subject.
#[derive(Debug, Clone)]
pub struct RefreshRecord {
    pub key: String,
    pub value: String,
    /// Expiration of the stored token (Unix seconds)
    pub expires_at: i64,
}

/// Clamp Unix seconds into SQLite's signed INTEGER range.
fn to_timestamp(secs: u64) -> i64 {
    i64::try_from(secs).unwrap_or(i64::MAX)
}

/// Store for the single-slot refresh token record of each subject.
pub struct RefreshTokenStore {
    pool: SqlitePool,
}

impl RefreshTokenStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create or overwrite the record for `key`.
    pub async fn save(&self, key: &str, value: &str, expires_at: u64) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO refresh_tokens (key, value, expires_at) VALUES (?, ?, ?)
             ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                expires_at = excluded.expires_at,
                updated_at = datetime('now')",
        )
        .bind(key)
        .bind(value)
        .bind(to_timestamp(expires_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Get the record for `key`, if any.
    pub async fn find(&self, key: &str) -> Result<Option<RefreshRecord>, sqlx::Error> {
        let row: Option<(String, String, i64)> =
            sqlx::query_as("SELECT key, value, expires_at FROM refresh_tokens WHERE key = ?")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.map(|(key, value, expires_at)| RefreshRecord {
            key,
            value,
            expires_at,
        }))
    }

    /// Replace the value of an existing record. Returns false if no record exists.
    pub async fn update(
        &self,
        key: &str,
        value: &str,
        expires_at: u64,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE refresh_tokens SET value = ?, expires_at = ?, updated_at = datetime('now')
             WHERE key = ?",
        )
        .bind(value)
        .bind(to_timestamp(expires_at))
        .bind(key)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Replace the value only if the stored value still equals `expected`.
    ///
    /// Single conditional UPDATE, so two rotations racing on the same
    /// record cannot both succeed.
    pub async fn compare_and_replace(
        &self,
        key: &str,
        expected: &str,
        value: &str,
        expires_at: u64,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE refresh_tokens SET value = ?, expires_at = ?, updated_at = datetime('now')
             WHERE key = ? AND value = ?",
        )
        .bind(value)
        .bind(to_timestamp(expires_at))
        .bind(key)
        .bind(expected)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete records whose stored token has expired.
    pub async fn delete_expired(&self) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "DELETE FROM refresh_tokens WHERE expires_at < CAST(strftime('%s', 'now') AS INTEGER)",
        )
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_timestamp_saturates() {
        assert_eq!(to_timestamp(1_700_000_000), 1_700_000_000);
        assert_eq!(to_timestamp(u64::MAX), i64::MAX);
    }
}
