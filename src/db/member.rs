use std::collections::BTreeSet;

use sqlx::sqlite::SqlitePool;

use crate::auth::Authority;

#[derive(Clone)]
pub struct MemberStore {
    pool: SqlitePool,
}

#[derive(Debug, Clone)]
pub struct Member {
    pub id: i64,
    pub email: String,
    pub username: String,
    pub password_hash: String,
}

#[derive(sqlx::FromRow)]
struct MemberRow {
    id: i64,
    email: String,
    username: String,
    password_hash: String,
}

impl From<MemberRow> for Member {
    fn from(row: MemberRow) -> Self {
        Self {
            id: row.id,
            email: row.email,
            username: row.username,
            password_hash: row.password_hash,
        }
    }
}

impl MemberStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a member with the given authorities. Returns the member ID.
    pub async fn create(
        &self,
        email: &str,
        username: &str,
        password_hash: &str,
        authorities: &BTreeSet<Authority>,
    ) -> Result<i64, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let result =
            sqlx::query("INSERT INTO members (email, username, password_hash) VALUES (?, ?, ?)")
                .bind(email)
                .bind(username)
                .bind(password_hash)
                .execute(&mut *tx)
                .await?;
        let id = result.last_insert_rowid();

        for authority in authorities {
            sqlx::query("INSERT INTO member_authorities (member_id, authority_name) VALUES (?, ?)")
                .bind(id)
                .bind(authority.name())
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(id)
    }

    /// Get a member by email.
    pub async fn get_by_email(&self, email: &str) -> Result<Option<Member>, sqlx::Error> {
        let row: Option<MemberRow> = sqlx::query_as(
            "SELECT id, email, username, password_hash FROM members WHERE email = ?",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Member::from))
    }

    /// Check whether an email is already registered.
    pub async fn exists(&self, email: &str) -> Result<bool, sqlx::Error> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM members WHERE email = ?")
            .bind(email)
            .fetch_one(&self.pool)
            .await?;
        Ok(count.0 > 0)
    }

    /// Load the authorities granted to a member.
    /// Names outside the known authority table are skipped.
    pub async fn authorities(&self, member_id: i64) -> Result<BTreeSet<Authority>, sqlx::Error> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT authority_name FROM member_authorities WHERE member_id = ?")
                .bind(member_id)
                .fetch_all(&self.pool)
                .await?;

        Ok(rows
            .into_iter()
            .filter_map(|(name,)| Authority::from_name(&name))
            .collect())
    }

    /// Grant an authority to a member. Granting twice is a no-op.
    pub async fn add_authority(
        &self,
        member_id: i64,
        authority: Authority,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO member_authorities (member_id, authority_name) VALUES (?, ?)",
        )
        .bind(member_id)
        .bind(authority.name())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
