//! JIT user provisioning store. Users have no aggregate behaviour of their
//! own in this system - they are an opaque identity record mirrored from
//! the external IdP on first sight, so this is a plain upsert repository
//! rather than a `Repository<T, ID>` implementation.

use chrono::{DateTime, Utc};
use karto_common::UserId;
use karto_errors::{AppError, AppResult};
use sqlx::PgPool;

pub struct PostgresUserRepository {
    pool: PgPool,
}

#[derive(sqlx::FromRow)]
pub struct UserRecord {
    pub id: String,
    pub username: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PostgresUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find_by_id(&self, id: &UserId) -> AppResult<Option<UserRecord>> {
        sqlx::query_as("SELECT id, username, created_at, updated_at FROM users WHERE id = $1")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(AppError::from)
    }

    /// Creates the user if absent; updates `username` if it changed. This
    /// is Stage 3 of the auth pipeline - JIT provisioning on the token
    /// path only, never called from the API-key path since the user
    /// already exists by construction there.
    ///
    /// Returns whether this call actually inserted a new row, so the
    /// caller can count real JIT provisioning events rather than every
    /// token validation - `xmax = 0` is true only for a freshly inserted
    /// row, never for one reached through the conflict branch.
    pub async fn provision(&self, id: &UserId, username: &str) -> AppResult<bool> {
        let row: Option<(bool,)> = sqlx::query_as(
            r#"
            INSERT INTO users (id, username)
            VALUES ($1, $2)
            ON CONFLICT (id) DO UPDATE SET
                username = EXCLUDED.username,
                updated_at = NOW()
            WHERE users.username <> EXCLUDED.username
            RETURNING (xmax = 0) AS inserted
            "#,
        )
        .bind(id.as_str())
        .bind(username)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::from)?;

        Ok(row.map(|(inserted,)| inserted).unwrap_or(false))
    }
}
