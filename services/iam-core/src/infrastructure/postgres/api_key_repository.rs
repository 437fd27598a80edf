use async_trait::async_trait;
use chrono::{DateTime, Utc};
use karto_common::{ApiKeyId, AuditInfo, TenantId, UserId};
use karto_domain_core::{Entity, RecordsEvents};
use karto_errors::{AppError, AppResult};
use karto_ports::Repository;
use sqlx::PgPool;

use crate::domain::ApiKey;

use super::outbox_append::append_event;

pub struct PostgresApiKeyRepository {
    pool: PgPool,
}

impl PostgresApiKeyRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Candidates sharing the given lookup prefix - normally one, but more
    /// than one is handled (logged as a collision, not treated as fatal).
    pub async fn find_by_prefix(&self, prefix: &str) -> AppResult<Vec<ApiKey>> {
        let rows: Vec<ApiKeyRow> = sqlx::query_as(
            r#"
            SELECT id, owner_user_id, tenant_id, name, prefix, hash, created_at, updated_at,
                   expires_at, last_used_at, is_revoked
            FROM api_keys WHERE prefix = $1
            "#,
        )
        .bind(prefix)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::from)?;

        rows.into_iter().map(Self::hydrate).collect()
    }

    /// Opportunistic last-used-at bump, bypassing the event-recording save
    /// path entirely - a failure here must never fail the request.
    pub async fn touch_last_used(&self, id: &ApiKeyId, at: DateTime<Utc>) -> AppResult<()> {
        sqlx::query("UPDATE api_keys SET last_used_at = $2 WHERE id = $1")
            .bind(id.to_string())
            .bind(at)
            .execute(&self.pool)
            .await
            .map_err(AppError::from)?;
        Ok(())
    }

    fn hydrate(row: ApiKeyRow) -> AppResult<ApiKey> {
        let id: ApiKeyId = row.id.parse().map_err(|_| AppError::internal("corrupt api key id in storage"))?;
        let tenant_id: TenantId = row.tenant_id.parse().map_err(|_| AppError::internal("corrupt tenant id in storage"))?;
        let owner_user_id = UserId::new(row.owner_user_id).map_err(|e| AppError::internal(e.to_string()))?;

        Ok(ApiKey::from_parts(
            id,
            owner_user_id,
            tenant_id,
            row.name,
            row.prefix,
            row.hash,
            row.expires_at,
            row.last_used_at,
            row.is_revoked,
            AuditInfo {
                created_at: row.created_at,
                updated_at: row.updated_at,
            },
        ))
    }
}

#[derive(sqlx::FromRow)]
struct ApiKeyRow {
    id: String,
    owner_user_id: String,
    tenant_id: String,
    name: String,
    prefix: String,
    hash: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    expires_at: Option<DateTime<Utc>>,
    last_used_at: Option<DateTime<Utc>>,
    is_revoked: bool,
}

#[async_trait]
impl Repository<ApiKey, ApiKeyId> for PostgresApiKeyRepository {
    async fn find_by_id(&self, id: &ApiKeyId) -> AppResult<Option<ApiKey>> {
        let row: Option<ApiKeyRow> = sqlx::query_as(
            r#"
            SELECT id, owner_user_id, tenant_id, name, prefix, hash, created_at, updated_at,
                   expires_at, last_used_at, is_revoked
            FROM api_keys WHERE id = $1
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::from)?;

        row.map(Self::hydrate).transpose()
    }

    async fn save(&self, key: &mut ApiKey) -> AppResult<()> {
        let events = key.collect_events();
        let mut tx = self.pool.begin().await.map_err(AppError::from)?;

        sqlx::query(
            r#"
            INSERT INTO api_keys (id, owner_user_id, tenant_id, name, prefix, hash, is_revoked)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (id) DO UPDATE SET is_revoked = EXCLUDED.is_revoked
            "#,
        )
        .bind(key.id().to_string())
        .bind(key.owner_user_id().as_str())
        .bind(key.tenant_id().to_string())
        .bind(key.name())
        .bind(key.prefix())
        .bind(key.hash())
        .bind(key.is_revoked())
        .execute(&mut *tx)
        .await
        .map_err(classify_unique_violation)?;

        for event in &events {
            append_event(&mut tx, "ApiKey", &key.id().to_string(), event).await?;
        }

        tx.commit().await.map_err(AppError::from)?;
        Ok(())
    }

    async fn delete(&self, key: &mut ApiKey) -> AppResult<bool> {
        let events = key.collect_events();
        let mut tx = self.pool.begin().await.map_err(AppError::from)?;

        let result = sqlx::query("DELETE FROM api_keys WHERE id = $1")
            .bind(key.id().to_string())
            .execute(&mut *tx)
            .await
            .map_err(AppError::from)?;

        for event in &events {
            append_event(&mut tx, "ApiKey", &key.id().to_string(), event).await?;
        }

        tx.commit().await.map_err(AppError::from)?;
        Ok(result.rows_affected() > 0)
    }

    async fn exists(&self, id: &ApiKeyId) -> AppResult<bool> {
        let row: Option<(i32,)> = sqlx::query_as("SELECT 1 FROM api_keys WHERE id = $1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(AppError::from)?;
        Ok(row.is_some())
    }
}

fn classify_unique_violation(err: sqlx::Error) -> AppError {
    if let sqlx::Error::Database(ref db_err) = err {
        if db_err.is_unique_violation() {
            return AppError::duplicate_name("an API key with this name already exists for this owner and tenant");
        }
    }
    AppError::from(err)
}
