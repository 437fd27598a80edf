//! PostgreSQL outbox.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use karto_errors::{AppError, AppResult};
use karto_ports::{NewOutboxEntry, OutboxEntry, OutboxPort, OutboxStatus};
use sqlx::PgPool;

pub struct PostgresOutbox {
    pool: PgPool,
}

impl PostgresOutbox {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OutboxPort for PostgresOutbox {
    async fn save(&self, entry: &NewOutboxEntry) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO outbox (id, aggregate_type, aggregate_id, event_type, payload, occurred_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, NOW())
            "#,
        )
        .bind(&entry.id)
        .bind(&entry.aggregate_type)
        .bind(&entry.aggregate_id)
        .bind(&entry.event_type)
        .bind(&entry.payload)
        .bind(entry.occurred_at)
        .execute(&self.pool)
        .await
        .map_err(AppError::from)?;

        Ok(())
    }

    async fn fetch_pending_batch(&self, limit: usize) -> AppResult<Vec<OutboxEntry>> {
        let rows = sqlx::query_as::<_, OutboxRow>(
            r#"
            SELECT id, aggregate_type, aggregate_id, event_type, payload, occurred_at, created_at,
                   processed_at, retry_count, last_error, failed_at
            FROM outbox
            WHERE processed_at IS NULL AND failed_at IS NULL
            ORDER BY aggregate_id, created_at ASC
            LIMIT $1
            FOR UPDATE SKIP LOCKED
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::from)?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn mark_processed(&self, id: &str) -> AppResult<()> {
        sqlx::query("UPDATE outbox SET processed_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(AppError::from)?;

        Ok(())
    }

    async fn record_failure(&self, id: &str, error: &str) -> AppResult<u32> {
        let row: (i32,) = sqlx::query_as(
            r#"
            UPDATE outbox
            SET retry_count = retry_count + 1, last_error = $2
            WHERE id = $1
            RETURNING retry_count
            "#,
        )
        .bind(id)
        .bind(error)
        .fetch_one(&self.pool)
        .await
        .map_err(AppError::from)?;

        Ok(row.0 as u32)
    }

    async fn quarantine(&self, id: &str) -> AppResult<()> {
        sqlx::query("UPDATE outbox SET failed_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(AppError::from)?;

        Ok(())
    }

    async fn delete_processed_before(&self, before: DateTime<Utc>) -> AppResult<u64> {
        let result = sqlx::query("DELETE FROM outbox WHERE processed_at IS NOT NULL AND processed_at < $1")
            .bind(before)
            .execute(&self.pool)
            .await
            .map_err(AppError::from)?;

        Ok(result.rows_affected())
    }
}

#[derive(sqlx::FromRow)]
struct OutboxRow {
    id: String,
    aggregate_type: String,
    aggregate_id: String,
    event_type: String,
    payload: serde_json::Value,
    occurred_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
    processed_at: Option<DateTime<Utc>>,
    retry_count: i32,
    last_error: Option<String>,
    failed_at: Option<DateTime<Utc>>,
}

impl From<OutboxRow> for OutboxEntry {
    fn from(row: OutboxRow) -> Self {
        let status = if row.failed_at.is_some() {
            OutboxStatus::Quarantined
        } else if row.processed_at.is_some() {
            OutboxStatus::Processed
        } else {
            OutboxStatus::Pending
        };

        Self {
            id: row.id,
            aggregate_type: row.aggregate_type,
            aggregate_id: row.aggregate_id,
            event_type: row.event_type,
            payload: row.payload,
            occurred_at: row.occurred_at,
            created_at: row.created_at,
            status,
            retry_count: row.retry_count.max(0) as u32,
            last_error: row.last_error,
            failed_at: row.failed_at,
            processed_at: row.processed_at,
        }
    }
}
