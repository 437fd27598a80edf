//! Appends a domain event to the outbox table using the caller's own
//! executor, so it lands in the same transaction as the aggregate write
//! that produced it.

use karto_domain_core::DomainEvent;
use karto_errors::{AppError, AppResult};
use serde::Serialize;
use sqlx::PgConnection;
use uuid::Uuid;

use crate::domain::payload_of;

pub async fn append_event<E>(
    conn: &mut PgConnection,
    aggregate_type: &str,
    aggregate_id: &str,
    event: &E,
) -> AppResult<()>
where
    E: DomainEvent + Serialize,
{
    let payload = payload_of(event);

    sqlx::query(
        r#"
        INSERT INTO outbox (id, aggregate_type, aggregate_id, event_type, payload, occurred_at, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, NOW())
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(aggregate_type)
    .bind(aggregate_id)
    .bind(event.event_type())
    .bind(payload)
    .bind(event.occurred_at())
    .execute(conn)
    .await
    .map_err(AppError::from)?;

    Ok(())
}
