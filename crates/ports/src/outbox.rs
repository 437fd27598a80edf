//! Outbox port.
//!
//! An aggregate's repository writes its state and its pending domain events
//! to the outbox in the same transaction. The worker never sees that
//! transaction - it only ever reads back committed rows.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use karto_errors::AppResult;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutboxStatus {
    Pending,
    Processed,
    Quarantined,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboxEntry {
    pub id: String,
    pub aggregate_type: String,
    pub aggregate_id: String,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub occurred_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub status: OutboxStatus,
    pub retry_count: u32,
    pub last_error: Option<String>,
    pub failed_at: Option<DateTime<Utc>>,
    pub processed_at: Option<DateTime<Utc>>,
}

/// A draft entry as written by an aggregate's repository - no status or
/// retry bookkeeping yet, that's the worker's job.
#[derive(Debug, Clone)]
pub struct NewOutboxEntry {
    pub id: String,
    pub aggregate_type: String,
    pub aggregate_id: String,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub occurred_at: DateTime<Utc>,
}

#[async_trait]
pub trait OutboxPort: Send + Sync {
    /// Inserts a draft entry. Intended to be called from inside the same
    /// relational transaction that persists the aggregate's own state.
    async fn save(&self, entry: &NewOutboxEntry) -> AppResult<()>;

    /// Fetches up to `limit` pending entries, locked against concurrent
    /// workers (`FOR UPDATE SKIP LOCKED`), ordered so that entries sharing
    /// an `aggregate_id` come back in `created_at` order.
    async fn fetch_pending_batch(&self, limit: usize) -> AppResult<Vec<OutboxEntry>>;

    async fn mark_processed(&self, id: &str) -> AppResult<()>;

    /// Records a failed processing attempt: increments `retry_count`, sets
    /// `last_error`/`failed_at`. Does not change `status` - the caller
    /// decides whether to quarantine based on the returned attempt count.
    async fn record_failure(&self, id: &str, error: &str) -> AppResult<u32>;

    async fn quarantine(&self, id: &str) -> AppResult<()>;

    /// Permanently deletes processed entries older than `before`.
    async fn delete_processed_before(&self, before: DateTime<Utc>) -> AppResult<u64>;
}
