//! Unit-of-work port.
//!
//! A transaction boundary never spans a call to the authorization engine -
//! relational writes commit first, then a translated relationship write is
//! sent to the engine outside the transaction (that round trip is what the
//! outbox exists to retry).

use async_trait::async_trait;
use karto_errors::AppResult;

#[async_trait]
pub trait UnitOfWork: Send + Sync {
    async fn begin(&mut self) -> AppResult<()>;
    async fn commit(&mut self) -> AppResult<()>;
    async fn rollback(&mut self) -> AppResult<()>;
}
