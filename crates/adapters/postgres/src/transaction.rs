//! Transaction management.
//!
//! Read-committed, begin/commit/rollback only - the only isolation
//! requirement in this system is the atomicity of an aggregate write plus
//! its outbox row, which read-committed already gives within one
//! transaction.

use async_trait::async_trait;
use karto_errors::{AppError, AppResult};
use karto_ports::UnitOfWork;
use sqlx::{PgPool, Postgres, Transaction};

#[derive(Clone)]
pub struct TransactionManager {
    pool: PgPool,
}

impl TransactionManager {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn begin(&self) -> AppResult<Transaction<'static, Postgres>> {
        self.pool.begin().await.map_err(AppError::from)
    }
}

/// A `UnitOfWork` wrapping a single sqlx transaction. Repositories operating
/// within one unit of work share the same transaction so an aggregate's
/// state write and its outbox append commit or roll back together.
pub struct PostgresUnitOfWork {
    tx: Option<Transaction<'static, Postgres>>,
}

impl PostgresUnitOfWork {
    pub async fn begin(manager: &TransactionManager) -> AppResult<Self> {
        Ok(Self {
            tx: Some(manager.begin().await?),
        })
    }

    /// Borrows the underlying executor for a repository call.
    pub fn executor(&mut self) -> &mut Transaction<'static, Postgres> {
        self.tx.as_mut().expect("unit of work used after commit/rollback")
    }
}

#[async_trait]
impl UnitOfWork for PostgresUnitOfWork {
    async fn begin(&mut self) -> AppResult<()> {
        Ok(())
    }

    async fn commit(&mut self) -> AppResult<()> {
        if let Some(tx) = self.tx.take() {
            tx.commit().await.map_err(AppError::from)?;
        }
        Ok(())
    }

    async fn rollback(&mut self) -> AppResult<()> {
        if let Some(tx) = self.tx.take() {
            tx.rollback().await.map_err(AppError::from)?;
        }
        Ok(())
    }
}
