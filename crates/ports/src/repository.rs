//! Generic repository traits. Concrete aggregate repositories (tenant,
//! group, workspace, api key) are declared in the service crate against
//! its own aggregate types, implementing these generic traits so adapters
//! can be swapped without touching domain code.

use async_trait::async_trait;
use karto_common::Pagination;
use karto_errors::AppResult;

#[async_trait]
pub trait Repository<T, ID>: Send + Sync {
    async fn find_by_id(&self, id: &ID) -> AppResult<Option<T>>;
    async fn save(&self, entity: &mut T) -> AppResult<()>;
    /// Deletes `entity`'s row and appends whatever events it recorded
    /// (typically a `*Deleted` event from `mark_for_deletion()`) to the
    /// outbox, both in one transaction. Returns `false` if the row was
    /// already gone.
    async fn delete(&self, entity: &mut T) -> AppResult<bool>;
    async fn exists(&self, id: &ID) -> AppResult<bool>;
}

#[async_trait]
pub trait PageableRepository<T, ID>: Repository<T, ID> {
    async fn find_all(&self, pagination: &Pagination) -> AppResult<Vec<T>>;
    async fn count(&self) -> AppResult<u64>;
}
