use async_trait::async_trait;
use chrono::{DateTime, Utc};
use karto_common::{AuditInfo, Pagination, TenantId, WorkspaceId};
use karto_domain_core::{Entity, RecordsEvents};
use karto_errors::{AppError, AppResult};
use karto_ports::{PageableRepository, Repository};
use sqlx::PgPool;

use crate::domain::Workspace;

use super::outbox_append::append_event;

pub struct PostgresWorkspaceRepository {
    pool: PgPool,
}

impl PostgresWorkspaceRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find_root(&self, tenant_id: TenantId) -> AppResult<Option<Workspace>> {
        let row: Option<WorkspaceRow> = sqlx::query_as(
            r#"
            SELECT id, tenant_id, name, parent_workspace_id, is_root, created_at, updated_at
            FROM workspaces WHERE tenant_id = $1 AND is_root
            "#,
        )
        .bind(tenant_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::from)?;

        row.map(Self::hydrate).transpose()
    }

    /// True if any workspace still references `id` as its parent - callers
    /// use this before deleting, since the relational foreign key is
    /// `RESTRICT` and will fail loudly anyway; this lets the caller turn
    /// that into a clean domain error instead.
    pub async fn has_children(&self, id: &WorkspaceId) -> AppResult<bool> {
        let row: Option<(i32,)> = sqlx::query_as("SELECT 1 FROM workspaces WHERE parent_workspace_id = $1 LIMIT 1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(AppError::from)?;
        Ok(row.is_some())
    }

    fn hydrate(row: WorkspaceRow) -> AppResult<Workspace> {
        let id: WorkspaceId = row.id.parse().map_err(|_| AppError::internal("corrupt workspace id in storage"))?;
        let tenant_id: TenantId = row.tenant_id.parse().map_err(|_| AppError::internal("corrupt tenant id in storage"))?;
        let parent_id = row
            .parent_workspace_id
            .map(|p| p.parse::<WorkspaceId>())
            .transpose()
            .map_err(|_| AppError::internal("corrupt parent workspace id in storage"))?;

        Ok(Workspace::from_parts(
            id,
            tenant_id,
            row.name,
            parent_id,
            row.is_root,
            AuditInfo {
                created_at: row.created_at,
                updated_at: row.updated_at,
            },
        ))
    }
}

#[derive(sqlx::FromRow)]
struct WorkspaceRow {
    id: String,
    tenant_id: String,
    name: String,
    parent_workspace_id: Option<String>,
    is_root: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[async_trait]
impl Repository<Workspace, WorkspaceId> for PostgresWorkspaceRepository {
    async fn find_by_id(&self, id: &WorkspaceId) -> AppResult<Option<Workspace>> {
        let row: Option<WorkspaceRow> = sqlx::query_as(
            r#"
            SELECT id, tenant_id, name, parent_workspace_id, is_root, created_at, updated_at
            FROM workspaces WHERE id = $1
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::from)?;

        row.map(Self::hydrate).transpose()
    }

    async fn save(&self, workspace: &mut Workspace) -> AppResult<()> {
        let events = workspace.collect_events();
        let mut tx = self.pool.begin().await.map_err(AppError::from)?;

        sqlx::query(
            r#"
            INSERT INTO workspaces (id, tenant_id, name, parent_workspace_id, is_root)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO UPDATE SET name = EXCLUDED.name, updated_at = NOW()
            "#,
        )
        .bind(workspace.id().to_string())
        .bind(workspace.tenant_id().to_string())
        .bind(workspace.name())
        .bind(workspace.parent_id().map(|p| p.to_string()))
        .bind(workspace.is_root())
        .execute(&mut *tx)
        .await
        .map_err(|e| classify_workspace_error(e))?;

        for event in &events {
            append_event(&mut tx, "Workspace", &workspace.id().to_string(), event).await?;
        }

        tx.commit().await.map_err(AppError::from)?;
        Ok(())
    }

    async fn delete(&self, workspace: &mut Workspace) -> AppResult<bool> {
        let events = workspace.collect_events();
        let mut tx = self.pool.begin().await.map_err(AppError::from)?;

        let result = sqlx::query("DELETE FROM workspaces WHERE id = $1")
            .bind(workspace.id().to_string())
            .execute(&mut *tx)
            .await
            .map_err(|e| classify_workspace_error(e))?;

        for event in &events {
            append_event(&mut tx, "Workspace", &workspace.id().to_string(), event).await?;
        }

        tx.commit().await.map_err(AppError::from)?;
        Ok(result.rows_affected() > 0)
    }

    async fn exists(&self, id: &WorkspaceId) -> AppResult<bool> {
        let row: Option<(i32,)> = sqlx::query_as("SELECT 1 FROM workspaces WHERE id = $1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(AppError::from)?;
        Ok(row.is_some())
    }
}

#[async_trait]
impl PageableRepository<Workspace, WorkspaceId> for PostgresWorkspaceRepository {
    async fn find_all(&self, pagination: &Pagination) -> AppResult<Vec<Workspace>> {
        let rows: Vec<WorkspaceRow> = sqlx::query_as(
            r#"
            SELECT id, tenant_id, name, parent_workspace_id, is_root, created_at, updated_at
            FROM workspaces ORDER BY created_at ASC OFFSET $1 LIMIT $2
            "#,
        )
        .bind(pagination.offset as i64)
        .bind(pagination.limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::from)?;

        rows.into_iter().map(Self::hydrate).collect()
    }

    async fn count(&self) -> AppResult<u64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM workspaces")
            .fetch_one(&self.pool)
            .await
            .map_err(AppError::from)?;
        Ok(row.0 as u64)
    }
}

/// A root-uniqueness violation and a RESTRICT-blocked delete both surface
/// as database errors here; translate them into the taxonomy the caller
/// actually wants to branch on.
fn classify_workspace_error(err: sqlx::Error) -> AppError {
    if let sqlx::Error::Database(ref db_err) = err {
        if db_err.is_unique_violation() {
            return AppError::invariant("tenant already has a root workspace");
        }
        if db_err.is_foreign_key_violation() {
            return AppError::invariant("workspace cannot be deleted while it has children");
        }
    }
    AppError::from(err)
}
