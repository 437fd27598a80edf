use async_trait::async_trait;
use chrono::{DateTime, Utc};
use karto_common::{AuditInfo, Pagination, TenantId, UserId};
use karto_domain_core::{Entity, RecordsEvents};
use karto_errors::{AppError, AppResult};
use karto_ports::{PageableRepository, Repository};
use sqlx::PgPool;

use crate::domain::{Role, Tenant};

use super::outbox_append::append_event;

pub struct PostgresTenantRepository {
    pool: PgPool,
}

impl PostgresTenantRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find_by_name(&self, name: &str) -> AppResult<Option<Tenant>> {
        let row: Option<TenantRow> = sqlx::query_as("SELECT id, name, created_at, updated_at FROM tenants WHERE name = $1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(AppError::from)?;

        match row {
            Some(row) => Ok(Some(self.hydrate(row).await?)),
            None => Ok(None),
        }
    }

    async fn hydrate(&self, row: TenantRow) -> AppResult<Tenant> {
        let members: Vec<MemberRow> = sqlx::query_as("SELECT user_id, role FROM tenant_members WHERE tenant_id = $1")
            .bind(&row.id)
            .fetch_all(&self.pool)
            .await
            .map_err(AppError::from)?;

        let id: TenantId = row.id.parse().map_err(|_| AppError::internal("corrupt tenant id in storage"))?;
        let members = members
            .into_iter()
            .map(|m| {
                let role = parse_role(&m.role)?;
                let user_id = UserId::new(m.user_id).map_err(|e| AppError::internal(e.to_string()))?;
                Ok((user_id, role))
            })
            .collect::<AppResult<Vec<_>>>()?;

        Ok(Tenant::from_parts(
            id,
            row.name,
            members,
            AuditInfo {
                created_at: row.created_at,
                updated_at: row.updated_at,
            },
        ))
    }
}

fn parse_role(s: &str) -> AppResult<Role> {
    match s {
        "admin" => Ok(Role::Admin),
        "member" => Ok(Role::Member),
        other => Err(AppError::internal(format!("unknown role `{other}` in storage"))),
    }
}

#[derive(sqlx::FromRow)]
struct TenantRow {
    id: String,
    name: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct MemberRow {
    user_id: String,
    role: String,
}

#[async_trait]
impl Repository<Tenant, TenantId> for PostgresTenantRepository {
    async fn find_by_id(&self, id: &TenantId) -> AppResult<Option<Tenant>> {
        let row: Option<TenantRow> = sqlx::query_as("SELECT id, name, created_at, updated_at FROM tenants WHERE id = $1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(AppError::from)?;

        match row {
            Some(row) => Ok(Some(self.hydrate(row).await?)),
            None => Ok(None),
        }
    }

    /// Persists the tenant's current membership roster and appends its
    /// pending events, all inside one transaction.
    async fn save(&self, tenant: &mut Tenant) -> AppResult<()> {
        let events = tenant.collect_events();
        let mut tx = self.pool.begin().await.map_err(AppError::from)?;

        sqlx::query(
            r#"
            INSERT INTO tenants (id, name)
            VALUES ($1, $2)
            ON CONFLICT (id) DO UPDATE SET name = EXCLUDED.name, updated_at = NOW()
            "#,
        )
        .bind(tenant.id().to_string())
        .bind(tenant.name())
        .execute(&mut *tx)
        .await
        .map_err(|e| classify_unique_violation(e, "tenant name"))?;

        sqlx::query("DELETE FROM tenant_members WHERE tenant_id = $1")
            .bind(tenant.id().to_string())
            .execute(&mut *tx)
            .await
            .map_err(AppError::from)?;

        for (user_id, role) in tenant.members() {
            sqlx::query("INSERT INTO tenant_members (tenant_id, user_id, role) VALUES ($1, $2, $3)")
                .bind(tenant.id().to_string())
                .bind(user_id.as_str())
                .bind(role.to_string())
                .execute(&mut *tx)
                .await
                .map_err(AppError::from)?;
        }

        for event in &events {
            append_event(&mut tx, "Tenant", &tenant.id().to_string(), event).await?;
        }

        tx.commit().await.map_err(AppError::from)?;
        Ok(())
    }

    async fn delete(&self, tenant: &mut Tenant) -> AppResult<bool> {
        let events = tenant.collect_events();
        let mut tx = self.pool.begin().await.map_err(AppError::from)?;

        let result = sqlx::query("DELETE FROM tenants WHERE id = $1")
            .bind(tenant.id().to_string())
            .execute(&mut *tx)
            .await
            .map_err(AppError::from)?;

        for event in &events {
            append_event(&mut tx, "Tenant", &tenant.id().to_string(), event).await?;
        }

        tx.commit().await.map_err(AppError::from)?;
        Ok(result.rows_affected() > 0)
    }

    async fn exists(&self, id: &TenantId) -> AppResult<bool> {
        let row: Option<(i32,)> = sqlx::query_as("SELECT 1 FROM tenants WHERE id = $1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(AppError::from)?;
        Ok(row.is_some())
    }
}

#[async_trait]
impl PageableRepository<Tenant, TenantId> for PostgresTenantRepository {
    async fn find_all(&self, pagination: &Pagination) -> AppResult<Vec<Tenant>> {
        let rows: Vec<TenantRow> = sqlx::query_as(
            "SELECT id, name, created_at, updated_at FROM tenants ORDER BY created_at ASC OFFSET $1 LIMIT $2",
        )
        .bind(pagination.offset as i64)
        .bind(pagination.limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::from)?;

        let mut tenants = Vec::with_capacity(rows.len());
        for row in rows {
            tenants.push(self.hydrate(row).await?);
        }
        Ok(tenants)
    }

    async fn count(&self) -> AppResult<u64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM tenants")
            .fetch_one(&self.pool)
            .await
            .map_err(AppError::from)?;
        Ok(row.0 as u64)
    }
}

fn classify_unique_violation(err: sqlx::Error, what: &str) -> AppError {
    if let sqlx::Error::Database(ref db_err) = err {
        if db_err.is_unique_violation() {
            return AppError::duplicate_name(format!("{what} already in use"));
        }
    }
    AppError::from(err)
}
