use async_trait::async_trait;
use chrono::{DateTime, Utc};
use karto_common::{AuditInfo, GroupId, Pagination, TenantId, UserId};
use karto_domain_core::{Entity, RecordsEvents};
use karto_errors::{AppError, AppResult};
use karto_ports::{PageableRepository, Repository};
use sqlx::PgPool;

use crate::domain::{Group, Role};

use super::outbox_append::append_event;

pub struct PostgresGroupRepository {
    pool: PgPool,
}

impl PostgresGroupRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find_by_name(&self, tenant_id: TenantId, name: &str) -> AppResult<Option<Group>> {
        let row: Option<GroupRow> =
            sqlx::query_as("SELECT id, tenant_id, name, created_at, updated_at FROM groups WHERE tenant_id = $1 AND name = $2")
                .bind(tenant_id.to_string())
                .bind(name)
                .fetch_optional(&self.pool)
                .await
                .map_err(AppError::from)?;

        match row {
            Some(row) => Ok(Some(self.hydrate(row).await?)),
            None => Ok(None),
        }
    }

    async fn hydrate(&self, row: GroupRow) -> AppResult<Group> {
        let members: Vec<MemberRow> = sqlx::query_as("SELECT user_id, role FROM group_members WHERE group_id = $1")
            .bind(&row.id)
            .fetch_all(&self.pool)
            .await
            .map_err(AppError::from)?;

        let id: GroupId = row.id.parse().map_err(|_| AppError::internal("corrupt group id in storage"))?;
        let tenant_id: TenantId = row.tenant_id.parse().map_err(|_| AppError::internal("corrupt tenant id in storage"))?;
        let members = members
            .into_iter()
            .map(|m| {
                let role = parse_role(&m.role)?;
                let user_id = UserId::new(m.user_id).map_err(|e| AppError::internal(e.to_string()))?;
                Ok((user_id, role))
            })
            .collect::<AppResult<Vec<_>>>()?;

        Ok(Group::from_parts(
            id,
            tenant_id,
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
struct GroupRow {
    id: String,
    tenant_id: String,
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
impl Repository<Group, GroupId> for PostgresGroupRepository {
    async fn find_by_id(&self, id: &GroupId) -> AppResult<Option<Group>> {
        let row: Option<GroupRow> =
            sqlx::query_as("SELECT id, tenant_id, name, created_at, updated_at FROM groups WHERE id = $1")
                .bind(id.to_string())
                .fetch_optional(&self.pool)
                .await
                .map_err(AppError::from)?;

        match row {
            Some(row) => Ok(Some(self.hydrate(row).await?)),
            None => Ok(None),
        }
    }

    async fn save(&self, group: &mut Group) -> AppResult<()> {
        let events = group.collect_events();
        let mut tx = self.pool.begin().await.map_err(AppError::from)?;

        sqlx::query(
            r#"
            INSERT INTO groups (id, tenant_id, name)
            VALUES ($1, $2, $3)
            ON CONFLICT (id) DO UPDATE SET name = EXCLUDED.name, updated_at = NOW()
            "#,
        )
        .bind(group.id().to_string())
        .bind(group.tenant_id().to_string())
        .bind(group.name())
        .execute(&mut *tx)
        .await
        .map_err(|e| classify_unique_violation(e))?;

        sqlx::query("DELETE FROM group_members WHERE group_id = $1")
            .bind(group.id().to_string())
            .execute(&mut *tx)
            .await
            .map_err(AppError::from)?;

        for (user_id, role) in group.members() {
            sqlx::query("INSERT INTO group_members (group_id, user_id, role) VALUES ($1, $2, $3)")
                .bind(group.id().to_string())
                .bind(user_id.as_str())
                .bind(role.to_string())
                .execute(&mut *tx)
                .await
                .map_err(AppError::from)?;
        }

        for event in &events {
            append_event(&mut tx, "Group", &group.id().to_string(), event).await?;
        }

        tx.commit().await.map_err(AppError::from)?;
        Ok(())
    }

    async fn delete(&self, group: &mut Group) -> AppResult<bool> {
        let events = group.collect_events();
        let mut tx = self.pool.begin().await.map_err(AppError::from)?;

        let result = sqlx::query("DELETE FROM groups WHERE id = $1")
            .bind(group.id().to_string())
            .execute(&mut *tx)
            .await
            .map_err(AppError::from)?;

        for event in &events {
            append_event(&mut tx, "Group", &group.id().to_string(), event).await?;
        }

        tx.commit().await.map_err(AppError::from)?;
        Ok(result.rows_affected() > 0)
    }

    async fn exists(&self, id: &GroupId) -> AppResult<bool> {
        let row: Option<(i32,)> = sqlx::query_as("SELECT 1 FROM groups WHERE id = $1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(AppError::from)?;
        Ok(row.is_some())
    }
}

#[async_trait]
impl PageableRepository<Group, GroupId> for PostgresGroupRepository {
    async fn find_all(&self, pagination: &Pagination) -> AppResult<Vec<Group>> {
        let rows: Vec<GroupRow> = sqlx::query_as(
            "SELECT id, tenant_id, name, created_at, updated_at FROM groups ORDER BY created_at ASC OFFSET $1 LIMIT $2",
        )
        .bind(pagination.offset as i64)
        .bind(pagination.limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::from)?;

        let mut groups = Vec::with_capacity(rows.len());
        for row in rows {
            groups.push(self.hydrate(row).await?);
        }
        Ok(groups)
    }

    async fn count(&self) -> AppResult<u64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM groups")
            .fetch_one(&self.pool)
            .await
            .map_err(AppError::from)?;
        Ok(row.0 as u64)
    }
}

fn classify_unique_violation(err: sqlx::Error) -> AppError {
    if let sqlx::Error::Database(ref db_err) = err {
        if db_err.is_unique_violation() {
            return AppError::duplicate_name("group name already in use within this tenant");
        }
    }
    AppError::from(err)
}
