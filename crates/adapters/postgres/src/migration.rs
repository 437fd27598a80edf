//! Hand-rolled forward-only migrations with checksum verification.
//!
//! No `sqlx::migrate!` macro - migrations are plain SQL strings defined in
//! code and tracked in a `_migrations` table, applied one at a time inside
//! their own transaction.

use karto_errors::{AppError, AppResult};
use sqlx::PgPool;
use tracing::{info, warn};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct MigrationRecord {
    pub version: i64,
    pub name: String,
    pub applied_at: chrono::DateTime<chrono::Utc>,
    pub checksum: String,
}

#[derive(Debug, Clone)]
pub struct Migration {
    pub version: i64,
    pub name: String,
    pub up_sql: String,
    pub checksum: String,
}

impl Migration {
    pub fn new(version: i64, name: impl Into<String>, up_sql: impl Into<String>) -> Self {
        let up_sql = up_sql.into();
        let checksum = Self::calculate_checksum(&up_sql);
        Self {
            version,
            name: name.into(),
            up_sql,
            checksum,
        }
    }

    fn calculate_checksum(sql: &str) -> String {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let mut hasher = DefaultHasher::new();
        sql.hash(&mut hasher);
        format!("{:x}", hasher.finish())
    }
}

#[derive(Debug, Default)]
pub struct MigrationResult {
    pub applied: Vec<i64>,
    pub skipped: Vec<i64>,
}

pub struct MigrationManager {
    pool: PgPool,
    table_name: String,
}

impl MigrationManager {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            table_name: "_migrations".to_string(),
        }
    }

    pub async fn init(&self) -> AppResult<()> {
        let create_sql = format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
                version BIGINT PRIMARY KEY,
                name VARCHAR(255) NOT NULL,
                applied_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                checksum VARCHAR(64) NOT NULL
            )
            "#,
            self.table_name
        );

        sqlx::query(&create_sql)
            .execute(&self.pool)
            .await
            .map_err(AppError::from)?;

        info!(table = %self.table_name, "migration table initialized");
        Ok(())
    }

    pub async fn get_applied_migrations(&self) -> AppResult<Vec<MigrationRecord>> {
        let sql = format!(
            "SELECT version, name, applied_at, checksum FROM {} ORDER BY version ASC",
            self.table_name
        );

        sqlx::query_as::<_, MigrationRecord>(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(AppError::from)
    }

    pub async fn current_version(&self) -> AppResult<Option<i64>> {
        let sql = format!("SELECT MAX(version) FROM {}", self.table_name);
        let row: Option<(Option<i64>,)> = sqlx::query_as(&sql)
            .fetch_optional(&self.pool)
            .await
            .map_err(AppError::from)?;
        Ok(row.and_then(|(v,)| v))
    }

    pub async fn apply(&self, migration: &Migration) -> AppResult<bool> {
        let mut tx = self.pool.begin().await.map_err(AppError::from)?;

        let check_sql = format!("SELECT version FROM {} WHERE version = $1", self.table_name);
        let existing: Option<(i64,)> = sqlx::query_as(&check_sql)
            .bind(migration.version)
            .fetch_optional(&mut *tx)
            .await
            .map_err(AppError::from)?;

        if existing.is_some() {
            warn!(version = migration.version, name = %migration.name, "migration already applied, skipping");
            return Ok(false);
        }

        sqlx::query(&migration.up_sql)
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::database(format!("migration {} failed: {e}", migration.version)))?;

        let insert_sql = format!(
            "INSERT INTO {} (version, name, checksum) VALUES ($1, $2, $3)",
            self.table_name
        );
        sqlx::query(&insert_sql)
            .bind(migration.version)
            .bind(&migration.name)
            .bind(&migration.checksum)
            .execute(&mut *tx)
            .await
            .map_err(AppError::from)?;

        tx.commit().await.map_err(AppError::from)?;
        info!(version = migration.version, name = %migration.name, "migration applied");
        Ok(true)
    }

    /// Applies every migration in `migrations` that hasn't been applied yet,
    /// in ascending version order. Fails fast on a checksum mismatch - a
    /// migration already recorded as applied must never have its SQL
    /// changed afterward.
    pub async fn migrate(&self, migrations: &[Migration]) -> AppResult<MigrationResult> {
        self.init().await?;

        let applied = self.get_applied_migrations().await?;
        let mut result = MigrationResult::default();

        let mut sorted: Vec<_> = migrations.iter().collect();
        sorted.sort_by_key(|m| m.version);

        for migration in sorted {
            if let Some(record) = applied.iter().find(|r| r.version == migration.version) {
                if record.checksum != migration.checksum {
                    return Err(AppError::internal(format!(
                        "migration {} has been modified after being applied",
                        migration.version
                    )));
                }
                result.skipped.push(migration.version);
                continue;
            }

            self.apply(migration).await?;
            result.applied.push(migration.version);
        }

        Ok(result)
    }
}
