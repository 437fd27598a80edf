//! Drives the tenant/workspace bootstrap adapter against a real database,
//! including the duplicate-name and root-uniqueness races it's meant to
//! absorb.

mod common;

use std::sync::Arc;

use iam_core::infrastructure::postgres::{PostgresTenantRepository, PostgresWorkspaceRepository};
use iam_core::infrastructure::IamTenantBootstrap;
use karto_bootstrap::{ensure_default_tenant_with_workspace, TenantBootstrapPort};
use karto_errors::AppResult;
use sqlx::PgPool;

fn bootstrap(pool: &PgPool) -> IamTenantBootstrap {
    IamTenantBootstrap::new(
        Arc::new(PostgresTenantRepository::new(pool.clone())),
        Arc::new(PostgresWorkspaceRepository::new(pool.clone())),
    )
}

#[sqlx::test(migrations = false)]
async fn ensure_tenant_is_idempotent(pool: PgPool) -> AppResult<()> {
    common::apply_migrations(&pool).await;

    let port = bootstrap(&pool);
    let first = port.ensure_tenant("default").await?;
    let second = port.ensure_tenant("default").await?;

    assert_eq!(first, second);
    Ok(())
}

#[sqlx::test(migrations = false)]
async fn ensure_root_workspace_is_idempotent(pool: PgPool) -> AppResult<()> {
    common::apply_migrations(&pool).await;

    let port = bootstrap(&pool);
    let tenant_id = port.ensure_tenant("default").await?;

    port.ensure_root_workspace(&tenant_id, "root").await?;
    // Calling it again must not fail with a root-uniqueness violation.
    port.ensure_root_workspace(&tenant_id, "root").await?;
    Ok(())
}

#[sqlx::test(migrations = false)]
async fn full_bootstrap_sequence_is_idempotent_across_calls(pool: PgPool) -> AppResult<()> {
    common::apply_migrations(&pool).await;

    let port = bootstrap(&pool);
    let first = ensure_default_tenant_with_workspace(&port, "default", "root").await?;
    let second = ensure_default_tenant_with_workspace(&port, "default", "root").await?;

    assert_eq!(first, second);
    Ok(())
}

#[sqlx::test(migrations = false)]
async fn concurrent_ensure_tenant_converges_to_one_row(pool: PgPool) -> AppResult<()> {
    common::apply_migrations(&pool).await;

    let port_a = bootstrap(&pool);
    let port_b = bootstrap(&pool);

    // Both instances race to create the same default tenant; the
    // duplicate-name branch must make the loser converge on the winner's
    // row rather than erroring out.
    let (a, b) = tokio::join!(port_a.ensure_tenant("default"), port_b.ensure_tenant("default"));
    assert_eq!(a?, b?);
    Ok(())
}
