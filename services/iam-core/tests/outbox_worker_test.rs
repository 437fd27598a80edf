//! Exercises a real group aggregate through its Postgres repository, the
//! outbox it writes to in the same transaction, and the worker that drains
//! it - the `IamEventTranslator` is the real one, only the authorization
//! engine on the far end is faked.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{arc, AlwaysFailsEngine, FlakyEngine, RecordingEngine};
use iam_core::domain::{Group, Role, Tenant};
use iam_core::infrastructure::postgres::{PostgresGroupRepository, PostgresTenantRepository};
use iam_core::worker::{OutboxWorker, OutboxWorkerConfig};
use karto_adapter_authzengine::IamEventTranslator;
use karto_adapter_postgres::PostgresOutbox;
use karto_common::{RetryConfig, TenantId, UserId};
use karto_domain_core::Entity;
use karto_errors::AppResult;
use karto_ports::{OutboxPort, RelationshipOp, Repository};
use sqlx::PgPool;

fn user(s: &str) -> UserId {
    UserId::new(s).unwrap()
}

fn worker_config() -> OutboxWorkerConfig {
    OutboxWorkerConfig {
        poll_interval: Duration::from_secs(30),
        batch_size: 50,
        retry: RetryConfig::new(3, Duration::from_millis(1), Duration::from_millis(10)),
    }
}

/// `groups.tenant_id` is `NOT NULL REFERENCES tenants(id)`, so a group can
/// only be created against a tenant row that actually exists.
async fn seed_tenant(pool: &PgPool) -> TenantId {
    let repo = PostgresTenantRepository::new(pool.clone());
    let mut tenant = Tenant::create("acme", user("tenant-owner")).unwrap();
    repo.save(&mut tenant).await.unwrap();
    *tenant.id()
}

async fn seed_group(pool: &PgPool, tenant_id: TenantId) -> Group {
    let repo = PostgresGroupRepository::new(pool.clone());
    let mut group = Group::create(tenant_id, "engineering", user("admin-1")).unwrap();
    repo.save(&mut group).await.unwrap();
    group
}

#[sqlx::test(migrations = false)]
async fn group_creation_propagates_write_relationships(pool: PgPool) -> AppResult<()> {
    common::apply_migrations(&pool).await;

    let tenant_id = seed_tenant(&pool).await;
    seed_group(&pool, tenant_id).await;

    let outbox: Arc<dyn OutboxPort> = arc(PostgresOutbox::new(pool.clone()));
    let engine = arc(RecordingEngine::default());
    let worker = OutboxWorker::new(outbox, engine.clone(), arc(IamEventTranslator::new()), worker_config());

    worker.process_batch().await?;

    let applied = engine.applied.lock().unwrap();
    // GroupCreated + MemberAdded(admin) each translate to a relationship write.
    assert_eq!(applied.len(), 2);
    assert!(applied.iter().all(|op| matches!(op, RelationshipOp::WriteRelationship(_))));
    Ok(())
}

#[sqlx::test(migrations = false)]
async fn group_deletion_propagates_member_teardown(pool: PgPool) -> AppResult<()> {
    common::apply_migrations(&pool).await;

    let tenant_id = seed_tenant(&pool).await;
    let repo = PostgresGroupRepository::new(pool.clone());
    let mut group = seed_group(&pool, tenant_id).await;

    group.add_member(user("member-1"), Role::Member).unwrap();
    repo.save(&mut group).await.unwrap();

    let outbox: Arc<dyn OutboxPort> = arc(PostgresOutbox::new(pool.clone()));
    let engine = arc(RecordingEngine::default());
    let worker = OutboxWorker::new(outbox.clone(), engine.clone(), arc(IamEventTranslator::new()), worker_config());

    // Drain the creation/membership entries first so only the deletion
    // entry's effect is visible below.
    worker.process_batch().await?;
    engine.applied.lock().unwrap().clear();

    // `mark_for_deletion` only records the event; `delete` removes the row
    // and appends that event to the outbox in the same transaction.
    group.mark_for_deletion();
    repo.delete(&mut group).await.unwrap();

    worker.process_batch().await?;

    let applied = engine.applied.lock().unwrap();
    // One `group -> tenant` delete plus one per-member delete (admin-1, member-1).
    assert_eq!(applied.len(), 3);
    assert!(applied.iter().all(|op| matches!(op, RelationshipOp::DeleteRelationship(_))));
    Ok(())
}

#[sqlx::test(migrations = false)]
async fn worker_retries_a_transient_failure_then_succeeds(pool: PgPool) -> AppResult<()> {
    common::apply_migrations(&pool).await;

    let tenant_id = seed_tenant(&pool).await;
    seed_group(&pool, tenant_id).await;

    let outbox: Arc<dyn OutboxPort> = arc(PostgresOutbox::new(pool.clone()));
    let engine = arc(FlakyEngine::new(1));
    let worker = OutboxWorker::new(outbox.clone(), engine.clone(), arc(IamEventTranslator::new()), worker_config());

    let backoff = worker.process_batch().await?;
    assert!(backoff.is_some(), "first batch should report a failure and a backoff");

    worker.process_batch().await?;

    let remaining = outbox.fetch_pending_batch(10).await?;
    assert!(remaining.is_empty(), "all entries should be processed after the engine recovers");
    Ok(())
}

#[sqlx::test(migrations = false)]
async fn entry_is_quarantined_after_exhausting_retries(pool: PgPool) -> AppResult<()> {
    common::apply_migrations(&pool).await;

    let tenant_id = seed_tenant(&pool).await;
    seed_group(&pool, tenant_id).await;

    let outbox: Arc<dyn OutboxPort> = arc(PostgresOutbox::new(pool.clone()));
    let mut config = worker_config();
    config.retry = RetryConfig::new(2, Duration::from_millis(1), Duration::from_millis(5));
    let worker = OutboxWorker::new(outbox.clone(), arc(AlwaysFailsEngine), arc(IamEventTranslator::new()), config);

    // The group has two outbox entries (`GroupCreated`, `MemberAdded`) that
    // share an aggregate id, so only one of them is attempted per batch
    // while the other sits blocked behind it. With `max_attempts = 2`,
    // three batches are needed: the first entry quarantines on the second
    // batch, freeing the second entry to start its own two attempts.
    for _ in 0..3 {
        worker.process_batch().await?;
    }

    let remaining = outbox.fetch_pending_batch(10).await?;
    assert!(remaining.is_empty(), "quarantined entries must not be returned as pending");
    Ok(())
}

#[sqlx::test(migrations = false)]
async fn two_workers_sharing_one_outbox_never_double_apply(pool: PgPool) -> AppResult<()> {
    common::apply_migrations(&pool).await;

    let tenant_id = seed_tenant(&pool).await;
    for i in 0..5 {
        let repo = PostgresGroupRepository::new(pool.clone());
        let mut group = Group::create(tenant_id, format!("group-{i}"), user("admin-1")).unwrap();
        repo.save(&mut group).await.unwrap();
    }

    let outbox_a: Arc<dyn OutboxPort> = arc(PostgresOutbox::new(pool.clone()));
    let outbox_b: Arc<dyn OutboxPort> = arc(PostgresOutbox::new(pool.clone()));
    let engine_a = arc(RecordingEngine::default());
    let engine_b = arc(RecordingEngine::default());

    let worker_a = OutboxWorker::new(outbox_a, engine_a.clone(), arc(IamEventTranslator::new()), worker_config());
    let worker_b = OutboxWorker::new(outbox_b, engine_b.clone(), arc(IamEventTranslator::new()), worker_config());

    // Two independent worker instances pointed at the same table: whichever
    // drains a row first marks it processed, so the other finds nothing
    // left to do rather than reprocessing it.
    worker_a.process_batch().await?;
    worker_b.process_batch().await?;

    let total_applied = engine_a.applied.lock().unwrap().len() + engine_b.applied.lock().unwrap().len();
    // 5 groups x (GroupCreated + MemberAdded) = 10 relationship writes total.
    assert_eq!(total_applied, 10);
    Ok(())
}
