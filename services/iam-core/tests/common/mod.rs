//! Shared test support for the integration suite.
//!
//! `#[sqlx::test]` normally looks for a `migrations/` directory of `.sql`
//! files next to the crate and runs them automatically; this workspace's
//! migrations are Rust values instead, so every test disables that lookup
//! (`#[sqlx::test(migrations = false)]`) and calls [`apply_migrations`]
//! itself before touching the schema.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use iam_core::infrastructure::postgres::migrations;
use karto_adapter_postgres::MigrationManager;
use karto_errors::AppResult;
use karto_ports::{AuthorizationEnginePort, RelationshipOp, RelationshipRef};
use sqlx::PgPool;

pub async fn apply_migrations(pool: &PgPool) {
    MigrationManager::new(pool.clone())
        .migrate(&migrations::all())
        .await
        .expect("failed to apply migrations to test database");
}

/// Records every batch handed to `apply` so a test can assert on what the
/// worker actually sent, without standing up a real authorization engine.
#[derive(Default)]
pub struct RecordingEngine {
    pub applied: Mutex<Vec<RelationshipOp>>,
}

#[async_trait]
impl AuthorizationEnginePort for RecordingEngine {
    async fn apply(&self, ops: &[RelationshipOp]) -> AppResult<()> {
        self.applied.lock().unwrap().extend(ops.iter().cloned());
        Ok(())
    }

    async fn check_permission(&self, _check: &RelationshipRef) -> AppResult<bool> {
        Ok(true)
    }
}

/// Fails every `apply` call until `succeed_after` calls have been made for
/// a given aggregate, then starts succeeding - used to exercise the
/// worker's retry and quarantine paths against a real outbox.
pub struct FlakyEngine {
    pub fail_count: Mutex<u32>,
    pub succeed_after: u32,
}

impl FlakyEngine {
    pub fn new(succeed_after: u32) -> Self {
        Self {
            fail_count: Mutex::new(0),
            succeed_after,
        }
    }

    pub fn attempts(&self) -> u32 {
        *self.fail_count.lock().unwrap()
    }
}

#[async_trait]
impl AuthorizationEnginePort for FlakyEngine {
    async fn apply(&self, _ops: &[RelationshipOp]) -> AppResult<()> {
        let mut count = self.fail_count.lock().unwrap();
        *count += 1;
        if *count <= self.succeed_after {
            return Err(karto_errors::AppError::authorization_engine("engine temporarily unavailable"));
        }
        Ok(())
    }

    async fn check_permission(&self, _check: &RelationshipRef) -> AppResult<bool> {
        Ok(true)
    }
}

/// Always-failing engine - used to drive an entry to quarantine.
pub struct AlwaysFailsEngine;

#[async_trait]
impl AuthorizationEnginePort for AlwaysFailsEngine {
    async fn apply(&self, _ops: &[RelationshipOp]) -> AppResult<()> {
        Err(karto_errors::AppError::authorization_engine("engine permanently down"))
    }

    async fn check_permission(&self, _check: &RelationshipRef) -> AppResult<bool> {
        Ok(true)
    }
}

pub fn arc<T>(value: T) -> Arc<T> {
    Arc::new(value)
}
