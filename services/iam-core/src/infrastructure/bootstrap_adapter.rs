//! Adapts this crate's tenant/workspace aggregates and repositories to
//! `karto_bootstrap::TenantBootstrapPort`, so the generic startup sequence
//! never needs to know these concrete types.

use std::sync::Arc;

use async_trait::async_trait;
use karto_bootstrap::TenantBootstrapPort;
use karto_common::{TenantId, UserId};
use karto_domain_core::Entity;
use karto_errors::{AppError, AppResult};
use karto_ports::Repository;

use crate::domain::{Tenant, Workspace};

use super::postgres::{PostgresTenantRepository, PostgresWorkspaceRepository};

/// No real user exists at boot, so the default tenant is created with this
/// as its sole admin member rather than loosening the aggregate's
/// "always at least one admin" invariant for the bootstrap path.
const SYSTEM_BOOTSTRAP_USER_ID: &str = "system";

pub struct IamTenantBootstrap {
    tenants: Arc<PostgresTenantRepository>,
    workspaces: Arc<PostgresWorkspaceRepository>,
}

impl IamTenantBootstrap {
    pub fn new(tenants: Arc<PostgresTenantRepository>, workspaces: Arc<PostgresWorkspaceRepository>) -> Self {
        Self { tenants, workspaces }
    }
}

#[async_trait]
impl TenantBootstrapPort for IamTenantBootstrap {
    async fn ensure_tenant(&self, name: &str) -> AppResult<String> {
        if let Some(tenant) = self.tenants.find_by_name(name).await? {
            return Ok(tenant.id().to_string());
        }

        let owner = UserId::new(SYSTEM_BOOTSTRAP_USER_ID).map_err(|e| AppError::internal(e.to_string()))?;
        match Tenant::create(name, owner) {
            Ok(mut tenant) => {
                match self.tenants.save(&mut tenant).await {
                    Ok(()) => Ok(tenant.id().to_string()),
                    Err(AppError::DuplicateName(_)) => {
                        // Lost the race to another instance - the winner's row is authoritative.
                        let tenant = self
                            .tenants
                            .find_by_name(name)
                            .await?
                            .ok_or_else(|| AppError::internal("default tenant vanished after duplicate-name race"))?;
                        Ok(tenant.id().to_string())
                    }
                    Err(e) => Err(e),
                }
            }
            Err(e) => Err(e),
        }
    }

    async fn ensure_root_workspace(&self, tenant_id: &str, name: &str) -> AppResult<()> {
        let tenant_id: TenantId = tenant_id
            .parse()
            .map_err(|_| AppError::internal("bootstrap tenant id is not a valid id"))?;

        if self.workspaces.find_root(tenant_id).await?.is_some() {
            return Ok(());
        }

        let mut workspace = Workspace::create_root(tenant_id, name)?;
        match self.workspaces.save(&mut workspace).await {
            Ok(()) => Ok(()),
            Err(AppError::InvariantViolation(_)) => Ok(()), // another instance won the race
            Err(e) => Err(e),
        }
    }
}
