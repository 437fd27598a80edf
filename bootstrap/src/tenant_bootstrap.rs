//! Ensures the default tenant and its root workspace exist at startup.
//!
//! Supplemental feature with no counterpart in the distilled operation
//! list: implied by `tenant.single_tenant_mode`/`tenant.default_name`
//! configuration and the auth pipeline's "first login bootstrapping" note.
//! Idempotent and race-tolerant - if two instances start concurrently, the
//! loser's duplicate-name failure is treated as "someone else won" and the
//! tenant is re-queried rather than propagated as an error.

use async_trait::async_trait;
use karto_errors::AppResult;
use tracing::info;

#[async_trait]
pub trait TenantBootstrapPort: Send + Sync {
    /// Returns the id of the named tenant, creating it if absent. A
    /// duplicate-name race with another instance must resolve to the
    /// winner's tenant id, never an error.
    async fn ensure_tenant(&self, name: &str) -> AppResult<String>;

    /// Creates the tenant's root workspace if one doesn't already exist.
    async fn ensure_root_workspace(&self, tenant_id: &str, name: &str) -> AppResult<()>;
}

pub async fn ensure_default_tenant_with_workspace(
    port: &dyn TenantBootstrapPort,
    tenant_name: &str,
    workspace_name: &str,
) -> AppResult<String> {
    let tenant_id = port.ensure_tenant(tenant_name).await?;
    port.ensure_root_workspace(&tenant_id, workspace_name).await?;
    info!(tenant = %tenant_name, workspace = %workspace_name, "default tenant bootstrap complete");
    Ok(tenant_id)
}
