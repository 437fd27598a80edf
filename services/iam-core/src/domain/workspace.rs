use chrono::Utc;
use karto_common::{AuditInfo, TenantId, WorkspaceId};
use karto_domain_core::{AggregateRoot, Entity, RecordsEvents};
use karto_errors::{AppError, AppResult};

use super::events::WorkspaceEvent;

const MAX_NAME_LEN: usize = 100;

/// `{id, tenant_id, name, parent_id?, is_root}`. Exactly one root per
/// tenant is enforced by a partial unique index at the relational layer;
/// this aggregate enforces the shape-level invariants that hold regardless
/// of storage.
#[derive(Debug, Clone)]
pub struct Workspace {
    id: WorkspaceId,
    tenant_id: TenantId,
    name: String,
    parent_id: Option<WorkspaceId>,
    is_root: bool,
    audit: AuditInfo,
    pending: Vec<WorkspaceEvent>,
}

impl Workspace {
    pub fn create_root(tenant_id: TenantId, name: impl Into<String>) -> AppResult<Self> {
        Self::new(tenant_id, name, None, true)
    }

    pub fn create_child(tenant_id: TenantId, name: impl Into<String>, parent_id: WorkspaceId) -> AppResult<Self> {
        Self::new(tenant_id, name, Some(parent_id), false)
    }

    fn new(tenant_id: TenantId, name: impl Into<String>, parent_id: Option<WorkspaceId>, is_root: bool) -> AppResult<Self> {
        let name = name.into();
        if name.trim().is_empty() || name.len() > MAX_NAME_LEN {
            return Err(AppError::invariant(format!(
                "workspace name must be 1-{MAX_NAME_LEN} characters"
            )));
        }
        if is_root && parent_id.is_some() {
            return Err(AppError::invariant("a root workspace cannot have a parent"));
        }
        if !is_root && parent_id.is_none() {
            return Err(AppError::invariant("a non-root workspace requires a parent"));
        }

        let id = WorkspaceId::new();
        let workspace = Self {
            id,
            tenant_id,
            name: name.clone(),
            parent_id,
            is_root,
            audit: AuditInfo::new(),
            pending: vec![WorkspaceEvent::WorkspaceCreated {
                workspace_id: id.to_string(),
                tenant_id: tenant_id.to_string(),
                name,
                parent_workspace_id: parent_id.map(|p| p.to_string()),
                occurred_at: Utc::now(),
            }],
        };
        Ok(workspace)
    }

    pub fn from_parts(
        id: WorkspaceId,
        tenant_id: TenantId,
        name: String,
        parent_id: Option<WorkspaceId>,
        is_root: bool,
        audit: AuditInfo,
    ) -> Self {
        Self {
            id,
            tenant_id,
            name,
            parent_id,
            is_root,
            audit,
            pending: Vec::new(),
        }
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    pub fn is_root(&self) -> bool {
        self.is_root
    }

    pub fn parent_id(&self) -> Option<WorkspaceId> {
        self.parent_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Records `WorkspaceDeleted`. Callers must have already verified there
    /// are no child workspaces - the relational `RESTRICT` foreign key
    /// makes the delete itself fail loudly if they haven't, which is the
    /// intended backstop, not this method's job.
    pub fn mark_for_deletion(&mut self) {
        self.pending.push(WorkspaceEvent::WorkspaceDeleted {
            workspace_id: self.id.to_string(),
            tenant_id: self.tenant_id.to_string(),
            occurred_at: Utc::now(),
        });
    }
}

impl Entity for Workspace {
    type Id = WorkspaceId;

    fn id(&self) -> &WorkspaceId {
        &self.id
    }
}

impl AggregateRoot for Workspace {
    fn audit_info(&self) -> &AuditInfo {
        &self.audit
    }

    fn audit_info_mut(&mut self) -> &mut AuditInfo {
        &mut self.audit
    }
}

impl RecordsEvents for Workspace {
    type Event = WorkspaceEvent;

    fn collect_events(&mut self) -> Vec<WorkspaceEvent> {
        std::mem::take(&mut self.pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_workspace_has_no_parent() {
        let w = Workspace::create_root(TenantId::new(), "root").unwrap();
        assert!(w.is_root());
        assert!(w.parent_id().is_none());
    }

    #[test]
    fn child_workspace_requires_parent() {
        assert!(Workspace::new(TenantId::new(), "child", None, false).is_err());
    }

    #[test]
    fn root_workspace_rejects_parent() {
        assert!(Workspace::new(TenantId::new(), "root", Some(WorkspaceId::new()), true).is_err());
    }

    #[test]
    fn create_records_a_single_created_event() {
        let mut w = Workspace::create_root(TenantId::new(), "root").unwrap();
        assert_eq!(w.collect_events().len(), 1);
    }
}
