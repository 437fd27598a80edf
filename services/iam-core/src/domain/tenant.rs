use chrono::Utc;
use karto_common::{AuditInfo, TenantId, UserId};
use karto_domain_core::{AggregateRoot, DomainEvent, Entity, RecordsEvents};
use karto_errors::{AppError, AppResult};

use super::events::{MemberSnapshot, TenantEvent};
use super::role::Role;

const MAX_NAME_LEN: usize = 100;

#[derive(Debug, Clone)]
struct TenantMember {
    user_id: UserId,
    role: Role,
}

/// `{id, name}` plus its membership roster. Invariant: at least one
/// administrative member at all times.
#[derive(Debug, Clone)]
pub struct Tenant {
    id: TenantId,
    name: String,
    members: Vec<TenantMember>,
    audit: AuditInfo,
    pending: Vec<TenantEvent>,
}

impl Tenant {
    /// Creates a new tenant with `owner` as its first administrative
    /// member and records `TenantCreated` + `TenantMemberAdded`.
    pub fn create(name: impl Into<String>, owner: UserId) -> AppResult<Self> {
        let name = name.into();
        if name.trim().is_empty() || name.len() > MAX_NAME_LEN {
            return Err(AppError::invariant(format!(
                "tenant name must be 1-{MAX_NAME_LEN} characters"
            )));
        }

        let id = TenantId::new();
        let now = Utc::now();
        let mut tenant = Self {
            id,
            name: name.clone(),
            members: vec![TenantMember {
                user_id: owner.clone(),
                role: Role::Admin,
            }],
            audit: AuditInfo::new(),
            pending: vec![TenantEvent::TenantCreated {
                tenant_id: id.to_string(),
                name,
                occurred_at: now,
            }],
        };
        tenant.pending.push(TenantEvent::TenantMemberAdded {
            tenant_id: id.to_string(),
            user_id: owner.as_str().to_string(),
            role: Role::Admin,
            occurred_at: now,
        });
        Ok(tenant)
    }

    /// Reconstructs a tenant from its persisted state, with no pending
    /// events - used when loading from the repository, not when creating.
    pub fn from_parts(id: TenantId, name: String, members: Vec<(UserId, Role)>, audit: AuditInfo) -> Self {
        Self {
            id,
            name,
            members: members.into_iter().map(|(user_id, role)| TenantMember { user_id, role }).collect(),
            audit,
            pending: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn members(&self) -> impl Iterator<Item = (&UserId, Role)> {
        self.members.iter().map(|m| (&m.user_id, m.role))
    }

    fn admin_count(&self) -> usize {
        self.members.iter().filter(|m| m.role == Role::Admin).count()
    }

    pub fn add_member(&mut self, user_id: UserId, role: Role) -> AppResult<()> {
        if self.members.iter().any(|m| m.user_id == user_id) {
            return Err(AppError::invariant("user is already a tenant member"));
        }
        self.members.push(TenantMember {
            user_id: user_id.clone(),
            role,
        });
        self.audit.touch();
        self.pending.push(TenantEvent::TenantMemberAdded {
            tenant_id: self.id.to_string(),
            user_id: user_id.as_str().to_string(),
            role,
            occurred_at: Utc::now(),
        });
        Ok(())
    }

    pub fn remove_member(&mut self, user_id: &UserId) -> AppResult<()> {
        let idx = self
            .members
            .iter()
            .position(|m| &m.user_id == user_id)
            .ok_or_else(|| AppError::invariant("user is not a tenant member"))?;

        if self.members[idx].role == Role::Admin && self.admin_count() == 1 {
            return Err(AppError::invariant("cannot remove the last administrative member"));
        }

        let removed = self.members.remove(idx);
        self.audit.touch();
        self.pending.push(TenantEvent::TenantMemberRemoved {
            tenant_id: self.id.to_string(),
            user_id: removed.user_id.as_str().to_string(),
            role: removed.role,
            occurred_at: Utc::now(),
        });
        Ok(())
    }

    /// Marks the tenant for deletion, recording a `TenantDeleted` event
    /// carrying a full membership snapshot. The relational cascade and
    /// resource teardown are a separately tracked concern - see the open
    /// ticket in the design notes. This does not clear `self.members`;
    /// callers are responsible for the actual deletion of the row.
    pub fn mark_for_deletion(&mut self) {
        let snapshot = self
            .members
            .iter()
            .map(|m| MemberSnapshot {
                user_id: m.user_id.as_str().to_string(),
                role: m.role,
            })
            .collect();
        self.pending.push(TenantEvent::TenantDeleted {
            tenant_id: self.id.to_string(),
            members: snapshot,
            occurred_at: Utc::now(),
        });
    }
}

impl Entity for Tenant {
    type Id = TenantId;

    fn id(&self) -> &TenantId {
        &self.id
    }
}

impl AggregateRoot for Tenant {
    fn audit_info(&self) -> &AuditInfo {
        &self.audit
    }

    fn audit_info_mut(&mut self) -> &mut AuditInfo {
        &mut self.audit
    }
}

impl RecordsEvents for Tenant {
    type Event = TenantEvent;

    fn collect_events(&mut self) -> Vec<TenantEvent> {
        std::mem::take(&mut self.pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(s: &str) -> UserId {
        UserId::new(s).unwrap()
    }

    #[test]
    fn create_records_created_and_member_added() {
        let mut t = Tenant::create("acme", user("u1")).unwrap();
        let events = t.collect_events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type(), "TenantCreated");
        assert_eq!(events[1].event_type(), "TenantMemberAdded");
        assert!(t.collect_events().is_empty());
    }

    #[test]
    fn rejects_empty_name() {
        assert!(Tenant::create("", user("u1")).is_err());
    }

    #[test]
    fn cannot_remove_last_admin() {
        let mut t = Tenant::create("acme", user("u1")).unwrap();
        t.collect_events();
        assert!(t.remove_member(&user("u1")).is_err());
    }

    #[test]
    fn removing_non_last_admin_after_adding_another_succeeds() {
        let mut t = Tenant::create("acme", user("u1")).unwrap();
        t.collect_events();
        t.add_member(user("u2"), Role::Admin).unwrap();
        t.collect_events();
        assert!(t.remove_member(&user("u1")).is_ok());
    }

    #[test]
    fn adding_existing_member_fails() {
        let mut t = Tenant::create("acme", user("u1")).unwrap();
        t.collect_events();
        assert!(t.add_member(user("u1"), Role::Member).is_err());
    }

    #[test]
    fn mark_for_deletion_carries_full_member_snapshot() {
        let mut t = Tenant::create("acme", user("u1")).unwrap();
        t.collect_events();
        t.add_member(user("u2"), Role::Member).unwrap();
        t.collect_events();
        t.mark_for_deletion();
        let events = t.collect_events();
        match &events[0] {
            TenantEvent::TenantDeleted { members, .. } => assert_eq!(members.len(), 2),
            _ => panic!("expected TenantDeleted"),
        }
    }
}
