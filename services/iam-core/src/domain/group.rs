use chrono::Utc;
use karto_common::{AuditInfo, GroupId, TenantId, UserId};
use karto_domain_core::{AggregateRoot, Entity, RecordsEvents};
use karto_errors::{AppError, AppResult};

use super::events::{GroupEvent, MemberSnapshot};
use super::role::Role;

const MAX_NAME_LEN: usize = 100;

#[derive(Debug, Clone)]
struct GroupMember {
    user_id: UserId,
    role: Role,
}

/// `{id, tenant_id, name, members}`. Invariant: at least one administrative
/// member at all times; a user holds at most one role per group.
#[derive(Debug, Clone)]
pub struct Group {
    id: GroupId,
    tenant_id: TenantId,
    name: String,
    members: Vec<GroupMember>,
    audit: AuditInfo,
    pending: Vec<GroupEvent>,
}

impl Group {
    pub fn create(tenant_id: TenantId, name: impl Into<String>, admin: UserId) -> AppResult<Self> {
        let name = name.into();
        if name.trim().is_empty() || name.len() > MAX_NAME_LEN {
            return Err(AppError::invariant(format!(
                "group name must be 1-{MAX_NAME_LEN} characters"
            )));
        }

        let id = GroupId::new();
        let now = Utc::now();
        let mut group = Self {
            id,
            tenant_id,
            name: name.clone(),
            members: vec![GroupMember {
                user_id: admin.clone(),
                role: Role::Admin,
            }],
            audit: AuditInfo::new(),
            pending: vec![GroupEvent::GroupCreated {
                group_id: id.to_string(),
                tenant_id: tenant_id.to_string(),
                name,
                occurred_at: now,
            }],
        };
        group.pending.push(GroupEvent::MemberAdded {
            group_id: id.to_string(),
            user_id: admin.as_str().to_string(),
            role: Role::Admin,
            occurred_at: now,
        });
        Ok(group)
    }

    pub fn from_parts(
        id: GroupId,
        tenant_id: TenantId,
        name: String,
        members: Vec<(UserId, Role)>,
        audit: AuditInfo,
    ) -> Self {
        Self {
            id,
            tenant_id,
            name,
            members: members.into_iter().map(|(user_id, role)| GroupMember { user_id, role }).collect(),
            audit,
            pending: Vec::new(),
        }
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
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
            return Err(AppError::invariant("user is already present with a role in this group"));
        }
        self.members.push(GroupMember {
            user_id: user_id.clone(),
            role,
        });
        self.audit.touch();
        self.pending.push(GroupEvent::MemberAdded {
            group_id: self.id.to_string(),
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
            .ok_or_else(|| AppError::invariant("user is not a member of this group"))?;

        if self.members[idx].role == Role::Admin && self.admin_count() == 1 {
            return Err(AppError::invariant("cannot remove the last administrative member"));
        }

        let removed = self.members.remove(idx);
        self.audit.touch();
        self.pending.push(GroupEvent::MemberRemoved {
            group_id: self.id.to_string(),
            user_id: removed.user_id.as_str().to_string(),
            role: removed.role,
            occurred_at: Utc::now(),
        });
        Ok(())
    }

    pub fn change_role(&mut self, user_id: &UserId, new_role: Role) -> AppResult<()> {
        let member = self
            .members
            .iter_mut()
            .find(|m| &m.user_id == user_id)
            .ok_or_else(|| AppError::invariant("user is not a member of this group"))?;

        let old_role = member.role;
        if old_role == new_role {
            return Err(AppError::invariant("user already holds this role"));
        }
        if old_role == Role::Admin && new_role == Role::Member {
            let remaining_admins = self.members.iter().filter(|m| m.role == Role::Admin).count();
            if remaining_admins == 1 {
                return Err(AppError::invariant("cannot demote the last administrative member"));
            }
        }

        member.role = new_role;
        self.audit.touch();
        self.pending.push(GroupEvent::MemberRoleChanged {
            group_id: self.id.to_string(),
            user_id: user_id.as_str().to_string(),
            old_role,
            new_role,
            occurred_at: Utc::now(),
        });
        Ok(())
    }

    /// Records `GroupDeleted` carrying a full member snapshot so the worker
    /// can expand it into per-member relationship deletes even after the
    /// relational row is gone.
    pub fn mark_for_deletion(&mut self) {
        let snapshot = self
            .members
            .iter()
            .map(|m| MemberSnapshot {
                user_id: m.user_id.as_str().to_string(),
                role: m.role,
            })
            .collect();
        self.pending.push(GroupEvent::GroupDeleted {
            group_id: self.id.to_string(),
            tenant_id: self.tenant_id.to_string(),
            members: snapshot,
            occurred_at: Utc::now(),
        });
    }
}

impl Entity for Group {
    type Id = GroupId;

    fn id(&self) -> &GroupId {
        &self.id
    }
}

impl AggregateRoot for Group {
    fn audit_info(&self) -> &AuditInfo {
        &self.audit
    }

    fn audit_info_mut(&mut self) -> &mut AuditInfo {
        &mut self.audit
    }
}

impl RecordsEvents for Group {
    type Event = GroupEvent;

    fn collect_events(&mut self) -> Vec<GroupEvent> {
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
        let mut g = Group::create(TenantId::new(), "eng", user("u1")).unwrap();
        let events = g.collect_events();
        assert_eq!(events.len(), 2);
    }

    #[test]
    fn cannot_remove_last_admin() {
        let mut g = Group::create(TenantId::new(), "eng", user("u1")).unwrap();
        g.collect_events();
        assert!(g.remove_member(&user("u1")).is_err());
    }

    #[test]
    fn cannot_demote_last_admin() {
        let mut g = Group::create(TenantId::new(), "eng", user("u1")).unwrap();
        g.collect_events();
        assert!(g.change_role(&user("u1"), Role::Member).is_err());
    }

    #[test]
    fn role_change_records_old_and_new() {
        let mut g = Group::create(TenantId::new(), "eng", user("u1")).unwrap();
        g.collect_events();
        g.add_member(user("u2"), Role::Member).unwrap();
        g.collect_events();
        g.change_role(&user("u2"), Role::Admin).unwrap();
        let events = g.collect_events();
        match &events[0] {
            GroupEvent::MemberRoleChanged { old_role, new_role, .. } => {
                assert_eq!(*old_role, Role::Member);
                assert_eq!(*new_role, Role::Admin);
            }
            _ => panic!("expected MemberRoleChanged"),
        }
    }

    #[test]
    fn adding_duplicate_member_fails() {
        let mut g = Group::create(TenantId::new(), "eng", user("u1")).unwrap();
        g.collect_events();
        assert!(g.add_member(user("u1"), Role::Member).is_err());
    }
}
