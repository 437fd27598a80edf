//! Translates domain event payloads into relationship operations per the
//! exhaustive event -> operation mapping. Pure: no I/O, same input always
//! produces the same output.

use karto_errors::{AppError, AppResult};
use karto_ports::{RelationshipOp, RelationshipRef};
use serde_json::Value;

const SUPPORTED: &[&str] = &[
    "GroupCreated",
    "MemberAdded",
    "MemberRemoved",
    "MemberRoleChanged",
    "GroupDeleted",
    "TenantCreated",
    "TenantMemberAdded",
    "TenantMemberRemoved",
    "TenantDeleted",
    "WorkspaceCreated",
    "WorkspaceDeleted",
    "APIKeyCreated",
    "APIKeyRevoked",
    "APIKeyDeleted",
];

#[derive(Default)]
pub struct IamEventTranslator;

impl IamEventTranslator {
    pub fn new() -> Self {
        Self
    }
}

fn field<'a>(payload: &'a Value, key: &str) -> AppResult<&'a str> {
    payload
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| AppError::internal(format!("outbox payload missing field `{key}`")))
}

fn write(resource_type: &str, resource_id: &str, relation: &str, subject_type: &str, subject_id: &str) -> RelationshipOp {
    RelationshipOp::WriteRelationship(RelationshipRef {
        resource_type: resource_type.to_string(),
        resource_id: resource_id.to_string(),
        relation: relation.to_string(),
        subject_type: subject_type.to_string(),
        subject_id: subject_id.to_string(),
    })
}

fn delete(resource_type: &str, resource_id: &str, relation: &str, subject_type: &str, subject_id: &str) -> RelationshipOp {
    RelationshipOp::DeleteRelationship(RelationshipRef {
        resource_type: resource_type.to_string(),
        resource_id: resource_id.to_string(),
        relation: relation.to_string(),
        subject_type: subject_type.to_string(),
        subject_id: subject_id.to_string(),
    })
}

/// `{user_id, role}` entries carried by a deletion snapshot.
fn members(payload: &Value) -> AppResult<Vec<(String, String)>> {
    let arr = payload
        .get("members")
        .and_then(Value::as_array)
        .ok_or_else(|| AppError::internal("outbox payload missing `members` snapshot"))?;

    arr.iter()
        .map(|m| {
            let user_id = field(m, "user_id")?.to_string();
            let role = field(m, "role")?.to_string();
            Ok((user_id, role))
        })
        .collect()
}

impl karto_ports::EventTranslator for IamEventTranslator {
    fn supported_event_types(&self) -> &[&'static str] {
        SUPPORTED
    }

    fn translate(&self, event_type: &str, payload: &Value) -> AppResult<Vec<RelationshipOp>> {
        match event_type {
            "GroupCreated" => {
                let group_id = field(payload, "group_id")?;
                let tenant_id = field(payload, "tenant_id")?;
                Ok(vec![write("group", group_id, "tenant", "tenant", tenant_id)])
            }
            "MemberAdded" => {
                let group_id = field(payload, "group_id")?;
                let user_id = field(payload, "user_id")?;
                let role = field(payload, "role")?;
                Ok(vec![write("group", group_id, role, "user", user_id)])
            }
            "MemberRemoved" => {
                let group_id = field(payload, "group_id")?;
                let user_id = field(payload, "user_id")?;
                let role = field(payload, "role")?;
                Ok(vec![delete("group", group_id, role, "user", user_id)])
            }
            "MemberRoleChanged" => {
                let group_id = field(payload, "group_id")?;
                let user_id = field(payload, "user_id")?;
                let old_role = field(payload, "old_role")?;
                let new_role = field(payload, "new_role")?;
                // Order matters: the old grant must be gone before the new
                // one is written, so a reader never observes both at once.
                Ok(vec![
                    delete("group", group_id, old_role, "user", user_id),
                    write("group", group_id, new_role, "user", user_id),
                ])
            }
            "GroupDeleted" => {
                let group_id = field(payload, "group_id")?;
                let tenant_id = field(payload, "tenant_id")?;
                let mut ops = vec![delete("group", group_id, "tenant", "tenant", tenant_id)];
                for (user_id, role) in members(payload)? {
                    ops.push(delete("group", group_id, &role, "user", &user_id));
                }
                Ok(ops)
            }
            "TenantCreated" => Ok(vec![]),
            "TenantMemberAdded" => {
                let tenant_id = field(payload, "tenant_id")?;
                let user_id = field(payload, "user_id")?;
                let role = field(payload, "role")?;
                Ok(vec![write("tenant", tenant_id, role, "user", user_id)])
            }
            "TenantMemberRemoved" => {
                let tenant_id = field(payload, "tenant_id")?;
                let user_id = field(payload, "user_id")?;
                let role = field(payload, "role")?;
                Ok(vec![delete("tenant", tenant_id, role, "user", user_id)])
            }
            // Relational cascade and resource teardown are a separate,
            // explicitly deferred concern (see the open ticket on tenant
            // deletion). No relationship mutation is emitted here.
            "TenantDeleted" => Ok(vec![]),
            "WorkspaceCreated" => {
                let workspace_id = field(payload, "workspace_id")?;
                let tenant_id = field(payload, "tenant_id")?;
                let mut ops = vec![write("workspace", workspace_id, "tenant", "tenant", tenant_id)];
                if let Some(parent_id) = payload.get("parent_workspace_id").and_then(Value::as_str) {
                    ops.push(write("workspace", workspace_id, "parent", "workspace", parent_id));
                }
                Ok(ops)
            }
            "WorkspaceDeleted" => {
                let workspace_id = field(payload, "workspace_id")?;
                let tenant_id = field(payload, "tenant_id")?;
                Ok(vec![delete("workspace", workspace_id, "tenant", "tenant", tenant_id)])
            }
            "APIKeyCreated" => {
                let key_id = field(payload, "api_key_id")?;
                let owner_id = field(payload, "owner_user_id")?;
                let tenant_id = field(payload, "tenant_id")?;
                Ok(vec![
                    write("api_key", key_id, "owner", "user", owner_id),
                    write("api_key", key_id, "tenant", "tenant", tenant_id),
                ])
            }
            // Revoked keys keep their relationships so owners/tenant admins
            // can still see them in listings; only the relational
            // `is_revoked` flag gates authentication.
            "APIKeyRevoked" => Ok(vec![]),
            "APIKeyDeleted" => {
                let key_id = field(payload, "api_key_id")?;
                let owner_id = field(payload, "owner_user_id")?;
                let tenant_id = field(payload, "tenant_id")?;
                Ok(vec![
                    delete("api_key", key_id, "owner", "user", owner_id),
                    delete("api_key", key_id, "tenant", "tenant", tenant_id),
                ])
            }
            other => Err(AppError::internal(format!("unsupported event type `{other}`"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use karto_ports::EventTranslator;
    use serde_json::json;

    #[test]
    fn group_created_writes_tenant_relation() {
        let t = IamEventTranslator::new();
        let ops = t
            .translate("GroupCreated", &json!({"group_id": "g1", "tenant_id": "t1"}))
            .unwrap();
        assert_eq!(ops.len(), 1);
        match &ops[0] {
            RelationshipOp::WriteRelationship(r) => {
                assert_eq!(r.resource_type, "group");
                assert_eq!(r.relation, "tenant");
                assert_eq!(r.subject_id, "t1");
            }
            _ => panic!("expected a write"),
        }
    }

    #[test]
    fn member_role_changed_deletes_before_writing() {
        let t = IamEventTranslator::new();
        let ops = t
            .translate(
                "MemberRoleChanged",
                &json!({"group_id": "g1", "user_id": "u1", "old_role": "member", "new_role": "admin"}),
            )
            .unwrap();
        assert!(matches!(ops[0], RelationshipOp::DeleteRelationship(_)));
        assert!(matches!(ops[1], RelationshipOp::WriteRelationship(_)));
    }

    #[test]
    fn tenant_created_and_deleted_are_no_ops() {
        let t = IamEventTranslator::new();
        assert!(t.translate("TenantCreated", &json!({})).unwrap().is_empty());
        assert!(t.translate("TenantDeleted", &json!({"members": []})).unwrap().is_empty());
    }

    #[test]
    fn api_key_revoked_is_a_no_op() {
        let t = IamEventTranslator::new();
        assert!(t.translate("APIKeyRevoked", &json!({})).unwrap().is_empty());
    }

    #[test]
    fn group_deleted_expands_member_snapshot() {
        let t = IamEventTranslator::new();
        let ops = t
            .translate(
                "GroupDeleted",
                &json!({
                    "group_id": "g1",
                    "tenant_id": "t1",
                    "members": [{"user_id": "u1", "role": "admin"}, {"user_id": "u2", "role": "member"}]
                }),
            )
            .unwrap();
        assert_eq!(ops.len(), 3);
    }

    #[test]
    fn workspace_created_without_parent_skips_parent_op() {
        let t = IamEventTranslator::new();
        let ops = t
            .translate("WorkspaceCreated", &json!({"workspace_id": "w1", "tenant_id": "t1"}))
            .unwrap();
        assert_eq!(ops.len(), 1);
    }

    #[test]
    fn unsupported_event_type_fails_fast() {
        let t = IamEventTranslator::new();
        assert!(t.translate("SomethingElse", &json!({})).is_err());
    }
}
