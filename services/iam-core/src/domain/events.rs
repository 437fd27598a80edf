//! Domain events. Each variant carries the minimum payload needed to later
//! reconstruct the corresponding authorization-engine mutation; deletion
//! variants carry a full snapshot because by the time the worker processes
//! them the relational rows may already be gone.

use chrono::{DateTime, Utc};
use karto_domain_core::DomainEvent;
use serde::{Deserialize, Serialize};

use super::role::Role;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberSnapshot {
    pub user_id: String,
    pub role: Role,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type")]
pub enum TenantEvent {
    TenantCreated {
        tenant_id: String,
        name: String,
        occurred_at: DateTime<Utc>,
    },
    TenantMemberAdded {
        tenant_id: String,
        user_id: String,
        role: Role,
        occurred_at: DateTime<Utc>,
    },
    TenantMemberRemoved {
        tenant_id: String,
        user_id: String,
        role: Role,
        occurred_at: DateTime<Utc>,
    },
    TenantDeleted {
        tenant_id: String,
        members: Vec<MemberSnapshot>,
        occurred_at: DateTime<Utc>,
    },
}

impl DomainEvent for TenantEvent {
    fn event_type(&self) -> &'static str {
        match self {
            TenantEvent::TenantCreated { .. } => "TenantCreated",
            TenantEvent::TenantMemberAdded { .. } => "TenantMemberAdded",
            TenantEvent::TenantMemberRemoved { .. } => "TenantMemberRemoved",
            TenantEvent::TenantDeleted { .. } => "TenantDeleted",
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            TenantEvent::TenantCreated { occurred_at, .. }
            | TenantEvent::TenantMemberAdded { occurred_at, .. }
            | TenantEvent::TenantMemberRemoved { occurred_at, .. }
            | TenantEvent::TenantDeleted { occurred_at, .. } => *occurred_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type")]
pub enum GroupEvent {
    GroupCreated {
        group_id: String,
        tenant_id: String,
        name: String,
        occurred_at: DateTime<Utc>,
    },
    MemberAdded {
        group_id: String,
        user_id: String,
        role: Role,
        occurred_at: DateTime<Utc>,
    },
    MemberRemoved {
        group_id: String,
        user_id: String,
        role: Role,
        occurred_at: DateTime<Utc>,
    },
    MemberRoleChanged {
        group_id: String,
        user_id: String,
        old_role: Role,
        new_role: Role,
        occurred_at: DateTime<Utc>,
    },
    GroupDeleted {
        group_id: String,
        tenant_id: String,
        members: Vec<MemberSnapshot>,
        occurred_at: DateTime<Utc>,
    },
}

impl DomainEvent for GroupEvent {
    fn event_type(&self) -> &'static str {
        match self {
            GroupEvent::GroupCreated { .. } => "GroupCreated",
            GroupEvent::MemberAdded { .. } => "MemberAdded",
            GroupEvent::MemberRemoved { .. } => "MemberRemoved",
            GroupEvent::MemberRoleChanged { .. } => "MemberRoleChanged",
            GroupEvent::GroupDeleted { .. } => "GroupDeleted",
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            GroupEvent::GroupCreated { occurred_at, .. }
            | GroupEvent::MemberAdded { occurred_at, .. }
            | GroupEvent::MemberRemoved { occurred_at, .. }
            | GroupEvent::MemberRoleChanged { occurred_at, .. }
            | GroupEvent::GroupDeleted { occurred_at, .. } => *occurred_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type")]
pub enum WorkspaceEvent {
    WorkspaceCreated {
        workspace_id: String,
        tenant_id: String,
        name: String,
        parent_workspace_id: Option<String>,
        occurred_at: DateTime<Utc>,
    },
    WorkspaceDeleted {
        workspace_id: String,
        tenant_id: String,
        occurred_at: DateTime<Utc>,
    },
}

impl DomainEvent for WorkspaceEvent {
    fn event_type(&self) -> &'static str {
        match self {
            WorkspaceEvent::WorkspaceCreated { .. } => "WorkspaceCreated",
            WorkspaceEvent::WorkspaceDeleted { .. } => "WorkspaceDeleted",
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            WorkspaceEvent::WorkspaceCreated { occurred_at, .. } => *occurred_at,
            WorkspaceEvent::WorkspaceDeleted { occurred_at, .. } => *occurred_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type")]
pub enum ApiKeyEvent {
    APIKeyCreated {
        api_key_id: String,
        owner_user_id: String,
        tenant_id: String,
        name: String,
        occurred_at: DateTime<Utc>,
    },
    APIKeyRevoked {
        api_key_id: String,
        owner_user_id: String,
        tenant_id: String,
        occurred_at: DateTime<Utc>,
    },
    APIKeyDeleted {
        api_key_id: String,
        owner_user_id: String,
        tenant_id: String,
        occurred_at: DateTime<Utc>,
    },
}

impl DomainEvent for ApiKeyEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ApiKeyEvent::APIKeyCreated { .. } => "APIKeyCreated",
            ApiKeyEvent::APIKeyRevoked { .. } => "APIKeyRevoked",
            ApiKeyEvent::APIKeyDeleted { .. } => "APIKeyDeleted",
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ApiKeyEvent::APIKeyCreated { occurred_at, .. } => *occurred_at,
            ApiKeyEvent::APIKeyRevoked { occurred_at, .. } => *occurred_at,
            ApiKeyEvent::APIKeyDeleted { occurred_at, .. } => *occurred_at,
        }
    }
}

/// Flattens an event to the outbox payload shape (§6.2): all fields
/// flattened into one JSON object, no wrapper `event_type` field inside the
/// payload (that lives in the outbox row's own column).
pub fn payload_of<T: Serialize>(event: &T) -> serde_json::Value {
    let mut value = serde_json::to_value(event).expect("event serialization is infallible");
    if let Some(obj) = value.as_object_mut() {
        obj.remove("event_type");
    }
    value
}
