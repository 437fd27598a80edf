//! Domain aggregates and events (C1): Tenant, Group, Workspace, APIKey.

mod api_key;
mod events;
mod group;
mod role;
mod tenant;
mod workspace;

pub use api_key::ApiKey;
pub use events::{payload_of, ApiKeyEvent, GroupEvent, MemberSnapshot, TenantEvent, WorkspaceEvent};
pub use group::Group;
pub use role::Role;
pub use tenant::Tenant;
pub use workspace::Workspace;
