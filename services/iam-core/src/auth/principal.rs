use karto_common::{TenantId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialKind {
    Token,
    ApiKey,
}

/// The immutable result of the auth pipeline, handed to downstream request
/// handling.
#[derive(Debug, Clone)]
pub struct Principal {
    pub user_id: UserId,
    pub username: Option<String>,
    pub tenant_id: TenantId,
    pub credential_kind: CredentialKind,
}
