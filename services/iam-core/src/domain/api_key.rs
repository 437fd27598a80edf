use chrono::{DateTime, Utc};
use karto_common::{ApiKeyId, AuditInfo, TenantId, UserId};
use karto_domain_core::{AggregateRoot, Entity, RecordsEvents};
use karto_errors::{AppError, AppResult};

use super::events::ApiKeyEvent;

const MAX_NAME_LEN: usize = 100;

/// `{id, owner_user_id, tenant_id, name, prefix, hash, expires_at?,
/// last_used_at?, is_revoked}`. The plaintext secret exists only at
/// creation time and is never stored on this aggregate.
#[derive(Debug, Clone)]
pub struct ApiKey {
    id: ApiKeyId,
    owner_user_id: UserId,
    tenant_id: TenantId,
    name: String,
    prefix: String,
    hash: String,
    expires_at: Option<DateTime<Utc>>,
    last_used_at: Option<DateTime<Utc>>,
    is_revoked: bool,
    audit: AuditInfo,
    pending: Vec<ApiKeyEvent>,
}

impl ApiKey {
    pub fn create(
        owner_user_id: UserId,
        tenant_id: TenantId,
        name: impl Into<String>,
        prefix: impl Into<String>,
        hash: impl Into<String>,
        expires_at: Option<DateTime<Utc>>,
    ) -> AppResult<Self> {
        let name = name.into();
        if name.trim().is_empty() || name.len() > MAX_NAME_LEN {
            return Err(AppError::invariant(format!(
                "API key name must be 1-{MAX_NAME_LEN} characters"
            )));
        }

        let id = ApiKeyId::new();
        Ok(Self {
            id,
            owner_user_id: owner_user_id.clone(),
            tenant_id,
            name: name.clone(),
            prefix: prefix.into(),
            hash: hash.into(),
            expires_at,
            last_used_at: None,
            is_revoked: false,
            audit: AuditInfo::new(),
            pending: vec![ApiKeyEvent::APIKeyCreated {
                api_key_id: id.to_string(),
                owner_user_id: owner_user_id.as_str().to_string(),
                tenant_id: tenant_id.to_string(),
                name,
                occurred_at: Utc::now(),
            }],
        })
    }

    #[allow(clippy::too_many_arguments)]
    pub fn from_parts(
        id: ApiKeyId,
        owner_user_id: UserId,
        tenant_id: TenantId,
        name: String,
        prefix: String,
        hash: String,
        expires_at: Option<DateTime<Utc>>,
        last_used_at: Option<DateTime<Utc>>,
        is_revoked: bool,
        audit: AuditInfo,
    ) -> Self {
        Self {
            id,
            owner_user_id,
            tenant_id,
            name,
            prefix,
            hash,
            expires_at,
            last_used_at,
            is_revoked,
            audit,
            pending: Vec::new(),
        }
    }

    pub fn owner_user_id(&self) -> &UserId {
        &self.owner_user_id
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }

    pub fn is_revoked(&self) -> bool {
        self.is_revoked
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|exp| exp <= now).unwrap_or(false)
    }

    /// Side-effect-only - usage is not an authorization-significant fact,
    /// so this records no event.
    pub fn record_usage(&mut self, at: DateTime<Utc>) {
        self.last_used_at = Some(at);
    }

    /// One-way door: sets `is_revoked = true` and records `APIKeyRevoked`.
    /// Authorization relationships are deliberately left in place so the
    /// revoked key still appears in listings for audit.
    pub fn revoke(&mut self) -> AppResult<()> {
        if self.is_revoked {
            return Err(AppError::invariant("API key is already revoked"));
        }
        self.is_revoked = true;
        self.audit.touch();
        self.pending.push(ApiKeyEvent::APIKeyRevoked {
            api_key_id: self.id.to_string(),
            owner_user_id: self.owner_user_id.as_str().to_string(),
            tenant_id: self.tenant_id.to_string(),
            occurred_at: Utc::now(),
        });
        Ok(())
    }

    pub fn mark_for_deletion(&mut self) {
        self.pending.push(ApiKeyEvent::APIKeyDeleted {
            api_key_id: self.id.to_string(),
            owner_user_id: self.owner_user_id.as_str().to_string(),
            tenant_id: self.tenant_id.to_string(),
            occurred_at: Utc::now(),
        });
    }
}

impl Entity for ApiKey {
    type Id = ApiKeyId;

    fn id(&self) -> &ApiKeyId {
        &self.id
    }
}

impl AggregateRoot for ApiKey {
    fn audit_info(&self) -> &AuditInfo {
        &self.audit
    }

    fn audit_info_mut(&mut self) -> &mut AuditInfo {
        &mut self.audit
    }
}

impl RecordsEvents for ApiKey {
    type Event = ApiKeyEvent;

    fn collect_events(&mut self) -> Vec<ApiKeyEvent> {
        std::mem::take(&mut self.pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> ApiKey {
        ApiKey::create(
            UserId::new("u1").unwrap(),
            TenantId::new(),
            "ci key",
            "karto_abcdef",
            "$argon2id$...",
            None,
        )
        .unwrap()
    }

    #[test]
    fn create_records_a_single_created_event() {
        let mut k = key();
        assert_eq!(k.collect_events().len(), 1);
    }

    #[test]
    fn revoke_is_one_way() {
        let mut k = key();
        k.collect_events();
        k.revoke().unwrap();
        assert!(k.is_revoked());
        assert!(k.revoke().is_err());
    }

    #[test]
    fn record_usage_records_no_event() {
        let mut k = key();
        k.collect_events();
        k.record_usage(Utc::now());
        assert!(k.collect_events().is_empty());
    }

    #[test]
    fn expiry_is_inclusive_of_now() {
        let mut k = ApiKey::create(
            UserId::new("u1").unwrap(),
            TenantId::new(),
            "expiring",
            "karto_abcdef",
            "$argon2id$...",
            Some(Utc::now()),
        )
        .unwrap();
        k.collect_events();
        assert!(k.is_expired(Utc::now() + chrono::Duration::seconds(1)));
    }
}
