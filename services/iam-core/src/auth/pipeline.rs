use std::sync::Arc;

use chrono::Utc;
use karto_auth_core::OidcVerifier;
use karto_common::{TenantId, UserId};
use karto_config::{ApiKeyConfig, TenantConfig};
use karto_domain_core::Entity;
use karto_errors::{AppError, AppResult};
use karto_ports::{AuthorizationEnginePort, RelationshipRef, Repository};
use karto_telemetry::metric_names;
use metrics::counter;
use tracing::warn;

use crate::domain::Role;
use crate::infrastructure::postgres::{PostgresApiKeyRepository, PostgresTenantRepository, PostgresUserRepository};

use super::credential::{classify, Credential, CredentialInput};
use super::principal::{CredentialKind, Principal};

enum TenantSource {
    Header,
    Default,
}

/// Wires `karto-auth-core`'s token/API-key primitives, JIT user
/// provisioning and tenant resolution into the five ordered stages from
/// the credential classification down to principal emission.
pub struct AuthPipeline {
    verifier: Arc<OidcVerifier>,
    api_keys: Arc<PostgresApiKeyRepository>,
    users: Arc<PostgresUserRepository>,
    tenants: Arc<PostgresTenantRepository>,
    authz: Arc<dyn AuthorizationEnginePort>,
    tenant_config: TenantConfig,
    api_key_config: ApiKeyConfig,
    default_tenant_id: TenantId,
}

impl AuthPipeline {
    pub fn new(
        verifier: Arc<OidcVerifier>,
        api_keys: Arc<PostgresApiKeyRepository>,
        users: Arc<PostgresUserRepository>,
        tenants: Arc<PostgresTenantRepository>,
        authz: Arc<dyn AuthorizationEnginePort>,
        tenant_config: TenantConfig,
        api_key_config: ApiKeyConfig,
        default_tenant_id: TenantId,
    ) -> Self {
        Self {
            verifier,
            api_keys,
            users,
            tenants,
            authz,
            tenant_config,
            api_key_config,
            default_tenant_id,
        }
    }

    pub async fn authenticate(&self, input: CredentialInput) -> AppResult<Principal> {
        match classify(&input, &self.api_key_config.prefix)? {
            Credential::Token(token) => self.authenticate_token(&token, input.tenant_header.as_deref()).await,
            Credential::ApiKey(secret) => self.authenticate_api_key(&secret).await,
        }
    }

    async fn authenticate_token(&self, token: &str, tenant_header: Option<&str>) -> AppResult<Principal> {
        let claims = self.verifier.verify(token).await?;
        let user_id = UserId::new(claims.subject).map_err(|e| AppError::unauthenticated(e.to_string()))?;

        let username = claims.username.unwrap_or_else(|| user_id.as_str().to_string());
        if self.users.provision(&user_id, &username).await? {
            counter!(metric_names::AUTH_JIT_PROVISIONS).increment(1);
        }

        let (tenant_id, source) = self.resolve_tenant_for_token(tenant_header)?;
        self.authorize_tenant_binding(&user_id, tenant_id, source).await?;

        counter!(metric_names::AUTH_TOKEN_VALIDATIONS).increment(1);
        Ok(Principal {
            user_id,
            username: Some(username),
            tenant_id,
            credential_kind: CredentialKind::Token,
        })
    }

    fn resolve_tenant_for_token(&self, tenant_header: Option<&str>) -> AppResult<(TenantId, TenantSource)> {
        if let Some(header) = tenant_header {
            let tenant_id: TenantId = header
                .parse()
                .map_err(|_| AppError::unauthenticated("X-Tenant-Id header is not a valid tenant id"))?;
            return Ok((tenant_id, TenantSource::Header));
        }

        if self.tenant_config.single_tenant_mode {
            return Ok((self.default_tenant_id, TenantSource::Default));
        }

        Err(AppError::TenantContextMissing)
    }

    /// Stage 4's VIEW check plus the "first login bootstrapping" carve-out:
    /// an explicit header with no grant is a hard `Forbidden`, but a
    /// default-tenant resolution in single-tenant mode is treated as a new
    /// member joining rather than an error.
    async fn authorize_tenant_binding(&self, user_id: &UserId, tenant_id: TenantId, source: TenantSource) -> AppResult<()> {
        let check = RelationshipRef {
            resource_type: "tenant".to_string(),
            resource_id: tenant_id.to_string(),
            relation: "view".to_string(),
            subject_type: "user".to_string(),
            subject_id: user_id.as_str().to_string(),
        };

        if self.authz.check_permission(&check).await? {
            return Ok(());
        }

        match source {
            TenantSource::Header => Err(AppError::Forbidden),
            TenantSource::Default => self.bootstrap_first_login(user_id, tenant_id).await,
        }
    }

    async fn bootstrap_first_login(&self, user_id: &UserId, tenant_id: TenantId) -> AppResult<()> {
        let mut tenant = self
            .tenants
            .find_by_id(&tenant_id)
            .await?
            .ok_or_else(|| AppError::internal("default tenant missing at first-login bootstrap"))?;

        tenant.add_member(user_id.clone(), Role::Member)?;
        self.tenants.save(&mut tenant).await?;
        Ok(())
    }

    async fn authenticate_api_key(&self, secret: &str) -> AppResult<Principal> {
        const LOOKUP_PREFIX_LEN: usize = 12;
        if secret.len() < LOOKUP_PREFIX_LEN {
            return Err(AppError::unauthenticated("api_key_verification_failed"));
        }
        let lookup_prefix: String = secret.chars().take(LOOKUP_PREFIX_LEN).collect();

        let candidates = self.api_keys.find_by_prefix(&lookup_prefix).await?;
        if candidates.len() > 1 {
            warn!(prefix = %lookup_prefix, count = candidates.len(), "multiple api keys share a lookup prefix");
        }

        let key = candidates
            .iter()
            .find(|k| karto_auth_core::ApiKeyHash::from_stored(k.hash().to_string()).verify(secret))
            .ok_or_else(|| AppError::unauthenticated("api_key_verification_failed"))?;

        if key.is_revoked() || key.is_expired(Utc::now()) {
            return Err(AppError::unauthenticated("api_key_verification_failed"));
        }

        // Best-effort - a failure here must never fail the request.
        if let Err(e) = self.api_keys.touch_last_used(key.id(), Utc::now()).await {
            warn!(error = %e, "failed to update api key last_used_at");
        }

        let username = self.users.find_by_id(key.owner_user_id()).await?.map(|u| u.username);

        counter!(metric_names::AUTH_API_KEY_VALIDATIONS).increment(1);
        Ok(Principal {
            user_id: key.owner_user_id().clone(),
            username,
            tenant_id: key.tenant_id(),
            credential_kind: CredentialKind::ApiKey,
        })
    }
}
