//! API-key subsystem orchestration (C6): wires `karto-auth-core`'s
//! generation/hashing primitives into the `ApiKey` aggregate and its
//! repository so the plaintext secret exists only for the caller of
//! [`ApiKeyIssuer::issue`] and never touches storage or logs.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use karto_auth_core::{generate_api_key, ApiKeyHash};
use karto_common::{ApiKeyId, TenantId, UserId};
use karto_config::ApiKeyConfig;
use karto_domain_core::Entity;
use karto_errors::{AppError, AppResult};
use karto_ports::Repository;

use crate::domain::ApiKey;
use crate::infrastructure::postgres::PostgresApiKeyRepository;

/// The plaintext secret, returned exactly once at issuance time.
#[derive(Debug, Clone)]
pub struct IssuedApiKey {
    pub id: ApiKeyId,
    pub secret: String,
}

pub struct ApiKeyIssuer {
    api_keys: Arc<PostgresApiKeyRepository>,
    config: ApiKeyConfig,
}

impl ApiKeyIssuer {
    pub fn new(api_keys: Arc<PostgresApiKeyRepository>, config: ApiKeyConfig) -> Self {
        Self { api_keys, config }
    }

    pub async fn issue(
        &self,
        owner_user_id: UserId,
        tenant_id: TenantId,
        name: impl Into<String>,
        expires_at: Option<DateTime<Utc>>,
    ) -> AppResult<IssuedApiKey> {
        let generated = generate_api_key(&self.config.prefix, self.config.entropy_bytes);
        let hash = ApiKeyHash::hash(&generated.secret)?;

        let mut key = ApiKey::create(
            owner_user_id,
            tenant_id,
            name,
            generated.lookup_prefix,
            hash.as_str().to_string(),
            expires_at,
        )?;

        self.api_keys.save(&mut key).await?;

        Ok(IssuedApiKey {
            id: *key.id(),
            secret: generated.secret,
        })
    }

    pub async fn revoke(&self, id: &ApiKeyId) -> AppResult<()> {
        let mut key = self
            .api_keys
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::not_found("api key not found"))?;

        key.revoke()?;
        self.api_keys.save(&mut key).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Exercises generation, hashing and aggregate construction without a
    /// database - the repository round trip is covered by the integration
    /// tests, this only checks the secret a caller receives actually
    /// verifies against what gets persisted.
    #[test]
    fn generated_secret_verifies_against_its_own_hash() {
        let config = ApiKeyConfig {
            prefix: "karto_".to_string(),
            entropy_bytes: 32,
        };
        let generated = generate_api_key(&config.prefix, config.entropy_bytes);
        let hash = ApiKeyHash::hash(&generated.secret).unwrap();

        let key = ApiKey::create(
            UserId::new("u1").unwrap(),
            TenantId::new(),
            "ci key",
            generated.lookup_prefix,
            hash.as_str().to_string(),
            None,
        )
        .unwrap();

        assert!(ApiKeyHash::from_stored(key.hash().to_string()).verify(&generated.secret));
    }
}
