//! JWKS fetch and a process-wide, TTL-bound key cache.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use jsonwebtoken::DecodingKey;
use karto_errors::{AppError, AppResult};
use karto_telemetry::metric_names;
use metrics::counter;
use serde::Deserialize;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

#[derive(Debug, Deserialize)]
struct JwksResponse {
    keys: Vec<JwkEntry>,
}

#[derive(Debug, Deserialize)]
struct JwkEntry {
    kid: Option<String>,
    kty: Option<String>,
    alg: Option<String>,
    n: Option<String>,
    e: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DiscoveryDocument {
    jwks_uri: String,
}

pub struct JwksFetcher {
    client: reqwest::Client,
    url: String,
}

impl JwksFetcher {
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }

    /// Resolves `{issuer_url}/.well-known/openid-configuration` to find the
    /// provider's `jwks_uri` rather than assuming a fixed path.
    pub async fn from_issuer(client: reqwest::Client, issuer_url: &str) -> AppResult<Self> {
        let discovery_url = format!(
            "{}/.well-known/openid-configuration",
            issuer_url.trim_end_matches('/')
        );
        let doc = client
            .get(&discovery_url)
            .send()
            .await
            .map_err(|e| AppError::jwks_fetch_failed(format!("discovery request failed: {e}")))?
            .error_for_status()
            .map_err(|e| AppError::jwks_fetch_failed(format!("discovery non-2xx: {e}")))?
            .json::<DiscoveryDocument>()
            .await
            .map_err(|e| {
                AppError::jwks_fetch_failed(format!("malformed discovery document: {e}"))
            })?;
        Ok(Self::new(client, doc.jwks_uri))
    }

    pub async fn fetch(&self) -> AppResult<Vec<(String, DecodingKey)>> {
        let body = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| AppError::jwks_fetch_failed(format!("request failed: {e}")))?
            .error_for_status()
            .map_err(|e| AppError::jwks_fetch_failed(format!("non-2xx response: {e}")))?
            .json::<JwksResponse>()
            .await
            .map_err(|e| AppError::jwks_fetch_failed(format!("malformed JWKS document: {e}")))?;

        let mut keys = Vec::new();
        for entry in body.keys {
            let Some(kid) = entry.kid else {
                warn!("jwks entry missing kid, skipping");
                continue;
            };
            let kty = entry.kty.as_deref().unwrap_or_default();
            if kty != "RSA" {
                warn!(kid, kty, "unsupported key type, skipping");
                continue;
            }
            if let Some(alg) = &entry.alg {
                if alg != "RS256" {
                    warn!(kid, alg, "unsupported algorithm, skipping");
                    continue;
                }
            }
            let (Some(n), Some(e)) = (entry.n, entry.e) else {
                warn!(kid, "jwks entry missing RSA components, skipping");
                continue;
            };
            let key = DecodingKey::from_rsa_components(&n, &e)
                .map_err(|e| AppError::jwks_fetch_failed(format!("bad RSA components: {e}")))?;
            keys.push((kid, key));
        }
        Ok(keys)
    }
}

/// Caches fetched keys for `ttl`, refetching at most once per expiry window
/// even when several requests race to look up an unknown `kid`.
pub struct JwksCache {
    fetcher: JwksFetcher,
    ttl: Duration,
    keys: RwLock<HashMap<String, DecodingKey>>,
    fetched_at: RwLock<Option<Instant>>,
    refresh_lock: Mutex<()>,
}

impl JwksCache {
    pub fn new(fetcher: JwksFetcher, ttl: Duration) -> Arc<Self> {
        Arc::new(Self {
            fetcher,
            ttl,
            keys: RwLock::new(HashMap::new()),
            fetched_at: RwLock::new(None),
            refresh_lock: Mutex::new(()),
        })
    }

    async fn is_stale(&self) -> bool {
        match *self.fetched_at.read().await {
            None => true,
            Some(at) => at.elapsed() >= self.ttl,
        }
    }

    async fn refresh(&self) -> AppResult<()> {
        let _guard = self.refresh_lock.lock().await;
        // Re-check under the lock: another task may have just refreshed.
        if !self.is_stale().await {
            return Ok(());
        }
        let fetched = self.fetcher.fetch().await?;
        let mut keys = self.keys.write().await;
        keys.clear();
        keys.extend(fetched);
        *self.fetched_at.write().await = Some(Instant::now());
        info!(key_count = keys.len(), "jwks cache refreshed");
        counter!(metric_names::JWKS_REFRESH_TOTAL).increment(1);
        Ok(())
    }

    /// Looks up a key by `kid`, refreshing the cache if stale or if the
    /// `kid` isn't present yet (covers key rotation between TTL windows).
    pub async fn get(&self, kid: &str) -> AppResult<DecodingKey> {
        if self.is_stale().await || !self.keys.read().await.contains_key(kid) {
            self.refresh().await?;
        }
        self.keys
            .read()
            .await
            .get(kid)
            .cloned()
            .ok_or_else(|| AppError::unauthenticated(format!("unknown signing key: {kid}")))
    }
}
