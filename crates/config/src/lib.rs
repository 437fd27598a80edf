//! Configuration loading.
//!
//! Layered with [`figment`]: `config/default.toml`, then
//! `config/{APP_ENV}.toml`, then environment variables (`_`-separated,
//! e.g. `DATABASE_URL`, `OIDC_ISSUER_URL`). Unknown keys at any layer fail
//! startup rather than being silently ignored.

use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use secrecy::Secret;
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatabaseConfig {
    pub url: Secret<String>,
    #[serde(default = "default_pool_min")]
    pub pool_min: u32,
    #[serde(default = "default_pool_max")]
    pub pool_max: u32,
}

fn default_pool_min() -> u32 {
    2
}

fn default_pool_max() -> u32 {
    10
}

/// OIDC identity-provider settings the auth pipeline validates bearer
/// tokens against.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OidcConfig {
    pub issuer_url: String,
    pub audience: String,
    #[serde(default = "default_user_id_claim")]
    pub user_id_claim: String,
    #[serde(default = "default_username_claim")]
    pub username_claim: String,
    #[serde(default = "default_jwks_cache_ttl_secs")]
    pub jwks_cache_ttl_secs: u64,
}

fn default_user_id_claim() -> String {
    "sub".to_string()
}

fn default_username_claim() -> String {
    "preferred_username".to_string()
}

fn default_jwks_cache_ttl_secs() -> u64 {
    24 * 60 * 60
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutboxConfig {
    #[serde(default = "default_outbox_batch_size")]
    pub batch_size: u32,
    #[serde(default = "default_outbox_poll_interval_s")]
    pub poll_interval_s: u64,
    #[serde(default = "default_outbox_max_attempts")]
    pub max_attempts: u32,
}

fn default_outbox_batch_size() -> u32 {
    100
}

fn default_outbox_poll_interval_s() -> u64 {
    5
}

fn default_outbox_max_attempts() -> u32 {
    8
}

impl Default for OutboxConfig {
    fn default() -> Self {
        Self {
            batch_size: default_outbox_batch_size(),
            poll_interval_s: default_outbox_poll_interval_s(),
            max_attempts: default_outbox_max_attempts(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TenantConfig {
    #[serde(default)]
    pub single_tenant_mode: bool,
    #[serde(default = "default_tenant_name")]
    pub default_name: String,
}

fn default_tenant_name() -> String {
    "default".to_string()
}

impl Default for TenantConfig {
    fn default() -> Self {
        Self {
            single_tenant_mode: false,
            default_name: default_tenant_name(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ApiKeyConfig {
    #[serde(default = "default_api_key_prefix")]
    pub prefix: String,
    #[serde(default = "default_api_key_entropy_bytes")]
    pub entropy_bytes: usize,
}

fn default_api_key_prefix() -> String {
    "karto_".to_string()
}

fn default_api_key_entropy_bytes() -> usize {
    32
}

impl Default for ApiKeyConfig {
    fn default() -> Self {
        Self {
            prefix: default_api_key_prefix(),
            entropy_bytes: default_api_key_entropy_bytes(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TelemetryConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub json_logs: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logs: false,
        }
    }
}

/// Settings for the external authorization engine the outbox worker writes
/// translated relationships to.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuthorizationEngineConfig {
    pub base_url: String,
    pub api_key: Option<Secret<String>>,
    #[serde(default = "default_authz_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_authz_timeout_secs() -> u64 {
    5
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    #[serde(default = "default_app_env")]
    pub app_env: String,
    pub database: DatabaseConfig,
    pub oidc: OidcConfig,
    pub authorization_engine: AuthorizationEngineConfig,
    #[serde(default)]
    pub outbox: OutboxConfig,
    #[serde(default)]
    pub tenant: TenantConfig,
    #[serde(default)]
    pub api_key: ApiKeyConfig,
    pub server: ServerConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

fn default_app_env() -> String {
    "development".to_string()
}

impl AppConfig {
    /// Loads from `{config_dir}/default.toml`, `{config_dir}/{APP_ENV}.toml`,
    /// then environment variables, in that order of increasing precedence.
    pub fn load(config_dir: &str) -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let figment = Figment::new()
            .merge(Toml::file(format!("{config_dir}/default.toml")))
            .merge(Toml::file(format!("{config_dir}/{env}.toml")))
            .merge(Env::prefixed("").split("__"));

        figment.extract().map_err(Box::new).map_err(ConfigError::from)
    }

    pub fn is_production(&self) -> bool {
        self.app_env == "production"
    }

    pub fn is_development(&self) -> bool {
        self.app_env == "development"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn loads_defaults_and_required_fields_from_toml() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "default.toml",
                r#"
                app_env = "test"

                [database]
                url = "postgres://localhost/karto"

                [oidc]
                issuer_url = "https://idp.example.com"
                audience = "karto-api"

                [authorization_engine]
                base_url = "https://authz.example.com"

                [server]
                host = "0.0.0.0"
                port = 8080
                "#,
            )?;

            let config = AppConfig::load(".").expect("config loads");
            assert_eq!(config.outbox.batch_size, 100);
            assert_eq!(config.oidc.user_id_claim, "sub");
            assert!(!config.tenant.single_tenant_mode);
            Ok(())
        });
    }

    #[test]
    fn unknown_top_level_key_is_rejected() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "default.toml",
                r#"
                app_env = "test"
                unknown_section = true

                [database]
                url = "postgres://localhost/karto"

                [oidc]
                issuer_url = "https://idp.example.com"
                audience = "karto-api"

                [authorization_engine]
                base_url = "https://authz.example.com"

                [server]
                host = "0.0.0.0"
                port = 8080
                "#,
            )?;

            assert!(AppConfig::load(".").is_err());
            Ok(())
        });
    }
}
