//! Service entrypoint: loads configuration, runs migrations, bootstraps the
//! default tenant, wires the outbox worker and event source to the
//! authorization engine, and idles until a shutdown signal arrives.
//!
//! No HTTP/gRPC route scaffolding is started here - the authentication
//! pipeline and API-key issuer are assembled and available to whatever
//! transport a caller wires in front of them, but exposing one is outside
//! this binary's job.

use std::sync::Arc;
use std::time::Duration;

use iam_core::apikey::ApiKeyIssuer;
use iam_core::auth::AuthPipeline;
use iam_core::eventsource::EventSource;
use iam_core::infrastructure::postgres::{
    PostgresApiKeyRepository, PostgresTenantRepository, PostgresUserRepository, PostgresWorkspaceRepository, migrations,
};
use iam_core::infrastructure::IamTenantBootstrap;
use iam_core::worker::{OutboxWorker, OutboxWorkerConfig};
use karto_adapter_authzengine::{AuthzEngineClient, IamEventTranslator};
use karto_adapter_postgres::{check_connection, create_pool, MigrationManager, PostgresConfig, PostgresOutbox};
use karto_auth_core::{JwksCache, JwksFetcher, OidcVerifier};
use karto_bootstrap::{ensure_default_tenant_with_workspace, ShutdownController};
use karto_common::TenantId;
use karto_config::AppConfig;
use karto_ports::{AuthorizationEnginePort, OutboxPort};
use karto_telemetry::{init_metrics, init_tracing, init_tracing_json};
use secrecy::ExposeSecret;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config_dir = std::env::var("CONFIG_DIR").unwrap_or_else(|_| "config".to_string());
    let config = AppConfig::load(&config_dir)?;

    if config.is_production() {
        init_tracing_json(&config.telemetry.log_level);
    } else {
        init_tracing(&config.telemetry.log_level);
    }
    let _metrics_handle = init_metrics();

    info!(app_env = %config.app_env, "starting karto-iam");

    let pool_config = PostgresConfig::new(
        config.database.url.expose_secret().clone(),
        config.database.pool_min,
        config.database.pool_max,
    );
    let pool = create_pool(&pool_config).await?;
    check_connection(&pool).await?;

    MigrationManager::new(pool.clone()).migrate(&migrations::all()).await?;
    info!("migrations applied");

    let tenants = Arc::new(PostgresTenantRepository::new(pool.clone()));
    let workspaces = Arc::new(PostgresWorkspaceRepository::new(pool.clone()));
    let users = Arc::new(PostgresUserRepository::new(pool.clone()));
    let api_keys = Arc::new(PostgresApiKeyRepository::new(pool.clone()));
    let outbox: Arc<dyn OutboxPort> = Arc::new(PostgresOutbox::new(pool.clone()));

    let engine_api_key = config.authorization_engine.api_key.clone();
    let authz: Arc<dyn AuthorizationEnginePort> = Arc::new(AuthzEngineClient::new(
        config.authorization_engine.base_url.clone(),
        engine_api_key,
        Duration::from_secs(config.authorization_engine.timeout_secs),
    )?);

    let bootstrap = IamTenantBootstrap::new(tenants.clone(), workspaces.clone());
    let default_tenant_id_raw =
        ensure_default_tenant_with_workspace(&bootstrap, &config.tenant.default_name, "root").await?;
    let default_tenant_id: TenantId = default_tenant_id_raw
        .parse()
        .map_err(|_| karto_errors::AppError::internal("bootstrap returned an invalid tenant id"))?;

    let http_client = reqwest::Client::new();
    let jwks_fetcher = JwksFetcher::from_issuer(http_client, &config.oidc.issuer_url).await?;
    let jwks_cache = JwksCache::new(jwks_fetcher, Duration::from_secs(config.oidc.jwks_cache_ttl_secs));
    let verifier = Arc::new(OidcVerifier::new(
        jwks_cache,
        &config.oidc.issuer_url,
        &config.oidc.audience,
        &config.oidc.user_id_claim,
        &config.oidc.username_claim,
    ));

    // Assembled for whatever transport layer is wired in front of this
    // service; neither is consumed by this binary itself.
    let _auth_pipeline = Arc::new(AuthPipeline::new(
        verifier,
        api_keys.clone(),
        users.clone(),
        tenants.clone(),
        authz.clone(),
        config.tenant.clone(),
        config.api_key.clone(),
        default_tenant_id,
    ));
    let _api_key_issuer = Arc::new(ApiKeyIssuer::new(api_keys.clone(), config.api_key.clone()));

    let shutdown = ShutdownController::new();

    let worker = Arc::new(OutboxWorker::new(
        outbox,
        authz,
        Arc::new(IamEventTranslator::new()),
        OutboxWorkerConfig::from(&config.outbox),
    ));
    let wake = worker.wake_handle();
    let worker_handle = worker.start(shutdown.clone());

    let event_source = Arc::new(EventSource::new(pool, "outbox_events"));
    let event_source_handle = event_source.start(wake, shutdown.clone());

    wait_for_shutdown_signal().await;
    shutdown.shutdown();

    let _ = tokio::join!(worker_handle, event_source_handle);
    info!("karto-iam stopped");
    Ok(())
}

async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install sigterm handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("shutdown signal received");
}
