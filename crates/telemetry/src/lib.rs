//! Tracing/metrics bootstrap shared by every binary in the workspace.

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Human-readable tracing output, for local development.
pub fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// JSON tracing output, for production.
pub fn init_tracing_json(log_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().json())
        .init();
}

/// Installs the global Prometheus recorder, returning a handle the HTTP
/// metrics endpoint can render from.
pub fn init_metrics() -> metrics_exporter_prometheus::PrometheusHandle {
    let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
    builder
        .install_recorder()
        .expect("failed to install prometheus recorder")
}

/// Stable metric names emitted by the outbox worker, event source and auth
/// pipeline. Kept in one place so a dashboard author has a single source of
/// truth.
pub mod metric_names {
    pub const OUTBOX_ENTRIES_PROCESSED: &str = "karto_outbox_entries_processed_total";
    pub const OUTBOX_ENTRIES_FAILED: &str = "karto_outbox_entries_failed_total";
    pub const OUTBOX_ENTRIES_QUARANTINED: &str = "karto_outbox_entries_quarantined_total";
    pub const OUTBOX_BATCH_LATENCY_MS: &str = "karto_outbox_batch_latency_ms";
    pub const EVENT_SOURCE_RECONNECTS: &str = "karto_event_source_reconnects_total";
    pub const AUTH_TOKEN_VALIDATIONS: &str = "karto_auth_token_validations_total";
    pub const AUTH_API_KEY_VALIDATIONS: &str = "karto_auth_api_key_validations_total";
    pub const AUTH_JIT_PROVISIONS: &str = "karto_auth_jit_provisions_total";
    pub const JWKS_REFRESH_TOTAL: &str = "karto_jwks_refresh_total";
}

#[derive(Debug, Clone)]
pub struct HealthStatus {
    pub healthy: bool,
    pub checks: Vec<HealthCheck>,
}

#[derive(Debug, Clone)]
pub struct HealthCheck {
    pub name: String,
    pub healthy: bool,
    pub message: Option<String>,
}

impl HealthStatus {
    pub fn new() -> Self {
        Self {
            healthy: true,
            checks: Vec::new(),
        }
    }

    pub fn add_check(&mut self, name: impl Into<String>, healthy: bool, message: Option<String>) {
        if !healthy {
            self.healthy = false;
        }
        self.checks.push(HealthCheck {
            name: name.into(),
            healthy,
            message,
        });
    }
}

impl Default for HealthStatus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_status_turns_unhealthy_on_any_failed_check() {
        let mut status = HealthStatus::new();
        status.add_check("db", true, None);
        assert!(status.healthy);
        status.add_check("jwks", false, Some("fetch timed out".into()));
        assert!(!status.healthy);
        assert_eq!(status.checks.len(), 2);
    }
}
