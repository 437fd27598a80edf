use std::sync::Arc;
use std::time::Duration;

use karto_bootstrap::{run_with_shutdown, ShutdownController};
use karto_common::retry::RetryConfig;
use karto_config::OutboxConfig;
use karto_errors::AppResult;
use karto_ports::{AuthorizationEnginePort, EventTranslator, OutboxEntry, OutboxPort};
use karto_telemetry::metric_names;
use metrics::{counter, histogram};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
pub struct OutboxWorkerConfig {
    pub poll_interval: Duration,
    pub batch_size: usize,
    pub retry: RetryConfig,
}

impl From<&OutboxConfig> for OutboxWorkerConfig {
    fn from(cfg: &OutboxConfig) -> Self {
        Self {
            poll_interval: Duration::from_secs(cfg.poll_interval_s),
            batch_size: cfg.batch_size as usize,
            retry: RetryConfig::new(cfg.max_attempts, Duration::from_millis(200), Duration::from_secs(30)),
        }
    }
}

/// Drains the outbox on a timer, translating each entry into relationship
/// operations and applying them to the authorization engine. The fetch
/// transaction and the authorization-engine round trip never overlap -
/// `fetch_pending_batch` locks and returns committed rows, everything after
/// that point is plain request/response plus follow-up `UPDATE`s.
pub struct OutboxWorker {
    outbox: Arc<dyn OutboxPort>,
    engine: Arc<dyn AuthorizationEnginePort>,
    translator: Arc<dyn EventTranslator>,
    config: OutboxWorkerConfig,
    wake: Arc<Notify>,
}

impl OutboxWorker {
    pub fn new(
        outbox: Arc<dyn OutboxPort>,
        engine: Arc<dyn AuthorizationEnginePort>,
        translator: Arc<dyn EventTranslator>,
        config: OutboxWorkerConfig,
    ) -> Self {
        Self {
            outbox,
            engine,
            translator,
            config,
            wake: Arc::new(Notify::new()),
        }
    }

    /// Shared with the event source so a `LISTEN/NOTIFY` wakeup can nudge
    /// the poll loop early, without giving the event source any other
    /// access to the worker's state.
    pub fn wake_handle(&self) -> Arc<Notify> {
        self.wake.clone()
    }

    pub fn start(self: Arc<Self>, shutdown: ShutdownController) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!("outbox worker started");
            let worker = self.clone();
            if let Err(e) = run_with_shutdown(shutdown, || async move { worker.run_loop().await }).await {
                error!(error = %e, "outbox worker exited with an error");
            }
            info!("outbox worker stopped");
        })
    }

    async fn run_loop(&self) -> AppResult<()> {
        let mut ticker = interval(self.config.poll_interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = self.wake.notified() => {}
            }
            match self.process_batch().await {
                Ok(Some(backoff)) => tokio::time::sleep(backoff).await,
                Ok(None) => {}
                Err(e) => error!(error = %e, "failed to drain outbox batch"),
            }
        }
    }

    /// Returns a backoff delay to apply before the next poll if any entry in
    /// this batch failed without being quarantined - a cheap substitute for
    /// a persisted `next_attempt_at` column, scaled by the worst attempt
    /// count seen in the batch.
    ///
    /// Public so integration tests can drive a batch directly against a
    /// real outbox instead of waiting on the polling loop.
    pub async fn process_batch(&self) -> AppResult<Option<Duration>> {
        let started_at = std::time::Instant::now();
        let entries = self.outbox.fetch_pending_batch(self.config.batch_size).await?;
        if entries.is_empty() {
            return Ok(None);
        }

        debug!(count = entries.len(), "draining outbox batch");

        let mut blocked_aggregate: Option<String> = None;
        let mut worst_attempt: Option<u32> = None;

        for entry in &entries {
            if blocked_aggregate.as_deref() == Some(entry.aggregate_id.as_str()) {
                continue;
            }

            match self.apply_entry(entry).await {
                Ok(()) => {
                    self.outbox.mark_processed(&entry.id).await?;
                    counter!(metric_names::OUTBOX_ENTRIES_PROCESSED).increment(1);
                }
                Err(e) => {
                    warn!(
                        entry_id = %entry.id,
                        aggregate_id = %entry.aggregate_id,
                        event_type = %entry.event_type,
                        error = %e,
                        "failed to apply outbox entry"
                    );
                    let attempts = self.outbox.record_failure(&entry.id, &e.to_string()).await?;
                    counter!(metric_names::OUTBOX_ENTRIES_FAILED).increment(1);
                    if attempts >= self.config.retry.max_attempts {
                        self.outbox.quarantine(&entry.id).await?;
                        counter!(metric_names::OUTBOX_ENTRIES_QUARANTINED).increment(1);
                        error!(
                            entry_id = %entry.id,
                            aggregate_id = %entry.aggregate_id,
                            attempts,
                            "quarantined outbox entry after exhausting retries"
                        );
                    } else {
                        blocked_aggregate = Some(entry.aggregate_id.clone());
                        worst_attempt = Some(worst_attempt.unwrap_or(0).max(attempts));
                    }
                }
            }
        }

        histogram!(metric_names::OUTBOX_BATCH_LATENCY_MS).record(started_at.elapsed().as_millis() as f64);
        Ok(worst_attempt.map(|attempts| self.config.retry.delay_for_attempt(attempts.saturating_sub(1))))
    }

    async fn apply_entry(&self, entry: &OutboxEntry) -> AppResult<()> {
        let ops = self.translator.translate(&entry.event_type, &entry.payload)?;
        self.engine.apply(&ops).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use karto_ports::{NewOutboxEntry, OutboxStatus, RelationshipOp};
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeOutbox {
        entries: Mutex<Vec<OutboxEntry>>,
        processed: Mutex<Vec<String>>,
        failures: Mutex<Vec<(String, u32)>>,
        quarantined: Mutex<Vec<String>>,
    }

    impl FakeOutbox {
        fn seed(&self, id: &str, aggregate_id: &str, event_type: &str) {
            self.entries.lock().unwrap().push(OutboxEntry {
                id: id.to_string(),
                aggregate_type: "Tenant".to_string(),
                aggregate_id: aggregate_id.to_string(),
                event_type: event_type.to_string(),
                payload: serde_json::json!({}),
                occurred_at: Utc::now(),
                created_at: Utc::now(),
                status: OutboxStatus::Pending,
                retry_count: 0,
                last_error: None,
                failed_at: None,
                processed_at: None,
            });
        }
    }

    #[async_trait]
    impl OutboxPort for FakeOutbox {
        async fn save(&self, _entry: &NewOutboxEntry) -> AppResult<()> {
            Ok(())
        }

        async fn fetch_pending_batch(&self, limit: usize) -> AppResult<Vec<OutboxEntry>> {
            Ok(self.entries.lock().unwrap().iter().take(limit).cloned().collect())
        }

        async fn mark_processed(&self, id: &str) -> AppResult<()> {
            self.processed.lock().unwrap().push(id.to_string());
            Ok(())
        }

        async fn record_failure(&self, id: &str, _error: &str) -> AppResult<u32> {
            let mut failures = self.failures.lock().unwrap();
            let attempts = failures.iter().filter(|(fid, _)| fid == id).count() as u32 + 1;
            failures.push((id.to_string(), attempts));
            Ok(attempts)
        }

        async fn quarantine(&self, id: &str) -> AppResult<()> {
            self.quarantined.lock().unwrap().push(id.to_string());
            Ok(())
        }

        async fn delete_processed_before(&self, _before: chrono::DateTime<Utc>) -> AppResult<u64> {
            Ok(0)
        }
    }

    struct AlwaysFailsTranslator;

    impl EventTranslator for AlwaysFailsTranslator {
        fn supported_event_types(&self) -> &[&'static str] {
            &["TenantCreated"]
        }

        fn translate(&self, _event_type: &str, _payload: &serde_json::Value) -> AppResult<Vec<RelationshipOp>> {
            Ok(vec![])
        }
    }

    struct NoopEngine;

    #[async_trait]
    impl AuthorizationEnginePort for NoopEngine {
        async fn apply(&self, _ops: &[RelationshipOp]) -> AppResult<()> {
            Ok(())
        }

        async fn check_permission(&self, _check: &karto_ports::RelationshipRef) -> AppResult<bool> {
            Ok(true)
        }
    }

    struct FailingEngine;

    #[async_trait]
    impl AuthorizationEnginePort for FailingEngine {
        async fn apply(&self, _ops: &[RelationshipOp]) -> AppResult<()> {
            Err(karto_errors::AppError::authorization_engine("boom"))
        }

        async fn check_permission(&self, _check: &karto_ports::RelationshipRef) -> AppResult<bool> {
            Err(karto_errors::AppError::authorization_engine("boom"))
        }
    }

    fn config() -> OutboxWorkerConfig {
        OutboxWorkerConfig {
            poll_interval: Duration::from_secs(5),
            batch_size: 100,
            retry: RetryConfig::new(2, Duration::from_millis(1), Duration::from_millis(10)),
        }
    }

    #[tokio::test]
    async fn successful_entries_are_marked_processed() {
        let outbox = Arc::new(FakeOutbox::default());
        outbox.seed("e1", "tenant-1", "TenantCreated");

        let worker = OutboxWorker::new(
            outbox.clone(),
            Arc::new(NoopEngine),
            Arc::new(AlwaysFailsTranslator),
            config(),
        );

        worker.process_batch().await.unwrap();
        assert_eq!(outbox.processed.lock().unwrap().as_slice(), ["e1"]);
    }

    #[tokio::test]
    async fn a_failure_blocks_only_its_own_aggregate() {
        let outbox = Arc::new(FakeOutbox::default());
        outbox.seed("e1", "tenant-1", "TenantCreated");
        outbox.seed("e2", "tenant-1", "TenantCreated");
        outbox.seed("e3", "tenant-2", "TenantCreated");

        let worker = OutboxWorker::new(
            outbox.clone(),
            Arc::new(FailingEngine),
            Arc::new(AlwaysFailsTranslator),
            config(),
        );
        // translator never emits ops, so swap in a translator that does, via NoopEngine test above;
        // here the engine itself fails regardless of ops.

        worker.process_batch().await.unwrap();

        assert!(outbox.processed.lock().unwrap().is_empty());
        let failures = outbox.failures.lock().unwrap();
        assert!(failures.iter().any(|(id, _)| id == "e1"));
        assert!(!failures.iter().any(|(id, _)| id == "e2"));
        assert!(failures.iter().any(|(id, _)| id == "e3"));
    }

    #[tokio::test]
    async fn exhausting_retries_quarantines_the_entry() {
        let outbox = Arc::new(FakeOutbox::default());
        outbox.seed("e1", "tenant-1", "TenantCreated");

        let worker = OutboxWorker::new(
            outbox.clone(),
            Arc::new(FailingEngine),
            Arc::new(AlwaysFailsTranslator),
            config(),
        );

        worker.process_batch().await.unwrap();
        worker.process_batch().await.unwrap();

        assert_eq!(outbox.quarantined.lock().unwrap().as_slice(), ["e1"]);
    }
}
