use std::sync::Arc;
use std::time::Duration;

use karto_bootstrap::ShutdownController;
use karto_telemetry::metric_names;
use metrics::counter;
use sqlx::postgres::PgListener;
use sqlx::PgPool;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

const RECONNECT_DELAY: Duration = Duration::from_secs(2);

/// Listens on a Postgres `NOTIFY` channel and nudges the outbox worker's
/// wake handle for every notification carrying a well-formed entry id.
/// Connection loss is not fatal - it reconnects and leaves the worker's own
/// polling ticker to cover whatever was missed in the meantime.
pub struct EventSource {
    pool: PgPool,
    channel: &'static str,
}

impl EventSource {
    pub fn new(pool: PgPool, channel: &'static str) -> Self {
        Self { pool, channel }
    }

    pub fn start(self: Arc<Self>, wake: Arc<Notify>, shutdown: ShutdownController) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(channel = self.channel, "event source started");
            tokio::select! {
                _ = self.run_loop(wake) => {}
                _ = shutdown.shutdown_signal() => {
                    info!("event source received shutdown signal");
                }
            }
            info!("event source stopped");
        })
    }

    async fn run_loop(&self, wake: Arc<Notify>) {
        loop {
            match self.listen_until_disconnected(&wake).await {
                Ok(()) => {}
                Err(e) => {
                    warn!(error = %e, "event source listener disconnected, reconnecting");
                    counter!(metric_names::EVENT_SOURCE_RECONNECTS).increment(1);
                }
            }
            tokio::time::sleep(RECONNECT_DELAY).await;
        }
    }

    async fn listen_until_disconnected(&self, wake: &Arc<Notify>) -> Result<(), sqlx::Error> {
        let mut listener = PgListener::connect_with(&self.pool).await?;
        listener.listen(self.channel).await?;

        loop {
            let notification = listener.recv().await?;
            let payload = notification.payload();

            match Uuid::parse_str(payload) {
                Ok(entry_id) => {
                    debug!(%entry_id, "outbox notification received");
                    wake.notify_one();
                }
                Err(_) => {
                    // Not a well-formed entry id - the polling fallback
                    // will still pick up whatever produced it.
                    warn!(payload, "ignoring malformed outbox notification payload");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    #[test]
    fn malformed_payload_is_not_a_valid_uuid() {
        assert!(Uuid::parse_str("not-a-uuid").is_err());
    }

    #[test]
    fn well_formed_payload_parses() {
        let id = Uuid::new_v4();
        assert_eq!(Uuid::parse_str(&id.to_string()).unwrap(), id);
    }
}
