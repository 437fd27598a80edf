//! Graceful shutdown primitives shared by the worker, event source and
//! request pipeline.

use std::future::Future;
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::info;

#[derive(Clone)]
pub struct ShutdownController {
    notify: Arc<Notify>,
}

impl ShutdownController {
    pub fn new() -> Self {
        Self {
            notify: Arc::new(Notify::new()),
        }
    }

    pub fn shutdown(&self) {
        info!("triggering shutdown");
        self.notify.notify_waiters();
    }

    pub fn shutdown_signal(&self) -> impl Future<Output = ()> + Send + '_ {
        async move {
            self.notify.notified().await;
        }
    }
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs `task`, honoring a shutdown signal between units of work rather
/// than in the middle of one - callers are expected to check
/// `shutdown.shutdown_signal()` at their own natural suspension points
/// (e.g. between outbox entries, never mid-entry) and this wraps the
/// outermost loop.
pub async fn run_with_shutdown<F, Fut>(shutdown: ShutdownController, task: F) -> karto_errors::AppResult<()>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = karto_errors::AppResult<()>> + Send,
{
    tokio::select! {
        result = task() => result,
        _ = shutdown.shutdown_signal() => {
            info!("task cancelled due to shutdown");
            Ok(())
        }
    }
}
