//! Shutdown coordination.

use crate::error::Result;
use crate::types::Event;
use std::sync::atomic::Ordering;
use std::time::Duration;

use super::LogPulse;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

impl LogPulse {
    /// Gracefully shut down
    ///
    /// 1. Stops accepting new jobs (`reserve` fails with `ShuttingDown`)
    /// 2. Waits up to 30 seconds for in-flight jobs to finish
    /// 3. Emits [`Event::Shutdown`] and closes the database
    ///
    /// Jobs still running after the grace period are left to the next start,
    /// which marks them failed.
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!("Initiating graceful shutdown");

        self.accepting_new.store(false, Ordering::SeqCst);
        tracing::info!("Stopped accepting new jobs");

        self.tracker.close();
        match tokio::time::timeout(SHUTDOWN_GRACE, self.tracker.wait()).await {
            Ok(()) => tracing::info!("All in-flight jobs finished"),
            Err(_) => tracing::warn!(
                remaining = self.tracker.len(),
                "Timeout waiting for jobs to finish, proceeding with shutdown"
            ),
        }

        self.emit(Event::Shutdown);
        self.db.close().await;

        tracing::info!("Graceful shutdown complete");
        Ok(())
    }

    /// Whether new jobs are accepted
    pub fn is_accepting(&self) -> bool {
        self.accepting_new.load(Ordering::SeqCst)
    }
}
