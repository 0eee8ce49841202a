//! Job pipeline split into focused submodules.
//!
//! The `LogPulse` struct and its methods are organized by stage:
//! - [`job`] - Validation, check-and-reserve and job construction
//! - [`orchestration`] - Background execution of one job end-to-end
//! - [`cleanup`] - Idempotent removal of a job's temporary artifacts
//! - [`lifecycle`] - Startup and shutdown coordination

mod cleanup;
mod job;
mod lifecycle;
mod orchestration;

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

pub use job::{Job, JobSource, Reservation, validate_recipient};

use crate::analyzer::{Analyzer, PatternAnalyzer};
use crate::cache::ResultCache;
use crate::config::Config;
use crate::db::Database;
use crate::error::{Error, Result};
use crate::notifier::{Notifier, ResultDispatcher, notifier_from_config};
use crate::types::{Event, JobId, JobInfo, Status};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64};
use tokio::sync::broadcast;
use tokio_util::task::TaskTracker;

/// Main service instance (cloneable - all fields are Arc-wrapped)
#[derive(Clone)]
pub struct LogPulse {
    /// Job status table
    /// Public for integration tests to query job status
    pub db: Arc<Database>,
    /// Event broadcast channel sender (multiple subscribers supported)
    pub(crate) event_tx: broadcast::Sender<Event>,
    /// Configuration (wrapped in Arc for sharing across tasks)
    pub(crate) config: Arc<Config>,
    /// Result cache holding reservations and accumulated records
    pub(crate) cache: Arc<ResultCache>,
    /// Line consumer shared by every job
    pub(crate) analyzer: Arc<dyn Analyzer>,
    /// Cache reader and notifier
    pub(crate) dispatcher: Arc<ResultDispatcher>,
    /// In-flight job tasks, awaited on shutdown
    pub(crate) tracker: TaskTracker,
    /// Set to false during shutdown
    pub(crate) accepting_new: Arc<AtomicBool>,
    /// Sequence for naming staged uploads
    pub(crate) staged_uploads: Arc<AtomicU64>,
}

impl LogPulse {
    /// Create a new LogPulse instance
    ///
    /// - Creates the temp and cache directories
    /// - Opens/creates the SQLite database and runs migrations
    /// - Marks jobs left unfinished by a previous process as failed
    /// - Builds the pattern analyzer and the configured notifier
    pub async fn new(config: Config) -> Result<Self> {
        config.validate()?;

        for (dir, what) in [
            (&config.ingest.temp_dir, "temp"),
            (&config.ingest.cache_dir, "cache"),
        ] {
            tokio::fs::create_dir_all(dir).await.map_err(|e| {
                Error::Io(std::io::Error::new(
                    e.kind(),
                    format!("Failed to create {} directory '{}': {}", what, dir.display(), e),
                ))
            })?;
        }

        let db = Database::new(&config.persistence.database_path).await?;

        let interrupted = db.mark_interrupted_jobs().await?;
        if interrupted > 0 {
            tracing::warn!(
                count = interrupted,
                "Marked jobs interrupted by previous shutdown as failed"
            );
        }

        let analyzer: Arc<dyn Analyzer> = Arc::new(PatternAnalyzer::new(&config.analyzer)?);
        let notifier = notifier_from_config(&config.notifications)?;

        Ok(Self::with_components(config, db, analyzer, notifier))
    }

    /// Assemble an instance from already-built parts
    ///
    /// Does not touch the filesystem; directories must exist.
    pub fn with_components(
        config: Config,
        db: Database,
        analyzer: Arc<dyn Analyzer>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let (event_tx, _rx) = broadcast::channel(1000);

        let cache = Arc::new(ResultCache::new(
            config.ingest.cache_dir.clone(),
            config.ingest.stale_reservation_after,
        ));
        let dispatcher = Arc::new(ResultDispatcher::new(
            cache.clone(),
            notifier,
            config.notifications.retry.clone(),
        ));

        Self {
            db: Arc::new(db),
            event_tx,
            config: Arc::new(config),
            cache,
            analyzer,
            dispatcher,
            tracker: TaskTracker::new(),
            accepting_new: Arc::new(AtomicBool::new(true)),
            staged_uploads: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Subscribe to job lifecycle events
    ///
    /// Slow subscribers miss events once the channel buffer (1000) overflows.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Active configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Look up one job
    pub async fn get_job(&self, id: JobId) -> Result<JobInfo> {
        self.db
            .get_job(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("job {} not found", id)))
    }

    /// List jobs, newest first
    pub async fn list_jobs(
        &self,
        status: Option<Status>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<JobInfo>> {
        self.db.list_jobs(status, limit, offset).await
    }

    /// Number of jobs currently running
    pub fn active_jobs(&self) -> usize {
        self.tracker.len()
    }

    pub(crate) fn emit(&self, event: Event) {
        // No subscribers is fine
        let _ = self.event_tx.send(event);
    }
}
