//! Removal of a job's temporary artifacts.
//!
//! Every step runs regardless of the others. A missing artifact is not an
//! error; any other failure is logged, announced as [`Event::CleanupFailed`]
//! and otherwise ignored, so it never changes the job's outcome.

use crate::error::PipelineError;
use crate::types::{Event, JobId};
use std::path::{Path, PathBuf};

use super::LogPulse;
use super::job::Reservation;

impl LogPulse {
    /// Remove `artifacts`, the job directory and the cache reservation
    ///
    /// The cache target is released under the job's own lease, so a target that
    /// dispatch already freed and another job has since reserved is left alone.
    ///
    /// Returns the failures that were logged; callers only use this in tests.
    pub(crate) async fn cleanup(
        &self,
        reservation: &Reservation,
        artifacts: &[PathBuf],
    ) -> Vec<PipelineError> {
        let id = reservation.id;
        let mut failures = Vec::new();

        for path in artifacts {
            if let Err(e) = remove_file_if_exists(path).await {
                failures.push(self.cleanup_failed(id, path, e));
            }
        }

        if let Err(e) = remove_dir_if_exists(&reservation.work_dir).await {
            failures.push(self.cleanup_failed(id, &reservation.work_dir, e));
        }

        if let Err(e) = self
            .cache
            .release(&reservation.cache_target, reservation.lease)
            .await
        {
            let path = self.cache.path_for(&reservation.cache_target);
            failures.push(self.cleanup_failed(id, &path, std::io::Error::other(e.to_string())));
        }

        if failures.is_empty() {
            tracing::debug!(job_id = id.0, artifacts = artifacts.len(), "Job cleaned up");
        }
        failures
    }

    fn cleanup_failed(&self, id: JobId, path: &Path, error: std::io::Error) -> PipelineError {
        tracing::warn!(job_id = id.0, path = %path.display(), error = %error, "Failed to remove job artifact");
        self.emit(Event::CleanupFailed {
            id,
            path: path.to_path_buf(),
            error: error.to_string(),
        });
        PipelineError::CleanupFailed {
            path: path.to_path_buf(),
            reason: error.to_string(),
        }
    }
}

async fn remove_file_if_exists(path: &Path) -> std::io::Result<()> {
    match tokio::fs::remove_file(path).await {
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

async fn remove_dir_if_exists(path: &Path) -> std::io::Result<()> {
    match tokio::fs::remove_dir_all(path).await {
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}
