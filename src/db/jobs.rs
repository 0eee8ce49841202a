//! Job status table operations.

use crate::types::{JobId, JobInfo, Status};
use crate::{Error, Result};

use super::{Database, JobOutcome, JobRow, NewJob};

const JOB_COLUMNS: &str = "id, filename, recipient, cache_target, compressed, status, \
     lines_streamed, records_dispatched, error, created_at, completed_at";

impl Database {
    /// Insert a freshly accepted job, returning its ID
    pub async fn insert_job(&self, job: &NewJob) -> Result<JobId> {
        let now = chrono::Utc::now().timestamp();

        let result = sqlx::query(
            r#"
            INSERT INTO jobs (filename, recipient, cache_target, compressed, status, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&job.filename)
        .bind(&job.recipient)
        .bind(&job.cache_target)
        .bind(job.compressed as i32)
        .bind(Status::Accepted.to_i32())
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(Error::Sqlx)?;

        Ok(JobId(result.last_insert_rowid()))
    }

    /// Record a non-terminal lifecycle transition
    pub async fn update_status(&self, id: JobId, status: Status) -> Result<()> {
        sqlx::query("UPDATE jobs SET status = ? WHERE id = ?")
            .bind(status.to_i32())
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(Error::Sqlx)?;

        Ok(())
    }

    /// Record the terminal outcome of a job
    pub async fn finish_job(&self, id: JobId, outcome: &JobOutcome) -> Result<()> {
        let now = chrono::Utc::now().timestamp();

        sqlx::query(
            r#"
            UPDATE jobs
            SET status = ?, lines_streamed = ?, records_dispatched = ?, error = ?, completed_at = ?
            WHERE id = ?
            "#,
        )
        .bind(outcome.status.to_i32())
        .bind(outcome.lines_streamed as i64)
        .bind(outcome.records_dispatched as i64)
        .bind(&outcome.error)
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(Error::Sqlx)?;

        Ok(())
    }

    /// Get a single job by ID
    pub async fn get_job(&self, id: JobId) -> Result<Option<JobInfo>> {
        let row = sqlx::query_as::<_, JobRow>(&format!(
            "SELECT {} FROM jobs WHERE id = ?",
            JOB_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Sqlx)?;

        Ok(row.map(JobInfo::from))
    }

    /// List jobs, most recent first, with an optional status filter
    pub async fn list_jobs(
        &self,
        status_filter: Option<Status>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<JobInfo>> {
        let rows = match status_filter {
            Some(status) => {
                sqlx::query_as::<_, JobRow>(&format!(
                    "SELECT {} FROM jobs WHERE status = ? ORDER BY id DESC LIMIT ? OFFSET ?",
                    JOB_COLUMNS
                ))
                .bind(status.to_i32())
                .bind(limit as i64)
                .bind(offset as i64)
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query_as::<_, JobRow>(&format!(
                    "SELECT {} FROM jobs ORDER BY id DESC LIMIT ? OFFSET ?",
                    JOB_COLUMNS
                ))
                .bind(limit as i64)
                .bind(offset as i64)
                .fetch_all(&self.pool)
                .await
            }
        }
        .map_err(Error::Sqlx)?;

        Ok(rows.into_iter().map(JobInfo::from).collect())
    }

    /// Mark jobs left in a non-terminal status by a previous process as failed
    ///
    /// Returns the number of rows updated.
    pub async fn mark_interrupted_jobs(&self) -> Result<u64> {
        let now = chrono::Utc::now().timestamp();

        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET status = ?, error = 'interrupted by restart', completed_at = ?
            WHERE status NOT IN (?, ?)
            "#,
        )
        .bind(Status::Failed.to_i32())
        .bind(now)
        .bind(Status::Complete.to_i32())
        .bind(Status::Failed.to_i32())
        .execute(&self.pool)
        .await
        .map_err(Error::Sqlx)?;

        Ok(result.rows_affected())
    }
}
