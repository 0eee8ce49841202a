//! Database layer for logpulse
//!
//! Handles SQLite persistence for the job status table: one row per accepted
//! upload, tracking its lifecycle so operators (and tests) can see how
//! fire-and-forget background jobs ended.
//!
//! ## Submodules
//!
//! Methods on [`Database`] are organized by domain:
//! - [`migrations`] — Database lifecycle, schema migrations
//! - [`jobs`] — Job status CRUD

use crate::types::{JobId, JobInfo, Status};
use sqlx::{FromRow, sqlite::SqlitePool};

mod jobs;
mod migrations;

/// New job to be inserted into the database
#[derive(Debug, Clone)]
pub struct NewJob {
    /// Uploaded filename
    pub filename: String,
    /// Recipient of the results
    pub recipient: String,
    /// Reserved cache target
    pub cache_target: String,
    /// Whether the upload is gzip-compressed
    pub compressed: bool,
}

/// Job record from database (raw from SQLite)
#[derive(Debug, Clone, FromRow)]
pub struct JobRow {
    /// Unique database ID
    pub id: i64,
    /// Uploaded filename
    pub filename: String,
    /// Recipient of the results
    pub recipient: String,
    /// Reserved cache target
    pub cache_target: String,
    /// Whether the upload is gzip-compressed (0 = no, 1 = yes)
    pub compressed: i32,
    /// Current status code (see [`Status::to_i32`])
    pub status: i32,
    /// Lines relayed to the analyzer
    pub lines_streamed: i64,
    /// Records delivered
    pub records_dispatched: i64,
    /// Error message if the job failed
    pub error: Option<String>,
    /// Unix timestamp when the job was accepted
    pub created_at: i64,
    /// Unix timestamp when the job reached a terminal state
    pub completed_at: Option<i64>,
}

impl From<JobRow> for JobInfo {
    fn from(row: JobRow) -> Self {
        use chrono::{TimeZone, Utc};

        JobInfo {
            id: JobId(row.id),
            filename: row.filename,
            recipient: row.recipient,
            cache_target: row.cache_target,
            compressed: row.compressed != 0,
            status: Status::from_i32(row.status),
            lines_streamed: row.lines_streamed.max(0) as u64,
            records_dispatched: row.records_dispatched.max(0) as u64,
            error: row.error,
            created_at: Utc
                .timestamp_opt(row.created_at, 0)
                .single()
                .unwrap_or_else(Utc::now),
            completed_at: row
                .completed_at
                .and_then(|ts| Utc.timestamp_opt(ts, 0).single()),
        }
    }
}

/// Terminal outcome written by [`Database::finish_job`]
#[derive(Debug, Clone)]
pub struct JobOutcome {
    /// `Complete` or `Failed`
    pub status: Status,
    /// Lines relayed to the analyzer
    pub lines_streamed: u64,
    /// Records delivered
    pub records_dispatched: u64,
    /// Error message for failed jobs
    pub error: Option<String>,
}

/// Database handle for logpulse
pub struct Database {
    pool: SqlitePool,
}
