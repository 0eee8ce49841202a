//! Core types for logpulse

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use utoipa::ToSchema;

/// Unique identifier for a job (row id in the job status table)
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(transparent)]
pub struct JobId(pub i64);

impl JobId {
    /// Get the inner i64 value
    pub fn get(&self) -> i64 {
        self.0
    }
}

impl From<i64> for JobId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for JobId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

// Implement sqlx Type, Encode, and Decode for database operations
impl sqlx::Type<sqlx::Sqlite> for JobId {
    fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
        <i64 as sqlx::Type<sqlx::Sqlite>>::type_info()
    }

    fn compatible(ty: &sqlx::sqlite::SqliteTypeInfo) -> bool {
        <i64 as sqlx::Type<sqlx::Sqlite>>::compatible(ty)
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Sqlite> for JobId {
    fn encode_by_ref(
        &self,
        buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
    ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        sqlx::Encode::<sqlx::Sqlite>::encode_by_ref(&self.0, buf)
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Sqlite> for JobId {
    fn decode(value: sqlx::sqlite::SqliteValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let id = <i64 as sqlx::Decode<sqlx::Sqlite>>::decode(value)?;
        Ok(Self(id))
    }
}

/// Job lifecycle status
///
/// Transitions: `Accepted → [Decompressing →] Streaming → Dispatching → Complete`,
/// with `Failed` reachable from every non-terminal state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Validated and reserved, background task not yet started
    Accepted,
    /// Inflating a gzip upload
    Decompressing,
    /// Relaying lines into the analyzer
    Streaming,
    /// Delivering cached results to the recipient
    Dispatching,
    /// Results delivered, artifacts removed
    Complete,
    /// Terminated with an error (artifacts removed)
    Failed,
}

impl Status {
    /// Convert integer status code to Status enum
    pub fn from_i32(status: i32) -> Self {
        match status {
            0 => Status::Accepted,
            1 => Status::Decompressing,
            2 => Status::Streaming,
            3 => Status::Dispatching,
            4 => Status::Complete,
            5 => Status::Failed,
            _ => Status::Failed, // Default to Failed for unknown status
        }
    }

    /// Convert Status enum to integer status code
    pub fn to_i32(&self) -> i32 {
        match self {
            Status::Accepted => 0,
            Status::Decompressing => 1,
            Status::Streaming => 2,
            Status::Dispatching => 3,
            Status::Complete => 4,
            Status::Failed => 5,
        }
    }

    /// Whether the job has reached a final state
    pub fn is_terminal(&self) -> bool {
        matches!(self, Status::Complete | Status::Failed)
    }
}

/// One result produced by the analyzer and accumulated in the cache
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ResultRecord {
    /// 1-based line number in the uploaded file
    pub line_number: u64,
    /// The pattern (or rule) that produced this record
    pub pattern: String,
    /// The line text
    pub line: String,
}

/// Event emitted during the job lifecycle
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Job validated, reserved and handed to a background task
    Accepted {
        /// Job ID
        id: JobId,
        /// Uploaded filename
        filename: String,
        /// Cache target reserved for the job
        cache_target: String,
    },

    /// Gzip upload is being inflated
    Decompressing {
        /// Job ID
        id: JobId,
    },

    /// Lines are being relayed to the analyzer
    Streaming {
        /// Job ID
        id: JobId,
    },

    /// Stream finished, results are being delivered
    Dispatching {
        /// Job ID
        id: JobId,
        /// Lines relayed to the analyzer
        lines: u64,
        /// Records accumulated in the cache
        records: u64,
    },

    /// Results delivered
    Complete {
        /// Job ID
        id: JobId,
        /// Lines relayed to the analyzer
        lines: u64,
        /// Records delivered
        records: u64,
    },

    /// Job failed after acceptance
    Failed {
        /// Job ID
        id: JobId,
        /// Error message
        error: String,
    },

    /// A temporary artifact could not be removed
    CleanupFailed {
        /// Job ID
        id: JobId,
        /// The artifact left behind
        path: PathBuf,
        /// Error message
        error: String,
    },

    /// Graceful shutdown initiated
    Shutdown,
}

/// Job status table entry
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct JobInfo {
    /// Unique job identifier
    pub id: JobId,

    /// Uploaded filename
    pub filename: String,

    /// Recipient of the results
    pub recipient: String,

    /// Cache target the results accumulate under
    pub cache_target: String,

    /// Whether the upload was gzip-compressed
    pub compressed: bool,

    /// Current status
    pub status: Status,

    /// Lines relayed to the analyzer
    pub lines_streamed: u64,

    /// Records delivered to the recipient
    pub records_dispatched: u64,

    /// Error message if the job failed
    pub error: Option<String>,

    /// When the job was accepted
    pub created_at: DateTime<Utc>,

    /// When the job reached a terminal state
    pub completed_at: Option<DateTime<Utc>>,
}

/// Acknowledgment returned as soon as a job is accepted
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct JobAccepted {
    /// Job identifier for status queries
    pub job_id: JobId,
    /// Reserved cache target
    pub cache_target: String,
    /// Always `accepted`
    pub status: Status,
}
