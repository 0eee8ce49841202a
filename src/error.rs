//! Error types for logpulse
//!
//! This module provides error handling for the library, including:
//! - The pipeline failure taxonomy (validation, conflict, decompression, streaming, ...)
//! - HTTP status code mapping for API integration
//! - Structured error responses with machine-readable error codes

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;
use utoipa::ToSchema;

/// Result type alias for logpulse operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for logpulse
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "ingest.temp_dir")
        key: Option<String>,
    },

    /// Database operation failed
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    /// SQLx database error
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// Ingestion pipeline error
    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Job not found
    #[error("job not found: {0}")]
    NotFound(String),

    /// Shutdown in progress - not accepting new jobs
    #[error("shutdown in progress: not accepting new jobs")]
    ShuttingDown,

    /// Network error (webhook delivery)
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// API server error
    #[error("API server error: {0}")]
    ApiServerError(String),

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Database-related errors
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Failed to connect to database
    #[error("failed to connect to database: {0}")]
    ConnectionFailed(String),

    /// Failed to run migrations
    #[error("failed to run migrations: {0}")]
    MigrationFailed(String),

    /// Query failed
    #[error("query failed: {0}")]
    QueryFailed(String),
}

/// Failures of a single upload-to-dispatch job
///
/// `ValidationFailed` and `ConflictInProgress` are raised synchronously, before a
/// job exists. Everything else happens after the caller was acknowledged and is
/// only observable through logs, events and the job status table.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Upload or recipient failed validation
    #[error("validation failed: {reason}")]
    ValidationFailed {
        /// What was wrong with the request
        reason: String,
    },

    /// A job with the same cache target is already running
    #[error("a job for {cache_target} is already in progress")]
    ConflictInProgress {
        /// The contested cache target
        cache_target: String,
    },

    /// Gzip input could not be decompressed
    #[error("decompression failed for {path}: {reason}")]
    DecompressionFailed {
        /// The compressed input
        path: PathBuf,
        /// The reason decompression failed
        reason: String,
    },

    /// Reading the line source failed mid-stream
    #[error("stream read failed after {lines_read} lines: {reason}")]
    StreamReadFailed {
        /// Lines successfully relayed before the failure
        lines_read: u64,
        /// The reason the read failed
        reason: String,
    },

    /// The analyzer task failed or panicked
    #[error("analyzer failed: {reason}")]
    AnalyzerFailed {
        /// The reason the analyzer failed
        reason: String,
    },

    /// Results could not be dispatched to the recipient
    #[error("dispatch failed for {cache_target}: {reason}")]
    DispatchFailed {
        /// The cache target being dispatched
        cache_target: String,
        /// The reason dispatch failed
        reason: String,
        /// Whether a later attempt may succeed (timeouts, refused connections, 5xx, 429)
        retryable: bool,
    },

    /// The job exceeded its deadline
    #[error("job exceeded its deadline of {seconds}s")]
    TimedOut {
        /// The configured deadline in seconds
        seconds: u64,
    },

    /// Removing a temporary artifact failed (non-fatal, logged as warning)
    #[error("cleanup failed for {path}: {reason}")]
    CleanupFailed {
        /// The artifact that could not be removed
        path: PathBuf,
        /// The reason removal failed
        reason: String,
    },
}

impl PipelineError {
    /// Shorthand for a validation failure
    pub fn validation(reason: impl Into<String>) -> Self {
        PipelineError::ValidationFailed {
            reason: reason.into(),
        }
    }
}

/// API error response format
///
/// # Example JSON Response
///
/// ```json
/// {
///   "error": {
///     "code": "conflict_in_progress",
///     "message": "pipeline error: a job for access.logu@x.com.json is already in progress",
///     "details": { "cache_target": "access.logu@x.com.json" }
///   }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ApiError {
    /// The error details
    pub error: ErrorDetail,
}

/// Detailed error information for API responses
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g., "not_found", "validation_failed")
    pub code: String,

    /// Human-readable error message
    pub message: String,

    /// Optional additional context about the error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    /// Create a new API error with code and message
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    /// Create a "not found" error
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::new("not_found", format!("{} not found", resource.into()))
    }

    /// Create a "validation error" error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new("validation_failed", message)
    }

    /// Create an "internal server error"
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new("internal_error", message)
    }
}

/// Convert errors to HTTP status codes for API responses
pub trait ToHttpStatus {
    /// Get the HTTP status code for this error
    fn status_code(&self) -> u16;

    /// Get the machine-readable error code
    fn error_code(&self) -> &str;
}

impl ToHttpStatus for Error {
    fn status_code(&self) -> u16 {
        match self {
            // 400 Bad Request - Client error (invalid input)
            Error::Config { .. } => 400,
            Error::Pipeline(PipelineError::ValidationFailed { .. }) => 400,

            // 404 Not Found
            Error::NotFound(_) => 404,

            // 409 Conflict - same cache target already running
            Error::Pipeline(PipelineError::ConflictInProgress { .. }) => 409,

            // 422 Unprocessable Entity - the upload itself could not be processed
            Error::Pipeline(PipelineError::DecompressionFailed { .. }) => 422,

            // 504 Gateway Timeout
            Error::Pipeline(PipelineError::TimedOut { .. }) => 504,

            // 502 Bad Gateway - downstream delivery failed
            Error::Pipeline(PipelineError::DispatchFailed { .. }) => 502,
            Error::Network(_) => 502,

            // 503 Service Unavailable
            Error::ShuttingDown => 503,

            // 500 Internal Server Error - Server-side issues
            Error::Pipeline(PipelineError::StreamReadFailed { .. }) => 500,
            Error::Pipeline(PipelineError::AnalyzerFailed { .. }) => 500,
            Error::Pipeline(PipelineError::CleanupFailed { .. }) => 500,
            Error::Database(_) => 500,
            Error::Sqlx(_) => 500,
            Error::Io(_) => 500,
            Error::Serialization(_) => 500,
            Error::ApiServerError(_) => 500,
            Error::Other(_) => 500,
        }
    }

    fn error_code(&self) -> &str {
        match self {
            Error::Config { .. } => "config_error",
            Error::Database(_) => "database_error",
            Error::Sqlx(_) => "database_error",
            Error::Pipeline(e) => match e {
                PipelineError::ValidationFailed { .. } => "validation_failed",
                PipelineError::ConflictInProgress { .. } => "conflict_in_progress",
                PipelineError::DecompressionFailed { .. } => "decompression_failed",
                PipelineError::StreamReadFailed { .. } => "stream_read_failed",
                PipelineError::AnalyzerFailed { .. } => "analyzer_failed",
                PipelineError::DispatchFailed { .. } => "dispatch_failed",
                PipelineError::TimedOut { .. } => "timed_out",
                PipelineError::CleanupFailed { .. } => "cleanup_failed",
            },
            Error::Io(_) => "io_error",
            Error::NotFound(_) => "not_found",
            Error::ShuttingDown => "shutting_down",
            Error::Network(_) => "network_error",
            Error::Serialization(_) => "serialization_error",
            Error::ApiServerError(_) => "api_server_error",
            Error::Other(_) => "internal_error",
        }
    }
}

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        let code = error.error_code().to_string();
        let message = error.to_string();

        let details = match &error {
            Error::Pipeline(PipelineError::ConflictInProgress { cache_target }) => {
                Some(serde_json::json!({ "cache_target": cache_target }))
            }
            Error::Pipeline(PipelineError::DecompressionFailed { path, .. }) => {
                Some(serde_json::json!({ "path": path }))
            }
            Error::Pipeline(PipelineError::StreamReadFailed { lines_read, .. }) => {
                Some(serde_json::json!({ "lines_read": lines_read }))
            }
            Error::Config { key: Some(key), .. } => Some(serde_json::json!({ "key": key })),
            _ => None,
        };

        ApiError {
            error: ErrorDetail {
                code,
                message,
                details,
            },
        }
    }
}
