//! Route handlers for the REST API
//!
//! Handlers are organized by domain:
//! - [`uploads`] - Log uploads
//! - [`jobs`] - Job status table
//! - [`system`] - Health, events, OpenAPI

use crate::types::Status;
use serde::{Deserialize, Serialize};

mod jobs;
mod system;
mod uploads;

pub use jobs::*;
pub use system::*;
pub use uploads::*;

/// Query parameters for GET /jobs
#[derive(Debug, Deserialize, Serialize, utoipa::ToSchema, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct JobsQuery {
    /// Only jobs in this status
    pub status: Option<Status>,
    /// Maximum number of items to return (default: 50, capped at 500)
    pub limit: Option<usize>,
    /// Number of items to skip (default: 0)
    pub offset: Option<usize>,
}

/// Multipart form for POST /log/file (documentation only)
#[derive(Debug, Deserialize, Serialize, utoipa::ToSchema)]
pub struct LogUploadForm {
    /// Log file, plain text or gzip (`.gz`)
    #[schema(value_type = String, format = Binary)]
    pub file: Vec<u8>,
    /// Recipient of the analysis results
    pub email: String,
}
