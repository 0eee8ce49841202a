//! Application state for the API server

use crate::{Config, LogPulse};
use std::sync::Arc;

/// Shared application state accessible to all route handlers
///
/// Cloned for each request (cheap Arc clone).
#[derive(Clone)]
pub struct AppState {
    /// The pipeline accepting jobs
    pub pulse: Arc<LogPulse>,

    /// Configuration (read-only)
    pub config: Arc<Config>,
}

impl AppState {
    /// Create a new AppState
    pub fn new(pulse: Arc<LogPulse>, config: Arc<Config>) -> Self {
        Self { pulse, config }
    }
}
