//! # logpulse
//!
//! Accepts log uploads over HTTP, streams their lines through an analyzer and
//! delivers the accumulated results to the recipient named with the upload.
//!
//! Each upload becomes a job. A job reserves a cache target derived from the
//! base filename and the recipient, so two uploads of the same file for the
//! same recipient never run at once. Gzip uploads are spooled to disk and
//! inflated before streaming. Every temporary artifact is removed when the
//! job ends, whatever the outcome.
//!
//! ## Quick Start
//!
//! ```no_run
//! use logpulse::{Config, LogPulse};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut config = Config::default();
//!     config.analyzer.patterns = vec!["ERROR".to_string(), "timeout".to_string()];
//!
//!     let pulse = LogPulse::new(config).await?;
//!
//!     let mut events = pulse.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let accepted = pulse
//!         .ingest_bytes("access.log", "ops@example.com", b"GET / 200\nERROR boom\n".to_vec())
//!         .await?;
//!     println!("job {} -> {}", accepted.job_id, accepted.cache_target);
//!
//!     pulse.shutdown().await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Line analyzers
pub mod analyzer;
/// REST API module
pub mod api;
/// Result cache and target reservations
pub mod cache;
/// Configuration types
pub mod config;
/// Job status persistence
pub mod db;
/// Gzip inflation
pub mod decompress;
/// Error types
pub mod error;
/// Line-by-line reading of uploads and inflated files
pub mod line_source;
/// Result delivery
pub mod notifier;
/// Job pipeline (decomposed into focused submodules)
pub mod pipeline;
/// Retry logic with exponential backoff
pub mod retry;
/// Core types and events
pub mod types;

// Re-export commonly used types
pub use analyzer::{Analyzer, PatternAnalyzer};
pub use cache::{Lease, RecordSink, ResultCache};
pub use config::Config;
pub use db::Database;
pub use error::{ApiError, DatabaseError, Error, ErrorDetail, PipelineError, Result, ToHttpStatus};
pub use notifier::{Delivery, LogNotifier, Notifier, WebhookNotifier};
pub use pipeline::{Job, JobSource, LogPulse, Reservation};
pub use types::{Event, JobAccepted, JobId, JobInfo, ResultRecord, Status};

/// Run a `LogPulse` until a termination signal arrives, then shut it down.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// In-flight jobs are given the shutdown grace period to finish.
///
/// # Example
///
/// ```no_run
/// use logpulse::{Config, LogPulse, run_with_shutdown};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let pulse = LogPulse::new(Config::default()).await?;
///     let _api = pulse.spawn_api_server();
///
///     run_with_shutdown(pulse).await?;
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(pulse: LogPulse) -> Result<()> {
    wait_for_signal().await;
    pulse.shutdown().await
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Set up signal handlers - these may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
