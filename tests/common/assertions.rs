//! Event-driven waits for job outcomes

use logpulse::{Event, JobId};
use std::time::Duration;
use tokio::sync::broadcast;

/// Result of waiting for a job to finish
#[derive(Debug)]
pub enum WaitResult {
    /// Results delivered
    Completed {
        /// Lines relayed to the analyzer
        lines: u64,
        /// Records delivered
        records: u64,
    },
    /// Job failed with error
    Failed(String),
    /// Timeout waiting for an outcome
    Timeout,
    /// Channel closed unexpectedly
    ChannelClosed,
}

/// Wait for `id` to reach Complete or Failed
///
/// The receiver must be subscribed before the job is submitted, otherwise the
/// terminal event may already have been broadcast.
pub async fn wait_for_outcome(
    events: &mut broadcast::Receiver<Event>,
    id: JobId,
    timeout: Duration,
) -> WaitResult {
    let result = tokio::time::timeout(timeout, async {
        loop {
            match events.recv().await {
                Ok(Event::Complete {
                    id: event_id,
                    lines,
                    records,
                }) if event_id == id => return WaitResult::Completed { lines, records },
                Ok(Event::Failed {
                    id: event_id,
                    error,
                }) if event_id == id => return WaitResult::Failed(error),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return WaitResult::ChannelClosed,
            }
        }
    })
    .await;

    result.unwrap_or(WaitResult::Timeout)
}

/// Collect events for `id` until its terminal event
pub async fn collect_job_events(
    events: &mut broadcast::Receiver<Event>,
    id: JobId,
    timeout: Duration,
) -> Vec<Event> {
    let mut collected = Vec::new();
    let _ = tokio::time::timeout(timeout, async {
        while let Ok(event) = events.recv().await {
            let (event_id, terminal) = match &event {
                Event::Accepted { id, .. }
                | Event::Decompressing { id }
                | Event::Streaming { id }
                | Event::CleanupFailed { id, .. } => (Some(*id), false),
                Event::Dispatching { id, .. } => (Some(*id), false),
                Event::Complete { id, .. } | Event::Failed { id, .. } => (Some(*id), true),
                Event::Shutdown => (None, false),
            };
            if event_id == Some(id) {
                collected.push(event);
                if terminal {
                    return;
                }
            }
        }
    })
    .await;
    collected
}
