//! Background execution of a single job.
//!
//! Stage order inside the job task:
//! 1. inflate a compressed upload (before any analyzer or line source exists)
//! 2. start the analyzer on a fresh bounded channel and the job's cache target
//! 3. start the line source and relay lines until end-of-stream
//! 4. close the analyzer input, wait for it and flush its records
//! 5. dispatch the cached records
//! 6. clean up, whatever happened above
//!
//! Stages 1-5 run under the job deadline. The analyzer and line source tasks are
//! aborted when the job future is dropped, so a job that hits its deadline
//! leaves nothing running behind it.

use crate::db::JobOutcome;
use crate::decompress::decompress;
use crate::error::{Error, PipelineError, Result};
use crate::line_source::{LineEvent, LineSource, LineStream};
use crate::notifier::DeliveryTarget;
use crate::types::{Event, JobAccepted, JobId, Status};
use std::path::PathBuf;
use tokio::sync::mpsc;
use tokio_util::task::AbortOnDropHandle;

use super::job::{Job, JobSource, Reservation};
use super::LogPulse;

/// What a job produced and left behind, filled in as stages complete
#[derive(Debug, Default)]
pub(crate) struct JobProgress {
    /// Lines relayed to the analyzer
    pub(crate) lines: u64,
    /// Records the analyzer appended
    pub(crate) records: u64,
    /// Records delivered to the recipient
    pub(crate) dispatched: u64,
    /// Files this job created on disk, removed during cleanup
    pub(crate) artifacts: Vec<PathBuf>,
}

/// How the relay loop stopped
enum RelayEnd {
    /// The source signalled end-of-stream after its last line
    EndOfStream,
    /// The source stopped without end-of-stream
    SourceClosed,
    /// The analyzer dropped its input
    AnalyzerGone,
}

impl LogPulse {
    /// Run a job on a background task and acknowledge immediately
    ///
    /// The returned acknowledgment is all the caller learns; progress and the
    /// outcome are observable through [`LogPulse::subscribe`] and the job table.
    pub fn submit(&self, job: Job) -> JobAccepted {
        let ack = job.reservation.acknowledgment();
        let pulse = self.clone();
        self.tracker.spawn(async move {
            pulse.run_job(job).await;
        });
        ack
    }

    async fn run_job(&self, job: Job) {
        let Job {
            reservation,
            source,
        } = job;
        let id = reservation.id;
        let mut progress = JobProgress::default();

        let result = match self.config.ingest.job_timeout {
            Some(limit) => {
                match tokio::time::timeout(limit, self.execute(&reservation, source, &mut progress))
                    .await
                {
                    Ok(result) => result,
                    Err(_) => Err(Error::Pipeline(PipelineError::TimedOut {
                        seconds: limit.as_secs(),
                    })),
                }
            }
            None => self.execute(&reservation, source, &mut progress).await,
        };

        self.cleanup(&reservation, &progress.artifacts).await;

        // Emit before the row turns terminal
        match result {
            Ok(()) => {
                tracing::info!(
                    job_id = id.0,
                    cache_target = %reservation.cache_target,
                    lines = progress.lines,
                    records = progress.dispatched,
                    "Job complete"
                );
                self.emit(Event::Complete {
                    id,
                    lines: progress.lines,
                    records: progress.dispatched,
                });
                self.record_outcome(
                    id,
                    JobOutcome {
                        status: Status::Complete,
                        lines_streamed: progress.lines,
                        records_dispatched: progress.dispatched,
                        error: None,
                    },
                )
                .await;
            }
            Err(e) => {
                tracing::error!(
                    job_id = id.0,
                    cache_target = %reservation.cache_target,
                    lines = progress.lines,
                    error = %e,
                    "Job failed"
                );
                self.emit(Event::Failed {
                    id,
                    error: e.to_string(),
                });
                self.record_outcome(
                    id,
                    JobOutcome {
                        status: Status::Failed,
                        lines_streamed: progress.lines,
                        records_dispatched: 0,
                        error: Some(e.to_string()),
                    },
                )
                .await;
            }
        }
    }

    async fn execute(
        &self,
        reservation: &Reservation,
        source: JobSource,
        progress: &mut JobProgress,
    ) -> Result<()> {
        let id = reservation.id;

        let line_source = match source {
            JobSource::Upload(reader) => LineSource::Upload(reader),
            JobSource::File {
                path,
                compressed: false,
            } => {
                if path.starts_with(&reservation.work_dir) {
                    progress.artifacts.push(path.clone());
                }
                LineSource::File(path)
            }
            JobSource::File {
                path,
                compressed: true,
            } => {
                progress.artifacts.push(path.clone());
                self.set_status(id, Status::Decompressing).await;
                self.emit(Event::Decompressing { id });

                let inflated = decompress(&path).await?;
                progress.artifacts.push(inflated.clone());
                LineSource::File(inflated)
            }
        };

        self.set_status(id, Status::Streaming).await;
        self.emit(Event::Streaming { id });

        // Analyzer is running and owns its receiver before the first line exists
        let capacity = self.config.ingest.channel_capacity;
        let mut sink = self.cache.open_sink(&reservation.cache_target).await?;
        let (line_tx, line_rx) = mpsc::channel::<String>(capacity);
        let analyzer = self.analyzer.clone();
        let analyzer_task = AbortOnDropHandle::new(tokio::spawn(async move {
            let analyzed = analyzer.analyze(line_rx, &mut sink).await;
            let flushed = sink.finish().await;
            analyzed.and(flushed)
        }));

        let mut stream = line_source.spawn(capacity);
        let end = relay(&mut stream, &line_tx, progress).await;

        // Closing the analyzer input on every path
        drop(line_tx);
        let read_result = stream.finish().await;
        let analyzer_result = analyzer_task.await.map_err(|e| {
            Error::Pipeline(PipelineError::AnalyzerFailed {
                reason: format!("analyzer task failed: {}", e),
            })
        })?;

        let records = match end {
            RelayEnd::EndOfStream => analyzer_result?,
            RelayEnd::SourceClosed => {
                return Err(match read_result {
                    Err(e) => e,
                    Ok(_) => Error::Pipeline(PipelineError::StreamReadFailed {
                        lines_read: progress.lines,
                        reason: "line source stopped without end of stream".to_string(),
                    }),
                });
            }
            RelayEnd::AnalyzerGone => {
                analyzer_result?;
                return Err(Error::Pipeline(PipelineError::AnalyzerFailed {
                    reason: format!("analyzer stopped after {} lines", progress.lines),
                }));
            }
        };
        progress.records = records;

        tracing::debug!(
            job_id = id.0,
            lines = progress.lines,
            records,
            "Stream finished, dispatching results"
        );
        self.set_status(id, Status::Dispatching).await;
        self.emit(Event::Dispatching {
            id,
            lines: progress.lines,
            records,
        });

        progress.dispatched = self
            .dispatcher
            .dispatch_from_cache(
                &reservation.cache_target,
                reservation.lease,
                DeliveryTarget {
                    job_id: id,
                    recipient: reservation.recipient.clone(),
                    filename: reservation.filename.clone(),
                },
            )
            .await?;

        Ok(())
    }

    /// Give up on a reservation whose upload could not be staged
    ///
    /// Removes whatever was staged, releases the target and records the failure.
    pub async fn abandon(&self, reservation: Reservation, error: &Error) {
        tracing::warn!(
            job_id = reservation.id.0,
            cache_target = %reservation.cache_target,
            error = %error,
            "Abandoning job before start"
        );

        let staged = [reservation.spool_path()];
        self.cleanup(&reservation, &staged).await;

        self.record_outcome(
            reservation.id,
            JobOutcome {
                status: Status::Failed,
                lines_streamed: 0,
                records_dispatched: 0,
                error: Some(error.to_string()),
            },
        )
        .await;
        self.emit(Event::Failed {
            id: reservation.id,
            error: error.to_string(),
        });
    }

    async fn set_status(&self, id: JobId, status: Status) {
        if let Err(e) = self.db.update_status(id, status).await {
            tracing::warn!(job_id = id.0, ?status, error = %e, "Failed to record job status");
        }
    }

    async fn record_outcome(&self, id: JobId, outcome: JobOutcome) {
        if let Err(e) = self.db.finish_job(id, &outcome).await {
            tracing::error!(job_id = id.0, error = %e, "Failed to record job outcome");
        }
    }
}

/// Forward lines from the source to the analyzer in order
///
/// Blocks on the analyzer's bounded input, so a slow analyzer slows the source
/// rather than growing a buffer.
async fn relay(
    stream: &mut LineStream,
    line_tx: &mpsc::Sender<String>,
    progress: &mut JobProgress,
) -> RelayEnd {
    while let Some(event) = stream.next().await {
        match event {
            LineEvent::Line(line) => {
                if line_tx.send(line).await.is_err() {
                    return RelayEnd::AnalyzerGone;
                }
                progress.lines += 1;
            }
            LineEvent::EndOfStream => return RelayEnd::EndOfStream,
        }
    }
    RelayEnd::SourceClosed
}
