//! Job validation and check-and-reserve.
//!
//! Everything here runs on the accepting path. A request that fails validation
//! or hits a conflict allocates nothing; a successful [`LogPulse::reserve`] owns
//! the cache target and a job row until the job it becomes is cleaned up.

use crate::cache::{Lease, base_filename, cache_target};
use crate::db::NewJob;
use crate::decompress::is_gzip_name;
use crate::error::{Error, PipelineError, Result};
use crate::types::{Event, JobAccepted, JobId, Status};
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

use super::LogPulse;

/// Where a job reads its lines from
pub enum JobSource {
    /// A live upload body, streamed as it arrives
    Upload(Box<dyn AsyncRead + Send + Unpin>),
    /// A file already on disk; `compressed` files are inflated first
    File {
        /// Location of the file
        path: PathBuf,
        /// Whether the file holds gzip data
        compressed: bool,
    },
}

impl std::fmt::Debug for JobSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobSource::Upload(_) => f.write_str("Upload(..)"),
            JobSource::File { path, compressed } => f
                .debug_struct("File")
                .field("path", path)
                .field("compressed", compressed)
                .finish(),
        }
    }
}

/// A validated request that holds its cache target and job row
///
/// Becomes a [`Job`] once its source is available. Dropping a reservation
/// without [`LogPulse::submit`] or [`LogPulse::abandon`] leaks the target until
/// it goes stale.
#[derive(Debug, Clone)]
pub struct Reservation {
    /// Job identifier
    pub id: JobId,
    /// Base name of the uploaded file
    pub filename: String,
    /// Recipient of the results
    pub recipient: String,
    /// Reserved cache target
    pub cache_target: String,
    /// Hold on `cache_target`; only this lease can release it
    pub lease: Lease,
    /// Whether the upload is gzip-compressed
    pub compressed: bool,
    /// Per-job scratch directory (`<temp_dir>/job-<id>`)
    pub work_dir: PathBuf,
}

impl Reservation {
    /// Where the upload is spooled in the job directory
    pub fn spool_path(&self) -> PathBuf {
        self.work_dir.join(&self.filename)
    }

    /// Bind the reservation to its source
    pub fn into_job(self, source: JobSource) -> Job {
        Job {
            reservation: self,
            source,
        }
    }

    /// Acknowledgment handed back to the caller
    pub fn acknowledgment(&self) -> JobAccepted {
        JobAccepted {
            job_id: self.id,
            cache_target: self.cache_target.clone(),
            status: Status::Accepted,
        }
    }
}

/// One upload-to-completion unit of work
///
/// Carries every per-request parameter; nothing about a job is read from shared
/// state once it is built.
#[derive(Debug)]
pub struct Job {
    /// Identity, recipient and cache target
    pub reservation: Reservation,
    /// Line input
    pub source: JobSource,
}

/// Check that `recipient` is a plausible email address
///
/// Requires exactly one `@`, a non-empty local part and a dotted domain. The
/// recipient becomes part of a file name, so whitespace, path separators and
/// control characters are rejected.
pub fn validate_recipient(recipient: &str) -> Result<()> {
    let invalid = |reason: &str| {
        Err(Error::Pipeline(PipelineError::validation(format!(
            "invalid recipient {:?}: {}",
            recipient, reason
        ))))
    };

    if recipient.is_empty() {
        return invalid("empty");
    }
    if recipient
        .chars()
        .any(|c| c.is_whitespace() || c.is_control() || c == '/' || c == '\\')
    {
        return invalid("contains whitespace or path separators");
    }

    let Some((local, domain)) = recipient.split_once('@') else {
        return invalid("missing '@'");
    };
    if local.is_empty() || domain.contains('@') {
        return invalid("expected exactly one '@' after a non-empty local part");
    }
    let labels: Vec<&str> = domain.split('.').collect();
    if labels.len() < 2 || labels.iter().any(|label| label.is_empty()) {
        return invalid("domain must be dotted");
    }

    Ok(())
}

impl LogPulse {
    /// Validate a request and reserve its cache target
    ///
    /// Rejects with `ValidationFailed` for a bad filename or recipient and with
    /// `ConflictInProgress` when a job for the same target is running. On success
    /// the job row exists with status `accepted`.
    pub async fn reserve(&self, filename: &str, recipient: &str) -> Result<Reservation> {
        if !self.accepting_new.load(Ordering::SeqCst) {
            return Err(Error::ShuttingDown);
        }

        let filename = base_filename(filename);
        if filename.is_empty() {
            return Err(Error::Pipeline(PipelineError::validation(
                "upload has no filename",
            )));
        }
        validate_recipient(recipient)?;

        let target = cache_target(filename, recipient);
        let lease = self.cache.reserve(&target).await?;

        let compressed = is_gzip_name(filename);
        let new_job = NewJob {
            filename: filename.to_string(),
            recipient: recipient.to_string(),
            cache_target: target.clone(),
            compressed,
        };
        let id = match self.db.insert_job(&new_job).await {
            Ok(id) => id,
            Err(e) => {
                if let Err(release_err) = self.cache.release(&target, lease).await {
                    tracing::warn!(cache_target = %target, error = %release_err, "Failed to release reservation");
                }
                return Err(e);
            }
        };

        let reservation = Reservation {
            id,
            filename: new_job.filename,
            recipient: new_job.recipient,
            cache_target: target,
            lease,
            compressed,
            work_dir: self.config.ingest.temp_dir.join(format!("job-{}", id)),
        };

        tracing::info!(
            job_id = id.0,
            filename = %reservation.filename,
            cache_target = %reservation.cache_target,
            compressed,
            "Job accepted"
        );
        self.emit(Event::Accepted {
            id,
            filename: reservation.filename.clone(),
            cache_target: reservation.cache_target.clone(),
        });

        Ok(reservation)
    }

    /// Open the spool file for an upload, creating the job directory
    pub async fn create_spool(&self, reservation: &Reservation) -> Result<tokio::fs::File> {
        tokio::fs::create_dir_all(&reservation.work_dir).await?;
        let file = tokio::fs::File::create(reservation.spool_path()).await?;
        Ok(file)
    }

    /// Create a fresh staging file for an upload whose recipient is not known yet
    ///
    /// The file lives directly under the temp directory; the caller owns it
    /// until [`LogPulse::adopt_staged`] moves it into a job directory.
    pub async fn create_staging(&self) -> Result<(PathBuf, tokio::fs::File)> {
        let seq = self.staged_uploads.fetch_add(1, Ordering::Relaxed);
        let path = self
            .config
            .ingest
            .temp_dir
            .join(format!("upload-{}-{}.part", std::process::id(), seq));
        let file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await?;
        Ok((path, file))
    }

    /// Move a staging file into `reservation`'s job directory as its spool
    pub async fn adopt_staged(&self, reservation: &Reservation, staged: &Path) -> Result<()> {
        tokio::fs::create_dir_all(&reservation.work_dir).await?;
        tokio::fs::rename(staged, reservation.spool_path()).await?;
        Ok(())
    }

    /// Reserve, stage and submit an upload whose bytes are already in memory
    ///
    /// Plain uploads are streamed straight from memory; `.gz` uploads are written
    /// to the job directory and decompressed by the background task.
    pub async fn ingest_bytes(
        &self,
        filename: &str,
        recipient: &str,
        bytes: Vec<u8>,
    ) -> Result<JobAccepted> {
        let reservation = self.reserve(filename, recipient).await?;

        if !reservation.compressed {
            let source = JobSource::Upload(Box::new(std::io::Cursor::new(bytes)));
            return Ok(self.submit(reservation.into_job(source)));
        }

        let staged = async {
            let mut spool = self.create_spool(&reservation).await?;
            write_spool(&mut spool, &bytes).await
        }
        .await;

        match staged {
            Ok(()) => {
                let source = JobSource::File {
                    path: reservation.spool_path(),
                    compressed: true,
                };
                Ok(self.submit(reservation.into_job(source)))
            }
            Err(e) => {
                self.abandon(reservation, &e).await;
                Err(e)
            }
        }
    }
}

/// Write one chunk to a spool file and flush it
pub(crate) async fn write_spool<W>(spool: &mut W, bytes: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    spool.write_all(bytes).await?;
    spool.flush().await?;
    Ok(())
}
