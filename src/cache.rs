//! Result cache keyed by cache target
//!
//! Each in-flight job owns one JSON Lines file `<cache_dir>/<target>` holding the
//! analyzer's records. The file is created when the job is accepted and removed
//! once its results were dispatched (or the job failed), so "file exists" doubles
//! as "job in progress".
//!
//! Reservation is check-and-reserve: the active set lookup and the exclusive
//! `create_new` happen under one lock, so two uploads deriving the same target
//! cannot both pass. Each reservation hands out a [`Lease`]; only the current
//! lease holder can release the target, so a late release from a finished job
//! never frees a target a newer job has reserved since.

use crate::error::{Error, PipelineError, Result};
use crate::types::ResultRecord;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Suffix appended to every cache target
pub const CACHE_SUFFIX: &str = ".json";

/// Derive the cache target for an upload
///
/// The base filename (directory components dropped) is concatenated with the
/// recipient and [`CACHE_SUFFIX`]: `access.log` + `u@x.com` gives
/// `access.logu@x.com.json`.
pub fn cache_target(filename: &str, recipient: &str) -> String {
    format!("{}{}{}", base_filename(filename), recipient, CACHE_SUFFIX)
}

/// Strip any directory components a client put in the upload filename
pub fn base_filename(filename: &str) -> &str {
    filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(filename)
}

/// Proof of holding a cache target, handed out by [`ResultCache::reserve`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Lease(u64);

/// File-backed store of analyzer results
pub struct ResultCache {
    dir: PathBuf,
    stale_after: Duration,
    active: Mutex<HashMap<String, Lease>>,
    next_lease: AtomicU64,
}

impl ResultCache {
    /// Create a cache rooted at `dir`
    ///
    /// Files found on disk that no live job owns are reclaimed once older than
    /// `stale_after`.
    pub fn new(dir: impl Into<PathBuf>, stale_after: Duration) -> Self {
        Self {
            dir: dir.into(),
            stale_after,
            active: Mutex::new(HashMap::new()),
            next_lease: AtomicU64::new(1),
        }
    }

    /// Directory holding the cache files
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the file backing `target`
    pub fn path_for(&self, target: &str) -> PathBuf {
        self.dir.join(target)
    }

    /// Atomically check that `target` is free and claim it
    ///
    /// Fails with `ConflictInProgress` if a live job holds the target, or if a
    /// file left by a crashed run is younger than the stale threshold.
    pub async fn reserve(&self, target: &str) -> Result<Lease> {
        validate_target(target)?;

        let mut active = self.active.lock().await;
        if active.contains_key(target) {
            return Err(conflict(target));
        }

        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.path_for(target);

        match create_exclusive(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                if !self.is_stale(&path).await {
                    return Err(conflict(target));
                }
                warn!(cache_target = target, "reclaiming stale cache file");
                remove_if_exists(&path).await?;
                create_exclusive(&path).await.map_err(|e| {
                    if e.kind() == std::io::ErrorKind::AlreadyExists {
                        conflict(target)
                    } else {
                        Error::Io(e)
                    }
                })?;
            }
            Err(e) => return Err(Error::Io(e)),
        }

        let lease = Lease(self.next_lease.fetch_add(1, Ordering::Relaxed));
        active.insert(target.to_string(), lease);
        debug!(cache_target = target, ?lease, "cache target reserved");
        Ok(lease)
    }

    /// Whether a job currently holds `target`
    ///
    /// A leftover file from a crashed run counts until it goes stale.
    pub async fn exists_in_progress(&self, target: &str) -> bool {
        if self.active.lock().await.contains_key(target) {
            return true;
        }
        let path = self.path_for(target);
        match tokio::fs::metadata(&path).await {
            Ok(_) => !self.is_stale(&path).await,
            Err(_) => false,
        }
    }

    /// Append one record to `target`
    pub async fn append(&self, target: &str, record: &ResultRecord) -> Result<()> {
        let mut sink = self.open_sink(target).await?;
        sink.append(record).await?;
        sink.finish().await?;
        Ok(())
    }

    /// Open a buffered appender for `target`
    ///
    /// The target must have been reserved; appending to an unknown target fails.
    pub async fn open_sink(&self, target: &str) -> Result<RecordSink> {
        let file = OpenOptions::new()
            .append(true)
            .open(self.path_for(target))
            .await?;
        Ok(RecordSink {
            target: target.to_string(),
            writer: BufWriter::new(file),
            records: 0,
        })
    }

    /// Read every record accumulated for `target`, in append order
    pub async fn read_all(&self, target: &str) -> Result<Vec<ResultRecord>> {
        let file = File::open(self.path_for(target)).await?;
        let mut lines = BufReader::new(file).lines();
        let mut records = Vec::new();

        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            records.push(serde_json::from_str(&line)?);
        }

        Ok(records)
    }

    /// Remove `target`'s file and free the reservation held under `lease`
    ///
    /// Idempotent: releasing a target that is already gone is not an error. A
    /// lease that no longer holds the target (released before, then reserved
    /// again by another job) leaves the current holder's file and entry alone.
    pub async fn release(&self, target: &str, lease: Lease) -> Result<()> {
        let mut active = self.active.lock().await;
        match active.get(target) {
            Some(holder) if *holder == lease => {}
            Some(holder) => {
                debug!(
                    cache_target = target,
                    ?lease,
                    ?holder,
                    "target held by a newer reservation, not releasing"
                );
                return Ok(());
            }
            None => return Ok(()),
        }

        let removed = remove_if_exists(&self.path_for(target)).await;
        active.remove(target);
        if removed.is_ok() {
            info!(cache_target = target, "cache target released");
        }
        removed
    }

    async fn is_stale(&self, path: &Path) -> bool {
        let modified = match tokio::fs::metadata(path).await.and_then(|m| m.modified()) {
            Ok(modified) => modified,
            Err(_) => return false,
        };
        modified
            .elapsed()
            .map(|age| age >= self.stale_after)
            .unwrap_or(false)
    }
}

/// Buffered writer appending records to one cache target
///
/// Handed to the analyzer; [`RecordSink::finish`] must be called to flush.
pub struct RecordSink {
    target: String,
    writer: BufWriter<File>,
    records: u64,
}

impl RecordSink {
    /// Cache target this sink writes to
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Records appended so far
    pub fn records(&self) -> u64 {
        self.records
    }

    /// Append one record
    pub async fn append(&mut self, record: &ResultRecord) -> Result<()> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');
        self.writer.write_all(&line).await?;
        self.records += 1;
        Ok(())
    }

    /// Flush buffered records to disk and return how many were written
    pub async fn finish(mut self) -> Result<u64> {
        self.writer.flush().await?;
        self.writer.get_ref().sync_data().await?;
        Ok(self.records)
    }
}

async fn create_exclusive(path: &Path) -> std::io::Result<()> {
    OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await
        .map(|_| ())
}

async fn remove_if_exists(path: &Path) -> Result<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::Io(e)),
    }
}

fn validate_target(target: &str) -> Result<()> {
    if target.is_empty()
        || target == CACHE_SUFFIX
        || target.contains(['/', '\\'])
        || target.starts_with('.')
    {
        return Err(Error::Pipeline(PipelineError::validation(format!(
            "invalid cache target {:?}",
            target
        ))));
    }
    Ok(())
}

fn conflict(target: &str) -> Error {
    Error::Pipeline(PipelineError::ConflictInProgress {
        cache_target: target.to_string(),
    })
}
