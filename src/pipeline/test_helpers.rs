//! Shared test helpers for building LogPulse instances with scripted collaborators.

use crate::analyzer::Analyzer;
use crate::cache::RecordSink;
use crate::config::Config;
use crate::db::Database;
use crate::error::{Error, PipelineError, Result};
use crate::notifier::{Delivery, Notifier};
use crate::pipeline::LogPulse;
use crate::types::{JobId, JobInfo, ResultRecord};
use async_trait::async_trait;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;
use tempfile::tempdir;
use tokio::io::{AsyncRead, ReadBuf};
use tokio::sync::{Semaphore, mpsc};

/// Reader that yields its data and then fails like a dropped connection
pub(crate) struct FailingReader {
    data: Vec<u8>,
    pos: usize,
}

impl FailingReader {
    pub(crate) fn new(data: &[u8]) -> Self {
        Self {
            data: data.to_vec(),
            pos: 0,
        }
    }
}

impl AsyncRead for FailingReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        if self.pos < self.data.len() {
            let start = self.pos;
            let n = buf.remaining().min(self.data.len() - start);
            buf.put_slice(&self.data[start..start + n]);
            self.pos += n;
            Poll::Ready(Ok(()))
        } else {
            Poll::Ready(Err(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "upload connection reset",
            )))
        }
    }
}

/// Analyzer that records every line it sees and emits one record per line
///
/// With a gate it waits for a permit before reading anything, which keeps a job
/// in flight until the test releases it. With `fail_after` it returns an error
/// once it has recorded that many lines.
#[derive(Default)]
pub(crate) struct RecordingAnalyzer {
    seen: Mutex<Vec<String>>,
    gate: Option<Arc<Semaphore>>,
    fail_after: Option<usize>,
    runs: Mutex<u32>,
    running: AtomicUsize,
}

/// Counts an analyze call as running until it is dropped or returns
struct Running<'a>(&'a AtomicUsize);

impl<'a> Running<'a> {
    fn start(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for Running<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl RecordingAnalyzer {
    pub(crate) fn gated(gate: Arc<Semaphore>) -> Self {
        Self {
            gate: Some(gate),
            ..Default::default()
        }
    }

    /// Fail once `lines` lines have been recorded
    pub(crate) fn fail_after(mut self, lines: usize) -> Self {
        self.fail_after = Some(lines);
        self
    }

    /// Number of analyze calls currently in progress
    pub(crate) fn running(&self) -> usize {
        self.running.load(Ordering::SeqCst)
    }

    pub(crate) fn seen(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }

    /// Number of analyze calls that returned
    pub(crate) fn finished_runs(&self) -> u32 {
        *self.runs.lock().unwrap()
    }
}

#[async_trait]
impl Analyzer for RecordingAnalyzer {
    async fn analyze(&self, mut lines: mpsc::Receiver<String>, sink: &mut RecordSink) -> Result<()> {
        let _running = Running::start(&self.running);
        if let Some(gate) = &self.gate {
            let permit = gate.acquire().await.unwrap();
            permit.forget();
        }

        let mut n = 0;
        while let Some(line) = lines.recv().await {
            if self.fail_after.is_some_and(|limit| n as usize >= limit) {
                return Err(Error::Pipeline(PipelineError::AnalyzerFailed {
                    reason: format!("rejected line {}", n + 1),
                }));
            }
            n += 1;
            self.seen.lock().unwrap().push(line.clone());
            sink.append(&ResultRecord {
                line_number: n,
                pattern: "*".to_string(),
                line,
            })
            .await?;
        }

        *self.runs.lock().unwrap() += 1;
        Ok(())
    }
}

/// Notifier that keeps every delivery, optionally failing them all
#[derive(Default)]
pub(crate) struct RecordingNotifier {
    deliveries: Mutex<Vec<Delivery>>,
    fail: bool,
}

impl RecordingNotifier {
    pub(crate) fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub(crate) fn deliveries(&self) -> Vec<Delivery> {
        self.deliveries.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn deliver(&self, delivery: &Delivery) -> Result<()> {
        if self.fail {
            return Err(Error::Pipeline(PipelineError::DispatchFailed {
                cache_target: delivery.cache_target.clone(),
                reason: "recipient rejected delivery".to_string(),
                retryable: false,
            }));
        }
        self.deliveries.lock().unwrap().push(delivery.clone());
        Ok(())
    }
}

/// Config rooted in `root` with small channels and no retry delay
pub(crate) fn test_config(root: &std::path::Path) -> Config {
    let mut config = Config::default();
    config.persistence.database_path = root.join("test.db");
    config.ingest.temp_dir = root.join("temp");
    config.ingest.cache_dir = root.join("cache");
    config.ingest.channel_capacity = 2;
    config.notifications.retry.max_attempts = 0;
    config
}

/// Create a test LogPulse around the given collaborators
/// Returns the instance and the tempdir (which must be kept alive).
pub(crate) async fn create_test_pulse(
    analyzer: Arc<dyn Analyzer>,
    notifier: Arc<dyn Notifier>,
) -> (LogPulse, tempfile::TempDir) {
    let temp_dir = tempdir().unwrap();
    let config = test_config(temp_dir.path());

    std::fs::create_dir_all(&config.ingest.temp_dir).unwrap();
    std::fs::create_dir_all(&config.ingest.cache_dir).unwrap();

    let db = Database::new(&config.persistence.database_path)
        .await
        .unwrap();

    (
        LogPulse::with_components(config, db, analyzer, notifier),
        temp_dir,
    )
}

/// Poll the job table until the job reaches a terminal status
pub(crate) async fn wait_for_job(pulse: &LogPulse, id: JobId) -> JobInfo {
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let job = pulse.get_job(id).await.unwrap();
            if job.status.is_terminal() {
                return job;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("job did not finish in time")
}

/// Gzip `content` in memory
pub(crate) fn gzip(content: &[u8]) -> Vec<u8> {
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::io::Write;

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(content).unwrap();
    encoder.finish().unwrap()
}

/// Every file left under `dir`, recursively
pub(crate) fn files_under(dir: &std::path::Path) -> Vec<std::path::PathBuf> {
    let mut found = Vec::new();
    let Ok(entries) = std::fs::read_dir(dir) else {
        return found;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            found.push(path.clone());
            found.extend(files_under(&path));
        } else {
            found.push(path);
        }
    }
    found
}
