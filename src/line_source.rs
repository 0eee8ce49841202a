//! Line sources: ordered, terminated line streams from an upload or a file
//!
//! Both variants run the same reader loop on a background task and feed a bounded
//! channel of [`LineEvent`]s. A source that finishes cleanly emits exactly one
//! [`LineEvent::EndOfStream`]; a source that fails mid-read closes the channel
//! without it, which consumers must treat as a failed stream.

use crate::error::{Error, PipelineError, Result};
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// One element of a line stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineEvent {
    /// A line of text with trailing `\n` / `\r\n` removed (may be empty)
    Line(String),
    /// No further lines will be produced
    EndOfStream,
}

/// Where the lines come from
pub enum LineSource {
    /// A file already fully on disk
    File(PathBuf),
    /// A live upload body; bytes are read as they become available
    Upload(Box<dyn AsyncRead + Send + Unpin>),
}

impl std::fmt::Debug for LineSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LineSource::File(path) => f.debug_tuple("File").field(path).finish(),
            LineSource::Upload(_) => f.write_str("Upload(..)"),
        }
    }
}

impl LineSource {
    /// Start reading on a background task
    ///
    /// `capacity` bounds the number of lines buffered ahead of the consumer; a
    /// slow consumer blocks the reader rather than growing memory.
    pub fn spawn(self, capacity: usize) -> LineStream {
        let (tx, rx) = mpsc::channel(capacity.max(1));

        let handle = tokio::spawn(async move {
            match self {
                LineSource::File(path) => {
                    let file = tokio::fs::File::open(&path).await.map_err(|e| {
                        Error::Pipeline(PipelineError::StreamReadFailed {
                            lines_read: 0,
                            reason: format!("cannot open {}: {}", path.display(), e),
                        })
                    })?;
                    read_lines(file, tx).await
                }
                LineSource::Upload(reader) => read_lines(reader, tx).await,
            }
        });

        LineStream {
            rx,
            handle: Some(handle),
            finished: false,
        }
    }
}

/// Receiving end of a running line source
pub struct LineStream {
    rx: mpsc::Receiver<LineEvent>,
    handle: Option<JoinHandle<Result<u64>>>,
    finished: bool,
}

impl LineStream {
    /// Next event, or `None` once the source has stopped
    ///
    /// After [`LineEvent::EndOfStream`] has been returned this always yields `None`.
    pub async fn next(&mut self) -> Option<LineEvent> {
        if self.finished {
            return None;
        }
        let event = self.rx.recv().await;
        if matches!(event, Some(LineEvent::EndOfStream) | None) {
            self.finished = true;
        }
        event
    }

    /// Wait for the reader task and return its line count or read error
    pub async fn finish(mut self) -> Result<u64> {
        self.rx.close();
        match self.handle.take() {
            Some(handle) => handle.await.map_err(|e| {
                Error::Pipeline(PipelineError::StreamReadFailed {
                    lines_read: 0,
                    reason: format!("line source task failed: {}", e),
                })
            })?,
            None => Ok(0),
        }
    }
}

impl Drop for LineStream {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

async fn read_lines<R>(reader: R, tx: mpsc::Sender<LineEvent>) -> Result<u64>
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::with_capacity(256);
    let mut lines: u64 = 0;

    loop {
        buf.clear();
        let read = reader.read_until(b'\n', &mut buf).await.map_err(|e| {
            warn!(lines_read = lines, error = %e, "line source read failed");
            Error::Pipeline(PipelineError::StreamReadFailed {
                lines_read: lines,
                reason: e.to_string(),
            })
        })?;

        if read == 0 {
            break;
        }

        trim_line_ending(&mut buf);
        let line = String::from_utf8_lossy(&buf).into_owned();

        if tx.send(LineEvent::Line(line)).await.is_err() {
            return Err(consumer_gone(lines));
        }
        lines += 1;
    }

    if tx.send(LineEvent::EndOfStream).await.is_err() {
        return Err(consumer_gone(lines));
    }

    debug!(lines, "line source reached end of stream");
    Ok(lines)
}

fn trim_line_ending(buf: &mut Vec<u8>) {
    if buf.last() == Some(&b'\n') {
        buf.pop();
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }
    }
}

fn consumer_gone(lines: u64) -> Error {
    Error::Pipeline(PipelineError::StreamReadFailed {
        lines_read: lines,
        reason: "line consumer went away".to_string(),
    })
}
