//! Analyzer seam
//!
//! The analyzer consumes the job's lines and appends result records to the job's
//! cache target. It runs until its input channel is closed; the orchestrator
//! flushes the sink afterwards, so everything appended before `analyze` returns
//! is visible to dispatch.

use crate::cache::RecordSink;
use async_trait::async_trait;
use tokio::sync::mpsc;

mod pattern;

pub use pattern::PatternAnalyzer;

/// Consumer turning a line sequence into result records
///
/// # Examples
///
/// ```no_run
/// use async_trait::async_trait;
/// use logpulse::analyzer::Analyzer;
/// use logpulse::cache::RecordSink;
/// use logpulse::types::ResultRecord;
/// use tokio::sync::mpsc;
///
/// struct EveryLine;
///
/// #[async_trait]
/// impl Analyzer for EveryLine {
///     async fn analyze(
///         &self,
///         mut lines: mpsc::Receiver<String>,
///         sink: &mut RecordSink,
///     ) -> logpulse::Result<()> {
///         let mut n = 0;
///         while let Some(line) = lines.recv().await {
///             n += 1;
///             sink.append(&ResultRecord { line_number: n, pattern: "*".into(), line })
///                 .await?;
///         }
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Analyzer: Send + Sync {
    /// Consume `lines` until the channel closes, appending results to `sink`
    async fn analyze(
        &self,
        lines: mpsc::Receiver<String>,
        sink: &mut RecordSink,
    ) -> crate::Result<()>;

    /// Short name used in logs
    fn name(&self) -> &'static str {
        "analyzer"
    }
}
