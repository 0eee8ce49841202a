//! Regex-driven analyzer

use super::Analyzer;
use crate::cache::RecordSink;
use crate::config::AnalyzerConfig;
use crate::error::{Error, Result};
use crate::types::ResultRecord;
use async_trait::async_trait;
use regex::RegexSet;
use tokio::sync::mpsc;
use tracing::debug;

/// Emits one record for every line matching any configured pattern
///
/// The record names the first matching pattern in configuration order.
pub struct PatternAnalyzer {
    patterns: Vec<String>,
    set: RegexSet,
    max_records: Option<u64>,
}

impl PatternAnalyzer {
    /// Compile the analyzer from configuration
    pub fn new(config: &AnalyzerConfig) -> Result<Self> {
        let set = RegexSet::new(&config.patterns).map_err(|e| Error::Config {
            message: format!("invalid analyzer pattern: {}", e),
            key: Some("analyzer.patterns".to_string()),
        })?;

        Ok(Self {
            patterns: config.patterns.clone(),
            set,
            max_records: config.max_records,
        })
    }

    fn first_match(&self, line: &str) -> Option<&str> {
        self.set
            .matches(line)
            .iter()
            .next()
            .map(|idx| self.patterns[idx].as_str())
    }
}

#[async_trait]
impl Analyzer for PatternAnalyzer {
    async fn analyze(
        &self,
        mut lines: mpsc::Receiver<String>,
        sink: &mut RecordSink,
    ) -> Result<()> {
        let mut line_number: u64 = 0;

        // Keep draining after the cap so the relay never blocks on a full channel
        while let Some(line) = lines.recv().await {
            line_number += 1;

            if self.max_records.is_some_and(|max| sink.records() >= max) {
                continue;
            }

            if let Some(pattern) = self.first_match(&line) {
                let record = ResultRecord {
                    line_number,
                    pattern: pattern.to_string(),
                    line,
                };
                sink.append(&record).await?;
            }
        }

        debug!(
            cache_target = sink.target(),
            lines = line_number,
            records = sink.records(),
            "pattern analysis finished"
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "pattern"
    }
}
