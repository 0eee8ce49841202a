//! Configuration and payload fixtures

use flate2::Compression;
use flate2::write::GzEncoder;
use logpulse::Config;
use logpulse::config::WebhookConfig;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Config rooted in `root`, delivering to `webhook_url` without retries
pub fn test_config(root: &Path, webhook_url: Option<String>) -> Config {
    let mut config = Config::default();
    config.persistence.database_path = root.join("pulse.db");
    config.ingest.temp_dir = root.join("temp");
    config.ingest.cache_dir = root.join("cache");
    config.analyzer.patterns = vec![r"\bERROR\b".to_string()];
    config.notifications.retry.max_attempts = 0;
    config.notifications.webhook = webhook_url.map(|url| WebhookConfig {
        url,
        auth_header: None,
        timeout: Duration::from_secs(5),
    });
    config
}

/// Gzip `data` in memory
pub fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

/// Every regular file below `dir`
pub fn files_in(dir: &Path) -> Vec<PathBuf> {
    let mut found = Vec::new();
    let Ok(entries) = std::fs::read_dir(dir) else {
        return found;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            found.extend(files_in(&path));
        } else {
            found.push(path);
        }
    }
    found
}

/// A log of `lines` lines where every third line is an error
pub fn sample_log(lines: usize) -> Vec<u8> {
    let mut log = String::new();
    for i in 1..=lines {
        if i % 3 == 0 {
            log.push_str(&format!("2026-01-01T00:00:{:02} ERROR request {} failed\n", i % 60, i));
        } else {
            log.push_str(&format!("2026-01-01T00:00:{:02} INFO request {} ok\n", i % 60, i));
        }
    }
    log.into_bytes()
}
