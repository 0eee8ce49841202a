//! Configuration types for logpulse

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{
    net::SocketAddr,
    path::{Path, PathBuf},
    time::Duration,
};
use utoipa::ToSchema;

/// File name looked up by [`Config::load`]
pub const CONFIG_FILE_NAME: &str = "PulseConfig.toml";

/// Ingestion settings (directories, channel sizing, deadlines)
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct IngestConfig {
    /// Directory for per-job temporary artifacts (default: "./temp")
    #[serde(default = "default_temp_dir")]
    pub temp_dir: PathBuf,

    /// Directory holding result cache files (default: "./cache")
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,

    /// Capacity of the line channels between source, relay and analyzer (default: 1024)
    ///
    /// A slow analyzer blocks the relay once this many lines are in flight.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    /// Deadline for a whole job: decompression, streaming and dispatch (default: 1 hour)
    ///
    /// `None` disables the deadline.
    #[serde(
        default = "default_job_timeout",
        with = "optional_duration_serde"
    )]
    pub job_timeout: Option<Duration>,

    /// Age after which a cache file left by a crashed run stops blocking resubmission
    /// (default: 24 hours)
    #[serde(default = "default_stale_reservation_after", with = "duration_serde")]
    pub stale_reservation_after: Duration,

    /// Maximum accepted upload body size in bytes (default: 512 MiB)
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            temp_dir: default_temp_dir(),
            cache_dir: default_cache_dir(),
            channel_capacity: default_channel_capacity(),
            job_timeout: default_job_timeout(),
            stale_reservation_after: default_stale_reservation_after(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

/// Settings for the built-in pattern analyzer
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct AnalyzerConfig {
    /// Regular expressions; every line matching one of them yields a result record
    #[serde(default = "default_patterns")]
    pub patterns: Vec<String>,

    /// Stop recording after this many records (None = unlimited)
    #[serde(default)]
    pub max_records: Option<u64>,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            patterns: default_patterns(),
            max_records: None,
        }
    }
}

/// Notification delivery settings
#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct NotificationConfig {
    /// Webhook receiving result deliveries (log-only delivery when unset)
    #[serde(default)]
    pub webhook: Option<WebhookConfig>,

    /// Retry policy for transient delivery failures
    #[serde(default)]
    pub retry: RetryConfig,
}

/// Webhook configuration
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct WebhookConfig {
    /// URL to POST deliveries to
    pub url: String,

    /// Optional authentication header value
    #[serde(default)]
    pub auth_header: Option<String>,

    /// Timeout for webhook requests (default: 30 seconds)
    #[serde(default = "default_webhook_timeout", with = "duration_serde")]
    pub timeout: Duration,
}

/// Retry configuration for transient failures
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (default: 3)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay before first retry (default: 1 second)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 30 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
        }
    }
}

/// Data storage configuration
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct PersistenceConfig {
    /// Database path for the job status table (default: "./logpulse.db")
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

/// API and external server integration configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct ServerIntegrationConfig {
    /// REST API configuration
    #[serde(default)]
    pub api: ApiConfig,
}

/// REST API configuration
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiConfig {
    /// Address to bind to (default: 127.0.0.1:8080)
    #[serde(default = "default_bind_address")]
    pub bind_address: SocketAddr,

    /// Enable CORS for browser access (default: true)
    #[serde(default = "default_true")]
    pub cors_enabled: bool,

    /// Allowed CORS origins (default: ["*"])
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,

    /// Enable Swagger UI at /swagger-ui (default: true)
    #[serde(default = "default_true")]
    pub swagger_ui: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            cors_enabled: true,
            cors_origins: default_cors_origins(),
            swagger_ui: true,
        }
    }
}

/// Main configuration for [`LogPulse`](crate::LogPulse)
///
/// Process-wide settings only. Everything specific to one upload (recipient,
/// cache target, artifacts) travels inside the job itself.
#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct Config {
    /// Ingestion settings
    #[serde(default)]
    pub ingest: IngestConfig,

    /// Pattern analyzer settings
    #[serde(default)]
    pub analyzer: AnalyzerConfig,

    /// Result delivery settings
    #[serde(default)]
    pub notifications: NotificationConfig,

    /// Job status persistence
    #[serde(default)]
    pub persistence: PersistenceConfig,

    /// API server settings
    #[serde(default)]
    pub server: ServerIntegrationConfig,
}

impl Config {
    /// Load `PulseConfig.toml` from the working directory, falling back to `$HOME`
    pub fn load() -> Result<Self> {
        let local = PathBuf::from(CONFIG_FILE_NAME);
        if local.exists() {
            return Self::from_file(&local);
        }

        let home = std::env::var_os("HOME").ok_or_else(|| Error::Config {
            message: format!(
                "could not find {} in the working directory and HOME is not set",
                CONFIG_FILE_NAME
            ),
            key: None,
        })?;
        let in_home = PathBuf::from(home).join(CONFIG_FILE_NAME);
        if !in_home.exists() {
            return Err(Error::Config {
                message: format!(
                    "could not find {} in the working directory or {}",
                    CONFIG_FILE_NAME,
                    in_home.display()
                ),
                key: None,
            });
        }
        Self::from_file(&in_home)
    }

    /// Parse a TOML configuration file and validate it
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&raw).map_err(|e| Error::Config {
            message: format!("failed to parse {}: {}", path.display(), e),
            key: None,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check settings that serde cannot express
    pub fn validate(&self) -> Result<()> {
        if self.ingest.channel_capacity == 0 {
            return Err(Error::Config {
                message: "channel capacity must be at least 1".to_string(),
                key: Some("ingest.channel_capacity".to_string()),
            });
        }

        if self.analyzer.patterns.is_empty() {
            return Err(Error::Config {
                message: "at least one analyzer pattern is required".to_string(),
                key: Some("analyzer.patterns".to_string()),
            });
        }
        for pattern in &self.analyzer.patterns {
            if let Err(e) = regex::Regex::new(pattern) {
                return Err(Error::Config {
                    message: format!("invalid pattern {:?}: {}", pattern, e),
                    key: Some("analyzer.patterns".to_string()),
                });
            }
        }

        let retry = &self.notifications.retry;
        if !retry.backoff_multiplier.is_finite() || retry.backoff_multiplier < 1.0 {
            return Err(Error::Config {
                message: format!(
                    "backoff multiplier must be a finite number of at least 1.0, got {}",
                    retry.backoff_multiplier
                ),
                key: Some("notifications.retry.backoff_multiplier".to_string()),
            });
        }
        if retry.max_delay < retry.initial_delay {
            return Err(Error::Config {
                message: format!(
                    "max retry delay {:?} is shorter than the initial delay {:?}",
                    retry.max_delay, retry.initial_delay
                ),
                key: Some("notifications.retry.max_delay".to_string()),
            });
        }

        if let Some(webhook) = &self.notifications.webhook
            && let Err(e) = url::Url::parse(&webhook.url)
        {
            return Err(Error::Config {
                message: format!("invalid webhook url {:?}: {}", webhook.url, e),
                key: Some("notifications.webhook.url".to_string()),
            });
        }

        Ok(())
    }
}

fn default_temp_dir() -> PathBuf {
    PathBuf::from("./temp")
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("./cache")
}

fn default_database_path() -> PathBuf {
    PathBuf::from("./logpulse.db")
}

fn default_channel_capacity() -> usize {
    1024
}

fn default_job_timeout() -> Option<Duration> {
    Some(Duration::from_secs(3600))
}

fn default_stale_reservation_after() -> Duration {
    Duration::from_secs(24 * 3600)
}

fn default_max_upload_bytes() -> usize {
    512 * 1024 * 1024
}

fn default_patterns() -> Vec<String> {
    vec![
        r"(?i)\berror\b".to_string(),
        r"(?i)\bfatal\b".to_string(),
        r"(?i)\bpanic\b".to_string(),
        r"(?i)\bexception\b".to_string(),
    ]
}

fn default_true() -> bool {
    true
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(30)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_webhook_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_bind_address() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

fn default_cors_origins() -> Vec<String> {
    vec!["*".to_string()]
}

// Duration serialization helper (seconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// Optional Duration serialization helper
mod optional_duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => serializer.serialize_some(&d.as_secs()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = Option::<u64>::deserialize(deserializer)?;
        Ok(secs.map(Duration::from_secs))
    }
}
