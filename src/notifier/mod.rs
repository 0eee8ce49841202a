//! Result delivery
//!
//! A [`Notifier`] delivers one job's records to its recipient. The
//! [`ResultDispatcher`] wraps it with the cache side of the contract: read the
//! accumulated records, deliver them with retry, then release the target so it
//! no longer reports "in progress".

use crate::cache::{Lease, ResultCache};
use crate::config::{NotificationConfig, RetryConfig};
use crate::error::{Error, PipelineError, Result};
use crate::retry::with_retry;
use crate::types::{JobId, ResultRecord};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

mod webhook;

pub use webhook::WebhookNotifier;

/// Everything a notifier needs to deliver one job's results
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct Delivery {
    /// Job the results belong to
    pub job_id: JobId,
    /// Recipient identity (email address)
    pub recipient: String,
    /// Uploaded filename
    pub filename: String,
    /// Cache target the records were read from
    pub cache_target: String,
    /// Analyzer results, in the order they were produced
    pub records: Vec<ResultRecord>,
    /// Unix timestamp of the delivery attempt
    pub timestamp: i64,
}

/// Per-job addressing handed to [`ResultDispatcher::dispatch_from_cache`]
#[derive(Clone, Debug)]
pub struct DeliveryTarget {
    /// Job the results belong to
    pub job_id: JobId,
    /// Recipient identity
    pub recipient: String,
    /// Uploaded filename
    pub filename: String,
}

/// Sends a job's results to its recipient
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver the results; transient failures should surface as retryable errors
    async fn deliver(&self, delivery: &Delivery) -> Result<()>;
}

/// Notifier that only logs a summary
///
/// Used when no webhook is configured.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn deliver(&self, delivery: &Delivery) -> Result<()> {
        tracing::info!(
            job_id = delivery.job_id.0,
            recipient = %delivery.recipient,
            filename = %delivery.filename,
            records = delivery.records.len(),
            "results ready for delivery"
        );
        Ok(())
    }
}

/// Build the notifier described by the configuration
pub fn notifier_from_config(config: &NotificationConfig) -> Result<Arc<dyn Notifier>> {
    match &config.webhook {
        Some(webhook) => Ok(Arc::new(WebhookNotifier::new(webhook.clone())?)),
        None => Ok(Arc::new(LogNotifier)),
    }
}

/// Reads cached results and hands them to the notifier
pub struct ResultDispatcher {
    cache: Arc<ResultCache>,
    notifier: Arc<dyn Notifier>,
    retry: RetryConfig,
}

impl ResultDispatcher {
    /// Create a dispatcher over `cache`
    pub fn new(cache: Arc<ResultCache>, notifier: Arc<dyn Notifier>, retry: RetryConfig) -> Self {
        Self {
            cache,
            notifier,
            retry,
        }
    }

    /// Whether `target` is held by a running job
    pub async fn exists_in_progress(&self, target: &str) -> bool {
        self.cache.exists_in_progress(target).await
    }

    /// Append one record to `target`
    pub async fn append(&self, target: &str, record: &ResultRecord) -> Result<()> {
        self.cache.append(target, record).await
    }

    /// Deliver every record accumulated for `cache_target`, then release it
    ///
    /// Returns the number of records delivered. On failure the target is left in
    /// place; releasing it is the caller's cleanup. `lease` must be the one
    /// returned when `cache_target` was reserved.
    pub async fn dispatch_from_cache(
        &self,
        cache_target: &str,
        lease: Lease,
        target: DeliveryTarget,
    ) -> Result<u64> {
        let records = self.cache.read_all(cache_target).await.map_err(|e| {
            Error::Pipeline(PipelineError::DispatchFailed {
                cache_target: cache_target.to_string(),
                reason: format!("cannot read cached results: {}", e),
                retryable: false,
            })
        })?;
        let count = records.len() as u64;

        let delivery = Delivery {
            job_id: target.job_id,
            recipient: target.recipient,
            filename: target.filename,
            cache_target: cache_target.to_string(),
            records,
            timestamp: chrono::Utc::now().timestamp(),
        };

        with_retry(&self.retry, || self.notifier.deliver(&delivery)).await?;

        self.cache.release(cache_target, lease).await?;
        Ok(count)
    }
}
