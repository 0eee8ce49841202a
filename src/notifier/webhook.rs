//! Webhook delivery of job results.

use super::{Delivery, Notifier};
use crate::config::WebhookConfig;
use crate::error::{Error, PipelineError, Result};
use async_trait::async_trait;

/// POSTs each [`Delivery`] as JSON to a configured URL
pub struct WebhookNotifier {
    client: reqwest::Client,
    config: WebhookConfig,
}

impl WebhookNotifier {
    /// Create a notifier for `config`
    pub fn new(config: WebhookConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn deliver(&self, delivery: &Delivery) -> Result<()> {
        let mut request = self.client.post(&self.config.url).json(delivery);
        if let Some(auth) = &self.config.auth_header {
            request = request.header("Authorization", auth);
        }

        let failed = |reason: String, retryable: bool| {
            Error::Pipeline(PipelineError::DispatchFailed {
                cache_target: delivery.cache_target.clone(),
                reason,
                retryable,
            })
        };

        let response = match tokio::time::timeout(self.config.timeout, request.send()).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                tracing::warn!(url = %self.config.url, error = %e, "webhook request failed");
                return Err(failed(
                    format!("webhook request failed: {}", e),
                    e.is_timeout() || e.is_connect(),
                ));
            }
            Err(_) => {
                return Err(failed(
                    format!("webhook timed out after {:?}", self.config.timeout),
                    true,
                ));
            }
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(url = %self.config.url, %status, "webhook rejected delivery");
            return Err(failed(
                format!("webhook returned status {}: {}", status.as_u16(), body),
                is_transient_status(status),
            ));
        }

        tracing::debug!(
            url = %self.config.url,
            job_id = delivery.job_id.0,
            records = delivery.records.len(),
            "webhook delivery sent"
        );
        Ok(())
    }
}

/// Server errors and rate limiting are worth another attempt
fn is_transient_status(status: reqwest::StatusCode) -> bool {
    status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS
}
