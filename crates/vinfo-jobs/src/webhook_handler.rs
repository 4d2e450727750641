//! WebhookHandler: delivers a recorded outcome to the client's webhook.
//!
//! Delivery is at-least-once. Any non-2xx answer or transport error hands the
//! job back to the queue for a retry with backoff.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{info, warn};

use vinfo_core::{defaults, JobKind, Result, WebhookJobArgs, WebhookPayload};

use crate::handler::{JobContext, JobHandler, JobResult};

#[derive(Clone)]
pub struct WebhookHandler {
    client: reqwest::Client,
}

impl WebhookHandler {
    /// Create a handler whose requests give up after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    /// Create from `VI_WEBHOOK_TIMEOUT_SECS` (default 30).
    pub fn from_env() -> Result<Self> {
        let secs = std::env::var("VI_WEBHOOK_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .unwrap_or(defaults::WEBHOOK_TIMEOUT_SECS);
        Self::new(Duration::from_secs(secs))
    }

    /// POST the payload once. `Err` carries the reason the attempt should be
    /// retried.
    pub async fn deliver(&self, args: &WebhookJobArgs) -> std::result::Result<(), String> {
        let start = Instant::now();
        let uuid = args.uuid;
        let payload = WebhookPayload::from(args.clone());

        info!(uuid = %uuid, uri = %args.uri, "Sending webhook request");

        let response = self
            .client
            .post(&args.uri)
            .header("Content-Type", "application/json")
            .json(&payload)
            .send()
            .await
            .map_err(|e| format!("webhook request failed: {}", e))?;

        let status = response.status();
        let duration_ms = start.elapsed().as_millis() as u64;
        if !status.is_success() {
            warn!(%uuid, status = status.as_u16(), duration_ms, "Webhook rejected");
            return Err(format!("webhook returned HTTP {}", status.as_u16()));
        }

        info!(%uuid, status = status.as_u16(), duration_ms, "Webhook delivered");
        Ok(())
    }
}

#[async_trait]
impl JobHandler for WebhookHandler {
    fn kind(&self) -> JobKind {
        JobKind::Webhook
    }

    async fn execute(&self, ctx: JobContext) -> JobResult {
        let args: WebhookJobArgs = match ctx.args() {
            Ok(args) => args,
            Err(e) => return JobResult::Failed(format!("Invalid webhook job arguments: {}", e)),
        };

        tokio::select! {
            biased;
            _ = ctx.cancellation().cancelled() => {
                JobResult::Retry("Webhook delivery cancelled by worker shutdown".into())
            }
            delivered = self.deliver(&args) => match delivered {
                Ok(()) => JobResult::Success(None),
                Err(reason) => JobResult::Retry(reason),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::test_support::running_job;
    use serde_json::json;
    use tokio_util::sync::CancellationToken;

    #[tokio::test]
    async fn test_invalid_args_fail_permanently() {
        let handler = WebhookHandler::new(Duration::from_secs(1)).unwrap();
        let ctx = JobContext::new(running_job(JobKind::Webhook, json!({"uri": 1})));

        assert!(matches!(handler.execute(ctx).await, JobResult::Failed(_)));
    }

    #[tokio::test]
    async fn test_cancelled_delivery_is_retried() {
        let handler = WebhookHandler::new(Duration::from_secs(1)).unwrap();
        let token = CancellationToken::new();
        token.cancel();
        let ctx = JobContext::new(running_job(
            JobKind::Webhook,
            json!({
                "uri": "http://127.0.0.1:1/hook",
                "uuid": uuid::Uuid::new_v4(),
                "outcome": {"error": "boom"}
            }),
        ))
        .with_cancellation(token);

        match handler.execute(ctx).await {
            JobResult::Retry(reason) => assert!(reason.contains("cancelled")),
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
