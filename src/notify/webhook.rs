// src/notify/webhook.rs
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

use super::{AlertEvent, AlertSink};
use crate::retry::RetryPolicy;

/// Posts alerts as JSON to a webhook (Slack-compatible `text` payload).
pub struct WebhookAlertSink {
    webhook_url: String,
    client: Client,
    timeout: Duration,
    policy: RetryPolicy,
}

impl WebhookAlertSink {
    pub fn new(webhook_url: String) -> Self {
        Self {
            webhook_url,
            client: Client::new(),
            timeout: Duration::from_secs(5),
            policy: RetryPolicy::new(3, Duration::from_millis(500), Duration::from_secs(5)),
        }
    }

    /// Reads ALERT_WEBHOOK_URL; None when unset.
    pub fn from_env() -> Option<Self> {
        std::env::var("ALERT_WEBHOOK_URL").ok().map(Self::new)
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }
}

#[derive(Serialize)]
struct WebhookPayload<'a> {
    text: String,
    #[serde(flatten)]
    event: &'a AlertEvent,
}

#[async_trait]
impl AlertSink for WebhookAlertSink {
    async fn send(&self, event: &AlertEvent) -> Result<()> {
        let text = format!(
            "*Black swan alert:* {} (score {:.3}, risk {:?})\n{}\n{}",
            event.title, event.final_score, event.risk_level, event.reasoning, event.url
        );
        let payload = WebhookPayload { text, event };

        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let res = self
                .client
                .post(&self.webhook_url)
                .timeout(self.timeout)
                .json(&payload)
                .send()
                .await;

            let err = match res {
                Ok(rsp) => match rsp.error_for_status_ref() {
                    Ok(_) => return Ok(()),
                    Err(e) => anyhow!("webhook HTTP error: {e}"),
                },
                Err(e) => anyhow!("webhook request failed: {e}"),
            };

            if !self.policy.should_retry(attempt) {
                return Err(err);
            }
            tokio::time::sleep(self.policy.delay_for(attempt)).await;
        }
    }

    fn name(&self) -> &'static str {
        "webhook"
    }
}
