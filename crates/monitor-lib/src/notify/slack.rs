//! Slack incoming-webhook notifier

use super::{Notifier, Severity};
use crate::config::MonitoringConfig;
use crate::error::{MonitorError, Result};
use crate::observability::MonitorMetrics;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, error, warn};

const SUCCESS_COLOR: &str = "#64FF33";
const WARNING_COLOR: &str = "#FFD133";
const ERROR_COLOR: &str = "#FF3333";

/// Webhook payload with a single colored attachment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlackMessage {
    pub attachments: Vec<SlackAttachment>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlackAttachment {
    pub color: String,
    pub text: String,
}

impl SlackMessage {
    pub fn new(text: &str, severity: Severity) -> Self {
        Self {
            attachments: vec![SlackAttachment {
                color: color_for(severity).to_string(),
                text: text.to_string(),
            }],
        }
    }
}

fn color_for(severity: Severity) -> &'static str {
    match severity {
        Severity::Success => SUCCESS_COLOR,
        Severity::Warning => WARNING_COLOR,
        Severity::Error => ERROR_COLOR,
    }
}

/// Posts messages to named Slack webhooks
pub struct SlackNotifier {
    client: reqwest::Client,
    webhooks: HashMap<String, String>,
    metrics: MonitorMetrics,
}

impl SlackNotifier {
    /// Build a notifier for the webhooks declared in the monitoring config
    pub fn new(config: &MonitoringConfig, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        let webhooks = config
            .slack_webhooks
            .iter()
            .map(|w| (w.name.clone(), w.url.clone()))
            .collect();

        Ok(Self {
            client,
            webhooks,
            metrics: MonitorMetrics::new(),
        })
    }

    async fn post(&self, url: &str, message: &SlackMessage) -> Result<()> {
        let response = self
            .client
            .post(url)
            .json(message)
            .send()
            .await
            .map_err(|e| MonitorError::Notifier(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(MonitorError::Notifier(format!(
                "Slack returned {}, body: {}",
                status, body
            )));
        }

        Ok(())
    }
}

#[async_trait]
impl Notifier for SlackNotifier {
    async fn send(&self, text: &str, destination: &str, severity: Severity) {
        let Some(url) = self.webhooks.get(destination) else {
            warn!(webhook = %destination, "Unknown webhook, dropping notification");
            self.metrics.inc_notification_failures();
            return;
        };

        let message = SlackMessage::new(text, severity);
        match self.post(url, &message).await {
            Ok(()) => {
                debug!(webhook = %destination, severity = %severity, "Notification delivered");
                self.metrics.inc_notifications_sent();
            }
            Err(e) => {
                error!(webhook = %destination, error = %e, "Couldn't send to Slack");
                self.metrics.inc_notification_failures();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WebhookConfig;

    #[test]
    fn test_payload_colors() {
        let message = SlackMessage::new("cluster down", Severity::Error);
        let json = serde_json::to_value(&message).unwrap();

        assert_eq!(json["attachments"][0]["color"], "#FF3333");
        assert_eq!(json["attachments"][0]["text"], "cluster down");
        assert_eq!(color_for(Severity::Success), "#64FF33");
        assert_eq!(color_for(Severity::Warning), "#FFD133");
    }

    #[tokio::test]
    async fn test_unreachable_webhook_is_swallowed() {
        let config = MonitoringConfig {
            clusters: vec![],
            slack_webhooks: vec![WebhookConfig {
                name: "ops".to_string(),
                url: "http://127.0.0.1:9/hook".to_string(),
            }],
        };
        let notifier = SlackNotifier::new(&config, Duration::from_millis(200)).unwrap();

        // Neither call may panic or propagate an error
        notifier.send("hello", "ops", Severity::Success).await;
        notifier.send("hello", "unknown", Severity::Success).await;
    }
}
