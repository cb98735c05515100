//! Outbound notifications
//!
//! The core talks to a [`Notifier`] port through [`NotificationService`],
//! which applies per-cluster category switches and builds message text.
//! Delivery is fire-and-forget: failures are logged and never returned.

mod service;
mod slack;

pub use service::NotificationService;
pub use slack::{SlackAttachment, SlackMessage, SlackNotifier};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Message severity, rendered as an attachment color by chat notifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Success,
    Warning,
    Error,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Success => write!(f, "success"),
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
        }
    }
}

/// Delivery port for notifications
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Send `text` to the destination named `destination`; never fails
    async fn send(&self, text: &str, destination: &str, severity: Severity);
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::sync::Mutex;

    /// A sent notification
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct Sent {
        pub text: String,
        pub destination: String,
        pub severity: Severity,
    }

    /// Notifier that records every message
    #[derive(Default)]
    pub struct RecordingNotifier {
        sent: Mutex<Vec<Sent>>,
    }

    impl RecordingNotifier {
        pub fn sent(&self) -> Vec<Sent> {
            self.sent.lock().unwrap().clone()
        }

        pub fn count_containing(&self, needle: &str) -> usize {
            self.sent()
                .iter()
                .filter(|s| s.text.contains(needle))
                .count()
        }
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn send(&self, text: &str, destination: &str, severity: Severity) {
            self.sent.lock().unwrap().push(Sent {
                text: text.to_string(),
                destination: destination.to_string(),
                severity,
            });
        }
    }
}
