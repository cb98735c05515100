//! Registry of in-flight rollouts used to silence drift alarms
//!
//! No cluster signal marks the end of a rollout, so each detection holds
//! for a fixed suppression window. Expired records stay in the list and
//! are skipped on read.

use crate::models::DetectedDeployment;
use crate::notify::NotificationService;
use crate::observability::MonitorMetrics;
use chrono::Utc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Default suppression window (3 minutes)
const DEFAULT_SUPPRESSION_SECS: i64 = 3 * 60;

/// Tracks workloads believed to be rolling out
pub struct DeploymentTracker {
    suppression: chrono::Duration,
    records: Mutex<Vec<DetectedDeployment>>,
    notifications: NotificationService,
    metrics: MonitorMetrics,
}

impl DeploymentTracker {
    pub fn new(notifications: NotificationService) -> Self {
        Self {
            suppression: chrono::Duration::seconds(DEFAULT_SUPPRESSION_SECS),
            records: Mutex::new(Vec::new()),
            notifications,
            metrics: MonitorMetrics::new(),
        }
    }

    /// Set custom suppression window
    pub fn with_suppression(mut self, window: Duration) -> Self {
        self.suppression = chrono::Duration::from_std(window)
            .unwrap_or_else(|_| chrono::Duration::seconds(DEFAULT_SUPPRESSION_SECS));
        self
    }

    /// Record a rollout signal; only the first signal per window notifies
    pub async fn add_deployment(&self, project: &str, cluster: &str, workload: &str) {
        let admitted = {
            let now = Utc::now();
            let mut records = self.records.lock().await;

            let active = records.iter().any(|r| {
                r.matches(project, cluster) && r.workload_name == workload && !r.is_expired(now)
            });

            if active {
                false
            } else {
                records.push(DetectedDeployment {
                    project: project.to_string(),
                    cluster: cluster.to_string(),
                    workload_name: workload.to_string(),
                    expiration: now + self.suppression,
                });
                true
            }
        };

        if !admitted {
            debug!(project = %project, cluster = %cluster, workload = %workload, "Rollout already tracked");
            return;
        }

        info!(project = %project, cluster = %cluster, workload = %workload, "Detected deployment");
        self.metrics.inc_deployments_detected();
        self.notifications
            .notify_deployment(project, cluster, workload)
            .await;
    }

    /// Names of workloads with an unexpired record for the cluster
    pub async fn active(&self, project: &str, cluster: &str) -> Vec<String> {
        let now = Utc::now();
        self.records
            .lock()
            .await
            .iter()
            .filter(|r| r.matches(project, cluster) && !r.is_expired(now))
            .map(|r| r.workload_name.clone())
            .collect()
    }

    /// Every record ever admitted, expired ones included
    pub async fn all(&self) -> Vec<DetectedDeployment> {
        self.records.lock().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_support::{descriptor, monitoring_config};
    use crate::notify::test_support::RecordingNotifier;
    use std::sync::Arc;

    fn tracker(window: Duration) -> (Arc<DeploymentTracker>, Arc<RecordingNotifier>) {
        let notifier = Arc::new(RecordingNotifier::default());
        let config = Arc::new(monitoring_config(vec![descriptor("shop", "prod")]));
        let service = NotificationService::new(config, notifier.clone());
        let tracker = DeploymentTracker::new(service).with_suppression(window);
        (Arc::new(tracker), notifier)
    }

    #[tokio::test]
    async fn test_duplicate_signal_within_window_notifies_once() {
        let (tracker, notifier) = tracker(Duration::from_secs(180));

        tracker.add_deployment("shop", "prod", "api").await;
        tracker.add_deployment("shop", "prod", "api").await;

        assert_eq!(notifier.sent().len(), 1);
        assert_eq!(tracker.active("shop", "prod").await, vec!["api".to_string()]);
    }

    #[tokio::test]
    async fn test_signals_separated_by_window_notify_twice() {
        let (tracker, notifier) = tracker(Duration::from_millis(50));

        tracker.add_deployment("shop", "prod", "api").await;
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(tracker.active("shop", "prod").await.is_empty());

        tracker.add_deployment("shop", "prod", "api").await;

        assert_eq!(notifier.sent().len(), 2);
        assert_eq!(tracker.active("shop", "prod").await.len(), 1);
        // Expired records are kept
        assert_eq!(tracker.all().await.len(), 2);
    }

    #[tokio::test]
    async fn test_active_is_scoped_to_cluster() {
        let (tracker, _) = tracker(Duration::from_secs(180));

        tracker.add_deployment("shop", "prod", "api").await;
        tracker.add_deployment("shop", "staging", "worker").await;

        assert_eq!(tracker.active("shop", "prod").await, vec!["api".to_string()]);
        assert_eq!(tracker.active("shop", "staging").await, vec!["worker".to_string()]);
        assert!(tracker.active("other", "prod").await.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_signals_admit_one_record() {
        let (tracker, notifier) = tracker(Duration::from_secs(180));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let tracker = tracker.clone();
                tokio::spawn(async move { tracker.add_deployment("shop", "prod", "api").await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(tracker.all().await.len(), 1);
        assert_eq!(notifier.sent().len(), 1);
    }
}
