//! Category routing and message text for cluster notifications

use super::{Notifier, Severity};
use crate::config::{MonitoringConfig, NotificationBinding};
use crate::models::{MaintenanceRequest, MaintenanceState, MaintenanceStatus};
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::{debug, warn};

/// Routes notifications to the destinations configured per cluster
#[derive(Clone)]
pub struct NotificationService {
    config: Arc<MonitoringConfig>,
    notifier: Arc<dyn Notifier>,
}

impl NotificationService {
    pub fn new(config: Arc<MonitoringConfig>, notifier: Arc<dyn Notifier>) -> Self {
        Self { config, notifier }
    }

    /// A new maintenance window was accepted
    pub async fn notify_maintenance_scheduled(&self, request: &MaintenanceRequest) {
        let Some(destination) =
            self.destination(&request.project, &request.cluster, "maintenance", |n| {
                &n.maintenance
            })
        else {
            return;
        };

        let mut message = format!(
            "New maintenance scheduled.\nProject: `{}`, cluster: `{}`\n",
            request.project, request.cluster
        );
        let _ = writeln!(message, "Start time: {}", request.start_time.to_rfc3339());
        let _ = writeln!(message, "End time: {}", request.end_time.to_rfc3339());
        message.push_str("Workloads to scale:\n");
        for workload in &request.workloads_to_scale {
            let _ = writeln!(message, "`{}`", workload);
        }

        self.notifier
            .send(&message, &destination, Severity::Success)
            .await;
    }

    /// A maintenance window moved to STARTED or ENDED
    pub async fn notify_maintenance_update(&self, state: &MaintenanceState) {
        let request = &state.maintenance_request;
        let Some(destination) =
            self.destination(&request.project, &request.cluster, "maintenance", |n| {
                &n.maintenance
            })
        else {
            return;
        };

        let started = state.maintenance_status == MaintenanceStatus::Started;
        let mut message = format!(
            "Ran scheduled maintenance - {}\nProject: `{}`, cluster: `{}`\n",
            if started {
                "shutdown of workloads."
            } else {
                "scale-up of workloads."
            },
            request.project,
            request.cluster
        );

        match state.maintenance_status {
            MaintenanceStatus::Started => {
                message.push_str("Scaled down the following workloads:\n");
                for (workload, replicas) in &state.original_replica_counts {
                    let _ = writeln!(message, "`{}`, saved replica count: {}", workload, replicas);
                }
                let _ = writeln!(
                    message,
                    "Workloads will be scaled back up at {}",
                    request.end_time.to_rfc3339()
                );
            }
            MaintenanceStatus::Ended => {
                message.push_str(
                    "Scaled up the following workloads to their original replica counts:\n",
                );
                for workload in state.original_replica_counts.keys() {
                    let _ = writeln!(message, "`{}`", workload);
                }
                message.push_str("This maintenance is now finished!\n");
            }
            MaintenanceStatus::NotStarted | MaintenanceStatus::Error => {}
        }

        self.notifier
            .send(&message, &destination, Severity::Success)
            .await;
    }

    /// A maintenance step failed and the request moved to ERROR
    pub async fn notify_maintenance_failed(&self, state: &MaintenanceState, reason: &str) {
        let request = &state.maintenance_request;
        let Some(destination) =
            self.destination(&request.project, &request.cluster, "maintenance", |n| {
                &n.maintenance
            })
        else {
            return;
        };

        let text = format!(
            "Scheduled maintenance failed.\nProject: `{}`, cluster: `{}`\nReason: {}\nSubmit a new request to retry.",
            request.project, request.cluster, reason
        );
        self.notifier.send(&text, &destination, Severity::Error).await;
    }

    /// A rollout of `workload` was detected
    pub async fn notify_deployment(&self, project: &str, cluster: &str, workload: &str) {
        let Some(destination) = self.destination(project, cluster, "deployment", |n| &n.deployments)
        else {
            return;
        };

        let text = format!(
            "`{}` is being deployed to cluster `{}` in project `{}`",
            workload, cluster, project
        );
        self.notifier.send(&text, &destination, Severity::Success).await;
    }

    /// An alertable cluster event occurred
    pub async fn notify_event(&self, project: &str, cluster: &str, text: &str) {
        let Some(destination) = self.destination(project, cluster, "event", |n| &n.events) else {
            return;
        };

        self.notifier.send(text, &destination, Severity::Error).await;
    }

    /// Resolve the webhook for a category, or None when silenced
    fn destination<F>(
        &self,
        project: &str,
        cluster: &str,
        category: &str,
        pick: F,
    ) -> Option<String>
    where
        F: Fn(&crate::config::NotificationConfig) -> &NotificationBinding,
    {
        let descriptor = match self.config.find_cluster(project, cluster) {
            Ok(descriptor) => descriptor,
            Err(e) => {
                warn!(error = %e, "Dropping notification for unknown cluster");
                return None;
            }
        };

        let binding = pick(&descriptor.notifications);
        if !binding.enabled {
            debug!(
                project = %project,
                cluster = %cluster,
                category = %category,
                "Notifications disabled; silencing notification"
            );
            return None;
        }

        binding.slack_webhook.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_support::{descriptor, monitoring_config};
    use crate::notify::test_support::RecordingNotifier;
    use chrono::{Duration, TimeZone, Utc};

    fn service_with(config: MonitoringConfig) -> (NotificationService, Arc<RecordingNotifier>) {
        let notifier = Arc::new(RecordingNotifier::default());
        let service = NotificationService::new(Arc::new(config), notifier.clone());
        (service, notifier)
    }

    fn request() -> MaintenanceRequest {
        let start = Utc.with_ymd_and_hms(2024, 5, 1, 22, 0, 0).unwrap();
        MaintenanceRequest {
            project: "shop".to_string(),
            cluster: "prod".to_string(),
            start_time: start,
            end_time: start + Duration::hours(4),
            workloads_to_scale: vec!["api".to_string(), "worker".to_string()],
        }
    }

    #[tokio::test]
    async fn test_deployment_message() {
        let (service, notifier) = service_with(monitoring_config(vec![descriptor("shop", "prod")]));

        service.notify_deployment("shop", "prod", "api").await;

        let sent = notifier.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].text, "`api` is being deployed to cluster `prod` in project `shop`");
        assert_eq!(sent[0].destination, "ops");
        assert_eq!(sent[0].severity, Severity::Success);
    }

    #[tokio::test]
    async fn test_disabled_category_is_silenced() {
        let mut cluster = descriptor("shop", "prod");
        cluster.notifications.events.enabled = false;
        let (service, notifier) = service_with(monitoring_config(vec![cluster]));

        service.notify_event("shop", "prod", "probe failed").await;
        service.notify_deployment("shop", "prod", "api").await;

        assert_eq!(notifier.sent().len(), 1);
        assert_eq!(notifier.count_containing("probe failed"), 0);
    }

    #[tokio::test]
    async fn test_unknown_cluster_is_dropped() {
        let (service, notifier) = service_with(monitoring_config(vec![]));
        service.notify_event("shop", "prod", "probe failed").await;
        assert!(notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn test_event_severity_is_error() {
        let (service, notifier) = service_with(monitoring_config(vec![descriptor("shop", "prod")]));
        service.notify_event("shop", "prod", "OOM").await;
        assert_eq!(notifier.sent()[0].severity, Severity::Error);
    }

    #[tokio::test]
    async fn test_maintenance_messages() {
        let (service, notifier) = service_with(monitoring_config(vec![descriptor("shop", "prod")]));

        service.notify_maintenance_scheduled(&request()).await;

        let mut state = MaintenanceState::new(request());
        state.original_replica_counts.insert("api".to_string(), 3);
        state.maintenance_status = MaintenanceStatus::Started;
        service.notify_maintenance_update(&state).await;

        state.maintenance_status = MaintenanceStatus::Ended;
        service.notify_maintenance_update(&state).await;

        let sent = notifier.sent();
        assert_eq!(sent.len(), 3);
        assert!(sent[0].text.contains("New maintenance scheduled."));
        assert!(sent[0].text.contains("`worker`"));
        assert!(sent[1].text.contains("shutdown of workloads."));
        assert!(sent[1].text.contains("`api`, saved replica count: 3"));
        assert!(sent[1].text.contains("scaled back up at 2024-05-02T02:00:00+00:00"));
        assert!(sent[2].text.contains("scale-up of workloads."));
        assert!(sent[2].text.contains("This maintenance is now finished!"));
    }
}
