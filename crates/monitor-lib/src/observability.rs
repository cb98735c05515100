//! Observability infrastructure for the cluster monitor
//!
//! Provides:
//! - Prometheus metrics (events, alerts, deployments, watchers, maintenance)
//! - Structured JSON logging with tracing

use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Histogram, IntCounter, IntCounterVec, IntGauge,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for status queries (in seconds)
const LATENCY_BUCKETS: &[f64] = &[0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<Option<MonitorMetricsInner>> = OnceLock::new();

struct MonitorMetricsInner {
    events_received: IntCounter,
    events_dropped: IntCounter,
    alerts_sent: IntCounterVec,
    deployments_detected: IntCounter,
    watcher_reconnects: IntCounter,
    active_watchers: IntGauge,
    maintenance_transitions: IntCounterVec,
    maintenance_failures: IntCounter,
    notifications_sent: IntCounter,
    notification_failures: IntCounter,
    status_latency_seconds: Histogram,
}

impl MonitorMetricsInner {
    fn register() -> prometheus::Result<Self> {
        Ok(Self {
            events_received: register_int_counter!(
                "kube_monitor_events_received_total",
                "Cluster events received across all watchers"
            )?,
            events_dropped: register_int_counter!(
                "kube_monitor_events_dropped_total",
                "Events dropped because they predate the watcher start"
            )?,
            alerts_sent: register_int_counter_vec!(
                "kube_monitor_alerts_total",
                "Alertable events forwarded to the notifier",
                &["reason"]
            )?,
            deployments_detected: register_int_counter!(
                "kube_monitor_deployments_detected_total",
                "Rollouts admitted into the deployment tracker"
            )?,
            watcher_reconnects: register_int_counter!(
                "kube_monitor_watcher_reconnects_total",
                "Watch reconnects caused by a stale resource version"
            )?,
            active_watchers: register_int_gauge!(
                "kube_monitor_active_watchers",
                "Clusters with a live event subscription"
            )?,
            maintenance_transitions: register_int_counter_vec!(
                "kube_monitor_maintenance_transitions_total",
                "Maintenance state transitions",
                &["status"]
            )?,
            maintenance_failures: register_int_counter!(
                "kube_monitor_maintenance_failures_total",
                "Maintenance tasks that moved to ERROR"
            )?,
            notifications_sent: register_int_counter!(
                "kube_monitor_notifications_sent_total",
                "Notifications delivered"
            )?,
            notification_failures: register_int_counter!(
                "kube_monitor_notification_failures_total",
                "Notifications that could not be delivered"
            )?,
            status_latency_seconds: register_histogram!(
                "kube_monitor_status_latency_seconds",
                "Time spent reconciling a cluster status",
                LATENCY_BUCKETS.to_vec()
            )?,
        })
    }
}

/// Monitor metrics for Prometheus exposition
///
/// This is a lightweight handle to the global metrics instance.
/// Multiple clones share the same underlying metrics; if registration
/// failed every call is a no-op.
#[derive(Clone)]
pub struct MonitorMetrics {
    _private: (),
}

impl Default for MonitorMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl MonitorMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(|| match MonitorMetricsInner::register() {
            Ok(inner) => Some(inner),
            Err(e) => {
                warn!(error = %e, "Failed to register Prometheus metrics");
                None
            }
        });
        Self { _private: () }
    }

    fn inner(&self) -> Option<&MonitorMetricsInner> {
        GLOBAL_METRICS.get().and_then(Option::as_ref)
    }

    pub fn inc_events_received(&self) {
        if let Some(m) = self.inner() {
            m.events_received.inc();
        }
    }

    pub fn inc_events_dropped(&self) {
        if let Some(m) = self.inner() {
            m.events_dropped.inc();
        }
    }

    pub fn inc_alerts(&self, reason: &str) {
        if let Some(m) = self.inner() {
            m.alerts_sent.with_label_values(&[reason]).inc();
        }
    }

    pub fn inc_deployments_detected(&self) {
        if let Some(m) = self.inner() {
            m.deployments_detected.inc();
        }
    }

    pub fn inc_watcher_reconnects(&self) {
        if let Some(m) = self.inner() {
            m.watcher_reconnects.inc();
        }
    }

    pub fn set_active_watchers(&self, count: i64) {
        if let Some(m) = self.inner() {
            m.active_watchers.set(count);
        }
    }

    pub fn inc_maintenance_transition(&self, status: &str) {
        if let Some(m) = self.inner() {
            m.maintenance_transitions.with_label_values(&[status]).inc();
        }
    }

    pub fn inc_maintenance_failures(&self) {
        if let Some(m) = self.inner() {
            m.maintenance_failures.inc();
        }
    }

    pub fn inc_notifications_sent(&self) {
        if let Some(m) = self.inner() {
            m.notifications_sent.inc();
        }
    }

    pub fn inc_notification_failures(&self) {
        if let Some(m) = self.inner() {
            m.notification_failures.inc();
        }
    }

    pub fn observe_status_latency(&self, duration_secs: f64) {
        if let Some(m) = self.inner() {
            m.status_latency_seconds.observe(duration_secs);
        }
    }
}

/// Structured logger for monitor lifecycle events
///
/// Provides consistent JSON-formatted logging with a stable `event` field.
#[derive(Clone)]
pub struct StructuredLogger {
    instance: String,
}

impl StructuredLogger {
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
        }
    }

    pub fn log_startup(&self, version: &str, clusters: usize) {
        info!(
            event = "monitor_started",
            instance = %self.instance,
            version = %version,
            clusters = clusters,
            "Cluster monitor started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "monitor_shutdown",
            instance = %self.instance,
            reason = %reason,
            "Cluster monitor shutting down"
        );
    }

    pub fn log_watcher_started(&self, project: &str, cluster: &str, watcher_id: &str) {
        info!(
            event = "watcher_started",
            instance = %self.instance,
            project = %project,
            cluster = %cluster,
            watcher_id = %watcher_id,
            "Created watcher"
        );
    }

    pub fn log_watcher_restart(&self, project: &str, cluster: &str) {
        info!(
            event = "watcher_restarted",
            instance = %self.instance,
            project = %project,
            cluster = %cluster,
            "Restarting watcher"
        );
    }

    pub fn log_alert(&self, project: &str, cluster: &str, reason: &str, object: &str) {
        warn!(
            event = "alert_raised",
            instance = %self.instance,
            project = %project,
            cluster = %cluster,
            reason = %reason,
            object = %object,
            "Alertable cluster event"
        );
    }

    pub fn log_maintenance_transition(
        &self,
        project: &str,
        cluster: &str,
        from: &str,
        to: &str,
    ) {
        info!(
            event = "maintenance_transition",
            instance = %self.instance,
            project = %project,
            cluster = %cluster,
            from = %from,
            to = %to,
            "Finished running maintenance task"
        );
    }
}
