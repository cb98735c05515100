//! Mapping from cluster events to monitor actions

use crate::cluster::ClusterEvent;
use crate::config::EventTypes;

/// What a received event means to the monitor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventAction {
    /// A Deployment or StatefulSet is rolling out
    TrackDeployment,
    Alert(AlertSignal),
    Ignore,
}

/// Alertable conditions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertSignal {
    /// Container killed after a failed probe
    ProbeKill,
    LivenessFailure,
    ReadinessFailure,
    OomKill,
}

impl AlertSignal {
    /// Probe failures repeat every few seconds and go through the event cache
    pub fn deduplicated(&self) -> bool {
        matches!(self, AlertSignal::LivenessFailure | AlertSignal::ReadinessFailure)
    }

    /// Per-cluster switch; probe kills are always reported
    pub fn enabled(&self, types: &EventTypes) -> bool {
        match self {
            AlertSignal::ProbeKill => true,
            AlertSignal::LivenessFailure => types.liveness_probe,
            AlertSignal::ReadinessFailure => types.readiness_probe,
            AlertSignal::OomKill => types.oom_kill,
        }
    }

    pub fn message(&self, project: &str, event: &ClusterEvent) -> String {
        match self {
            AlertSignal::OomKill => format!("{}: OOM kill on node {}", project, event.name),
            _ => format!("{}: {} - {}", project, event.message, event.name),
        }
    }
}

pub fn classify(event: &ClusterEvent) -> EventAction {
    match (event.event_type.as_str(), event.reason.as_str()) {
        ("Normal", "ScalingReplicaSet") if event.kind == "Deployment" => {
            EventAction::TrackDeployment
        }
        ("Normal", "SuccessfulCreate") if event.kind == "StatefulSet" => {
            EventAction::TrackDeployment
        }
        ("Normal", "Killing")
            if event.message.contains("failed liveness probe")
                || event.message.contains("failed readiness probe") =>
        {
            EventAction::Alert(AlertSignal::ProbeKill)
        }
        ("Warning", "Unhealthy") if event.message.contains("Liveness") => {
            EventAction::Alert(AlertSignal::LivenessFailure)
        }
        ("Warning", "Unhealthy") if event.message.contains("Readiness") => {
            EventAction::Alert(AlertSignal::ReadinessFailure)
        }
        ("Warning", "OOMKilling") => EventAction::Alert(AlertSignal::OomKill),
        _ => EventAction::Ignore,
    }
}

#[cfg(test)]
pub(crate) fn event(event_type: &str, kind: &str, reason: &str, message: &str) -> ClusterEvent {
    ClusterEvent {
        uid: "uid-1".to_string(),
        event_type: event_type.to_string(),
        kind: kind.to_string(),
        name: "api-7d9f".to_string(),
        reason: reason.to_string(),
        message: message.to_string(),
        timestamp: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rollout_signals() {
        assert_eq!(
            classify(&event("Normal", "Deployment", "ScalingReplicaSet", "Scaled up")),
            EventAction::TrackDeployment
        );
        assert_eq!(
            classify(&event("Normal", "StatefulSet", "SuccessfulCreate", "create Pod db-0")),
            EventAction::TrackDeployment
        );
        // Kind must match the reason
        assert_eq!(
            classify(&event("Normal", "ReplicaSet", "SuccessfulCreate", "Created pod")),
            EventAction::Ignore
        );
        assert_eq!(
            classify(&event("Warning", "Deployment", "ScalingReplicaSet", "")),
            EventAction::Ignore
        );
    }

    #[test]
    fn test_probe_kill() {
        assert_eq!(
            classify(&event(
                "Normal",
                "Pod",
                "Killing",
                "Container api failed liveness probe, will be restarted"
            )),
            EventAction::Alert(AlertSignal::ProbeKill)
        );
        assert_eq!(
            classify(&event("Normal", "Pod", "Killing", "Stopping container api")),
            EventAction::Ignore
        );
    }

    #[test]
    fn test_unhealthy_probes() {
        assert_eq!(
            classify(&event("Warning", "Pod", "Unhealthy", "Liveness probe failed: timeout")),
            EventAction::Alert(AlertSignal::LivenessFailure)
        );
        assert_eq!(
            classify(&event("Warning", "Pod", "Unhealthy", "Readiness probe failed: 503")),
            EventAction::Alert(AlertSignal::ReadinessFailure)
        );
        assert_eq!(
            classify(&event("Warning", "Pod", "Unhealthy", "Startup probe failed")),
            EventAction::Ignore
        );
    }

    #[test]
    fn test_oom_kill() {
        let oom = event("Warning", "Node", "OOMKilling", "Memory cgroup out of memory");
        assert_eq!(classify(&oom), EventAction::Alert(AlertSignal::OomKill));
        assert_eq!(
            AlertSignal::OomKill.message("shop", &oom),
            "shop: OOM kill on node api-7d9f"
        );
    }

    #[test]
    fn test_switches_and_dedup() {
        let types = EventTypes {
            readiness_probe: false,
            liveness_probe: true,
            oom_kill: false,
        };

        assert!(AlertSignal::ProbeKill.enabled(&types));
        assert!(AlertSignal::LivenessFailure.enabled(&types));
        assert!(!AlertSignal::ReadinessFailure.enabled(&types));
        assert!(!AlertSignal::OomKill.enabled(&types));

        assert!(AlertSignal::LivenessFailure.deduplicated());
        assert!(!AlertSignal::ProbeKill.deduplicated());
        assert!(!AlertSignal::OomKill.deduplicated());
    }

    #[test]
    fn test_probe_message_format() {
        let e = event("Warning", "Pod", "Unhealthy", "Liveness probe failed");
        assert_eq!(
            AlertSignal::LivenessFailure.message("shop", &e),
            "shop: Liveness probe failed - api-7d9f"
        );
    }
}
