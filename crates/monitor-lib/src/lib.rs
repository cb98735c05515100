//! Fleet monitoring core for Kubernetes clusters
//!
//! This crate provides:
//! - Event watching with reconnect and periodic refresh
//! - Alert deduplication and rollout suppression
//! - Drift reconciliation against expected workloads
//! - Scheduled maintenance windows that scale workloads down and back up
//! - Health checks and observability

pub mod cache;
pub mod cluster;
pub mod config;
pub mod error;
pub mod health;
pub mod maintenance;
pub mod models;
pub mod notify;
pub mod observability;
pub mod reconciler;
pub mod tracker;
pub mod watcher;

pub use cache::EventCache;
pub use cluster::{ClusterConnector, GcloudCredentials, KubeClientFactory};
pub use config::{ClusterDescriptor, MonitoringConfig, WorkloadKind};
pub use error::{MonitorError, Result};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use maintenance::MaintenanceOrchestrator;
pub use models::*;
pub use notify::{NotificationService, Notifier, Severity, SlackNotifier};
pub use observability::{MonitorMetrics, StructuredLogger};
pub use reconciler::DriftReconciler;
pub use tracker::DeploymentTracker;
pub use watcher::{WatchContext, WatchEngine};
