//! Access to monitored clusters
//!
//! The core depends only on the traits in this module:
//! - [`CredentialProvider`] mints a kubeconfig context and a bearer token
//! - [`ClientFactory`] turns a context and token into a [`ClusterClient`]
//! - [`ClusterConnector`] combines both behind one process-wide lock
//!
//! The production implementations shell out to gcloud and talk to the
//! API server through kube-rs.

mod connector;
mod credentials;
mod kube_client;

pub use connector::ClusterConnector;
pub use credentials::{CommandOutput, CommandRunner, GcloudCredentials, ProcessRunner};
pub use kube_client::{KubeClientFactory, KubeClusterClient};

use crate::config::WorkloadKind;
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Replica summary of one Deployment or StatefulSet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadInfo {
    pub kind: WorkloadKind,
    pub name: String,
    pub namespace: String,
    pub desired_replicas: i32,
    pub ready_replicas: i32,
}

/// A cluster event reduced to the fields the monitor classifies on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterEvent {
    pub uid: String,
    pub event_type: String,
    pub kind: String,
    pub name: String,
    pub reason: String,
    pub message: String,
    pub timestamp: Option<DateTime<Utc>>,
}

/// Event subscription; an `Err` item terminates it with an error, end of
/// stream is a normal close
pub type EventStream = BoxStream<'static, Result<ClusterEvent>>;

/// Live connection to one cluster
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// List workloads of one kind across all namespaces
    async fn list_workloads(&self, kind: WorkloadKind) -> Result<Vec<WorkloadInfo>>;

    /// Scale a named workload to `replicas`
    async fn scale(&self, kind: WorkloadKind, namespace: &str, name: &str, replicas: i32)
        -> Result<()>;

    /// Open an event subscription across all namespaces
    async fn watch_events(&self) -> Result<EventStream>;

    /// Release the connection; safe to call more than once
    fn close(&self);
}

/// Creates clients for a kubeconfig context
#[async_trait]
pub trait ClientFactory: Send + Sync {
    async fn new_client(&self, context: &str, token: &str) -> Result<Arc<dyn ClusterClient>>;
}

/// External credential tool
///
/// Implementations are not reentrant; callers go through
/// [`ClusterConnector`], which serializes every invocation.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Make sure a kubeconfig context exists for the cluster
    async fn ensure_context(&self, project: &str, zone: &str, cluster: &str) -> Result<()>;

    /// Current bearer token
    async fn token(&self) -> Result<String>;

    /// Name of the context written by `ensure_context`
    fn context_name(&self, project: &str, zone: &str, cluster: &str) -> String {
        format!("gke_{}_{}_{}", project, zone, cluster)
    }
}
