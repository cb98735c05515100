//! Error types for the cluster monitor

use std::time::Duration;
use thiserror::Error;

/// Errors raised by the monitoring core
#[derive(Debug, Error)]
pub enum MonitorError {
    /// No configuration exists for the requested project/cluster pair
    #[error("could not find cluster {cluster} in project {project}")]
    UnknownCluster { project: String, cluster: String },

    /// Credentials or context could not be resolved, e.g. the cluster was deleted
    #[error("cluster {0} is unreachable")]
    ClusterUnreachable(String),

    /// The credential tool failed for a reason other than a missing cluster
    #[error("credential provider error: {0}")]
    Provider(String),

    /// A cluster API call failed after a connection was established
    #[error("cluster client error: {0}")]
    Client(String),

    /// The resource version backing a watch is stale and the watch must be rebuilt
    #[error("watch invalidated: {0}")]
    WatchInvalidated(String),

    /// An outbound call did not complete in time
    #[error("{operation} timed out after {timeout:?}")]
    Timeout {
        operation: &'static str,
        timeout: Duration,
    },

    /// Notification delivery failed
    #[error("notifier error: {0}")]
    Notifier(String),

    /// A caller-supplied request is malformed
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Configuration could not be loaded or is inconsistent
    #[error("configuration error: {0}")]
    Config(String),
}

impl MonitorError {
    pub fn unknown_cluster(project: impl Into<String>, cluster: impl Into<String>) -> Self {
        Self::UnknownCluster {
            project: project.into(),
            cluster: cluster.into(),
        }
    }

    pub fn client(msg: impl Into<String>) -> Self {
        Self::Client(msg.into())
    }

    pub fn provider(msg: impl Into<String>) -> Self {
        Self::Provider(msg.into())
    }

    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Returns true for failures that should be retried on the next scheduling pass
    pub fn is_unreachable(&self) -> bool {
        matches!(self, MonitorError::ClusterUnreachable(_))
    }
}

impl From<kube::Error> for MonitorError {
    fn from(err: kube::Error) -> Self {
        MonitorError::Client(err.to_string())
    }
}

/// Result alias for monitor operations
pub type Result<T> = std::result::Result<T, MonitorError>;

/// Run an outbound call with a bounded timeout
pub async fn with_timeout<T, F>(operation: &'static str, timeout: Duration, fut: F) -> Result<T>
where
    F: std::future::Future<Output = Result<T>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(MonitorError::Timeout { operation, timeout }),
    }
}
