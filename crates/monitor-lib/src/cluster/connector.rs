//! Serialized credential refresh plus client creation

use super::{ClientFactory, ClusterClient, CredentialProvider};
use crate::config::ClusterDescriptor;
use crate::error::{with_timeout, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

/// Single entry point for "give me a client for cluster X"
///
/// One connector is shared by the reconciler, the maintenance
/// orchestrator and the watch engine. Its lock is held for the whole
/// credential exchange so the external tool never runs concurrently.
pub struct ClusterConnector {
    credentials: Arc<dyn CredentialProvider>,
    factory: Arc<dyn ClientFactory>,
    credential_lock: Mutex<()>,
    timeout: Duration,
}

impl ClusterConnector {
    pub fn new(
        credentials: Arc<dyn CredentialProvider>,
        factory: Arc<dyn ClientFactory>,
        timeout: Duration,
    ) -> Self {
        Self {
            credentials,
            factory,
            credential_lock: Mutex::new(()),
            timeout,
        }
    }

    /// Refresh credentials for the cluster and open a client
    ///
    /// Fails with `ClusterUnreachable` when the cluster no longer exists.
    pub async fn connect(&self, descriptor: &ClusterDescriptor) -> Result<Arc<dyn ClusterClient>> {
        let (context, token) = {
            let _guard = self.credential_lock.lock().await;

            with_timeout(
                "get-credentials",
                self.timeout,
                self.credentials
                    .ensure_context(&descriptor.project, &descriptor.zone, &descriptor.name),
            )
            .await?;

            let token = with_timeout("access token", self.timeout, self.credentials.token()).await?;
            let context =
                self.credentials
                    .context_name(&descriptor.project, &descriptor.zone, &descriptor.name);
            (context, token)
        };

        debug!(project = %descriptor.project, cluster = %descriptor.name, context = %context, "Connecting to cluster");
        with_timeout(
            "create client",
            self.timeout,
            self.factory.new_client(&context, &token),
        )
        .await
    }
}
