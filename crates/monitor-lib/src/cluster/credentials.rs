//! gcloud-backed credential provider

use super::CredentialProvider;
use crate::error::{MonitorError, Result};
use async_trait::async_trait;
use std::process::Output;
use tokio::process::Command;
use tracing::{debug, info};

/// Captured result of an external command
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// stdout and stderr joined, the way an operator would see them
    fn combined(&self) -> String {
        format!("{}{}", self.stdout, self.stderr)
    }
}

impl From<Output> for CommandOutput {
    fn from(output: Output) -> Self {
        Self {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        }
    }
}

/// Executes external commands (allows mocking in tests)
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput>;
}

/// Runs real processes; killed if the caller gives up on them
#[derive(Debug, Default, Clone)]
pub struct ProcessRunner;

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput> {
        debug!(program = %program, args = ?args, "Executing credential command");

        let output = Command::new(program)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| MonitorError::provider(format!("failed to execute {}: {}", program, e)))?;

        Ok(CommandOutput::from(output))
    }
}

/// Credential provider that shells out to the gcloud CLI
///
/// Not reentrant: gcloud rewrites the shared kubeconfig and credential
/// cache, so every call must go through [`super::ClusterConnector`].
pub struct GcloudCredentials<R: CommandRunner = ProcessRunner> {
    binary: String,
    runner: R,
}

impl GcloudCredentials<ProcessRunner> {
    pub fn new(binary: impl Into<String>) -> Self {
        Self::with_runner(binary, ProcessRunner)
    }
}

impl<R: CommandRunner> GcloudCredentials<R> {
    pub fn with_runner(binary: impl Into<String>, runner: R) -> Self {
        Self {
            binary: binary.into(),
            runner,
        }
    }
}

/// Map `get-credentials` output onto the error taxonomy
///
/// "404" only counts as not-found on a failed run; a successful run echoes
/// the cluster name, which may itself contain those digits.
fn check_get_credentials(cluster: &str, output: &CommandOutput) -> Result<()> {
    if output.success {
        return Ok(());
    }
    let combined = output.combined();
    if combined.contains("404") {
        return Err(MonitorError::ClusterUnreachable(cluster.to_string()));
    }
    Err(MonitorError::provider(format!(
        "get-credentials for {} failed: {}",
        cluster,
        combined.trim()
    )))
}

#[async_trait]
impl<R: CommandRunner> CredentialProvider for GcloudCredentials<R> {
    async fn ensure_context(&self, project: &str, zone: &str, cluster: &str) -> Result<()> {
        let args: Vec<String> = [
            "container",
            "clusters",
            "get-credentials",
            cluster,
            "--zone",
            zone,
            "--project",
            project,
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        let output = self.runner.run(&self.binary, &args).await?;
        check_get_credentials(cluster, &output)?;

        info!(project = %project, cluster = %cluster, "Set kubeconfig context");
        Ok(())
    }

    async fn token(&self) -> Result<String> {
        let args: Vec<String> = [
            "config",
            "config-helper",
            "--format",
            "value(credential.access_token)",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        let output = self.runner.run(&self.binary, &args).await?;
        if !output.success {
            return Err(MonitorError::provider(format!(
                "config-helper failed: {}",
                output.combined().trim()
            )));
        }

        let token = output.stdout.trim();
        if token.is_empty() {
            return Err(MonitorError::provider("config-helper returned an empty token"));
        }
        Ok(token.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct ScriptedRunner {
        output: CommandOutput,
        calls: Mutex<Vec<Vec<String>>>,
    }

    #[async_trait]
    impl CommandRunner for ScriptedRunner {
        async fn run(&self, _program: &str, args: &[String]) -> Result<CommandOutput> {
            self.calls.lock().unwrap().push(args.to_vec());
            Ok(self.output.clone())
        }
    }

    fn provider(success: bool, stdout: &str, stderr: &str) -> GcloudCredentials<ScriptedRunner> {
        GcloudCredentials::with_runner(
            "gcloud",
            ScriptedRunner {
                output: CommandOutput {
                    success,
                    stdout: stdout.to_string(),
                    stderr: stderr.to_string(),
                },
                calls: Mutex::new(Vec::new()),
            },
        )
    }

    #[tokio::test]
    async fn test_ensure_context_arguments() {
        let credentials = provider(true, "Fetching cluster endpoint and auth data.", "");
        tokio_test::assert_ok!(
            credentials
                .ensure_context("shop", "europe-west1-b", "prod")
                .await
        );

        let calls = credentials.runner.calls.lock().unwrap();
        assert_eq!(
            calls[0].join(" "),
            "container clusters get-credentials prod --zone europe-west1-b --project shop"
        );
    }

    #[tokio::test]
    async fn test_not_found_maps_to_unreachable() {
        let credentials = provider(
            false,
            "",
            "ERROR: (gcloud) ResponseError: code=404, message=Not found",
        );
        let err = credentials
            .ensure_context("shop", "europe-west1-b", "gone")
            .await
            .unwrap_err();
        assert!(err.is_unreachable());
    }

    #[tokio::test]
    async fn test_success_mentioning_404_is_ok() {
        let credentials = provider(
            true,
            "",
            "Fetching cluster endpoint and auth data.\nkubeconfig entry generated for prod-404.",
        );
        tokio_test::assert_ok!(
            credentials
                .ensure_context("shop", "europe-west1-b", "prod-404")
                .await
        );
    }

    #[tokio::test]
    async fn test_other_failure_is_provider_error() {
        let credentials = provider(false, "", "ERROR: permission denied");
        let err = credentials
            .ensure_context("shop", "europe-west1-b", "prod")
            .await
            .unwrap_err();
        assert!(matches!(err, MonitorError::Provider(_)));
    }

    #[tokio::test]
    async fn test_token_is_trimmed() {
        let credentials = provider(true, "ya29.token\n", "");
        assert_eq!(credentials.token().await.unwrap(), "ya29.token");
    }

    #[tokio::test]
    async fn test_empty_token_rejected() {
        let credentials = provider(true, "\n", "");
        tokio_test::assert_err!(credentials.token().await);
    }

    #[test]
    fn test_context_name() {
        let credentials = provider(true, "", "");
        assert_eq!(
            credentials.context_name("shop", "europe-west1-b", "prod"),
            "gke_shop_europe-west1-b_prod"
        );
    }
}
