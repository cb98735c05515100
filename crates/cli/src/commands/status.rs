//! Cluster status command

use anyhow::Result;
use colored::Colorize;

use crate::client::{ApiClient, ClusterStatus};
use crate::output::{color_status, print_json, print_info, print_success, OutputFormat};

/// Fetch the drift verdict for one cluster
pub async fn fetch_status(
    client: &ApiClient,
    project: &str,
    cluster: &str,
) -> Result<ClusterStatus> {
    client
        .get_with_query("status", &[("project", project), ("cluster", cluster)])
        .await
}

/// Show the drift verdict for one cluster
pub async fn show_status(
    client: &ApiClient,
    project: &str,
    cluster: &str,
    format: OutputFormat,
) -> Result<()> {
    let status = fetch_status(client, project, cluster).await?;

    match format {
        OutputFormat::Json => print_json(&status)?,
        OutputFormat::Table => {
            println!("{}", "Cluster Status".bold());
            println!("{}", "=".repeat(60));
            println!("Project: {}", status.project.cyan());
            println!("Cluster: {}", status.cluster.cyan());
            println!("State:   {}", color_status(&status.state));
            println!();

            if status.issues.is_empty() {
                print_success("No issues");
            } else {
                println!("{}", "Issues".bold());
                for issue in &status.issues {
                    println!("  - {}", issue);
                }
            }

            if !status.deployments_active.is_empty() {
                println!();
                print_info(&format!(
                    "Rollouts in progress: {}",
                    status.deployments_active.join(", ")
                ));
            }
        }
    }

    Ok(())
}
