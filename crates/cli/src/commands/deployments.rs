//! Tracked rollouts command

use anyhow::Result;
use chrono::Utc;
use colored::Colorize;
use tabled::Tabled;

use crate::client::{ApiClient, DetectedDeployment};
use crate::output::{format_time, print_json, print_rows, OutputFormat};

#[derive(Tabled)]
struct DeploymentRow {
    #[tabled(rename = "Project")]
    project: String,
    #[tabled(rename = "Cluster")]
    cluster: String,
    #[tabled(rename = "Workload")]
    workload: String,
    #[tabled(rename = "Expires")]
    expires: String,
    #[tabled(rename = "Active")]
    active: String,
}

/// List every rollout the monitor has seen, expired ones included
pub async fn list_deployments(
    client: &ApiClient,
    active_only: bool,
    format: OutputFormat,
) -> Result<()> {
    let now = Utc::now();
    let mut deployments: Vec<DetectedDeployment> = client.get("deployments").await?;
    if active_only {
        deployments.retain(|d| d.expiration >= now);
    }

    match format {
        OutputFormat::Json => print_json(&deployments)?,
        OutputFormat::Table => {
            let rows = deployments
                .iter()
                .map(|d| DeploymentRow {
                    project: d.project.clone(),
                    cluster: d.cluster.clone(),
                    workload: d.workload_name.clone(),
                    expires: format_time(&d.expiration),
                    active: if d.expiration >= now {
                        "yes".green().to_string()
                    } else {
                        "no".dimmed().to_string()
                    },
                })
                .collect();
            print_rows(rows, "No deployments tracked");
        }
    }

    Ok(())
}
