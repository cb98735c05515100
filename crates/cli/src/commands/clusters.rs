//! Monitored cluster configuration command

use anyhow::Result;
use tabled::Tabled;

use crate::client::{ApiClient, MonitoringConfig};
use crate::output::{print_json, print_rows, OutputFormat};

#[derive(Tabled)]
struct ClusterRow {
    #[tabled(rename = "Project")]
    project: String,
    #[tabled(rename = "Cluster")]
    name: String,
    #[tabled(rename = "Zone")]
    zone: String,
    #[tabled(rename = "Events")]
    events: String,
    #[tabled(rename = "Deployments")]
    deployments: String,
    #[tabled(rename = "StatefulSets")]
    stateful_sets: String,
}

/// Show the clusters the monitor is configured for
pub async fn show_config(client: &ApiClient, format: OutputFormat) -> Result<()> {
    match format {
        // Pass the document through untouched
        OutputFormat::Json => {
            let raw: serde_json::Value = client.get("config").await?;
            print_json(&raw)?;
        }
        OutputFormat::Table => {
            let config: MonitoringConfig = client.get("config").await?;
            let rows = config
                .clusters
                .into_iter()
                .map(|c| ClusterRow {
                    project: c.project,
                    name: c.name,
                    zone: c.zone,
                    events: if c.events.enabled { "on" } else { "off" }.to_string(),
                    deployments: c.expected_workloads.deployments.join(", "),
                    stateful_sets: c.expected_workloads.stateful_sets.join(", "),
                })
                .collect();
            print_rows(rows, "No clusters configured");
        }
    }

    Ok(())
}
