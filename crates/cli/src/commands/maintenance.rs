//! Maintenance window commands

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use tabled::Tabled;

use crate::client::{ApiClient, MaintenanceRequest, MaintenanceState};
use crate::output::{color_status, format_time, print_json, print_rows, print_success, OutputFormat};

#[derive(Tabled)]
struct MaintenanceRow {
    #[tabled(rename = "Project")]
    project: String,
    #[tabled(rename = "Cluster")]
    cluster: String,
    #[tabled(rename = "Start")]
    start: String,
    #[tabled(rename = "End")]
    end: String,
    #[tabled(rename = "Workloads")]
    workloads: String,
    #[tabled(rename = "Status")]
    status: String,
}

/// List every scheduled window with its current status
pub async fn list_maintenance(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let states: Vec<MaintenanceState> = client.get("maintenance").await?;

    match format {
        OutputFormat::Json => print_json(&states)?,
        OutputFormat::Table => {
            let rows = states
                .iter()
                .map(|s| {
                    let request = &s.maintenance_request;
                    let workloads = request
                        .workloads_to_scale
                        .iter()
                        .map(|w| match s.original_replica_counts.get(w) {
                            Some(replicas) => format!("{} ({})", w, replicas),
                            None => w.clone(),
                        })
                        .collect::<Vec<_>>()
                        .join(", ");
                    MaintenanceRow {
                        project: request.project.clone(),
                        cluster: request.cluster.clone(),
                        start: format_time(&request.start_time),
                        end: format_time(&request.end_time),
                        workloads,
                        status: color_status(&s.maintenance_status),
                    }
                })
                .collect();
            print_rows(rows, "No maintenance scheduled");
        }
    }

    Ok(())
}

/// Schedule a window that scales `workloads` to zero between start and end
pub async fn schedule_maintenance(
    client: &ApiClient,
    request: MaintenanceRequest,
    format: OutputFormat,
) -> Result<()> {
    if request.end_time < request.start_time {
        bail!("--end must not be before --start");
    }

    let accepted: MaintenanceRequest = client.post("maintenance", &request).await?;

    match format {
        OutputFormat::Json => print_json(&accepted)?,
        OutputFormat::Table => print_success(&format!(
            "Maintenance scheduled for {}/{} from {} to {}",
            accepted.project,
            accepted.cluster,
            format_time(&accepted.start_time),
            format_time(&accepted.end_time)
        )),
    }

    Ok(())
}

/// Build a request from command-line values
pub fn build_request(
    project: String,
    cluster: String,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    workloads: Vec<String>,
) -> MaintenanceRequest {
    MaintenanceRequest {
        project,
        cluster,
        start_time: start,
        end_time: end,
        workloads_to_scale: workloads,
    }
}
