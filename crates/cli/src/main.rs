//! kmctl - kube-monitor CLI
//!
//! Query cluster drift status and tracked rollouts, inspect the
//! monitored clusters and schedule maintenance windows.

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use kmctl::client::{ApiClient, ApiError};
use kmctl::commands::{clusters, deployments, maintenance, status};
use kmctl::config::Config;
use kmctl::output::{print_error, OutputFormat};

/// kube-monitor CLI
#[derive(Parser)]
#[command(name = "kmctl")]
#[command(author, version, about = "CLI for kube-monitor", long_about = None)]
pub struct Cli {
    /// API endpoint URL (can also be set via KMCTL_API_URL env var)
    #[arg(long, env = "KMCTL_API_URL")]
    pub api_url: Option<String>,

    /// Output format
    #[arg(long, short)]
    pub format: Option<OutputFormat>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show the drift status of a cluster
    Status {
        #[arg(long, short)]
        project: String,

        #[arg(long, short)]
        cluster: String,
    },

    /// List rollouts detected by the watchers
    Deployments {
        /// Hide rollouts whose suppression window has passed
        #[arg(long)]
        active_only: bool,
    },

    /// Show the monitored clusters
    Config,

    /// Maintenance windows
    #[command(subcommand)]
    Maintenance(MaintenanceCommands),
}

#[derive(Subcommand)]
pub enum MaintenanceCommands {
    /// List scheduled windows
    List,

    /// Scale workloads to zero for a window, then restore them
    Schedule {
        #[arg(long, short)]
        project: String,

        #[arg(long, short)]
        cluster: String,

        /// Window start (RFC 3339, e.g. 2030-05-01T22:00:00Z)
        #[arg(long)]
        start: DateTime<Utc>,

        /// Window end (RFC 3339)
        #[arg(long)]
        end: DateTime<Utc>,

        /// Workload to scale down; repeat for several
        #[arg(long = "workload", short)]
        workloads: Vec<String>,
    },
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;
    let format = config.format(cli.format);
    let client = ApiClient::new(&config.api_url(cli.api_url))?;

    match cli.command {
        Commands::Status { project, cluster } => {
            status::show_status(&client, &project, &cluster, format).await?;
        }
        Commands::Deployments { active_only } => {
            deployments::list_deployments(&client, active_only, format).await?;
        }
        Commands::Config => {
            clusters::show_config(&client, format).await?;
        }
        Commands::Maintenance(cmd) => match cmd {
            MaintenanceCommands::List => {
                maintenance::list_maintenance(&client, format).await?;
            }
            MaintenanceCommands::Schedule {
                project,
                cluster,
                start,
                end,
                workloads,
            } => {
                let request = maintenance::build_request(project, cluster, start, end, workloads);
                maintenance::schedule_maintenance(&client, request, format).await?;
            }
        },
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        match e.downcast_ref::<ApiError>() {
            Some(api) if api.is_not_found() => print_error(&format!("Not found: {}", api.message)),
            _ => print_error(&format!("{:#}", e)),
        }
        std::process::exit(1);
    }
}
