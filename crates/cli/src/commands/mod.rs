//! Subcommand implementations

pub mod clusters;
pub mod deployments;
pub mod maintenance;
pub mod status;
