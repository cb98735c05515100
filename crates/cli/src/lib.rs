//! kmctl - operator client for kube-monitor

pub mod client;
pub mod commands;
pub mod config;
pub mod output;
