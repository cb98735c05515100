//! Kube Monitor service
//!
//! HTTP surface and settings for the `kube-monitor` binary.

pub mod api;
pub mod config;
