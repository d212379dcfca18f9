// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Operator-wide configuration.
//!
//! [`OperatorConfig`] is built once in `main` from command line flags and cloned into
//! the controller context. It never changes while the operator runs.

use std::time::Duration;

use crate::constants::{
    DEFAULT_CONTAINER_REGISTRY, DEFAULT_METRICS_BIND_ADDRESS, DEFAULT_REQUEUE_AFTER_SECS,
};

/// IP family of the cluster network.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum IpFamily {
    #[default]
    Ipv4,
    Ipv6,
}

impl IpFamily {
    /// Address to bind to every interface.
    #[must_use]
    pub fn inaddr_any(self) -> &'static str {
        match self {
            Self::Ipv4 => "0.0.0.0",
            Self::Ipv6 => "::",
        }
    }
}

/// Immutable operator configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OperatorConfig {
    /// IP family used for bind addresses in rendered configurations
    pub ip_family: IpFamily,
    /// Create a service account and cluster role binding for Beats without one
    pub manage_autodiscover_rbac: bool,
    /// Requeue interval after a successful reconcile, to catch certificate rotations
    pub requeue_after: Duration,
    /// Registry default images are pulled from
    pub container_registry: String,
    /// Address the metrics endpoint listens on
    pub metrics_bind_address: String,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            ip_family: IpFamily::default(),
            manage_autodiscover_rbac: false,
            requeue_after: Duration::from_secs(DEFAULT_REQUEUE_AFTER_SECS),
            container_registry: DEFAULT_CONTAINER_REGISTRY.to_string(),
            metrics_bind_address: DEFAULT_METRICS_BIND_ADDRESS.to_string(),
        }
    }
}

impl OperatorConfig {
    /// Default image of a Beat: `<registry>/beats/<type>:<version>`.
    #[must_use]
    pub fn beat_image(&self, beat_type: &str, version: &str) -> String {
        format!("{}/beats/{beat_type}:{version}", self.container_registry)
    }

    /// Default image of a Dashboard: `<registry>/kibana/kibana:<version>`.
    #[must_use]
    pub fn dashboard_image(&self, version: &str) -> String {
        format!("{}/kibana/kibana:{version}", self.container_registry)
    }
}
