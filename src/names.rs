// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Deterministic naming of generated objects and paths.
//!
//! Every object the operator creates derives its name from the owning custom resource,
//! so names are stable across reconciles and restarts.

use std::fmt;

use crate::constants::{
    AUTODISCOVER_SUFFIX, BEAT_CONFIG_FILENAME, BEAT_CONFIG_MOUNT_DIR, BEAT_NAME_SEGMENT,
    CA_FILE_NAME, CONFIG_SUFFIX, DASHBOARD_CONFIG_FILENAME, DASHBOARD_CONFIG_MOUNT_DIR,
    DASHBOARD_HTTP_CERTS_SUFFIX, DASHBOARD_HTTP_PORT, DASHBOARD_HTTP_SERVICE_SUFFIX,
    DASHBOARD_NAME_SEGMENT, DATA_MOUNT_PREFIX, HOST_DATA_PREFIX, INTERNAL_MOUNT_PREFIX,
    MONITORING_SOCKET_DIR,
};

/// Namespace and name of an object, the primary key on the platform.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct NamespacedName {
    pub namespace: String,
    pub name: String,
}

impl NamespacedName {
    #[must_use]
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for NamespacedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

// ============================================================================
// Beat names
// ============================================================================

/// Workload name of a Beat: `<name>-beat-<type>`, the type lowercased.
#[must_use]
pub fn beat_workload_name(name: &str, beat_type: &str) -> String {
    format!(
        "{name}-{BEAT_NAME_SEGMENT}-{}",
        beat_type.to_ascii_lowercase()
    )
}

/// Rendered configuration secret of a Beat: `<name>-beat-<type>-config`.
#[must_use]
pub fn beat_config_secret_name(name: &str, beat_type: &str) -> String {
    format!("{}-{CONFIG_SUFFIX}", beat_workload_name(name, beat_type))
}

/// Autodiscover service account and cluster role binding name.
#[must_use]
pub fn beat_autodiscover_name(name: &str, beat_type: &str) -> String {
    format!("{}-{AUTODISCOVER_SUFFIX}", beat_workload_name(name, beat_type))
}

/// Cluster role bindings are cluster scoped, so the namespace is part of the name.
#[must_use]
pub fn beat_autodiscover_binding_name(namespace: &str, name: &str, beat_type: &str) -> String {
    format!("{namespace}-{}", beat_autodiscover_name(name, beat_type))
}

/// Mount path of the Beat configuration file: `/etc/beat.yml`.
#[must_use]
pub fn beat_config_mount_path() -> String {
    format!("{BEAT_CONFIG_MOUNT_DIR}/{BEAT_CONFIG_FILENAME}")
}

/// Host path of the Beat data volume: `/var/lib/<type>/<namespace>/<name>/<type>-data`.
#[must_use]
pub fn beat_host_data_path(namespace: &str, name: &str, beat_type: &str) -> String {
    format!("{HOST_DATA_PREFIX}/{beat_type}/{namespace}/{name}/{beat_type}-data")
}

/// In-container data directory: `/usr/share/<type>/data`.
#[must_use]
pub fn data_mount_path(kind: &str) -> String {
    format!("{DATA_MOUNT_PREFIX}/{kind}/data")
}

/// Data volume name: `<type>-data`, the type lowercased.
#[must_use]
pub fn data_volume_name(kind: &str) -> String {
    format!("{}-data", kind.to_ascii_lowercase())
}

/// Unix socket used to expose Beat metrics to stack monitoring.
#[must_use]
pub fn monitoring_socket_url(beat_type: &str, namespace: &str, name: &str) -> String {
    format!("unix://{MONITORING_SOCKET_DIR}/{beat_type}-{namespace}-{name}.sock")
}

// ============================================================================
// Dashboard names
// ============================================================================

/// Workload name of a Dashboard: `<name>-dash`.
#[must_use]
pub fn dashboard_workload_name(name: &str) -> String {
    format!("{name}-{DASHBOARD_NAME_SEGMENT}")
}

/// Rendered configuration secret of a Dashboard: `<name>-dash-config`.
#[must_use]
pub fn dashboard_config_secret_name(name: &str) -> String {
    format!("{}-{CONFIG_SUFFIX}", dashboard_workload_name(name))
}

/// HTTP certificates secret produced by the certificate collaborator.
#[must_use]
pub fn dashboard_http_certs_secret_name(name: &str) -> String {
    format!("{}-{DASHBOARD_HTTP_CERTS_SUFFIX}", dashboard_workload_name(name))
}

/// HTTP service of a Dashboard.
#[must_use]
pub fn dashboard_http_service_name(name: &str) -> String {
    format!("{}-{DASHBOARD_HTTP_SERVICE_SUFFIX}", dashboard_workload_name(name))
}

/// In-cluster URL of a Dashboard.
#[must_use]
pub fn dashboard_service_url(namespace: &str, name: &str, tls: bool) -> String {
    let scheme = if tls { "https" } else { "http" };
    format!(
        "{scheme}://{}.{namespace}.svc:{DASHBOARD_HTTP_PORT}",
        dashboard_http_service_name(name)
    )
}

/// Mount path of the Dashboard configuration file.
#[must_use]
pub fn dashboard_config_mount_path() -> String {
    format!("{DASHBOARD_CONFIG_MOUNT_DIR}/{DASHBOARD_CONFIG_FILENAME}")
}

// ============================================================================
// Association names
// ============================================================================

/// Volume name holding the CA of an association.
#[must_use]
pub fn association_ca_volume_name(association_type: &str, index: usize) -> String {
    if index == 0 {
        format!("{association_type}-certs")
    } else {
        format!("{association_type}-certs-{index}")
    }
}

/// Directory the CA of an association is mounted into.
#[must_use]
pub fn association_ca_mount_dir(association_type: &str, index: usize) -> String {
    format!(
        "{INTERNAL_MOUNT_PREFIX}/{}",
        association_ca_volume_name(association_type, index)
    )
}

/// Path of the CA file of an association, e.g. `/mnt/elastic-internal/indexstore-certs/ca.crt`.
#[must_use]
pub fn association_ca_path(association_type: &str, index: usize) -> String {
    format!(
        "{}/{CA_FILE_NAME}",
        association_ca_mount_dir(association_type, index)
    )
}

#[cfg(test)]
#[path = "names_tests.rs"]
mod names_tests;
