// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Common label and annotation constants used across all reconcilers.
//!
//! This module defines standard Kubernetes labels and Beacon-specific labels/annotations
//! so that every object the operator writes carries the same schema.

// ============================================================================
// Kubernetes Standard Labels
// https://kubernetes.io/docs/concepts/overview/working-with-objects/common-labels/
// ============================================================================

/// Standard label for the component name within the architecture
pub const K8S_COMPONENT: &str = "app.kubernetes.io/component";

/// Standard label for the tool being used to manage the operation of an application
pub const K8S_MANAGED_BY: &str = "app.kubernetes.io/managed-by";

/// Standard label for the name of the application
pub const K8S_NAME: &str = "app.kubernetes.io/name";

/// Standard label for a unique name identifying the instance of an application
pub const K8S_INSTANCE: &str = "app.kubernetes.io/instance";

/// Standard label for the name of a higher-level application this one is part of
pub const K8S_PART_OF: &str = "app.kubernetes.io/part-of";

// ============================================================================
// Kubernetes Standard Label Values
// ============================================================================

/// Value for `app.kubernetes.io/part-of`
pub const PART_OF_BEACON: &str = "beacon";

/// Value for `app.kubernetes.io/managed-by`
pub const MANAGED_BY_BEACON: &str = "beacon-operator";

/// Component value for log shipping agents
pub const COMPONENT_AGENT: &str = "agent";

/// Component value for dashboards
pub const COMPONENT_DASHBOARD: &str = "dashboard";

// ============================================================================
// Beacon-Specific Labels
// ============================================================================

/// Label carrying the kind discriminator (`filebeat`, `dashboard`, ...)
pub const TYPE_LABEL: &str = "beacon.firestoned.io/type";

/// Label carrying the owning custom resource name
pub const NAME_LABEL: &str = "beacon.firestoned.io/name";

/// Label carrying the stack version of the pods
pub const VERSION_LABEL: &str = "beacon.firestoned.io/version";

/// Label carrying the hex content hash of the rendered configuration
pub const CONFIG_HASH_LABEL: &str = "beacon.firestoned.io/config-hash";

/// Label carrying the hash of the pod template a workload was last written with
pub const TEMPLATE_HASH_LABEL: &str = "beacon.firestoned.io/template-hash";

/// Soft owner namespace label
pub const SOFT_OWNER_NAMESPACE_LABEL: &str = "beacon.firestoned.io/soft-owner-namespace";

/// Soft owner name label
pub const SOFT_OWNER_NAME_LABEL: &str = "beacon.firestoned.io/soft-owner-name";

/// Soft owner kind label
pub const SOFT_OWNER_KIND_LABEL: &str = "beacon.firestoned.io/soft-owner-kind";

// ============================================================================
// Beacon-Specific Annotations
// ============================================================================

/// Pod template annotation carrying the content hash, changing it rolls the pods
pub const CONFIG_HASH_ANNOTATION: &str = "beacon.firestoned.io/config-hash";

/// Setting this annotation to `"false"` opts a resource out of reconciliation
pub const MANAGED_ANNOTATION: &str = "beacon.firestoned.io/managed";

/// Setting this annotation to `"true"` permits version downgrades
pub const DISABLE_DOWNGRADE_VALIDATION_ANNOTATION: &str =
    "beacon.firestoned.io/disable-downgrade-validation";

/// Annotation written by `kubectl apply` holding the user-supplied manifest
pub const LAST_APPLIED_CONFIGURATION_ANNOTATION: &str =
    "kubectl.kubernetes.io/last-applied-configuration";

// ============================================================================
// Association Annotations
// ============================================================================

/// Prefix shared by every association conf annotation
pub const ASSOCIATION_CONF_PREFIX: &str = "association.beacon.firestoned.io/";

/// Annotation holding the index store association conf
pub const INDEX_STORE_CONF_ANNOTATION: &str = "association.beacon.firestoned.io/indexstore-conf";

/// Annotation holding the dashboard association conf
pub const DASHBOARD_CONF_ANNOTATION: &str = "association.beacon.firestoned.io/dashboard-conf";

/// Base of the annotations holding monitoring association confs, suffixed with `-<id>`
pub const MONITORING_CONF_ANNOTATION_BASE: &str =
    "association.beacon.firestoned.io/monitoring-conf";

// ============================================================================
// Annotation Values
// ============================================================================

/// Value used for boolean annotations
pub const ANNOTATION_TRUE: &str = "true";

/// Value used for boolean annotations
pub const ANNOTATION_FALSE: &str = "false";
