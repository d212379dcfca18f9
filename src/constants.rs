// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Global constants for the Beacon operator.
//!
//! This module contains the numeric and string constants used throughout the codebase,
//! organized by category. Label and annotation keys live in [`crate::labels`].

// ============================================================================
// API Constants
// ============================================================================

/// API group for all Beacon CRDs
pub const API_GROUP: &str = "beacon.firestoned.io";

/// API version for all Beacon CRDs
pub const API_VERSION: &str = "v1beta1";

/// Fully qualified API version (group/version)
pub const API_GROUP_VERSION: &str = "beacon.firestoned.io/v1beta1";

/// Kind name for the `Beat` resource
pub const KIND_BEAT: &str = "Beat";

/// Kind name for the `Dashboard` resource
pub const KIND_DASHBOARD: &str = "Dashboard";

/// Field manager used for every write issued by the operator
pub const FIELD_MANAGER: &str = "beacon-controller";

// ============================================================================
// Validation Constants
// ============================================================================

/// Maximum length of a custom resource name.
///
/// Generated resource names use the CR name as a prefix and must stay valid DNS labels.
pub const MAX_NAME_LENGTH: usize = 36;

/// Maximum length of the Beat type discriminator
pub const MAX_BEAT_TYPE_LENGTH: usize = 20;

/// Oldest supported stack version (inclusive)
pub const MIN_SUPPORTED_VERSION: &str = "7.0.0";

/// First unsupported stack version (exclusive)
pub const MAX_SUPPORTED_VERSION: &str = "10.0.0";

/// Oldest version supporting stack monitoring through the metrics endpoint
pub const MIN_STACK_MONITORING_VERSION: &str = "7.14.0";

/// Known Beat types. Any other type is accepted as long as an image is provided.
pub const KNOWN_BEAT_TYPES: [&str; 6] = [
    "filebeat",
    "metricbeat",
    "heartbeat",
    "auditbeat",
    "journalbeat",
    "packetbeat",
];

// ============================================================================
// Naming Constants
// ============================================================================

/// Short kind segment used in generated Beat resource names (`<name>-beat-<type>`)
pub const BEAT_NAME_SEGMENT: &str = "beat";

/// Short kind segment used in generated Dashboard resource names (`<name>-dash`)
pub const DASHBOARD_NAME_SEGMENT: &str = "dash";

/// Suffix for rendered configuration secrets
pub const CONFIG_SUFFIX: &str = "config";

/// Suffix for the autodiscover service account and cluster role binding
pub const AUTODISCOVER_SUFFIX: &str = "autodiscover";

/// Suffix of the Dashboard HTTP certificates secret produced by the certificate collaborator
pub const DASHBOARD_HTTP_CERTS_SUFFIX: &str = "http-certs-internal";

/// Suffix of the Dashboard HTTP service
pub const DASHBOARD_HTTP_SERVICE_SUFFIX: &str = "http";

/// Pre-existing cluster role bound to autodiscover service accounts
pub const AUTODISCOVER_CLUSTER_ROLE: &str = "beacon-autodiscover";

/// Value of `authSecretName` for associations that need no credentials
pub const NO_AUTH_REQUIRED: &str = "-";

// ============================================================================
// Container and Volume Constants
// ============================================================================

/// Name of the Beat main container
pub const CONTAINER_NAME_BEAT: &str = "beat";

/// Name of the Dashboard main container
pub const CONTAINER_NAME_DASHBOARD: &str = "dashboard";

/// Name of the init container fixing data directory ownership
pub const CONTAINER_NAME_PERMISSIONS: &str = "permissions";

/// Name of the init container building the keystore
pub const CONTAINER_NAME_KEYSTORE: &str = "keystore";

/// Default container registry for stack images
pub const DEFAULT_CONTAINER_REGISTRY: &str = "docker.elastic.co";

/// Beat configuration file name, both the secret key and the mounted file
pub const BEAT_CONFIG_FILENAME: &str = "beat.yml";

/// Directory the Beat configuration is mounted into
pub const BEAT_CONFIG_MOUNT_DIR: &str = "/etc";

/// Dashboard configuration file name
pub const DASHBOARD_CONFIG_FILENAME: &str = "dashboard.yml";

/// Directory the Dashboard configuration is mounted into
pub const DASHBOARD_CONFIG_MOUNT_DIR: &str = "/usr/share/dashboard/config";

/// Volume name of the rendered configuration
pub const CONFIG_VOLUME_NAME: &str = "config";

/// File mode of the rendered configuration (octal 0600, decimal 384)
pub const CONFIG_FILE_MODE: i32 = 0o600;

/// Prefix under which operator-managed secrets are mounted
pub const INTERNAL_MOUNT_PREFIX: &str = "/mnt/elastic-internal";

/// Name of the CA file inside association certificate secrets
pub const CA_FILE_NAME: &str = "ca.crt";

/// Certificate file inside the HTTP certificates secret
pub const TLS_CERT_FILE_NAME: &str = "tls.crt";

/// Key file inside the HTTP certificates secret
pub const TLS_KEY_FILE_NAME: &str = "tls.key";

/// Volume name of the Dashboard HTTP certificates
pub const HTTP_CERTS_VOLUME_NAME: &str = "http-certs";

/// Mount path of the Dashboard HTTP certificates
pub const HTTP_CERTS_MOUNT_PATH: &str = "/mnt/elastic-internal/http-certs";

/// Host directory prefix for Beat data volumes
pub const HOST_DATA_PREFIX: &str = "/var/lib";

/// Prefix of the in-container data directory (`/usr/share/<type>/data`)
pub const DATA_MOUNT_PREFIX: &str = "/usr/share";

/// Mount path of the secure settings secrets consumed by the keystore init container
pub const SECURE_SETTINGS_MOUNT_PATH: &str = "/mnt/elastic-internal/secure-settings";

/// Directory of the shared Unix sockets used for stack monitoring
pub const MONITORING_SOCKET_DIR: &str = "/var/shared";

/// Dashboard HTTP port
pub const DASHBOARD_HTTP_PORT: i32 = 5601;

/// Default key of the user configuration inside a `configRef` secret
pub const DEFAULT_CONFIG_REF_KEY: &str = "beat.yml";

/// Default key of the user configuration inside a Dashboard `configRef` secret
pub const DEFAULT_DASHBOARD_CONFIG_REF_KEY: &str = "dashboard.yml";

/// Root user id, containers running with it skip the permissions init container
pub const ROOT_USER_ID: i64 = 0;

/// User id assumed when neither the container nor the pod sets `runAsUser`
pub const DEFAULT_IMAGE_USER_ID: i64 = 1000;

/// Name of the projected secure settings volume
pub const SECURE_SETTINGS_VOLUME_NAME: &str = "secure-settings";

/// Environment variable carrying the node name of a Beat pod
pub const NODE_NAME_ENV: &str = "NODE_NAME";

// ============================================================================
// Replica Constants
// ============================================================================

/// Default replicas for the replicated Beat shape
pub const DEFAULT_BEAT_REPLICAS: i32 = 1;

/// Default replicas for a Dashboard
pub const DEFAULT_DASHBOARD_COUNT: i32 = 1;

// ============================================================================
// Controller Timing Constants
// ============================================================================

/// Requeue interval after a successful reconcile, covers certificate rotation windows (10 hours)
pub const DEFAULT_REQUEUE_AFTER_SECS: u64 = 36_000;

/// Requeue interval used by the controller error policy
pub const ERROR_REQUEUE_DURATION_SECS: u64 = 30;

/// Requeue interval while an association is pending
pub const ASSOCIATION_PENDING_REQUEUE_SECS: u64 = 10;

/// Default metrics bind address
pub const DEFAULT_METRICS_BIND_ADDRESS: &str = "0.0.0.0:8080";

// ============================================================================
// Runtime Constants
// ============================================================================

/// Number of Tokio worker threads for the controller runtime
pub const TOKIO_WORKER_THREADS: usize = 4;

/// Thread name for controller runtime workers
pub const TOKIO_THREAD_NAME: &str = "beacon-controller";
