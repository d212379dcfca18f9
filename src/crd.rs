// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Custom Resource Definitions (CRDs) for log shippers and dashboards.
//!
//! This module defines the Kubernetes Custom Resource Definitions managed by Beacon.
//!
//! # Resource Types
//!
//! - [`Beat`] - a log/metrics shipper, run as a `DaemonSet` or a `Deployment`
//! - [`Dashboard`] - the visualization front-end, always run as a `Deployment`
//!
//! # Example: A filebeat shipping to an index store
//!
//! ```rust,no_run
//! use beacon::crd::{BeatSpec, DaemonSetSpec, ObjectSelector};
//!
//! let spec = BeatSpec {
//!     r#type: "filebeat".to_string(),
//!     version: "8.15.0".to_string(),
//!     index_store_ref: Some(ObjectSelector::named("es")),
//!     daemon_set: Some(DaemonSetSpec::default()),
//!     ..Default::default()
//! };
//! ```

use k8s_openapi::api::apps::v1::{DaemonSetUpdateStrategy, DeploymentStrategy};
use k8s_openapi::api::core::v1::PodTemplateSpec;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::names::NamespacedName;

/// Schema of free-form configuration trees.
///
/// The API server must keep every key the user writes, so the field is declared as an
/// object that preserves unknown fields.
fn preserve_unknown_fields(_: &mut schemars::SchemaGenerator) -> schemars::Schema {
    schemars::json_schema!({
        "type": "object",
        "x-kubernetes-preserve-unknown-fields": true
    })
}

/// Condition represents an observation of a resource's current state.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition. Beacon reports `Ready`.
    pub r#type: String,

    /// Status of the condition: True, False, or Unknown.
    pub status: String,

    /// Brief CamelCase reason for the condition's last transition.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Human-readable message indicating details about the transition.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Last time the condition transitioned from one status to another (RFC3339 format).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<String>,
}

/// Reference to another resource, or to a secret describing an external one.
///
/// Exactly one of `name` and `secretName` is set. `namespace` and `serviceName`
/// only make sense together with `name`.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ObjectSelector {
    /// Name of the referenced resource.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Namespace of the referenced resource. Defaults to the namespace of the referencing resource.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    /// Name of an existing service to reach the referenced resource through.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_name: Option<String>,

    /// Name of a secret holding `url`, `username`, `password` and optionally `ca.crt`
    /// of a resource not managed by this operator.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_name: Option<String>,
}

fn non_empty(value: Option<&String>) -> Option<&str> {
    value.map(String::as_str).filter(|v| !v.is_empty())
}

impl ObjectSelector {
    /// Reference by name in the namespace of the referencing resource.
    #[must_use]
    pub fn named(name: &str) -> Self {
        Self {
            name: Some(name.to_string()),
            ..Self::default()
        }
    }

    /// Reference to an external resource described by a secret.
    #[must_use]
    pub fn external(secret_name: &str) -> Self {
        Self {
            secret_name: Some(secret_name.to_string()),
            ..Self::default()
        }
    }

    /// Fills in the namespace when the selector omits it.
    #[must_use]
    pub fn with_default_namespace(&self, default_namespace: &str) -> Self {
        let mut selector = self.clone();
        if non_empty(selector.namespace.as_ref()).is_none() {
            selector.namespace = Some(default_namespace.to_string());
        }
        selector
    }

    /// The name, or the secret name for external references.
    #[must_use]
    pub fn name_or_secret_name(&self) -> &str {
        non_empty(self.name.as_ref())
            .or_else(|| non_empty(self.secret_name.as_ref()))
            .unwrap_or_default()
    }

    /// True when the selector points at something.
    #[must_use]
    pub fn is_defined(&self) -> bool {
        !self.name_or_secret_name().is_empty()
    }

    /// True when the reference is fulfilled by a user provided secret.
    #[must_use]
    pub fn is_external(&self) -> bool {
        non_empty(self.secret_name.as_ref()).is_some()
    }

    /// Namespaced name of the target. The namespace is empty when not set.
    #[must_use]
    pub fn nsn(&self) -> NamespacedName {
        NamespacedName::new(
            non_empty(self.namespace.as_ref()).unwrap_or_default(),
            self.name_or_secret_name(),
        )
    }

    /// Checks that the selector combines its fields correctly.
    ///
    /// # Errors
    ///
    /// Returns a message describing the first invalid combination.
    pub fn validate(&self) -> Result<(), &'static str> {
        let name = non_empty(self.name.as_ref());
        let namespace = non_empty(self.namespace.as_ref());
        let service_name = non_empty(self.service_name.as_ref());
        let secret_name = non_empty(self.secret_name.as_ref());

        if name.is_some() && secret_name.is_some() {
            return Err("specify name or secretName, not both");
        }
        if secret_name.is_some() && (service_name.is_some() || namespace.is_some()) {
            return Err(
                "serviceName or namespace can only be used in combination with name, not with secretName",
            );
        }
        if name.is_none() && service_name.is_some() {
            return Err("serviceName can only be used in combination with name");
        }
        if name.is_none() && namespace.is_some() {
            return Err("namespace can only be used in combination with name");
        }
        Ok(())
    }
}

/// Configuration stored in a user-provided secret.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ConfigRef {
    /// Name of the secret in the namespace of the resource.
    pub secret_name: String,

    /// Key holding the configuration. Defaults to the configuration file name of the kind.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

/// Secret whose entries are loaded into the keystore.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SecretSource {
    /// Name of the secret in the namespace of the resource.
    pub secret_name: String,
}

/// Index stores receiving one kind of telemetry.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MonitoringTargets {
    /// Index store to ship to. At most one is supported.
    #[serde(default)]
    pub index_store_refs: Vec<ObjectSelector>,
}

/// Stack monitoring of the resource itself.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Monitoring {
    /// Where metrics of the resource are shipped.
    #[serde(default)]
    pub metrics: MonitoringTargets,

    /// Where logs of the resource are shipped.
    #[serde(default)]
    pub logs: MonitoringTargets,
}

impl Monitoring {
    /// True when metrics or logs have at least one defined target.
    #[must_use]
    pub fn is_defined(&self) -> bool {
        self.metrics_refs().next().is_some() || self.logs_refs().next().is_some()
    }

    /// Defined metrics targets.
    pub fn metrics_refs(&self) -> impl Iterator<Item = &ObjectSelector> {
        self.metrics.index_store_refs.iter().filter(|r| r.is_defined())
    }

    /// Defined logs targets.
    pub fn logs_refs(&self) -> impl Iterator<Item = &ObjectSelector> {
        self.logs.index_store_refs.iter().filter(|r| r.is_defined())
    }
}

/// Runs the resource with one pod per node.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DaemonSetSpec {
    /// Pod template merged over the operator defaults.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod_template: Option<PodTemplateSpec>,

    /// Update strategy of the `DaemonSet`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_strategy: Option<DaemonSetUpdateStrategy>,
}

/// Runs the resource as a replicated `Deployment`.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentSpec {
    /// Pod template merged over the operator defaults.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod_template: Option<PodTemplateSpec>,

    /// Number of replicas. Defaults to 1.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(range(min = 0, max = 2_147_483_647))]
    pub replicas: Option<i32>,

    /// Rollout strategy of the `Deployment`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<DeploymentStrategy>,
}

/// `Beat` deploys a log or metrics shipper.
///
/// # Example
///
/// ```yaml
/// apiVersion: beacon.firestoned.io/v1beta1
/// kind: Beat
/// metadata:
///   name: logs
///   namespace: observability
/// spec:
///   type: filebeat
///   version: 8.15.0
///   indexStoreRef:
///     name: es
///   config:
///     filebeat.inputs:
///       - type: container
///         paths: ["/var/log/containers/*.log"]
///   daemonSet: {}
/// ```
#[derive(CustomResource, Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
#[kube(
    group = "beacon.firestoned.io",
    version = "v1beta1",
    kind = "Beat",
    namespaced,
    shortname = "bt",
    doc = "Beat represents a log or metrics shipper. Each Beat renders its configuration into a Secret and runs either as a DaemonSet or as a Deployment.",
    printcolumn = r#"{"name":"Health","type":"string","jsonPath":".status.health"}"#,
    printcolumn = r#"{"name":"Available","type":"integer","jsonPath":".status.availableNodes"}"#,
    printcolumn = r#"{"name":"Expected","type":"integer","jsonPath":".status.expectedNodes"}"#,
    printcolumn = r#"{"name":"Type","type":"string","jsonPath":".spec.type"}"#,
    printcolumn = r#"{"name":"Version","type":"string","jsonPath":".status.version"}"#
)]
#[kube(status = "WorkloadStatus")]
#[serde(rename_all = "camelCase")]
pub struct BeatSpec {
    /// Type of the Beat, e.g. `filebeat` or `metricbeat`.
    ///
    /// Types outside the known set are allowed when `image` is set.
    #[schemars(regex(pattern = r"^[a-zA-Z0-9-]+$"), length(max = 20))]
    pub r#type: String,

    /// Version of the Beat, e.g. "8.15.0".
    pub version: String,

    /// Container image override. Defaults to the official image of the type and version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    /// Inline Beat configuration. Mutually exclusive with `configRef`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(schema_with = "preserve_unknown_fields")]
    pub config: Option<serde_json::Value>,

    /// Secret holding the Beat configuration. Mutually exclusive with `config`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_ref: Option<ConfigRef>,

    /// Index store the Beat ships its output to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index_store_ref: Option<ObjectSelector>,

    /// Dashboard the Beat loads its dashboards into.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dashboard_ref: Option<ObjectSelector>,

    /// Stack monitoring of the Beat.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub monitoring: Option<Monitoring>,

    /// Secrets loaded into the Beat keystore.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub secure_settings: Vec<SecretSource>,

    /// Service account of the Beat pods.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_account_name: Option<String>,

    /// Run one pod per node. Mutually exclusive with `deployment`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub daemon_set: Option<DaemonSetSpec>,

    /// Run a replicated deployment. Mutually exclusive with `daemonSet`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment: Option<DeploymentSpec>,
}

/// TLS options of the Dashboard HTTP endpoint.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TlsOptions {
    /// Serve plain HTTP.
    #[serde(default)]
    pub disabled: bool,

    /// Secret with `tls.crt` and `tls.key` to serve. Defaults to the operator generated certificate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate_secret_name: Option<String>,
}

/// HTTP settings of the Dashboard.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HttpConfig {
    /// TLS settings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<TlsOptions>,
}

impl HttpConfig {
    /// True unless TLS is explicitly disabled.
    #[must_use]
    pub fn tls_enabled(&self) -> bool {
        !self.tls.as_ref().is_some_and(|tls| tls.disabled)
    }
}

/// `Dashboard` deploys the visualization front-end of the stack.
///
/// # Example
///
/// ```yaml
/// apiVersion: beacon.firestoned.io/v1beta1
/// kind: Dashboard
/// metadata:
///   name: kb
///   namespace: observability
/// spec:
///   version: 8.15.0
///   count: 2
///   indexStoreRef:
///     name: es
/// ```
#[derive(CustomResource, Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
#[kube(
    group = "beacon.firestoned.io",
    version = "v1beta1",
    kind = "Dashboard",
    namespaced,
    shortname = "dash",
    doc = "Dashboard represents the visualization front-end. Each Dashboard renders its configuration into a Secret and runs as a Deployment connected to an index store.",
    printcolumn = r#"{"name":"Health","type":"string","jsonPath":".status.health"}"#,
    printcolumn = r#"{"name":"Available","type":"integer","jsonPath":".status.availableNodes"}"#,
    printcolumn = r#"{"name":"Version","type":"string","jsonPath":".status.version"}"#
)]
#[kube(status = "WorkloadStatus")]
#[serde(rename_all = "camelCase")]
pub struct DashboardSpec {
    /// Version of the Dashboard, e.g. "8.15.0".
    pub version: String,

    /// Container image override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    /// Number of instances. Defaults to 1.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(range(min = 0, max = 2_147_483_647))]
    pub count: Option<i32>,

    /// Index store the Dashboard reads from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index_store_ref: Option<ObjectSelector>,

    /// Inline Dashboard configuration. Mutually exclusive with `configRef`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(schema_with = "preserve_unknown_fields")]
    pub config: Option<serde_json::Value>,

    /// Secret holding the Dashboard configuration. Mutually exclusive with `config`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_ref: Option<ConfigRef>,

    /// HTTP settings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http: Option<HttpConfig>,

    /// Secrets loaded into the Dashboard keystore.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub secure_settings: Vec<SecretSource>,

    /// Service account of the Dashboard pods.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_account_name: Option<String>,

    /// Pod template merged over the operator defaults.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod_template: Option<PodTemplateSpec>,

    /// Stack monitoring of the Dashboard.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub monitoring: Option<Monitoring>,
}

/// Connection details of an association, cached as JSON in an annotation.
///
/// Written by the association controller of the referenced resource, read by the
/// reconciler of the referencing resource.
#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AssociationConf {
    /// Secret holding the credentials, `-` when no authentication is required.
    #[serde(default)]
    pub auth_secret_name: String,

    /// Key of the credentials in the auth secret. Also the user name for basic auth.
    #[serde(default)]
    pub auth_secret_key: String,

    /// True when the target serves a certificate signed by the CA in `caSecretName`.
    #[serde(default, rename = "caCertProvided")]
    pub ca_cert_provided: bool,

    /// Secret holding `ca.crt`.
    #[serde(default)]
    pub ca_secret_name: String,

    /// URL of the target.
    #[serde(default)]
    pub url: String,

    /// Version of the target.
    #[serde(default)]
    pub version: String,

    /// The credentials are a service account token rather than a password.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_account: Option<bool>,
}

impl AssociationConf {
    /// True when the target requires no credentials.
    #[must_use]
    pub fn no_auth_required(&self) -> bool {
        self.auth_secret_name == crate::constants::NO_AUTH_REQUIRED
    }

    /// True when the conf is usable: an auth secret (or none required) and a URL.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        !self.auth_secret_name.is_empty() && !self.url.is_empty()
    }
}

/// Overall health of a resource.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Health {
    /// No instance is ready, or an association is not established.
    Red,
    /// Some instances are ready.
    Yellow,
    /// Every expected instance is ready and every association is established.
    Green,
}

/// State of one association.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub enum AssociationStatus {
    /// The target is not ready yet, or its version is not compatible yet.
    Pending,
    /// Connection details are known and usable.
    Established,
    /// The association cannot be established without a user change.
    Failed,
}

/// Status of a [`Beat`] or a [`Dashboard`].
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkloadStatus {
    #[serde(default)]
    pub conditions: Vec<Condition>,

    /// Last spec generation fully processed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    /// Lowest version running across the pods.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// Number of pods expected to run.
    #[serde(default)]
    pub expected_nodes: i32,

    /// Number of ready pods.
    #[serde(default)]
    pub available_nodes: i32,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub health: Option<Health>,

    /// Association states by association type, then by target `namespace/name`.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub associations: BTreeMap<String, BTreeMap<String, AssociationStatus>>,
}

#[cfg(test)]
#[path = "crd_tests.rs"]
mod crd_tests;
