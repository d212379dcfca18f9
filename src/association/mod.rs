// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Association manager.
//!
//! An association is a typed link from a custom resource to another resource (an index
//! store, a dashboard) or to a user-provided secret describing an external one. The
//! connection details of an association ([`AssociationConf`]) are cached as JSON in an
//! annotation on the associating resource by the controller of the referenced kind.
//!
//! On every reconcile the manager:
//! 1. lists the associations defined in spec ([`Associated::associations`])
//! 2. loads their conf ([`get_and_set`]), from the annotation or the external secret
//! 3. checks every defined association is configured ([`are_configured_if_set`])
//! 4. gates the rollout on the versions of the targets ([`allow_version`])
//! 5. materializes credentials and CA availability ([`resolve`]) for the configuration
//!    and the content hash

use k8s_openapi::api::core::v1::Secret;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use tracing::debug;

use crate::constants::{CA_FILE_NAME, KIND_BEAT, KIND_DASHBOARD};
use crate::crd::{AssociationConf, AssociationStatus, Beat, Dashboard, ObjectSelector};
use crate::errors::{Error, Result};
use crate::hash::{hash_bytes, ContentHash};
use crate::labels::{
    ASSOCIATION_CONF_PREFIX, DASHBOARD_CONF_ANNOTATION, INDEX_STORE_CONF_ANNOTATION,
    MONITORING_CONF_ANNOTATION_BASE,
};
use crate::names::{association_ca_mount_dir, association_ca_path, association_ca_volume_name, NamespacedName};
use crate::platform::{Object, Platform};
use crate::secrets;
use crate::version::Version;

pub mod controller;
pub mod external;

/// Length of the target digest in monitoring conf annotation names.
const MONITORING_ID_LENGTH: usize = 16;

/// Kind of link between two resources.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AssociationType {
    /// Output of a Beat, data source of a Dashboard
    IndexStore,
    /// Dashboards loaded by a Beat
    Dashboard,
    /// Stack monitoring destination
    Monitoring,
}

impl AssociationType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::IndexStore => "indexstore",
            Self::Dashboard => "dashboard",
            Self::Monitoring => "monitoring",
        }
    }

    /// Kind of the referenced resource, for messages.
    #[must_use]
    pub fn target_kind(self) -> &'static str {
        match self {
            Self::IndexStore | Self::Monitoring => "IndexStore",
            Self::Dashboard => KIND_DASHBOARD,
        }
    }
}

impl fmt::Display for AssociationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Annotation caching the conf of a monitoring association to `target`.
#[must_use]
pub fn monitoring_conf_annotation(target: &NamespacedName) -> String {
    let digest = hash_bytes(target.to_string().as_bytes());
    format!(
        "{MONITORING_CONF_ANNOTATION_BASE}-{}",
        &digest[..MONITORING_ID_LENGTH]
    )
}

/// One link from a custom resource to a target.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Association {
    /// Kind of the associating resource
    pub associated_kind: &'static str,
    /// The associating resource
    pub associated: NamespacedName,
    pub association_type: AssociationType,
    /// Reference to the target, namespace defaulted to the associating resource's
    pub target: ObjectSelector,
    /// Annotation holding the conf on the associating resource
    pub annotation: String,
    /// Position among associations of the same type, used to name CA volumes
    pub index: usize,
    /// Conf loaded during this reconcile
    pub conf: Option<AssociationConf>,
}

impl Association {
    fn new(
        associated_kind: &'static str,
        associated: &NamespacedName,
        association_type: AssociationType,
        target: &ObjectSelector,
        index: usize,
    ) -> Self {
        let target = if target.is_external() {
            target.clone()
        } else {
            target.with_default_namespace(&associated.namespace)
        };
        let annotation = match association_type {
            AssociationType::IndexStore => INDEX_STORE_CONF_ANNOTATION.to_string(),
            AssociationType::Dashboard => DASHBOARD_CONF_ANNOTATION.to_string(),
            AssociationType::Monitoring => monitoring_conf_annotation(&target.nsn()),
        };
        Self {
            associated_kind,
            associated: associated.clone(),
            association_type,
            target,
            annotation,
            index,
            conf: None,
        }
    }

    /// Namespaced name of the target. External targets live in the associating namespace.
    #[must_use]
    pub fn target_nsn(&self) -> NamespacedName {
        if self.target.is_external() {
            NamespacedName::new(
                self.associated.namespace.clone(),
                self.target.name_or_secret_name(),
            )
        } else {
            self.target.nsn()
        }
    }

    #[must_use]
    pub fn is_external(&self) -> bool {
        self.target.is_external()
    }

    /// Volume the CA of this association is mounted from.
    #[must_use]
    pub fn ca_volume_name(&self) -> String {
        association_ca_volume_name(self.association_type.as_str(), self.index)
    }

    /// Directory the CA of this association is mounted into.
    #[must_use]
    pub fn ca_mount_dir(&self) -> String {
        association_ca_mount_dir(self.association_type.as_str(), self.index)
    }

    /// Path of the CA file inside the container.
    #[must_use]
    pub fn ca_path(&self) -> String {
        association_ca_path(self.association_type.as_str(), self.index)
    }
}

/// A custom resource that can reference other resources.
pub trait Associated: Object {
    /// Version declared in spec.
    fn spec_version(&self) -> &str;

    /// Associations defined in spec, in a stable order.
    fn associations(&self) -> Vec<Association>;
}

fn nsn_of<K: Object>(object: &K) -> NamespacedName {
    let meta = object.meta();
    NamespacedName::new(
        meta.namespace.clone().unwrap_or_default(),
        meta.name.clone().unwrap_or_default(),
    )
}

/// Monitoring associations, one per distinct target across metrics and logs.
fn monitoring_associations(
    kind: &'static str,
    associated: &NamespacedName,
    monitoring: Option<&crate::crd::Monitoring>,
) -> Vec<Association> {
    let Some(monitoring) = monitoring else {
        return Vec::new();
    };
    let mut seen = BTreeSet::new();
    monitoring
        .metrics_refs()
        .chain(monitoring.logs_refs())
        .filter(|selector| seen.insert(selector.with_default_namespace(&associated.namespace).nsn()))
        .enumerate()
        .map(|(index, selector)| {
            Association::new(kind, associated, AssociationType::Monitoring, selector, index)
        })
        .collect()
}

impl Associated for Beat {
    fn spec_version(&self) -> &str {
        &self.spec.version
    }

    fn associations(&self) -> Vec<Association> {
        let nsn = nsn_of(self);
        let mut associations = Vec::new();
        if let Some(selector) = self.spec.index_store_ref.as_ref().filter(|s| s.is_defined()) {
            associations.push(Association::new(KIND_BEAT, &nsn, AssociationType::IndexStore, selector, 0));
        }
        if let Some(selector) = self.spec.dashboard_ref.as_ref().filter(|s| s.is_defined()) {
            associations.push(Association::new(KIND_BEAT, &nsn, AssociationType::Dashboard, selector, 0));
        }
        associations.extend(monitoring_associations(KIND_BEAT, &nsn, self.spec.monitoring.as_ref()));
        associations
    }
}

impl Associated for Dashboard {
    fn spec_version(&self) -> &str {
        &self.spec.version
    }

    fn associations(&self) -> Vec<Association> {
        let nsn = nsn_of(self);
        let mut associations = Vec::new();
        if let Some(selector) = self.spec.index_store_ref.as_ref().filter(|s| s.is_defined()) {
            associations.push(Association::new(KIND_DASHBOARD, &nsn, AssociationType::IndexStore, selector, 0));
        }
        associations.extend(monitoring_associations(KIND_DASHBOARD, &nsn, self.spec.monitoring.as_ref()));
        associations
    }
}

/// Decodes the conf cached under `annotation`.
///
/// Returns `None` when the annotation is absent or holds a conf that is not usable yet.
///
/// # Errors
///
/// Returns [`Error::InvalidAssociation`] when the annotation is not valid JSON.
pub fn conf_from_annotations(
    annotations: &BTreeMap<String, String>,
    association: &Association,
) -> Result<Option<AssociationConf>> {
    let Some(raw) = annotations.get(&association.annotation) else {
        return Ok(None);
    };
    let conf: AssociationConf =
        serde_json::from_str(raw).map_err(|e| Error::InvalidAssociation {
            association: association.association_type.to_string(),
            reason: format!("annotation {} is not a valid conf: {e}", association.annotation),
        })?;
    Ok(conf.is_configured().then_some(conf))
}

/// Loads the conf of an association and caches it on the association.
///
/// Internal associations read the annotation of the associating resource, external
/// ones read the user-provided secret.
///
/// # Errors
///
/// Returns [`Error::NotFound`] when the external secret does not exist and
/// [`Error::InvalidAssociation`] when the annotation or the secret is malformed.
pub async fn get_and_set<P: Platform>(
    platform: &P,
    annotations: &BTreeMap<String, String>,
    association: &mut Association,
) -> Result<Option<AssociationConf>> {
    let conf = if association.is_external() {
        let target = association.target_nsn();
        let secret: Secret = platform
            .get(&target.namespace, &target.name)
            .await?
            .ok_or_else(|| Error::not_found("Secret", &target.namespace, &target.name))?;
        Some(external::conf_from_secret(association.association_type, &secret)?)
    } else {
        conf_from_annotations(annotations, association)?
    };
    association.conf.clone_from(&conf);
    Ok(conf)
}

/// True when every association defined in spec has a usable conf.
#[must_use]
pub fn are_configured_if_set(associations: &[Association]) -> bool {
    associations.iter().all(|association| {
        let configured = association.conf.is_some();
        if !configured {
            debug!(
                associated = %association.associated,
                association = %association.association_type,
                target = %association.target_nsn(),
                "Association not configured yet"
            );
        }
        configured
    })
}

/// Outcome of the version gate.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VersionGate {
    Allowed,
    /// The rollout waits on an association, the message explains why.
    Delayed {
        association_type: AssociationType,
        message: String,
    },
}

/// Checks that every target runs a version compatible with `version`.
///
/// A target is compatible when it runs the same major.minor or a newer version. A target
/// without known version delays the rollout, except for external targets whose secret
/// does not declare one.
#[must_use]
pub fn allow_version(version: &Version, associations: &[Association]) -> VersionGate {
    for association in associations {
        let Some(conf) = association.conf.as_ref() else {
            return VersionGate::Delayed {
                association_type: association.association_type,
                message: format!(
                    "waiting for the {} association configuration",
                    association.association_type
                ),
            };
        };
        if conf.version.is_empty() {
            if association.is_external() {
                continue;
            }
            return VersionGate::Delayed {
                association_type: association.association_type,
                message: format!(
                    "waiting for the version of {} {}",
                    association.association_type.target_kind(),
                    association.target_nsn()
                ),
            };
        }
        let target_version = match Version::parse(&conf.version) {
            Ok(v) => v,
            Err(e) => {
                return VersionGate::Delayed {
                    association_type: association.association_type,
                    message: e.to_string(),
                }
            }
        };
        if !(target_version.gte(version) || target_version.same_minor(version)) {
            return VersionGate::Delayed {
                association_type: association.association_type,
                message: format!(
                    "Delaying deployment of version {version} since the referenced {} {} is not upgraded to {version} yet (running {target_version})",
                    association.association_type.target_kind(),
                    association.target_nsn(),
                ),
            };
        }
    }
    VersionGate::Allowed
}

/// Credentials to connect to a target.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Credentials {
    /// The target requires no authentication
    None,
    Basic { username: String, password: String },
    /// API key or service account token
    Token(String),
}

/// An association with everything needed to render configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedAssociation {
    pub association: Association,
    pub conf: AssociationConf,
    pub credentials: Credentials,
    /// The CA secret exists and holds a CA certificate
    pub ca_available: bool,
    /// `(secret name, resourceVersion)` of every secret the association reads
    pub secret_versions: Vec<(String, String)>,
}

impl ResolvedAssociation {
    /// Mixes the versions of the association secrets into a content hash.
    pub fn hash_into(&self, hash: &mut ContentHash) {
        for (name, version) in &self.secret_versions {
            hash.write_str(name).write_str(version);
        }
    }
}

async fn get_secret<P: Platform>(platform: &P, namespace: &str, name: &str) -> Result<Secret> {
    platform
        .get(namespace, name)
        .await?
        .ok_or_else(|| Error::not_found("Secret", namespace, name))
}

fn resource_version(secret: &Secret) -> String {
    secret.metadata.resource_version.clone().unwrap_or_default()
}

/// Materializes credentials and CA availability of a configured association.
///
/// # Errors
///
/// Returns [`Error::NotFound`] when the auth secret does not exist yet and
/// [`Error::MissingSecretKey`] when it lacks the credentials key. A missing CA secret is
/// not an error: the CA is reported unavailable until a later reconcile.
pub async fn resolve<P: Platform>(platform: &P, association: &Association) -> Result<ResolvedAssociation> {
    let conf = association.conf.clone().ok_or_else(|| Error::InvalidAssociation {
        association: association.association_type.to_string(),
        reason: "association is not configured".to_string(),
    })?;
    let namespace = association.associated.namespace.as_str();
    let mut secret_versions = Vec::new();

    let credentials = if conf.no_auth_required() {
        Credentials::None
    } else {
        let secret = get_secret(platform, namespace, &conf.auth_secret_name).await?;
        secret_versions.push((conf.auth_secret_name.clone(), resource_version(&secret)));
        if association.is_external() {
            external::credentials_from_secret(association.association_type, &secret)?
        } else {
            let value = secrets::string_value(&secret, &conf.auth_secret_key).ok_or_else(|| {
                Error::MissingSecretKey {
                    namespace: namespace.to_string(),
                    name: conf.auth_secret_name.clone(),
                    key: conf.auth_secret_key.clone(),
                }
            })?;
            if conf.service_account == Some(true) {
                Credentials::Token(value)
            } else {
                Credentials::Basic {
                    username: conf.auth_secret_key.clone(),
                    password: value,
                }
            }
        }
    };

    let mut ca_available = false;
    if conf.ca_cert_provided && !conf.ca_secret_name.is_empty() {
        match platform.get::<Secret>(namespace, &conf.ca_secret_name).await? {
            Some(secret) => {
                ca_available = secrets::has_value(&secret, CA_FILE_NAME);
                if conf.ca_secret_name != conf.auth_secret_name {
                    secret_versions.push((conf.ca_secret_name.clone(), resource_version(&secret)));
                }
            }
            None => debug!(
                namespace = %namespace,
                secret = %conf.ca_secret_name,
                "CA secret not found yet, omitting the CA from the configuration"
            ),
        }
    }

    Ok(ResolvedAssociation {
        association: association.clone(),
        conf,
        credentials,
        ca_available,
        secret_versions,
    })
}

/// Status of every association, keyed by type then target.
///
/// `failed` lists associations that cannot be established without a user change,
/// `established` tells whether configured associations passed the version gate.
#[must_use]
pub fn association_statuses(
    associations: &[Association],
    failed: &[NamespacedName],
    established: bool,
) -> BTreeMap<String, BTreeMap<String, AssociationStatus>> {
    let mut statuses: BTreeMap<String, BTreeMap<String, AssociationStatus>> = BTreeMap::new();
    for association in associations {
        let target = association.target_nsn();
        let status = if failed.contains(&target) {
            AssociationStatus::Failed
        } else if association.conf.is_some() && established {
            AssociationStatus::Established
        } else {
            AssociationStatus::Pending
        };
        statuses
            .entry(association.association_type.to_string())
            .or_default()
            .insert(target.to_string(), status);
    }
    statuses
}

/// Annotation patch removing confs of associations that no longer exist.
///
/// A singleton conf is also obsolete when the previously reported status recorded a
/// different target: the conf still describes the old target.
#[must_use]
pub fn obsolete_conf_patch(
    annotations: &BTreeMap<String, String>,
    associations: &[Association],
    previous: &BTreeMap<String, BTreeMap<String, AssociationStatus>>,
) -> BTreeMap<String, Option<String>> {
    let mut patch = BTreeMap::new();
    let live: BTreeSet<&str> = associations.iter().map(|a| a.annotation.as_str()).collect();

    for key in annotations.keys() {
        if key.starts_with(ASSOCIATION_CONF_PREFIX) && !live.contains(key.as_str()) {
            patch.insert(key.clone(), None);
        }
    }

    for association in associations {
        if association.association_type == AssociationType::Monitoring || association.is_external() {
            continue;
        }
        let Some(targets) = previous.get(association.association_type.as_str()) else {
            continue;
        };
        let current = association.target_nsn().to_string();
        if !targets.is_empty()
            && !targets.contains_key(&current)
            && annotations.contains_key(&association.annotation)
        {
            patch.insert(association.annotation.clone(), None);
        }
    }
    patch
}

/// Annotation patch storing `conf` under `annotation`.
///
/// # Errors
///
/// Returns [`Error::Json`] if the conf cannot be encoded.
pub fn conf_patch(annotation: &str, conf: &AssociationConf) -> Result<BTreeMap<String, Option<String>>> {
    Ok(BTreeMap::from([(
        annotation.to_string(),
        Some(serde_json::to_string(conf)?),
    )]))
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod mod_tests;
