// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Workload manifests for Beats and Dashboards.
//!
//! A workload is either a `DaemonSet` or a `Deployment`. The expected manifest carries a
//! hash of its spec in the [`TEMPLATE_HASH_LABEL`] label: the existing workload is only
//! rewritten when that hash, its labels or its owner differ. Switching shape deletes the
//! workload of the other shape.

use k8s_openapi::api::apps::v1::{
    DaemonSet, DaemonSetSpec, DaemonSetUpdateStrategy, Deployment, DeploymentSpec,
    DeploymentStrategy,
};
use k8s_openapi::api::core::v1::PodTemplateSpec;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta, OwnerReference};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::debug;

use crate::errors::Result;
use crate::hash::hash_bytes;
use crate::labels::TEMPLATE_HASH_LABEL;
use crate::platform::Platform;
use crate::reconcilers::resources::{delete_if_exists, is_subset, merged, reconcile_resource};

/// How the pods of a workload are run.
#[derive(Clone, Debug, PartialEq)]
pub enum Shape {
    /// One pod per node
    DaemonSet {
        update_strategy: Option<DaemonSetUpdateStrategy>,
    },
    /// A fixed number of replicas
    Deployment {
        replicas: i32,
        strategy: Option<DeploymentStrategy>,
    },
}

/// Everything needed to build a workload manifest.
#[derive(Clone, Debug)]
pub struct WorkloadParams {
    pub name: String,
    pub namespace: String,
    /// Identity labels, used as the immutable selector
    pub selector: BTreeMap<String, String>,
    /// Labels of the workload object itself
    pub labels: BTreeMap<String, String>,
    pub pod_template: PodTemplateSpec,
    pub shape: Shape,
    pub owner_references: Option<Vec<OwnerReference>>,
}

/// Pod counts reported by a workload.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WorkloadCounts {
    pub expected: i32,
    pub available: i32,
}

fn spec_hash<S: Serialize>(spec: &S) -> Result<String> {
    Ok(hash_bytes(&serde_json::to_vec(spec)?))
}

fn metadata(params: &WorkloadParams, hash: String) -> ObjectMeta {
    let mut labels = params.labels.clone();
    labels.insert(TEMPLATE_HASH_LABEL.to_string(), hash);
    ObjectMeta {
        name: Some(params.name.clone()),
        namespace: Some(params.namespace.clone()),
        labels: Some(labels),
        owner_references: params.owner_references.clone(),
        ..Default::default()
    }
}

fn selector(params: &WorkloadParams) -> LabelSelector {
    LabelSelector {
        match_labels: Some(params.selector.clone()),
        ..Default::default()
    }
}

/// Expected `DaemonSet` manifest.
///
/// # Errors
///
/// Returns [`crate::errors::Error::Json`] if the spec cannot be hashed.
pub fn expected_daemon_set(
    params: &WorkloadParams,
    update_strategy: Option<DaemonSetUpdateStrategy>,
) -> Result<DaemonSet> {
    let spec = DaemonSetSpec {
        selector: selector(params),
        template: params.pod_template.clone(),
        update_strategy,
        ..Default::default()
    };
    Ok(DaemonSet {
        metadata: metadata(params, spec_hash(&spec)?),
        spec: Some(spec),
        ..Default::default()
    })
}

/// Expected `Deployment` manifest.
///
/// # Errors
///
/// Returns [`crate::errors::Error::Json`] if the spec cannot be hashed.
pub fn expected_deployment(
    params: &WorkloadParams,
    replicas: i32,
    strategy: Option<DeploymentStrategy>,
) -> Result<Deployment> {
    let spec = DeploymentSpec {
        replicas: Some(replicas),
        selector: selector(params),
        template: params.pod_template.clone(),
        strategy,
        ..Default::default()
    };
    Ok(Deployment {
        metadata: metadata(params, spec_hash(&spec)?),
        spec: Some(spec),
        ..Default::default()
    })
}

fn metadata_needs_update(expected: &ObjectMeta, existing: &ObjectMeta) -> bool {
    !is_subset(expected.labels.as_ref(), existing.labels.as_ref())
        || expected.owner_references != existing.owner_references
}

fn updated_metadata(existing: &ObjectMeta, expected: &ObjectMeta) -> ObjectMeta {
    let mut metadata = existing.clone();
    metadata.labels = merged(existing.labels.as_ref(), expected.labels.as_ref());
    metadata.owner_references.clone_from(&expected.owner_references);
    metadata
}

/// Creates or updates the workload and removes the one of the other shape.
///
/// # Errors
///
/// Returns platform errors.
pub async fn reconcile_workload<P: Platform>(
    platform: &P,
    params: &WorkloadParams,
) -> Result<WorkloadCounts> {
    debug!(
        namespace = %params.namespace,
        name = %params.name,
        shape = ?params.shape,
        "Reconciling workload"
    );
    match &params.shape {
        Shape::DaemonSet { update_strategy } => {
            let expected = expected_daemon_set(params, update_strategy.clone())?;
            let stored = reconcile_resource(
                platform,
                &expected,
                |expected, existing| metadata_needs_update(&expected.metadata, &existing.metadata),
                |existing, expected| DaemonSet {
                    metadata: updated_metadata(&existing.metadata, &expected.metadata),
                    spec: expected.spec.clone(),
                    status: existing.status.clone(),
                },
            )
            .await?;
            delete_if_exists::<P, Deployment>(platform, &params.namespace, &params.name).await?;
            Ok(daemon_set_counts(&stored))
        }
        Shape::Deployment { replicas, strategy } => {
            let expected = expected_deployment(params, *replicas, strategy.clone())?;
            let stored = reconcile_resource(
                platform,
                &expected,
                |expected, existing| metadata_needs_update(&expected.metadata, &existing.metadata),
                |existing, expected| Deployment {
                    metadata: updated_metadata(&existing.metadata, &expected.metadata),
                    spec: expected.spec.clone(),
                    status: existing.status.clone(),
                },
            )
            .await?;
            delete_if_exists::<P, DaemonSet>(platform, &params.namespace, &params.name).await?;
            Ok(deployment_counts(&stored))
        }
    }
}

/// Scheduled and available pods of a `DaemonSet`.
#[must_use]
pub fn daemon_set_counts(daemon_set: &DaemonSet) -> WorkloadCounts {
    daemon_set
        .status
        .as_ref()
        .map(|s| WorkloadCounts {
            expected: s.desired_number_scheduled,
            available: s.number_available.unwrap_or(0),
        })
        .unwrap_or_default()
}

/// Desired and available replicas of a `Deployment`.
#[must_use]
pub fn deployment_counts(deployment: &Deployment) -> WorkloadCounts {
    WorkloadCounts {
        expected: deployment
            .spec
            .as_ref()
            .and_then(|s| s.replicas)
            .unwrap_or(0),
        available: deployment
            .status
            .as_ref()
            .and_then(|s| s.available_replicas)
            .unwrap_or(0),
    }
}

#[cfg(test)]
#[path = "workload_tests.rs"]
mod workload_tests;
