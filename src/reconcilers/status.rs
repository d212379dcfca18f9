// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Status computation and condition helpers.
//!
//! A reconcile collects every status change in a [`WorkloadStatusUpdater`] and writes them
//! in a single status update at the end. Nothing is written when the status is
//! semantically unchanged, so a steady-state reconcile does not wake itself up again.
//!
//! # Condition Format
//!
//! Kubernetes conditions follow a standard format:
//! - `type`: The aspect of the resource being reported (`Ready`)
//! - `status`: "True", "False", or "Unknown"
//! - `reason`: A programmatic identifier (CamelCase)
//! - `message`: A human-readable explanation
//! - `lastTransitionTime`: RFC3339 timestamp when the condition changed
//!
//! # Example
//!
//! ```rust,no_run
//! use beacon::reconcilers::status::create_condition;
//!
//! let condition = create_condition("Ready", "True", "AllReady", "3/3 pods are ready");
//! assert_eq!(condition.status, "True");
//! ```

use chrono::Utc;
use k8s_openapi::api::core::v1::Pod;
use kube::Resource;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;

use crate::association::Associated;
use crate::context::Context;
use crate::crd::{AssociationStatus, Beat, Condition, Dashboard, Health, WorkloadStatus};
use crate::errors::{Error, Result};
use crate::labels::VERSION_LABEL;
use crate::metrics::record_reconciliation_requeue;
use crate::platform::{EventRecord, Platform};
use crate::reconcilers::results::Results;
use crate::status_reasons::{
    CONDITION_STATUS_FALSE, CONDITION_STATUS_TRUE, CONDITION_TYPE_READY,
    EVENT_ACTION_RECONCILE, EVENT_REASON_ASSOCIATION_STATUS_CHANGE, REASON_ALL_READY,
    REASON_ASSOCIATION_PENDING, REASON_NOT_READY, REASON_PARTIALLY_READY,
};
use crate::version::Version;

/// Association states by type, then by target.
pub type AssociationStatusMap = BTreeMap<String, BTreeMap<String, AssociationStatus>>;

/// A custom resource reporting a [`WorkloadStatus`].
pub trait HasWorkloadStatus: Associated {
    fn workload_status(&self) -> Option<&WorkloadStatus>;
}

impl HasWorkloadStatus for Beat {
    fn workload_status(&self) -> Option<&WorkloadStatus> {
        self.status.as_ref()
    }
}

impl HasWorkloadStatus for Dashboard {
    fn workload_status(&self) -> Option<&WorkloadStatus> {
        self.status.as_ref()
    }
}

/// Create a new Kubernetes condition with the current timestamp.
///
/// # Arguments
///
/// * `condition_type` - The type of condition (e.g., "Ready")
/// * `status` - The status: "True", "False", or "Unknown"
/// * `reason` - A programmatic identifier in `CamelCase`
/// * `message` - A human-readable explanation
#[must_use]
pub fn create_condition(
    condition_type: &str,
    status: &str,
    reason: &str,
    message: &str,
) -> Condition {
    Condition {
        r#type: condition_type.to_string(),
        status: status.to_string(),
        reason: Some(reason.to_string()),
        message: Some(message.to_string()),
        last_transition_time: Some(Utc::now().to_rfc3339()),
    }
}

/// Find a condition by type in a list of conditions.
#[must_use]
pub fn find_condition<'a>(
    conditions: &'a [Condition],
    condition_type: &str,
) -> Option<&'a Condition> {
    conditions.iter().find(|c| c.r#type == condition_type)
}

/// Update or add a condition in a mutable conditions list (in-memory, no API call).
///
/// The `lastTransitionTime` is preserved when the status does not change.
pub fn update_condition_in_memory(
    conditions: &mut Vec<Condition>,
    condition_type: &str,
    status: &str,
    reason: &str,
    message: &str,
) {
    if let Some(existing) = conditions.iter_mut().find(|c| c.r#type == condition_type) {
        let last_transition_time = if existing.status == status {
            existing
                .last_transition_time
                .clone()
                .unwrap_or_else(|| Utc::now().to_rfc3339())
        } else {
            Utc::now().to_rfc3339()
        };

        existing.status = status.to_string();
        existing.reason = Some(reason.to_string());
        existing.message = Some(message.to_string());
        existing.last_transition_time = Some(last_transition_time);
    } else {
        conditions.push(create_condition(condition_type, status, reason, message));
    }
}

/// Compare two condition lists ignoring `lastTransitionTime`.
#[must_use]
pub fn conditions_equal(current: &[Condition], new: &[Condition]) -> bool {
    current.len() == new.len()
        && new.iter().all(|new_cond| {
            find_condition(current, &new_cond.r#type).is_some_and(|curr_cond| {
                curr_cond.status == new_cond.status
                    && curr_cond.reason == new_cond.reason
                    && curr_cond.message == new_cond.message
            })
        })
}

/// Health from pod readiness and association state.
///
/// Any association not established forces red. Otherwise no ready pod is red, every
/// expected pod ready is green, and anything in between is yellow.
#[must_use]
pub fn compute_health(expected: i32, available: i32, associations_established: bool) -> Health {
    if !associations_established || available <= 0 {
        Health::Red
    } else if available >= expected {
        Health::Green
    } else {
        Health::Yellow
    }
}

/// True when every association in the map is established.
#[must_use]
pub fn all_established(associations: &AssociationStatusMap) -> bool {
    associations
        .values()
        .flat_map(BTreeMap::values)
        .all(|s| *s == AssociationStatus::Established)
}

/// Lowest version label across the pods selected by `selector`.
///
/// # Errors
///
/// Returns platform errors from listing the pods.
pub async fn observed_version<P: Platform>(
    platform: &P,
    namespace: &str,
    selector: &BTreeMap<String, String>,
) -> Result<Option<String>> {
    let pods: Vec<Pod> = platform.list(namespace, selector).await?;
    let versions: Vec<Version> = pods
        .iter()
        .filter_map(|pod| pod.metadata.labels.as_ref()?.get(VERSION_LABEL))
        .filter_map(|raw| match Version::parse(raw) {
            Ok(version) => Some(version),
            Err(e) => {
                debug!(version = %raw, "Ignoring pod with unparseable version label: {e}");
                None
            }
        })
        .collect();
    Ok(Version::min_of(&versions).map(|v| v.to_string()))
}

fn describe(associations: &AssociationStatusMap) -> String {
    let entries: Vec<String> = associations
        .iter()
        .flat_map(|(kind, targets)| {
            targets
                .iter()
                .map(move |(target, status)| format!("{kind} {target}: {status:?}"))
        })
        .collect();
    format!("[{}]", entries.join(", "))
}

/// Collects status changes for one reconcile and applies them in one API call.
pub struct WorkloadStatusUpdater<'a, K: HasWorkloadStatus> {
    object: &'a K,
    current: Option<WorkloadStatus>,
    new_status: WorkloadStatus,
}

impl<'a, K: HasWorkloadStatus> WorkloadStatusUpdater<'a, K> {
    /// Starts from the current status of `object`.
    #[must_use]
    pub fn new(object: &'a K) -> Self {
        let current = object.workload_status().cloned();
        let new_status = current.clone().unwrap_or_default();
        Self {
            object,
            current,
            new_status,
        }
    }

    pub fn set_counts(&mut self, expected: i32, available: i32) {
        self.new_status.expected_nodes = expected;
        self.new_status.available_nodes = available;
    }

    /// Sets the observed version, keeping the previous one when no pod reports any.
    pub fn set_version(&mut self, version: Option<String>) {
        if version.is_some() {
            self.new_status.version = version;
        }
    }

    pub fn set_associations(&mut self, associations: AssociationStatusMap) {
        self.new_status.associations = associations;
    }

    pub fn set_observed_generation(&mut self, generation: Option<i64>) {
        self.new_status.observed_generation = generation;
    }

    /// Sets health and the matching `Ready` condition.
    pub fn set_health(&mut self, health: Health) {
        self.new_status.health = Some(health);
        let expected = self.new_status.expected_nodes;
        let available = self.new_status.available_nodes;
        let message = format!("{available}/{expected} pods are ready");
        let (status, reason) = match health {
            Health::Green => (CONDITION_STATUS_TRUE, REASON_ALL_READY),
            Health::Yellow => (CONDITION_STATUS_FALSE, REASON_PARTIALLY_READY),
            Health::Red if !all_established(&self.new_status.associations) => {
                (CONDITION_STATUS_FALSE, REASON_ASSOCIATION_PENDING)
            }
            Health::Red => (CONDITION_STATUS_FALSE, REASON_NOT_READY),
        };
        update_condition_in_memory(
            &mut self.new_status.conditions,
            CONDITION_TYPE_READY,
            status,
            reason,
            &message,
        );
    }

    /// Reports a failed reconcile on the `Ready` condition.
    pub fn set_error(&mut self, error: &Error) {
        update_condition_in_memory(
            &mut self.new_status.conditions,
            CONDITION_TYPE_READY,
            CONDITION_STATUS_FALSE,
            error.status_reason(),
            &error.to_string(),
        );
    }

    #[must_use]
    pub fn status(&self) -> &WorkloadStatus {
        &self.new_status
    }

    /// True when the association map differs from the one last reported.
    #[must_use]
    pub fn associations_changed(&self) -> bool {
        let previous = self.current.as_ref().map(|s| &s.associations);
        match previous {
            Some(previous) => *previous != self.new_status.associations,
            None => !self.new_status.associations.is_empty(),
        }
    }

    /// True when the status differs semantically from the current one.
    #[must_use]
    pub fn has_changes(&self) -> bool {
        match &self.current {
            None => true,
            Some(current) => {
                current.observed_generation != self.new_status.observed_generation
                    || current.version != self.new_status.version
                    || current.expected_nodes != self.new_status.expected_nodes
                    || current.available_nodes != self.new_status.available_nodes
                    || current.health != self.new_status.health
                    || current.associations != self.new_status.associations
                    || !conditions_equal(&current.conditions, &self.new_status.conditions)
            }
        }
    }

    /// Writes the collected status when it changed.
    ///
    /// A conflict is not an error: the object changed since it was read, the returned
    /// results ask for an immediate requeue.
    ///
    /// # Errors
    ///
    /// Returns platform errors other than conflicts.
    pub async fn apply<P: Platform>(self, ctx: &Context<P>) -> Result<Results> {
        let kind = K::kind(&()).to_string();
        let meta = self.object.meta();
        let namespace = meta.namespace.clone().unwrap_or_default();
        let name = meta.name.clone().unwrap_or_default();

        if !self.has_changes() {
            debug!("{kind} {namespace}/{name} status unchanged, skipping update");
            return Ok(Results::new());
        }

        if self.associations_changed() {
            let previous = self
                .current
                .as_ref()
                .map(|s| describe(&s.associations))
                .unwrap_or_else(|| "[]".to_string());
            ctx.emit(
                self.object,
                EventRecord::normal(
                    EVENT_REASON_ASSOCIATION_STATUS_CHANGE,
                    EVENT_ACTION_RECONCILE,
                    format!(
                        "Association status changed from {previous} to {}",
                        describe(&self.new_status.associations)
                    ),
                ),
            )
            .await;
        }

        let status = serde_json::to_value(&self.new_status)?;
        match ctx.platform.update_status(self.object, status).await {
            Ok(()) => {
                debug!(
                    "Updated {kind} {namespace}/{name} status: health {:?}, {}/{} available",
                    self.new_status.health,
                    self.new_status.available_nodes,
                    self.new_status.expected_nodes
                );
                Ok(Results::new())
            }
            Err(e) if e.is_conflict() => {
                debug!("Conflict updating {kind} {namespace}/{name} status, requeueing");
                record_reconciliation_requeue(&kind, "conflict");
                Ok(Results::requeue(Duration::ZERO))
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
#[path = "status_tests.rs"]
mod status_tests;
