// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Reconcile steps shared by the Beat and Dashboard drivers.
//!
//! A driver reconcile runs in this order:
//!
//! 1. [`reconcile_associations`] strips obsolete association confs, loads the current
//!    ones, applies the version gate and resolves credentials. When an association is
//!    not usable yet it writes the status itself and the driver stops.
//! 2. The driver renders its configuration and reconciles its secret and workload.
//! 3. [`update_status`] reports pod counts, version, associations and health.
//!
//! Errors are reported once, at the top of the driver, by [`report_error`].

use kube::{Resource, ResourceExt};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

use crate::association::{
    are_configured_if_set, association_statuses, get_and_set, obsolete_conf_patch, resolve,
    allow_version, Association, AssociationType, ResolvedAssociation, VersionGate,
};
use crate::constants::NO_AUTH_REQUIRED;
use crate::context::Context;
use crate::crd::Health;
use crate::errors::{Error, Result};
use crate::hash::ContentHash;
use crate::labels::{ANNOTATION_FALSE, MANAGED_ANNOTATION};
use crate::metrics::{record_delayed_rollout, record_error};
use crate::names::NamespacedName;
use crate::platform::{EventRecord, Object, Platform};
use crate::reconcilers::results::Results;
use crate::reconcilers::status::{
    all_established, compute_health, observed_version, AssociationStatusMap, HasWorkloadStatus,
    WorkloadStatusUpdater,
};
use crate::reconcilers::workload::WorkloadCounts;
use crate::status_reasons::{
    EVENT_ACTION_RECONCILE, EVENT_ACTION_VALIDATE, EVENT_REASON_ASSOCIATION_ERROR,
    EVENT_REASON_DELAYED,
};
use crate::version::Version;
use crate::watches::association_watch_key;

const ASSOCIATION_TYPES: [AssociationType; 3] = [
    AssociationType::IndexStore,
    AssociationType::Dashboard,
    AssociationType::Monitoring,
];

/// Namespace and name of an object.
#[must_use]
pub fn nsn_of<K: Object>(object: &K) -> NamespacedName {
    NamespacedName::new(object.namespace().unwrap_or_default(), object.name_any())
}

/// False when the object opted out of reconciliation.
#[must_use]
pub fn is_managed<K: Object>(object: &K) -> bool {
    object
        .annotations()
        .get(MANAGED_ANNOTATION)
        .is_none_or(|value| value != ANNOTATION_FALSE)
}

/// True once the platform marked the object for deletion.
#[must_use]
pub fn is_being_deleted<K: Object>(object: &K) -> bool {
    object.meta().deletion_timestamp.is_some()
}

/// Outcome of the association phase.
#[derive(Debug)]
pub enum AssociationPhase {
    /// Every association is usable: configuration can be rendered.
    Ready {
        resolved: Vec<ResolvedAssociation>,
        statuses: AssociationStatusMap,
    },
    /// The status was reported, the reconcile stops here.
    Done(Results),
}

/// Secrets an association reads, watched so that rotations wake the owner up.
fn watched_secrets(association: &Association) -> Vec<NamespacedName> {
    let namespace = &association.associated.namespace;
    let mut targets = Vec::new();
    if association.is_external() {
        targets.push(association.target_nsn());
    }
    if let Some(conf) = &association.conf {
        if conf.auth_secret_name != NO_AUTH_REQUIRED && !conf.auth_secret_name.is_empty() {
            targets.push(NamespacedName::new(namespace, &conf.auth_secret_name));
        }
        if !conf.ca_secret_name.is_empty() {
            targets.push(NamespacedName::new(namespace, &conf.ca_secret_name));
        }
    }
    targets
}

fn register_association_watches<P: Platform>(
    ctx: &Context<P>,
    owner_kind: &str,
    owner: &NamespacedName,
    associations: &[Association],
) {
    let mut by_type: BTreeMap<AssociationType, BTreeSet<NamespacedName>> = BTreeMap::new();
    for association in associations {
        by_type
            .entry(association.association_type)
            .or_default()
            .extend(watched_secrets(association));
    }
    for association_type in ASSOCIATION_TYPES {
        ctx.watches.secrets.register(
            &association_watch_key(owner_kind, association_type.as_str(), owner),
            owner_kind,
            owner,
            by_type.remove(&association_type).unwrap_or_default(),
        );
    }
}

async fn report_pending<P: Platform, K: HasWorkloadStatus>(
    ctx: &Context<P>,
    object: &K,
    statuses: AssociationStatusMap,
) -> Result<Results> {
    let mut updater = WorkloadStatusUpdater::new(object);
    updater.set_associations(statuses);
    updater.set_health(Health::Red);
    updater.apply(ctx).await
}

/// Loads, gates and resolves the associations of `object`.
///
/// Returns the object as re-read after obsolete confs were removed, and the phase
/// outcome.
///
/// # Errors
///
/// Returns [`Error::NotFound`] for missing referenced secrets and platform errors.
pub async fn reconcile_associations<P: Platform, K: HasWorkloadStatus>(
    ctx: &Context<P>,
    object: K,
) -> Result<(K, AssociationPhase)> {
    let kind = K::kind(&()).to_string();
    let owner = nsn_of(&object);

    let previous = object
        .workload_status()
        .map(|s| s.associations.clone())
        .unwrap_or_default();
    let patch = obsolete_conf_patch(object.annotations(), &object.associations(), &previous);
    let object = if patch.is_empty() {
        object
    } else {
        ctx.platform
            .patch_annotations::<K>(&owner.namespace, &owner.name, &patch)
            .await?;
        info!(
            kind = %kind,
            resource = %owner,
            removed = patch.len(),
            "Removed obsolete association configurations"
        );
        ctx.platform
            .get::<K>(&owner.namespace, &owner.name)
            .await?
            .ok_or_else(|| Error::not_found(&kind, &owner.namespace, &owner.name))?
    };

    let mut associations = object.associations();
    register_association_watches(ctx, &kind, &owner, &associations);

    let annotations = object.annotations().clone();
    let mut failed = Vec::new();
    for association in &mut associations {
        match get_and_set(&ctx.platform, &annotations, association).await {
            Ok(_) => {}
            Err(e @ Error::InvalidAssociation { .. }) => {
                warn!(
                    resource = %owner,
                    target = %association.target_nsn(),
                    "Association failed: {e}"
                );
                failed.push((association.target_nsn(), e));
            }
            Err(e) => return Err(e),
        }
    }
    register_association_watches(ctx, &kind, &owner, &associations);

    if let Some((_, error)) = failed.first() {
        let targets: Vec<NamespacedName> = failed.iter().map(|(t, _)| t.clone()).collect();
        ctx.emit(
            &object,
            EventRecord::warning(
                EVENT_REASON_ASSOCIATION_ERROR,
                EVENT_ACTION_RECONCILE,
                error.to_string(),
            ),
        )
        .await;
        record_error(&kind, "association");
        let mut updater = WorkloadStatusUpdater::new(&object);
        updater.set_associations(association_statuses(&associations, &targets, false));
        updater.set_error(error);
        let results = updater.apply(ctx).await?;
        return Ok((object, AssociationPhase::Done(results)));
    }

    if !are_configured_if_set(&associations) {
        debug!(kind = %kind, resource = %owner, "Waiting for association configuration");
        let statuses = association_statuses(&associations, &[], false);
        let results = report_pending(ctx, &object, statuses).await?;
        return Ok((object, AssociationPhase::Done(results)));
    }

    let version = Version::parse(object.spec_version())?;
    if let VersionGate::Delayed {
        association_type,
        message,
    } = allow_version(&version, &associations)
    {
        info!(kind = %kind, resource = %owner, "{message}");
        ctx.emit(
            &object,
            EventRecord::normal(EVENT_REASON_DELAYED, EVENT_ACTION_RECONCILE, message),
        )
        .await;
        record_delayed_rollout(&kind, association_type.as_str());
        let statuses = association_statuses(&associations, &[], false);
        let results = report_pending(ctx, &object, statuses).await?;
        return Ok((object, AssociationPhase::Done(results)));
    }

    let mut resolved = Vec::with_capacity(associations.len());
    for association in &associations {
        resolved.push(resolve(&ctx.platform, association).await?);
    }
    let statuses = association_statuses(&associations, &[], true);
    Ok((object, AssociationPhase::Ready { resolved, statuses }))
}

/// Content hash of rendered bytes and every secret version the pods depend on.
#[must_use]
pub fn content_hash<'a, I>(
    rendered: &[u8],
    resolved: &[ResolvedAssociation],
    secret_versions: I,
) -> String
where
    I: IntoIterator<Item = &'a (String, String)>,
{
    let mut hash = ContentHash::new();
    hash.write(rendered);
    for association in resolved {
        association.hash_into(&mut hash);
    }
    for (name, version) in secret_versions {
        hash.write_str(name).write_str(version);
    }
    hash.finish()
}

/// Reports counts, version, associations and health, then schedules the next reconcile.
///
/// # Errors
///
/// Returns platform errors other than status conflicts.
pub async fn update_status<P: Platform, K: HasWorkloadStatus>(
    ctx: &Context<P>,
    object: &K,
    counts: WorkloadCounts,
    selector: &BTreeMap<String, String>,
    statuses: AssociationStatusMap,
) -> Result<Results> {
    let owner = nsn_of(object);
    let version = observed_version(&ctx.platform, &owner.namespace, selector).await?;
    let established = all_established(&statuses);

    let mut updater = WorkloadStatusUpdater::new(object);
    updater.set_counts(counts.expected, counts.available);
    updater.set_version(version);
    updater.set_associations(statuses);
    updater.set_observed_generation(object.meta().generation);
    updater.set_health(compute_health(counts.expected, counts.available, established));
    let results = updater.apply(ctx).await?;
    Ok(results.with_requeue(ctx.config.requeue_after))
}

/// Emits an event and records the error on the `Ready` condition.
///
/// Not-found and conflict errors are transient and only logged.
pub async fn report_error<P: Platform, K: HasWorkloadStatus>(
    ctx: &Context<P>,
    object: &K,
    error: &Error,
) {
    let kind = K::kind(&()).to_string();
    let owner = nsn_of(object);
    let Some(reason) = error.event_reason() else {
        debug!(kind = %kind, resource = %owner, "Transient reconcile error: {error}");
        return;
    };
    warn!(kind = %kind, resource = %owner, "Reconcile failed: {error}");
    let action = match error {
        Error::InvalidSpec { .. } => EVENT_ACTION_VALIDATE,
        _ => EVENT_ACTION_RECONCILE,
    };
    ctx.emit(object, EventRecord::warning(reason, action, error.to_string()))
        .await;

    let Ok(Some(current)) = ctx.platform.get::<K>(&owner.namespace, &owner.name).await else {
        return;
    };
    let mut updater = WorkloadStatusUpdater::new(&current);
    updater.set_error(error);
    if let Err(e) = updater.apply(ctx).await {
        debug!(kind = %kind, resource = %owner, "Failed to record error in status: {e}");
    }
}

#[cfg(test)]
#[path = "driver_tests.rs"]
mod driver_tests;
