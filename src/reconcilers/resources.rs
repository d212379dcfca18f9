// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Generic resource creation and update helpers.
//!
//! Every object the operator owns is reconciled the same way: fetch the current object,
//! create it when missing, otherwise compare it with the expected object through a
//! `needs_update` predicate and replace it only on difference. Repeated reconciles of an
//! unchanged resource therefore issue no writes.
//!
//! # Example
//!
//! ```rust,no_run
//! use beacon::platform::memory::MemoryPlatform;
//! use beacon::reconcilers::resources::reconcile_secret;
//! use k8s_openapi::api::core::v1::Secret;
//!
//! async fn example(platform: &MemoryPlatform, secret: Secret) -> beacon::errors::Result<()> {
//!     reconcile_secret(platform, &secret).await?;
//!     Ok(())
//! }
//! ```

use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::Resource;
use std::collections::BTreeMap;
use tracing::{debug, info};

use crate::errors::Result;
use crate::labels::{SOFT_OWNER_KIND_LABEL, SOFT_OWNER_NAMESPACE_LABEL, SOFT_OWNER_NAME_LABEL};
use crate::metrics::{record_resource_created, record_resource_deleted, record_resource_updated};
use crate::names::NamespacedName;
use crate::platform::{Object, Platform};

fn identity<K: Object>(object: &K) -> (String, String) {
    let meta = object.meta();
    (
        meta.namespace.clone().unwrap_or_default(),
        meta.name.clone().unwrap_or_default(),
    )
}

/// Create the expected object, or bring the existing one up to date.
///
/// # Arguments
///
/// * `platform` - Platform API access
/// * `expected` - The object as it should be
/// * `needs_update` - `(expected, existing)`, true when the existing object must be rewritten
/// * `update` - `(existing, expected)`, builds the object to write over the existing one
///
/// # Returns
///
/// The object as stored after the call.
///
/// # Errors
///
/// Returns platform errors, including [`crate::errors::Error::Conflict`] when the object
/// changed between the read and the write.
pub async fn reconcile_resource<P, K, N, U>(
    platform: &P,
    expected: &K,
    needs_update: N,
    update: U,
) -> Result<K>
where
    P: Platform,
    K: Object,
    N: Fn(&K, &K) -> bool,
    U: Fn(&K, &K) -> K,
{
    let kind = K::kind(&());
    let (namespace, name) = identity(expected);

    let Some(existing) = platform.get::<K>(&namespace, &name).await? else {
        debug!(kind = %kind, namespace = %namespace, name = %name, "Creating resource");
        let created = platform.create(expected).await?;
        record_resource_created(&kind);
        info!("Created {kind} {namespace}/{name}");
        return Ok(created);
    };

    if !needs_update(expected, &existing) {
        debug!(kind = %kind, namespace = %namespace, name = %name, "Resource up to date");
        return Ok(existing);
    }

    let mut updated = update(&existing, expected);
    updated
        .meta_mut()
        .resource_version
        .clone_from(&existing.meta().resource_version);
    let stored = platform.replace(&updated).await?;
    record_resource_updated(&kind);
    info!("Updated {kind} {namespace}/{name}");
    Ok(stored)
}

/// True when every entry of `expected` is present with the same value in `existing`.
#[must_use]
pub fn is_subset(
    expected: Option<&BTreeMap<String, String>>,
    existing: Option<&BTreeMap<String, String>>,
) -> bool {
    let Some(expected) = expected else {
        return true;
    };
    expected
        .iter()
        .all(|(k, v)| existing.and_then(|e| e.get(k)) == Some(v))
}

/// `base` with the entries of `overrides` on top.
#[must_use]
pub fn merged(
    base: Option<&BTreeMap<String, String>>,
    overrides: Option<&BTreeMap<String, String>>,
) -> Option<BTreeMap<String, String>> {
    if base.is_none() && overrides.is_none() {
        return None;
    }
    let mut result = base.cloned().unwrap_or_default();
    result.extend(overrides.cloned().unwrap_or_default());
    Some(result)
}

/// Reconcile a secret the operator renders.
///
/// The secret is rewritten when its data differs, or when the expected labels and
/// annotations are not all present. Labels and annotations added by others survive the
/// update.
///
/// # Errors
///
/// Returns platform errors.
pub async fn reconcile_secret<P: Platform>(platform: &P, expected: &Secret) -> Result<Secret> {
    reconcile_resource(
        platform,
        expected,
        |expected, existing| {
            expected.data != existing.data
                || !is_subset(expected.metadata.labels.as_ref(), existing.metadata.labels.as_ref())
                || !is_subset(
                    expected.metadata.annotations.as_ref(),
                    existing.metadata.annotations.as_ref(),
                )
                || expected.metadata.owner_references != existing.metadata.owner_references
        },
        |existing, expected| {
            let mut updated = existing.clone();
            updated.metadata.labels = merged(
                existing.metadata.labels.as_ref(),
                expected.metadata.labels.as_ref(),
            );
            updated.metadata.annotations = merged(
                existing.metadata.annotations.as_ref(),
                expected.metadata.annotations.as_ref(),
            );
            updated
                .metadata
                .owner_references
                .clone_from(&expected.metadata.owner_references);
            updated.data.clone_from(&expected.data);
            updated.string_data = None;
            updated
        },
    )
    .await
}

/// Controller owner reference to `owner`, empty when the owner has no uid yet.
#[must_use]
pub fn owner_references<K: Resource<DynamicType = ()>>(owner: &K) -> Option<Vec<OwnerReference>> {
    owner.controller_owner_ref(&()).map(|owner_ref| vec![owner_ref])
}

/// Labels marking an object as soft-owned by a custom resource.
#[must_use]
pub fn soft_owner_labels(kind: &str, owner: &NamespacedName) -> BTreeMap<String, String> {
    BTreeMap::from([
        (SOFT_OWNER_KIND_LABEL.to_string(), kind.to_string()),
        (SOFT_OWNER_NAMESPACE_LABEL.to_string(), owner.namespace.clone()),
        (SOFT_OWNER_NAME_LABEL.to_string(), owner.name.clone()),
    ])
}

/// Delete every secret soft-owned by a deleted custom resource.
///
/// # Returns
///
/// The number of secrets deleted.
///
/// # Errors
///
/// Returns platform errors from listing or deleting.
pub async fn garbage_collect_soft_owned_secrets<P: Platform>(
    platform: &P,
    kind: &str,
    owner: &NamespacedName,
) -> Result<usize> {
    let secrets: Vec<Secret> = platform
        .list(&owner.namespace, &soft_owner_labels(kind, owner))
        .await?;
    let mut deleted = 0;
    for secret in secrets {
        let name = secret.metadata.name.unwrap_or_default();
        if delete_if_exists::<P, Secret>(platform, &owner.namespace, &name).await? {
            deleted += 1;
        }
    }
    if deleted > 0 {
        info!(owner = %owner, kind = %kind, deleted, "Garbage collected soft-owned secrets");
    }
    Ok(deleted)
}

/// Delete an object, tolerating its absence.
///
/// # Errors
///
/// Returns platform errors other than the object not existing.
pub async fn delete_if_exists<P: Platform, K: Object>(
    platform: &P,
    namespace: &str,
    name: &str,
) -> Result<bool> {
    let kind = K::kind(&());
    match platform.delete::<K>(namespace, name).await {
        Ok(true) => {
            record_resource_deleted(&kind);
            info!("Deleted {kind} {namespace}/{name}");
            Ok(true)
        }
        Ok(false) => Ok(false),
        Err(e) if e.is_not_found() => Ok(false),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
#[path = "resources_tests.rs"]
mod resources_tests;
