// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Dynamic watch registry.
//!
//! Custom resources reference objects they do not own: user configuration secrets,
//! secure settings, certificates, association credentials. The reconcilers register
//! those references here under a well-known key, and the controller watch mappers ask
//! the registry which owners to wake up when one of the referenced objects changes.
//!
//! Registering a key replaces whatever that key pointed to before, so a reconcile only
//! ever needs to declare the current set of targets.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::names::NamespacedName;

fn owner_segment(owner_kind: &str, owner: &NamespacedName) -> String {
    format!(
        "{}-{}-{}",
        owner_kind.to_lowercase(),
        owner.namespace,
        owner.name
    )
}

/// Key of the user configuration secret watch of a resource.
#[must_use]
pub fn config_ref_watch_key(owner_kind: &str, owner: &NamespacedName) -> String {
    format!("config-ref-watch-{}", owner_segment(owner_kind, owner))
}

/// Key of the secure settings watch of a resource.
#[must_use]
pub fn secure_settings_watch_key(owner_kind: &str, owner: &NamespacedName) -> String {
    format!("secure-settings-watch-{}", owner_segment(owner_kind, owner))
}

/// Key of the certificate watch of a resource.
#[must_use]
pub fn cert_watch_key(owner_kind: &str, owner: &NamespacedName) -> String {
    format!("cert-watch-{}", owner_segment(owner_kind, owner))
}

/// Key of the credentials and CA watch of one association type of a resource.
#[must_use]
pub fn association_watch_key(
    owner_kind: &str,
    association_type: &str,
    owner: &NamespacedName,
) -> String {
    format!(
        "{association_type}-association-watch-{}",
        owner_segment(owner_kind, owner)
    )
}

/// One named watch: changes to any target wake up the owner.
///
/// Owners are scoped by kind, a Beat and a Dashboard sharing a name never see each
/// other's watches.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Registration {
    pub key: String,
    pub owner_kind: String,
    pub owner: NamespacedName,
    pub targets: BTreeSet<NamespacedName>,
}

impl Registration {
    fn is_owned_by(&self, owner_kind: &str, owner: &NamespacedName) -> bool {
        self.owner_kind == owner_kind && self.owner == *owner
    }
}

/// Watches on objects of a single kind.
#[derive(Debug, Default)]
pub struct WatchRegistry {
    registrations: RwLock<BTreeMap<String, Registration>>,
}

impl WatchRegistry {
    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<String, Registration>> {
        self.registrations.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<String, Registration>> {
        self.registrations.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sets the targets of `key`. An empty target set removes the key.
    pub fn register<I>(&self, key: &str, owner_kind: &str, owner: &NamespacedName, targets: I)
    where
        I: IntoIterator<Item = NamespacedName>,
    {
        let targets: BTreeSet<NamespacedName> = targets.into_iter().collect();
        let mut registrations = self.write();
        if targets.is_empty() {
            registrations.remove(key);
            return;
        }
        registrations.insert(
            key.to_string(),
            Registration {
                key: key.to_string(),
                owner_kind: owner_kind.to_string(),
                owner: owner.clone(),
                targets,
            },
        );
    }

    /// Removes a key. Unknown keys are ignored.
    pub fn remove(&self, key: &str) {
        self.write().remove(key);
    }

    /// Removes every key owned by `owner`.
    pub fn remove_owner(&self, owner_kind: &str, owner: &NamespacedName) {
        self.write()
            .retain(|_, registration| !registration.is_owned_by(owner_kind, owner));
    }

    /// Owners of kind `owner_kind` to reconcile when `target` changes.
    #[must_use]
    pub fn owners_of(&self, owner_kind: &str, target: &NamespacedName) -> Vec<NamespacedName> {
        let owners: BTreeSet<NamespacedName> = self
            .read()
            .values()
            .filter(|registration| registration.owner_kind == owner_kind)
            .filter(|registration| registration.targets.contains(target))
            .map(|registration| registration.owner.clone())
            .collect();
        owners.into_iter().collect()
    }

    /// Keys registered by `owner`.
    #[must_use]
    pub fn keys_of(&self, owner_kind: &str, owner: &NamespacedName) -> Vec<String> {
        self.read()
            .values()
            .filter(|registration| registration.is_owned_by(owner_kind, owner))
            .map(|registration| registration.key.clone())
            .collect()
    }

    /// A snapshot of the registration under `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Registration> {
        self.read().get(key).cloned()
    }

    /// Number of registered keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}

/// Registries of every dynamically watched kind.
#[derive(Debug, Default)]
pub struct DynamicWatches {
    /// Secrets referenced by Beats and Dashboards
    pub secrets: WatchRegistry,
    /// Dashboards referenced by Beats
    pub dashboards: WatchRegistry,
}

impl DynamicWatches {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops every watch of a deleted resource.
    pub fn remove_owner(&self, owner_kind: &str, owner: &NamespacedName) {
        self.secrets.remove_owner(owner_kind, owner);
        self.dashboards.remove_owner(owner_kind, owner);
    }

    /// Keys registered by `owner` across all watched kinds.
    #[must_use]
    pub fn keys_of(&self, owner_kind: &str, owner: &NamespacedName) -> Vec<String> {
        let mut keys = self.secrets.keys_of(owner_kind, owner);
        keys.extend(self.dashboards.keys_of(owner_kind, owner));
        keys
    }
}

#[cfg(test)]
#[path = "watches_tests.rs"]
mod watches_tests;
