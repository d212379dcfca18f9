// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Keystore init container built from secure settings.
//!
//! Every key of the referenced secrets is projected as one file into a read-only
//! volume. An init container then creates the keystore in the data directory and adds
//! one entry per file.

use k8s_openapi::api::core::v1::{
    Container, KeyToPath, ProjectedVolumeSource, Secret, SecretProjection, Volume,
    VolumeMount, VolumeProjection,
};
use std::collections::BTreeSet;
use tracing::debug;

use crate::constants::{
    CONTAINER_NAME_KEYSTORE, SECURE_SETTINGS_MOUNT_PATH, SECURE_SETTINGS_VOLUME_NAME,
};
use crate::crd::SecretSource;
use crate::errors::{Error, Result};
use crate::names::NamespacedName;
use crate::platform::Platform;
use crate::reconcilers::pod_template::resources;
use crate::secrets;
use crate::watches::{secure_settings_watch_key, WatchRegistry};

/// Commands of the keystore tool shipped in an image.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeystoreCommands {
    /// Creates an empty keystore, overwriting any existing one
    pub create: String,
    /// Adds the entry `$key` from the file `$filename`
    pub add: String,
    /// Directory holding the keystore
    pub keystore_dir: String,
    /// Skip the init container when a previous run left its marker
    pub use_initialized_flag: bool,
}

/// Volume and init container of a keystore, with the secret versions they depend on.
#[derive(Clone, Debug)]
pub struct KeystoreResources {
    pub volume: Volume,
    pub init_container: Container,
    /// `(secret name, resourceVersion)` of every secure settings secret
    pub secret_versions: Vec<(String, String)>,
}

/// Shell script run by the keystore init container.
#[must_use]
pub fn init_script(commands: &KeystoreCommands) -> String {
    let marker = format!("{}/keystore-initialized.ok", commands.keystore_dir);
    let mut script = String::from("#!/usr/bin/env bash\nset -eux\n");
    if commands.use_initialized_flag {
        script.push_str(&format!(
            "if [[ -f \"{marker}\" ]]; then\n  echo \"Keystore already initialized.\"\n  exit 0\nfi\n"
        ));
    }
    script.push_str(&format!(
        "{create}\nfor filename in {SECURE_SETTINGS_MOUNT_PATH}/*; do\n  [[ -e \"$filename\" ]] || continue\n  key=$(basename \"$filename\")\n  echo \"Adding $key to the keystore.\"\n  {add}\ndone\n",
        create = commands.create,
        add = commands.add,
    ));
    if commands.use_initialized_flag {
        script.push_str(&format!("touch \"{marker}\"\n"));
    }
    script.push_str("echo \"Keystore initialization successful.\"\n");
    script
}

/// Builds the keystore volume and init container for `owner`.
///
/// The secure settings secrets are registered as watched before they are read, so a
/// secret created later wakes the owner up. Without secure settings the watch is
/// dropped and `None` is returned.
///
/// # Errors
///
/// Returns [`Error::NotFound`] when a referenced secret does not exist.
pub async fn reconcile_keystore<P: Platform>(
    platform: &P,
    watches: &WatchRegistry,
    owner_kind: &str,
    owner: &NamespacedName,
    sources: &[SecretSource],
    commands: &KeystoreCommands,
    data_volume: &VolumeMount,
) -> Result<Option<KeystoreResources>> {
    let watch_key = secure_settings_watch_key(owner_kind, owner);
    watches.register(
        &watch_key,
        owner_kind,
        owner,
        sources
            .iter()
            .map(|s| NamespacedName::new(&owner.namespace, &s.secret_name)),
    );
    if sources.is_empty() {
        return Ok(None);
    }

    let mut fetched = Vec::with_capacity(sources.len());
    for source in sources {
        let secret: Secret = platform
            .get(&owner.namespace, &source.secret_name)
            .await?
            .ok_or_else(|| Error::not_found("Secret", &owner.namespace, &source.secret_name))?;
        fetched.push(secret);
    }

    // a key held by several secrets is projected from the last one only
    let mut claimed = BTreeSet::new();
    let mut projections = Vec::with_capacity(fetched.len());
    for secret in fetched.iter().rev() {
        let items: Vec<KeyToPath> = secrets::keys(secret)
            .into_iter()
            .filter(|key| claimed.insert(key.clone()))
            .map(|key| KeyToPath {
                key: key.clone(),
                path: key,
                ..Default::default()
            })
            .collect();
        if items.is_empty() {
            continue;
        }
        projections.push(VolumeProjection {
            secret: Some(SecretProjection {
                name: secret.metadata.name.clone().unwrap_or_default(),
                items: Some(items),
                ..Default::default()
            }),
            ..Default::default()
        });
    }
    projections.reverse();

    let secret_versions = fetched
        .iter()
        .map(|s| {
            (
                s.metadata.name.clone().unwrap_or_default(),
                s.metadata.resource_version.clone().unwrap_or_default(),
            )
        })
        .collect();
    debug!(owner = %owner, keys = claimed.len(), "Prepared keystore from secure settings");

    let volume = Volume {
        name: SECURE_SETTINGS_VOLUME_NAME.to_string(),
        projected: Some(ProjectedVolumeSource {
            sources: Some(projections),
            ..Default::default()
        }),
        ..Default::default()
    };
    let init_container = Container {
        name: CONTAINER_NAME_KEYSTORE.to_string(),
        command: Some(vec![
            "/usr/bin/env".to_string(),
            "bash".to_string(),
            "-c".to_string(),
            init_script(commands),
        ]),
        volume_mounts: Some(vec![
            VolumeMount {
                name: SECURE_SETTINGS_VOLUME_NAME.to_string(),
                mount_path: SECURE_SETTINGS_MOUNT_PATH.to_string(),
                read_only: Some(true),
                ..Default::default()
            },
            data_volume.clone(),
        ]),
        resources: Some(resources("196Mi", "100m")),
        ..Default::default()
    };

    Ok(Some(KeystoreResources {
        volume,
        init_container,
        secret_versions,
    }))
}

#[cfg(test)]
#[path = "keystore_tests.rs"]
mod keystore_tests;
