// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! User configuration, inline or read from a referenced secret.

use k8s_openapi::api::core::v1::Secret;
use tracing::debug;

use crate::crd::ConfigRef;
use crate::errors::{Error, Result};
use crate::names::NamespacedName;
use crate::platform::Platform;
use crate::secrets;
use crate::settings::CanonicalConfig;
use crate::watches::{config_ref_watch_key, WatchRegistry};

/// Loads the user configuration of `owner`.
///
/// Inline configuration wins over a reference; the validator rejects resources setting
/// both. The referenced secret is watched before it is read, and the watch is dropped
/// when no reference is set.
///
/// # Errors
///
/// Returns [`Error::NotFound`] when the referenced secret does not exist,
/// [`Error::MissingSecretKey`] when it lacks the key, and [`Error::ConfigParse`] when
/// the content is not a YAML mapping.
pub async fn load_user_config<P: Platform>(
    platform: &P,
    watches: &WatchRegistry,
    owner_kind: &str,
    owner: &NamespacedName,
    inline: Option<&serde_json::Value>,
    config_ref: Option<&ConfigRef>,
    default_key: &str,
) -> Result<Option<CanonicalConfig>> {
    let watch_key = config_ref_watch_key(owner_kind, owner);
    let Some(config_ref) = config_ref.filter(|r| !r.secret_name.is_empty()) else {
        watches.remove(&watch_key);
        return inline
            .map(|value| CanonicalConfig::from_value(value.clone()))
            .transpose();
    };

    watches.register(
        &watch_key,
        owner_kind,
        owner,
        [NamespacedName::new(&owner.namespace, &config_ref.secret_name)],
    );
    let secret: Secret = platform
        .get(&owner.namespace, &config_ref.secret_name)
        .await?
        .ok_or_else(|| Error::not_found("Secret", &owner.namespace, &config_ref.secret_name))?;
    let key = config_ref.key.as_deref().unwrap_or(default_key);
    let raw = secrets::value(&secret, key).ok_or_else(|| Error::MissingSecretKey {
        namespace: owner.namespace.clone(),
        name: config_ref.secret_name.clone(),
        key: key.to_string(),
    })?;
    debug!(owner = %owner, secret = %config_ref.secret_name, key = %key, "Loaded referenced configuration");
    CanonicalConfig::parse(&raw).map(Some)
}
