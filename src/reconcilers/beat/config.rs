// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Beat configuration composition.
//!
//! Fragments are merged in a fixed order, each one overriding the previous ones:
//!
//! 1. index store output, from the `indexstore` association
//! 2. dashboard setup, from the `dashboard` association
//! 3. stack monitoring, from the first metrics monitoring association
//! 4. the user configuration, inline or referenced
//!
//! Without associations, monitoring or user configuration the result is empty.

use serde_json::json;

use crate::association::{AssociationType, Credentials, ResolvedAssociation};
use crate::crd::Beat;
use crate::errors::Result;
use crate::names::{monitoring_socket_url, NamespacedName};
use crate::settings::CanonicalConfig;

/// Sets `<prefix>.username/password` or `<prefix>.api_key` from credentials.
fn set_credentials(config: &mut CanonicalConfig, prefix: &str, credentials: &Credentials) -> Result<()> {
    match credentials {
        Credentials::None => Ok(()),
        Credentials::Basic { username, password } => {
            let username_path = format!("{prefix}.username");
            let password_path = format!("{prefix}.password");
            config.set_strings(&[
                (username_path.as_str(), username.as_str()),
                (password_path.as_str(), password.as_str()),
            ])
        }
        Credentials::Token(token) => config.set(&format!("{prefix}.api_key"), token.as_str()),
    }
}

/// Connection fragment of an index store under `prefix`.
fn index_store_fragment(prefix: &str, resolved: &ResolvedAssociation) -> Result<CanonicalConfig> {
    let mut config = CanonicalConfig::single(&format!("{prefix}.hosts"), json!([resolved.conf.url]))?;
    set_credentials(&mut config, prefix, &resolved.credentials)?;
    if resolved.ca_available {
        config.set(
            &format!("{prefix}.ssl.certificate_authorities"),
            json!([resolved.association.ca_path()]),
        )?;
    }
    Ok(config)
}

/// `output.indexstore` fragment.
///
/// # Errors
///
/// Fails only on conflicting paths, which the fixed keys never produce.
pub fn output_fragment(resolved: &ResolvedAssociation) -> Result<CanonicalConfig> {
    index_store_fragment("output.indexstore", resolved)
}

/// `setup.kibana` fragment enabling dashboard setup.
///
/// # Errors
///
/// Fails only on conflicting paths, which the fixed keys never produce.
pub fn dashboard_fragment(resolved: &ResolvedAssociation) -> Result<CanonicalConfig> {
    let mut config = CanonicalConfig::single("setup.dashboards.enabled", true)?;
    config.set("setup.kibana.host", resolved.conf.url.as_str())?;
    set_credentials(&mut config, "setup.kibana", &resolved.credentials)?;
    if resolved.ca_available {
        config.set(
            "setup.kibana.ssl.certificate_authorities",
            json!([resolved.association.ca_path()]),
        )?;
    }
    Ok(config)
}

/// Stack monitoring fragment: internal collection to `monitoring.indexstore` and the
/// HTTP endpoint on a per-Beat Unix socket.
///
/// # Errors
///
/// Fails only on conflicting paths, which the fixed keys never produce.
pub fn monitoring_fragment(
    beat_type: &str,
    owner: &NamespacedName,
    resolved: &ResolvedAssociation,
) -> Result<CanonicalConfig> {
    let mut config = CanonicalConfig::single("monitoring.enabled", true)?;
    config.merge_opt(Some(&index_store_fragment("monitoring.indexstore", resolved)?))?;
    if resolved.ca_available {
        config.set("monitoring.indexstore.ssl.verification_mode", "certificate")?;
    }
    config.set("http.enabled", true)?;
    config.set(
        "http.host",
        monitoring_socket_url(beat_type, &owner.namespace, &owner.name),
    )?;
    Ok(config)
}

fn find(resolved: &[ResolvedAssociation], association_type: AssociationType) -> Option<&ResolvedAssociation> {
    resolved
        .iter()
        .find(|r| r.association.association_type == association_type)
}

/// The monitoring association of the first metrics target.
fn metrics_monitoring<'a>(beat: &Beat, resolved: &'a [ResolvedAssociation]) -> Option<&'a ResolvedAssociation> {
    let namespace = beat.metadata.namespace.as_deref().unwrap_or_default();
    let first = beat
        .spec
        .monitoring
        .as_ref()?
        .metrics_refs()
        .next()?
        .with_default_namespace(namespace)
        .nsn();
    resolved.iter().find(|r| {
        r.association.association_type == AssociationType::Monitoring
            && r.association.target_nsn() == first
    })
}

/// Composes the full Beat configuration.
///
/// # Errors
///
/// Returns [`crate::errors::Error::ConfigMerge`] when the user configuration uses an
/// operator-managed key with an incompatible type.
pub fn compose(
    beat: &Beat,
    resolved: &[ResolvedAssociation],
    user: Option<&CanonicalConfig>,
) -> Result<CanonicalConfig> {
    let owner = NamespacedName::new(
        beat.metadata.namespace.clone().unwrap_or_default(),
        beat.metadata.name.clone().unwrap_or_default(),
    );
    let mut config = CanonicalConfig::new();
    if let Some(index_store) = find(resolved, AssociationType::IndexStore) {
        config.merge_opt(Some(&output_fragment(index_store)?))?;
    }
    if let Some(dashboard) = find(resolved, AssociationType::Dashboard) {
        config.merge_opt(Some(&dashboard_fragment(dashboard)?))?;
    }
    if let Some(monitoring) = metrics_monitoring(beat, resolved) {
        config.merge_opt(Some(&monitoring_fragment(&beat.spec.r#type, &owner, monitoring)?))?;
    }
    config.merge_opt(user)?;
    Ok(config)
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod config_tests;
