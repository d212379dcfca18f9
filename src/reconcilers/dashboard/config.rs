// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Dashboard configuration composition.
//!
//! Fragments are merged in a fixed order, later ones winning:
//!
//! 1. base settings: server name and bind address, monitoring UI, index store hosts
//! 2. reusable encryption keys, kept across reconciles
//! 3. version defaults
//! 4. TLS of the HTTP endpoint
//! 5. stack monitoring
//! 6. index store TLS and credentials
//! 7. the user configuration, inline or referenced

use serde_json::json;

use crate::association::{AssociationType, Credentials, ResolvedAssociation};
use crate::config::IpFamily;
use crate::constants::{HTTP_CERTS_MOUNT_PATH, TLS_CERT_FILE_NAME, TLS_KEY_FILE_NAME};
use crate::crd::Dashboard;
use crate::errors::Result;
use crate::settings::CanonicalConfig;
use crate::version::Version;

pub const SERVER_NAME: &str = "server.name";
pub const SERVER_HOST: &str = "server.host";
pub const SERVER_SSL_ENABLED: &str = "server.ssl.enabled";
pub const SERVER_SSL_CERTIFICATE: &str = "server.ssl.certificate";
pub const SERVER_SSL_KEY: &str = "server.ssl.key";

/// Monitoring UI switch from 7.16.0.
pub const MONITORING_UI_CONTAINER_ENABLED: &str = "monitoring.ui.container.elasticsearch.enabled";
/// Monitoring UI switch before 7.16.0.
pub const XPACK_MONITORING_UI_CONTAINER_ENABLED: &str =
    "xpack.monitoring.ui.container.elasticsearch.enabled";
pub const XPACK_LICENSE_MANAGEMENT_UI_ENABLED: &str = "xpack.license_management.ui.enabled";
/// Internal collection of the Dashboard's own metrics.
pub const MONITORING_COLLECTION_ENABLED: &str = "monitoring.kibana.collection.enabled";

pub const SECURITY_ENCRYPTION_KEY: &str = "xpack.security.encryptionKey";
pub const REPORTING_ENCRYPTION_KEY: &str = "xpack.reporting.encryptionKey";
pub const SAVED_OBJECTS_ENCRYPTION_KEY: &str = "xpack.encryptedSavedObjects.encryptionKey";

pub const INDEX_STORE_HOSTS: &str = "elasticsearch.hosts";
pub const INDEX_STORE_USERNAME: &str = "elasticsearch.username";
pub const INDEX_STORE_PASSWORD: &str = "elasticsearch.password";
pub const INDEX_STORE_SERVICE_ACCOUNT_TOKEN: &str = "elasticsearch.serviceAccountToken";
pub const INDEX_STORE_CERTIFICATE_AUTHORITIES: &str = "elasticsearch.ssl.certificateAuthorities";
pub const INDEX_STORE_VERIFICATION_MODE: &str = "elasticsearch.ssl.verificationMode";

const MONITORING_KEY_RENAMED_IN: Version = Version::new(7, 16, 0);
const SAVED_OBJECTS_KEY_SINCE: Version = Version::new(7, 6, 0);

/// Random 256-bit key, hex encoded.
#[must_use]
pub fn random_key() -> String {
    (0..4).map(|_| format!("{:016x}", rand::random::<u64>())).collect()
}

fn index_store(resolved: &[ResolvedAssociation]) -> Option<&ResolvedAssociation> {
    resolved
        .iter()
        .find(|r| r.association.association_type == AssociationType::IndexStore)
}

/// Encryption keys of the previously rendered configuration, generated when missing.
///
/// The keys cannot be derived from the spec: regenerating them on every reconcile
/// would invalidate sessions and saved objects. Keys the user configuration sets are
/// left to it.
///
/// # Errors
///
/// Returns [`crate::errors::Error::Json`] when a previous key is not a string.
pub fn reusable_settings(
    existing: Option<&CanonicalConfig>,
    user: Option<&CanonicalConfig>,
    version: &Version,
) -> Result<CanonicalConfig> {
    let mut paths = vec![SECURITY_ENCRYPTION_KEY, REPORTING_ENCRYPTION_KEY];
    if version.gte(&SAVED_OBJECTS_KEY_SINCE) {
        paths.push(SAVED_OBJECTS_ENCRYPTION_KEY);
    }
    let user_keys = user.map(|u| u.has_keys(&paths)).unwrap_or_default();

    let mut config = CanonicalConfig::new();
    for path in paths.into_iter().filter(|p| !user_keys.iter().any(|k| k == p)) {
        let previous = match existing {
            Some(existing) => existing.unpack_at::<String>(path)?,
            None => None,
        };
        let key = previous
            .filter(|key| !key.is_empty())
            .unwrap_or_else(random_key);
        config.set(path, key)?;
    }
    Ok(config)
}

/// Server identity, bind address, monitoring UI and index store hosts.
///
/// # Errors
///
/// Fails only on conflicting paths, which the fixed keys never produce.
pub fn base_settings(
    dashboard: &Dashboard,
    version: &Version,
    ip_family: IpFamily,
    resolved: &[ResolvedAssociation],
) -> Result<CanonicalConfig> {
    let mut config = CanonicalConfig::single(
        SERVER_NAME,
        dashboard.metadata.name.clone().unwrap_or_default(),
    )?;
    config.set(SERVER_HOST, ip_family.inaddr_any())?;
    if version.gte(&MONITORING_KEY_RENAMED_IN) {
        config.set(MONITORING_UI_CONTAINER_ENABLED, true)?;
    } else {
        config.set(XPACK_MONITORING_UI_CONTAINER_ENABLED, true)?;
    }
    if let Some(index_store) = index_store(resolved).filter(|r| !r.conf.url.is_empty()) {
        config.set(INDEX_STORE_HOSTS, json!([index_store.conf.url]))?;
    }
    Ok(config)
}

/// Settings only known to some versions.
///
/// # Errors
///
/// Fails only on conflicting paths, which the fixed keys never produce.
pub fn version_defaults(version: &Version) -> Result<CanonicalConfig> {
    if version.gte(&SAVED_OBJECTS_KEY_SINCE) {
        CanonicalConfig::single(XPACK_LICENSE_MANAGEMENT_UI_ENABLED, false)
    } else {
        Ok(CanonicalConfig::new())
    }
}

/// Serves HTTPS from the mounted certificates, empty when TLS is disabled.
///
/// # Errors
///
/// Fails only on conflicting paths, which the fixed keys never produce.
pub fn tls_settings(dashboard: &Dashboard) -> Result<CanonicalConfig> {
    if !tls_enabled(dashboard) {
        return Ok(CanonicalConfig::new());
    }
    let mut config = CanonicalConfig::single(SERVER_SSL_ENABLED, true)?;
    config.set(
        SERVER_SSL_CERTIFICATE,
        format!("{HTTP_CERTS_MOUNT_PATH}/{TLS_CERT_FILE_NAME}"),
    )?;
    config.set(
        SERVER_SSL_KEY,
        format!("{HTTP_CERTS_MOUNT_PATH}/{TLS_KEY_FILE_NAME}"),
    )?;
    Ok(config)
}

/// Turns internal metrics collection off when metrics are shipped by stack monitoring,
/// empty otherwise.
///
/// # Errors
///
/// Fails only on conflicting paths, which the fixed keys never produce.
pub fn monitoring_settings(dashboard: &Dashboard) -> Result<CanonicalConfig> {
    let metrics_defined = dashboard
        .spec
        .monitoring
        .as_ref()
        .is_some_and(|m| m.metrics_refs().next().is_some());
    if !metrics_defined {
        return Ok(CanonicalConfig::new());
    }
    CanonicalConfig::single(MONITORING_COLLECTION_ENABLED, false)
}

/// True unless the spec disables TLS.
#[must_use]
pub fn tls_enabled(dashboard: &Dashboard) -> bool {
    dashboard
        .spec
        .http
        .as_ref()
        .is_none_or(crate::crd::HttpConfig::tls_enabled)
}

/// Credentials and CA trust of the index store connection.
///
/// # Errors
///
/// Fails only on conflicting paths, which the fixed keys never produce.
pub fn index_store_settings(resolved: &ResolvedAssociation) -> Result<CanonicalConfig> {
    let mut config = CanonicalConfig::new();
    match &resolved.credentials {
        Credentials::None => {}
        Credentials::Basic { username, password } => config.set_strings(&[
            (INDEX_STORE_USERNAME, username.as_str()),
            (INDEX_STORE_PASSWORD, password.as_str()),
        ])?,
        Credentials::Token(token) => config.set(INDEX_STORE_SERVICE_ACCOUNT_TOKEN, token.as_str())?,
    }
    if resolved.ca_available {
        config.set(
            INDEX_STORE_CERTIFICATE_AUTHORITIES,
            json!([resolved.association.ca_path()]),
        )?;
        config.set(INDEX_STORE_VERIFICATION_MODE, "certificate")?;
    }
    Ok(config)
}

/// Inputs of [`compose`] besides the Dashboard.
#[derive(Clone, Copy, Debug)]
pub struct ComposeParams<'a> {
    pub version: &'a Version,
    pub ip_family: IpFamily,
    pub resolved: &'a [ResolvedAssociation],
    /// Configuration rendered by a previous reconcile
    pub existing: Option<&'a CanonicalConfig>,
    pub user: Option<&'a CanonicalConfig>,
}

/// Composes the full Dashboard configuration.
///
/// # Errors
///
/// Returns [`crate::errors::Error::ConfigMerge`] when the user configuration uses an
/// operator-managed key with an incompatible type.
pub fn compose(dashboard: &Dashboard, params: &ComposeParams<'_>) -> Result<CanonicalConfig> {
    let mut config = base_settings(dashboard, params.version, params.ip_family, params.resolved)?;
    let mut fragments = vec![
        reusable_settings(params.existing, params.user, params.version)?,
        version_defaults(params.version)?,
        tls_settings(dashboard)?,
        monitoring_settings(dashboard)?,
    ];
    if let Some(index_store) = index_store(params.resolved) {
        fragments.push(index_store_settings(index_store)?);
    }
    config.merge_with(&fragments)?;
    config.merge_opt(params.user)?;
    Ok(config)
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod config_tests;
