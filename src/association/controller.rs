// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Dashboard association controller.
//!
//! Resolves `Beat.spec.dashboardRef` references to managed [`Dashboard`]s and caches the
//! connection details in the `dashboard-conf` annotation of the Beat. The Beat
//! reconciler only ever reads that annotation.

use kube::ResourceExt;
use std::collections::BTreeMap;
use tracing::{debug, info};

use super::{conf_patch, AssociationType, Associated};
use crate::constants::{DASHBOARD_HTTP_PORT, KIND_BEAT, NO_AUTH_REQUIRED};
use crate::context::Context;
use crate::crd::{AssociationConf, Beat, Dashboard};
use crate::errors::Result;
use crate::labels::DASHBOARD_CONF_ANNOTATION;
use crate::names::{dashboard_http_certs_secret_name, dashboard_service_url, NamespacedName};
use crate::platform::Platform;
use crate::watches::association_watch_key;

/// What the controller did to the Beat.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AssociationOutcome {
    /// The annotation already matched
    Unchanged,
    Updated(AssociationConf),
    Removed,
}

/// Connection details of a Dashboard as seen by its clients.
#[must_use]
pub fn dashboard_conf(dashboard: &Dashboard, service_name: Option<&str>) -> AssociationConf {
    let namespace = dashboard.namespace().unwrap_or_default();
    let name = dashboard.name_any();
    let tls = dashboard
        .spec
        .http
        .as_ref()
        .is_none_or(crate::crd::HttpConfig::tls_enabled);
    let url = match service_name.filter(|s| !s.is_empty()) {
        Some(service) => {
            let scheme = if tls { "https" } else { "http" };
            format!("{scheme}://{service}.{namespace}.svc:{DASHBOARD_HTTP_PORT}")
        }
        None => dashboard_service_url(&namespace, &name, tls),
    };
    AssociationConf {
        auth_secret_name: NO_AUTH_REQUIRED.to_string(),
        auth_secret_key: String::new(),
        ca_cert_provided: tls,
        ca_secret_name: if tls {
            dashboard_http_certs_secret_name(&name)
        } else {
            String::new()
        },
        url,
        version: dashboard
            .status
            .as_ref()
            .and_then(|s| s.version.clone())
            .unwrap_or_default(),
        service_account: None,
    }
}

/// Reconciles the `dashboard-conf` annotation of a Beat.
///
/// # Errors
///
/// Returns platform errors from reading the Dashboard or patching the Beat.
pub async fn reconcile_dashboard_association<P: Platform>(
    ctx: &Context<P>,
    beat: &Beat,
) -> Result<AssociationOutcome> {
    let owner = NamespacedName::new(beat.namespace().unwrap_or_default(), beat.name_any());
    let watch_key = association_watch_key(KIND_BEAT, AssociationType::Dashboard.as_str(), &owner);
    let annotations = beat.annotations();

    let association = beat
        .associations()
        .into_iter()
        .find(|a| a.association_type == AssociationType::Dashboard && !a.is_external());

    let Some(association) = association else {
        ctx.watches.dashboards.remove(&watch_key);
        return remove_conf(ctx, &owner, annotations).await;
    };

    let target = association.target_nsn();
    ctx.watches
        .dashboards
        .register(&watch_key, KIND_BEAT, &owner, [target.clone()]);

    let Some(dashboard) = ctx
        .platform
        .get::<Dashboard>(&target.namespace, &target.name)
        .await?
    else {
        debug!(beat = %owner, dashboard = %target, "Referenced Dashboard not found");
        return remove_conf(ctx, &owner, annotations).await;
    };

    let conf = dashboard_conf(&dashboard, association.target.service_name.as_deref());
    let current = annotations
        .get(DASHBOARD_CONF_ANNOTATION)
        .and_then(|raw| serde_json::from_str::<AssociationConf>(raw).ok());
    if current.as_ref() == Some(&conf) {
        return Ok(AssociationOutcome::Unchanged);
    }

    ctx.platform
        .patch_annotations::<Beat>(
            &owner.namespace,
            &owner.name,
            &conf_patch(DASHBOARD_CONF_ANNOTATION, &conf)?,
        )
        .await?;
    info!(beat = %owner, dashboard = %target, url = %conf.url, "Updated dashboard association");
    Ok(AssociationOutcome::Updated(conf))
}

async fn remove_conf<P: Platform>(
    ctx: &Context<P>,
    owner: &NamespacedName,
    annotations: &BTreeMap<String, String>,
) -> Result<AssociationOutcome> {
    if !annotations.contains_key(DASHBOARD_CONF_ANNOTATION) {
        return Ok(AssociationOutcome::Unchanged);
    }
    let patch = BTreeMap::from([(DASHBOARD_CONF_ANNOTATION.to_string(), None)]);
    ctx.platform
        .patch_annotations::<Beat>(&owner.namespace, &owner.name, &patch)
        .await?;
    info!(beat = %owner, "Removed dashboard association");
    Ok(AssociationOutcome::Removed)
}

#[cfg(test)]
#[path = "controller_tests.rs"]
mod controller_tests;
