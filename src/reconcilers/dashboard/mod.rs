// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Dashboard reconciliation logic.
//!
//! A Dashboard is rendered into:
//! - a configuration secret `<name>-dash-config` holding `dashboard.yml`
//! - a Deployment `<name>-dash` running `count` replicas
//! - a Service `<name>-dash-http` exposing the HTTP port
//!
//! Encryption keys are read back from the previously rendered configuration so that
//! they survive spec changes.

pub mod config;
pub mod pod;

use k8s_openapi::api::core::v1::{Secret, Service, ServicePort, ServiceSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::{debug, info, info_span, Instrument};

use crate::association::ResolvedAssociation;
use crate::constants::{
    DASHBOARD_CONFIG_FILENAME, DASHBOARD_HTTP_PORT, DEFAULT_DASHBOARD_CONFIG_REF_KEY,
    DEFAULT_DASHBOARD_COUNT, KIND_DASHBOARD,
};
use crate::context::Context;
use crate::crd::Dashboard;
use crate::errors::{Error, Result};
use crate::labels::{
    COMPONENT_DASHBOARD, K8S_COMPONENT, K8S_INSTANCE, K8S_MANAGED_BY, K8S_NAME, K8S_PART_OF,
    MANAGED_BY_BEACON, NAME_LABEL, PART_OF_BEACON, TYPE_LABEL,
};
use crate::metrics::{record_reconciliation_error, record_reconciliation_success};
use crate::names::{
    dashboard_config_secret_name, dashboard_http_certs_secret_name, dashboard_http_service_name,
    dashboard_workload_name, NamespacedName,
};
use crate::platform::Platform;
use crate::reconcilers::driver::{
    content_hash, is_being_deleted, is_managed, nsn_of, reconcile_associations, report_error,
    update_status, AssociationPhase,
};
use crate::reconcilers::keystore::{reconcile_keystore, KeystoreCommands};
use crate::reconcilers::resources::{
    garbage_collect_soft_owned_secrets, is_subset, merged, owner_references, reconcile_resource,
    reconcile_secret, soft_owner_labels,
};
use crate::reconcilers::results::Results;
use crate::reconcilers::user_config::load_user_config;
use crate::reconcilers::workload::{reconcile_workload, Shape, WorkloadParams};
use crate::secrets;
use crate::settings::CanonicalConfig;
use crate::validation;
use crate::version::Version;
use crate::watches::cert_watch_key;

/// Keystore tool of the Dashboard image.
#[must_use]
pub fn keystore_commands() -> KeystoreCommands {
    let binary = format!("/usr/share/{}/bin/{}-keystore", pod::DASHBOARD_HOME, pod::DASHBOARD_HOME);
    KeystoreCommands {
        create: format!("{binary} create"),
        add: format!("{binary} add \"$key\" --stdin < \"$filename\""),
        keystore_dir: pod::data_mount().mount_path,
        use_initialized_flag: true,
    }
}

/// Identity labels of a Dashboard, also the selector of its pods.
#[must_use]
pub fn selector_labels(dashboard: &Dashboard) -> BTreeMap<String, String> {
    BTreeMap::from([
        (TYPE_LABEL.to_string(), pod::DASHBOARD_HOME.to_string()),
        (
            NAME_LABEL.to_string(),
            dashboard.metadata.name.clone().unwrap_or_default(),
        ),
    ])
}

fn workload_labels(dashboard: &Dashboard, selector: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    let mut labels = selector.clone();
    labels.insert(K8S_NAME.to_string(), pod::DASHBOARD_HOME.to_string());
    labels.insert(
        K8S_INSTANCE.to_string(),
        dashboard.metadata.name.clone().unwrap_or_default(),
    );
    labels.insert(K8S_COMPONENT.to_string(), COMPONENT_DASHBOARD.to_string());
    labels.insert(K8S_PART_OF.to_string(), PART_OF_BEACON.to_string());
    labels.insert(K8S_MANAGED_BY.to_string(), MANAGED_BY_BEACON.to_string());
    labels
}

/// Secret serving the HTTPS certificate, `None` when TLS is disabled.
#[must_use]
pub fn http_certs_secret_name(dashboard: &Dashboard) -> Option<String> {
    if !config::tls_enabled(dashboard) {
        return None;
    }
    let user_secret = dashboard
        .spec
        .http
        .as_ref()
        .and_then(|h| h.tls.as_ref())
        .and_then(|t| t.certificate_secret_name.clone())
        .filter(|s| !s.is_empty());
    Some(user_secret.unwrap_or_else(|| {
        dashboard_http_certs_secret_name(dashboard.metadata.name.as_deref().unwrap_or_default())
    }))
}

/// Image of the Dashboard container: the spec image, else the operator default.
#[must_use]
pub fn image(dashboard: &Dashboard, config: &crate::config::OperatorConfig) -> String {
    match dashboard.spec.image.as_deref().filter(|i| !i.is_empty()) {
        Some(image) => image.to_string(),
        None => config.dashboard_image(&dashboard.spec.version),
    }
}

/// Configuration rendered by the previous reconcile, if any.
async fn existing_config<P: Platform>(
    platform: &P,
    namespace: &str,
    secret_name: &str,
) -> Result<Option<CanonicalConfig>> {
    let Some(secret) = platform.get::<Secret>(namespace, secret_name).await? else {
        debug!(namespace = %namespace, secret = %secret_name, "No previous Dashboard configuration");
        return Ok(None);
    };
    let raw = secrets::value(&secret, DASHBOARD_CONFIG_FILENAME).ok_or_else(|| {
        Error::MissingSecretKey {
            namespace: namespace.to_string(),
            name: secret_name.to_string(),
            key: DASHBOARD_CONFIG_FILENAME.to_string(),
        }
    })?;
    CanonicalConfig::parse(&raw).map(Some)
}

/// Registers the certificate watch and returns the `(name, resourceVersion)` of the
/// certificate secret.
async fn reconcile_http_certs<P: Platform>(
    ctx: &Context<P>,
    owner: &NamespacedName,
    secret_name: Option<&str>,
) -> Result<Option<(String, String)>> {
    let watch_key = cert_watch_key(KIND_DASHBOARD, owner);
    let Some(secret_name) = secret_name else {
        ctx.watches.secrets.remove(&watch_key);
        return Ok(None);
    };
    ctx.watches.secrets.register(
        &watch_key,
        KIND_DASHBOARD,
        owner,
        [NamespacedName::new(&owner.namespace, secret_name)],
    );
    let secret: Secret = ctx
        .platform
        .get(&owner.namespace, secret_name)
        .await?
        .ok_or_else(|| Error::not_found("Secret", &owner.namespace, secret_name))?;
    Ok(Some((
        secret_name.to_string(),
        secret.metadata.resource_version.unwrap_or_default(),
    )))
}

/// Expected HTTP service of a Dashboard.
#[must_use]
pub fn http_service(
    dashboard: &Dashboard,
    selector: &BTreeMap<String, String>,
    labels: BTreeMap<String, String>,
) -> Service {
    let owner = nsn_of(dashboard);
    Service {
        metadata: ObjectMeta {
            name: Some(dashboard_http_service_name(&owner.name)),
            namespace: Some(owner.namespace),
            labels: Some(labels),
            owner_references: owner_references(dashboard),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            selector: Some(selector.clone()),
            ports: Some(vec![ServicePort {
                name: Some(pod::http_port_name(config::tls_enabled(dashboard)).to_string()),
                port: DASHBOARD_HTTP_PORT,
                target_port: Some(IntOrString::Int(DASHBOARD_HTTP_PORT)),
                protocol: Some("TCP".to_string()),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

async fn reconcile_service<P: Platform>(platform: &P, expected: &Service) -> Result<Service> {
    let ports_and_selector = |service: &Service| {
        service
            .spec
            .as_ref()
            .map(|s| (s.ports.clone(), s.selector.clone()))
    };
    reconcile_resource(
        platform,
        expected,
        |expected, existing| {
            ports_and_selector(expected) != ports_and_selector(existing)
                || !is_subset(expected.metadata.labels.as_ref(), existing.metadata.labels.as_ref())
        },
        |existing, expected| {
            let mut updated = existing.clone();
            updated.metadata.labels = merged(
                existing.metadata.labels.as_ref(),
                expected.metadata.labels.as_ref(),
            );
            if let (Some(spec), Some(expected_spec)) = (updated.spec.as_mut(), expected.spec.as_ref()) {
                spec.ports.clone_from(&expected_spec.ports);
                spec.selector.clone_from(&expected_spec.selector);
            } else {
                updated.spec.clone_from(&expected.spec);
            }
            updated
        },
    )
    .await
}

/// Loads the user configuration and renders `dashboard.yml`, reusing the settings of the
/// previous render.
async fn render_config<P: Platform>(
    ctx: &Context<P>,
    dashboard: &Dashboard,
    owner: &NamespacedName,
    resolved: &[ResolvedAssociation],
    config_secret_name: &str,
) -> Result<Vec<u8>> {
    let version = Version::parse(&dashboard.spec.version)?;
    let user_config = load_user_config(
        &ctx.platform,
        &ctx.watches.secrets,
        KIND_DASHBOARD,
        owner,
        dashboard.spec.config.as_ref(),
        dashboard.spec.config_ref.as_ref(),
        DEFAULT_DASHBOARD_CONFIG_REF_KEY,
    )
    .await?;
    let existing = existing_config(&ctx.platform, &owner.namespace, config_secret_name).await?;
    config::compose(
        dashboard,
        &config::ComposeParams {
            version: &version,
            ip_family: ctx.config.ip_family,
            resolved,
            existing: existing.as_ref(),
            user: user_config.as_ref(),
        },
    )?
    .render()
}

/// Reconcile a Dashboard that exists, is managed and is not being deleted.
///
/// The configuration secret, the HTTP certificates, the keystore and the Service are
/// reconciled independently. The Deployment is only touched once all of them succeeded.
async fn reconcile_existing<P: Platform>(ctx: &Context<P>, dashboard: Dashboard) -> Results {
    let mut results = Results::new();
    if let Err(e) = validation::check(None, &dashboard) {
        return results.with_error(e);
    }

    let (dashboard, phase) = match reconcile_associations(ctx, dashboard).await {
        Ok(outcome) => outcome,
        Err(e) => return results.with_error(e),
    };
    let (resolved, statuses) = match phase {
        AssociationPhase::Ready { resolved, statuses } => (resolved, statuses),
        AssociationPhase::Done(done) => return done,
    };

    let owner = nsn_of(&dashboard);
    let config_secret_name = dashboard_config_secret_name(&owner.name);
    let rendered = match render_config(ctx, &dashboard, &owner, &resolved, &config_secret_name).await
    {
        Ok(rendered) => rendered,
        Err(e) => return results.with_error(e),
    };

    let selector = selector_labels(&dashboard);
    let labels = workload_labels(&dashboard, &selector);
    let mut secret_labels = soft_owner_labels(KIND_DASHBOARD, &owner);
    secret_labels.extend(selector.clone());
    let config_secret = Secret {
        metadata: ObjectMeta {
            name: Some(config_secret_name.clone()),
            namespace: Some(owner.namespace.clone()),
            labels: Some(secret_labels),
            owner_references: owner_references(&dashboard),
            ..Default::default()
        },
        data: Some(secrets::data_from([(DASHBOARD_CONFIG_FILENAME, rendered.clone())])),
        ..Default::default()
    };
    let config_secret = results.absorb(reconcile_secret(&ctx.platform, &config_secret).await);

    let certs_secret = http_certs_secret_name(&dashboard);
    let certs_version =
        results.absorb(reconcile_http_certs(ctx, &owner, certs_secret.as_deref()).await);

    let keystore = results.absorb(
        reconcile_keystore(
            &ctx.platform,
            &ctx.watches.secrets,
            KIND_DASHBOARD,
            &owner,
            &dashboard.spec.secure_settings,
            &keystore_commands(),
            &pod::data_mount(),
        )
        .await,
    );

    let service = http_service(&dashboard, &selector, labels.clone());
    let service = results.absorb(reconcile_service(&ctx.platform, &service).await);

    let (Some(_), Some(certs_version), Some(keystore), Some(_)) =
        (config_secret, certs_version, keystore, service)
    else {
        return results;
    };

    let config_hash = content_hash(
        &rendered,
        &resolved,
        keystore
            .iter()
            .flat_map(|k| k.secret_versions.iter())
            .chain(certs_version.iter()),
    );
    debug!(dashboard = %owner, hash = %config_hash, "Computed configuration hash");

    let pod_template = pod::build_pod_template(
        &dashboard,
        &pod::PodParams {
            image: image(&dashboard, &ctx.config),
            config_secret_name,
            config_hash,
            selector: &selector,
            associations: &resolved,
            keystore: keystore.as_ref(),
            http_certs_secret: certs_secret.as_deref(),
        },
    );

    let counts = reconcile_workload(
        &ctx.platform,
        &WorkloadParams {
            name: dashboard_workload_name(&owner.name),
            namespace: owner.namespace.clone(),
            selector: selector.clone(),
            labels,
            pod_template,
            shape: Shape::Deployment {
                replicas: dashboard.spec.count.unwrap_or(DEFAULT_DASHBOARD_COUNT),
                strategy: None,
            },
            owner_references: owner_references(&dashboard),
        },
    )
    .await;
    let Some(counts) = results.absorb(counts) else {
        return results;
    };

    let status = update_status(ctx, &dashboard, counts, &selector, statuses).await;
    if let Some(status) = results.absorb(status) {
        results.merge(status);
    }
    results
}

/// Reconcile the Dashboard `nsn`.
///
/// # Errors
///
/// Returns the error of the reconcile, an [`Error::Aggregate`] when several independent
/// steps failed. It has already been reported as an event and on the `Ready` condition
/// when the user can act on it.
///
/// [`Error::Aggregate`]: crate::errors::Error::Aggregate
pub async fn reconcile_dashboard<P: Platform>(
    ctx: &Context<P>,
    nsn: &NamespacedName,
) -> Result<Results> {
    let span = info_span!(
        "reconcile",
        controller = KIND_DASHBOARD,
        namespace = %nsn.namespace,
        name = %nsn.name,
        iteration = ctx.next_iteration()
    );
    async move {
        let start = Instant::now();
        let Some(dashboard) = ctx.platform.get::<Dashboard>(&nsn.namespace, &nsn.name).await? else {
            debug!("Dashboard {nsn} not found, cleaning up");
            on_delete(ctx, nsn).await?;
            return Ok(Results::new());
        };
        if !is_managed(&dashboard) {
            info!("Dashboard {nsn} is not managed, skipping");
            return Ok(Results::new());
        }
        if is_being_deleted(&dashboard) {
            debug!("Dashboard {nsn} is being deleted, skipping");
            return Ok(Results::new());
        }

        info!("Reconciling Dashboard {nsn}");
        match reconcile_existing(ctx, dashboard.clone()).await.aggregate() {
            Ok(results) => {
                record_reconciliation_success(KIND_DASHBOARD, start.elapsed());
                Ok(results)
            }
            Err(e) => {
                record_reconciliation_error(KIND_DASHBOARD, start.elapsed());
                report_error(ctx, &dashboard, &e).await;
                Err(e)
            }
        }
    }
    .instrument(span)
    .await
}

/// Cleans up after a deleted Dashboard: drops its watches and its soft-owned secrets.
///
/// # Errors
///
/// Returns platform errors from listing or deleting.
pub async fn on_delete<P: Platform>(ctx: &Context<P>, owner: &NamespacedName) -> Result<()> {
    ctx.watches.remove_owner(KIND_DASHBOARD, owner);
    garbage_collect_soft_owned_secrets(&ctx.platform, KIND_DASHBOARD, owner).await?;
    Ok(())
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod mod_tests;
