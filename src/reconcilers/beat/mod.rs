// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Beat reconciliation logic.
//!
//! A Beat is rendered into:
//! - a configuration secret `<name>-beat-<type>-config` holding `beat.yml`
//! - a DaemonSet or a Deployment `<name>-beat-<type>`, the other shape is deleted
//! - optionally a ServiceAccount and ClusterRoleBinding for autodiscovery
//!
//! The pod template carries a hash of the rendered configuration and of every secret
//! version the pods depend on, so any relevant change rolls the pods.

pub mod config;
pub mod pod;

use k8s_openapi::api::core::v1::{Secret, ServiceAccount};
use k8s_openapi::api::rbac::v1::{ClusterRoleBinding, RoleRef, Subject};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::{debug, info, info_span, Instrument};

use crate::association::ResolvedAssociation;
use crate::constants::{
    AUTODISCOVER_CLUSTER_ROLE, BEAT_CONFIG_FILENAME, DEFAULT_BEAT_REPLICAS,
    DEFAULT_CONFIG_REF_KEY, KIND_BEAT, KNOWN_BEAT_TYPES,
};
use crate::context::Context;
use crate::crd::Beat;
use crate::errors::Result;
use crate::labels::{
    COMPONENT_AGENT, K8S_COMPONENT, K8S_INSTANCE, K8S_MANAGED_BY, K8S_NAME, K8S_PART_OF,
    MANAGED_BY_BEACON, NAME_LABEL, PART_OF_BEACON, TYPE_LABEL,
};
use crate::metrics::{record_reconciliation_error, record_reconciliation_success};
use crate::names::{
    beat_autodiscover_binding_name, beat_autodiscover_name, beat_config_secret_name,
    beat_workload_name, data_mount_path, NamespacedName,
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
use crate::validation;

const RBAC_API_GROUP: &str = "rbac.authorization.k8s.io";

/// Beat families shipped with a default image, and the open fallback.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BeatKind {
    /// One of the known types, a default image exists for it
    Known(&'static str),
    /// Any other type, the spec must name an image
    Other(String),
}

impl BeatKind {
    #[must_use]
    pub fn from_type(beat_type: &str) -> Self {
        KNOWN_BEAT_TYPES
            .iter()
            .copied()
            .find(|known| *known == beat_type)
            .map_or_else(|| Self::Other(beat_type.to_string()), Self::Known)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Known(beat_type) => *beat_type,
            Self::Other(beat_type) => beat_type.as_str(),
        }
    }

    /// Image of the Beat container: the spec image, else the default of a known type.
    #[must_use]
    pub fn image(&self, beat: &Beat, config: &crate::config::OperatorConfig) -> String {
        match beat.spec.image.as_deref().filter(|i| !i.is_empty()) {
            Some(image) => image.to_string(),
            None => config.beat_image(self.as_str(), &beat.spec.version),
        }
    }

    /// Keystore commands, the Beat binary is named after its type.
    #[must_use]
    pub fn keystore_commands(&self) -> KeystoreCommands {
        let binary = self.as_str();
        KeystoreCommands {
            create: format!("{binary} keystore create --force"),
            add: format!("cat \"$filename\" | {binary} keystore add \"$key\" --stdin --force"),
            keystore_dir: data_mount_path(binary),
            use_initialized_flag: false,
        }
    }
}

/// Identity labels of a Beat, also the selector of its workload.
#[must_use]
pub fn selector_labels(beat: &Beat) -> BTreeMap<String, String> {
    BTreeMap::from([
        (TYPE_LABEL.to_string(), beat.spec.r#type.clone()),
        (
            NAME_LABEL.to_string(),
            beat.metadata.name.clone().unwrap_or_default(),
        ),
    ])
}

fn workload_labels(beat: &Beat, selector: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    let mut labels = selector.clone();
    labels.insert(K8S_NAME.to_string(), beat.spec.r#type.clone());
    labels.insert(
        K8S_INSTANCE.to_string(),
        beat.metadata.name.clone().unwrap_or_default(),
    );
    labels.insert(K8S_COMPONENT.to_string(), COMPONENT_AGENT.to_string());
    labels.insert(K8S_PART_OF.to_string(), PART_OF_BEACON.to_string());
    labels.insert(K8S_MANAGED_BY.to_string(), MANAGED_BY_BEACON.to_string());
    labels
}

/// Workload shape requested by the spec. A Deployment wins over a DaemonSet, the
/// validator rejects Beats setting both.
#[must_use]
pub fn shape(beat: &Beat) -> Shape {
    match &beat.spec.deployment {
        Some(deployment) => Shape::Deployment {
            replicas: deployment.replicas.unwrap_or(DEFAULT_BEAT_REPLICAS),
            strategy: deployment.strategy.clone(),
        },
        None => Shape::DaemonSet {
            update_strategy: beat
                .spec
                .daemon_set
                .as_ref()
                .and_then(|d| d.update_strategy.clone()),
        },
    }
}

/// Reconciles the ServiceAccount and ClusterRoleBinding used for autodiscovery.
///
/// Returns the name of the generated service account, `None` when the Beat brings
/// its own or the operator does not manage autodiscovery RBAC.
async fn reconcile_autodiscover_rbac<P: Platform>(
    ctx: &Context<P>,
    beat: &Beat,
) -> Result<Option<String>> {
    if !ctx.config.manage_autodiscover_rbac {
        return Ok(None);
    }
    let owner = nsn_of(beat);
    let beat_type = beat.spec.r#type.as_str();
    let binding_name = beat_autodiscover_binding_name(&owner.namespace, &owner.name, beat_type);

    if beat
        .spec
        .service_account_name
        .as_deref()
        .is_some_and(|sa| !sa.is_empty())
    {
        if ctx.platform.delete_cluster_role_binding(&binding_name).await? {
            info!("Removed autodiscover ClusterRoleBinding {binding_name} of Beat {owner}");
        }
        return Ok(None);
    }

    let account_name = beat_autodiscover_name(&owner.name, beat_type);
    let mut labels = soft_owner_labels(KIND_BEAT, &owner);
    labels.insert(TYPE_LABEL.to_string(), beat_type.to_string());

    let account = ServiceAccount {
        metadata: ObjectMeta {
            name: Some(account_name.clone()),
            namespace: Some(owner.namespace.clone()),
            labels: Some(labels.clone()),
            owner_references: owner_references(beat),
            ..Default::default()
        },
        ..Default::default()
    };
    reconcile_resource(
        &ctx.platform,
        &account,
        |expected, existing| {
            !is_subset(expected.metadata.labels.as_ref(), existing.metadata.labels.as_ref())
        },
        |existing, expected| {
            let mut updated = existing.clone();
            updated.metadata.labels = merged(
                existing.metadata.labels.as_ref(),
                expected.metadata.labels.as_ref(),
            );
            updated
                .metadata
                .owner_references
                .clone_from(&expected.metadata.owner_references);
            updated
        },
    )
    .await?;

    let binding = ClusterRoleBinding {
        metadata: ObjectMeta {
            name: Some(binding_name),
            labels: Some(labels),
            ..Default::default()
        },
        role_ref: RoleRef {
            api_group: RBAC_API_GROUP.to_string(),
            kind: "ClusterRole".to_string(),
            name: AUTODISCOVER_CLUSTER_ROLE.to_string(),
        },
        subjects: Some(vec![Subject {
            kind: "ServiceAccount".to_string(),
            name: account_name.clone(),
            namespace: Some(owner.namespace.clone()),
            ..Default::default()
        }]),
    };
    ctx.platform.apply_cluster_role_binding(&binding).await?;
    Ok(Some(account_name))
}

/// Loads the user configuration and renders `beat.yml`.
async fn render_config<P: Platform>(
    ctx: &Context<P>,
    beat: &Beat,
    owner: &NamespacedName,
    resolved: &[ResolvedAssociation],
) -> Result<Vec<u8>> {
    let user_config = load_user_config(
        &ctx.platform,
        &ctx.watches.secrets,
        KIND_BEAT,
        owner,
        beat.spec.config.as_ref(),
        beat.spec.config_ref.as_ref(),
        DEFAULT_CONFIG_REF_KEY,
    )
    .await?;
    config::compose(beat, resolved, user_config.as_ref())?.render()
}

/// Reconcile a Beat that exists, is managed and is not being deleted.
///
/// The configuration secret, the keystore and the autodiscover RBAC are reconciled
/// independently. The workload is only touched once all of them succeeded.
async fn reconcile_existing<P: Platform>(ctx: &Context<P>, beat: Beat) -> Results {
    let mut results = Results::new();
    if let Err(e) = validation::check(None, &beat) {
        return results.with_error(e);
    }

    let (beat, phase) = match reconcile_associations(ctx, beat).await {
        Ok(outcome) => outcome,
        Err(e) => return results.with_error(e),
    };
    let (resolved, statuses) = match phase {
        AssociationPhase::Ready { resolved, statuses } => (resolved, statuses),
        AssociationPhase::Done(done) => return done,
    };

    let owner = nsn_of(&beat);
    let kind = BeatKind::from_type(&beat.spec.r#type);
    let beat_type = kind.as_str();

    let rendered = match render_config(ctx, &beat, &owner, &resolved).await {
        Ok(rendered) => rendered,
        Err(e) => return results.with_error(e),
    };

    let selector = selector_labels(&beat);
    let config_secret_name = beat_config_secret_name(&owner.name, beat_type);
    let mut secret_labels = soft_owner_labels(KIND_BEAT, &owner);
    secret_labels.extend(selector.clone());
    let config_secret = Secret {
        metadata: ObjectMeta {
            name: Some(config_secret_name.clone()),
            namespace: Some(owner.namespace.clone()),
            labels: Some(secret_labels),
            owner_references: owner_references(&beat),
            ..Default::default()
        },
        data: Some(secrets::data_from([(BEAT_CONFIG_FILENAME, rendered.clone())])),
        ..Default::default()
    };
    let config_secret = results.absorb(reconcile_secret(&ctx.platform, &config_secret).await);

    let keystore = results.absorb(
        reconcile_keystore(
            &ctx.platform,
            &ctx.watches.secrets,
            KIND_BEAT,
            &owner,
            &beat.spec.secure_settings,
            &kind.keystore_commands(),
            &pod::data_mount(beat_type),
        )
        .await,
    );

    let service_account = results.absorb(reconcile_autodiscover_rbac(ctx, &beat).await);

    let (Some(_), Some(keystore), Some(service_account)) =
        (config_secret, keystore, service_account)
    else {
        return results;
    };

    let config_hash = content_hash(
        &rendered,
        &resolved,
        keystore.iter().flat_map(|k| k.secret_versions.iter()),
    );
    debug!(beat = %owner, hash = %config_hash, "Computed configuration hash");

    let pod_template = pod::build_pod_template(
        &beat,
        &pod::PodParams {
            image: kind.image(&beat, &ctx.config),
            config_secret_name,
            config_hash,
            selector: &selector,
            associations: &resolved,
            keystore: keystore.as_ref(),
            service_account: service_account.as_deref(),
        },
    );

    let counts = reconcile_workload(
        &ctx.platform,
        &WorkloadParams {
            name: beat_workload_name(&owner.name, beat_type),
            namespace: owner.namespace.clone(),
            selector: selector.clone(),
            labels: workload_labels(&beat, &selector),
            pod_template,
            shape: shape(&beat),
            owner_references: owner_references(&beat),
        },
    )
    .await;
    let Some(counts) = results.absorb(counts) else {
        return results;
    };

    let status = update_status(ctx, &beat, counts, &selector, statuses).await;
    if let Some(status) = results.absorb(status) {
        results.merge(status);
    }
    results
}

/// Reconcile the Beat `nsn`.
///
/// # Errors
///
/// Returns the error of the reconcile, an [`Error::Aggregate`] when several independent
/// steps failed. It has already been reported as an event and on the `Ready` condition
/// when the user can act on it.
///
/// [`Error::Aggregate`]: crate::errors::Error::Aggregate
pub async fn reconcile_beat<P: Platform>(ctx: &Context<P>, nsn: &NamespacedName) -> Result<Results> {
    let span = info_span!(
        "reconcile",
        controller = KIND_BEAT,
        namespace = %nsn.namespace,
        name = %nsn.name,
        iteration = ctx.next_iteration()
    );
    async move {
        let start = Instant::now();
        let Some(beat) = ctx.platform.get::<Beat>(&nsn.namespace, &nsn.name).await? else {
            debug!("Beat {nsn} not found, cleaning up");
            on_delete(ctx, nsn, None).await?;
            return Ok(Results::new());
        };
        if !is_managed(&beat) {
            info!("Beat {nsn} is not managed, skipping");
            return Ok(Results::new());
        }
        if is_being_deleted(&beat) {
            debug!("Beat {nsn} is being deleted, skipping");
            return Ok(Results::new());
        }

        info!("Reconciling Beat {nsn}");
        match reconcile_existing(ctx, beat.clone()).await.aggregate() {
            Ok(results) => {
                record_reconciliation_success(KIND_BEAT, start.elapsed());
                Ok(results)
            }
            Err(e) => {
                record_reconciliation_error(KIND_BEAT, start.elapsed());
                report_error(ctx, &beat, &e).await;
                Err(e)
            }
        }
    }
    .instrument(span)
    .await
}

/// Cleans up after a deleted Beat.
///
/// Drops its dynamic watches, deletes its autodiscover ClusterRoleBinding and garbage
/// collects its soft-owned secrets. The type of the deleted Beat is passed when known;
/// otherwise it is read from the labels of its soft-owned secrets.
///
/// # Errors
///
/// Returns platform errors from listing or deleting.
pub async fn on_delete<P: Platform>(
    ctx: &Context<P>,
    owner: &NamespacedName,
    beat_type: Option<&str>,
) -> Result<()> {
    ctx.watches.remove_owner(KIND_BEAT, owner);

    let soft_owned: Vec<Secret> = ctx
        .platform
        .list(&owner.namespace, &soft_owner_labels(KIND_BEAT, owner))
        .await?;
    let mut types: Vec<String> = soft_owned
        .iter()
        .filter_map(|s| s.metadata.labels.as_ref()?.get(TYPE_LABEL).cloned())
        .chain(beat_type.map(ToString::to_string))
        .collect();
    types.sort();
    types.dedup();
    for beat_type in &types {
        let binding = beat_autodiscover_binding_name(&owner.namespace, &owner.name, beat_type);
        if ctx.platform.delete_cluster_role_binding(&binding).await? {
            info!("Removed autodiscover ClusterRoleBinding {binding} of deleted Beat {owner}");
        }
    }

    garbage_collect_soft_owned_secrets(&ctx.platform, KIND_BEAT, owner).await?;
    Ok(())
}
