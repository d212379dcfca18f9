// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Pod template of a Beat.

use k8s_openapi::api::core::v1::{
    EmptyDirVolumeSource, HostPathVolumeSource, PodTemplateSpec, Volume, VolumeMount,
};
use std::collections::BTreeMap;

use crate::association::ResolvedAssociation;
use crate::constants::{
    BEAT_CONFIG_FILENAME, CONTAINER_NAME_BEAT, MONITORING_SOCKET_DIR, NODE_NAME_ENV,
};
use crate::crd::Beat;
use crate::labels::CONFIG_HASH_ANNOTATION;
use crate::names::{beat_config_mount_path, beat_host_data_path, data_mount_path, data_volume_name};
use crate::reconcilers::keystore::KeystoreResources;
use crate::reconcilers::pod_template::{
    ca_volume, config_volume, env_from_field, permissions_init_container, pod_labels, resources,
    PodTemplateBuilder,
};

/// Name of the volume sharing the monitoring socket.
pub const SHARED_VOLUME_NAME: &str = "shared-data";

/// Host path volume type creating the directory when missing.
const HOST_PATH_DIRECTORY_OR_CREATE: &str = "DirectoryOrCreate";

/// Everything the pod template depends on besides the Beat itself.
#[derive(Clone, Debug)]
pub struct PodParams<'a> {
    pub image: String,
    pub config_secret_name: String,
    pub config_hash: String,
    pub selector: &'a BTreeMap<String, String>,
    pub associations: &'a [ResolvedAssociation],
    pub keystore: Option<&'a KeystoreResources>,
    /// Generated autodiscover service account, when the operator manages one
    pub service_account: Option<&'a str>,
}

/// Mount of the data volume of a Beat.
#[must_use]
pub fn data_mount(beat_type: &str) -> VolumeMount {
    VolumeMount {
        name: data_volume_name(beat_type),
        mount_path: data_mount_path(beat_type),
        ..Default::default()
    }
}

/// Builds the pod template of `beat`.
#[must_use]
pub fn build_pod_template(beat: &Beat, params: &PodParams<'_>) -> PodTemplateSpec {
    let beat_type = beat.spec.r#type.as_str();
    let namespace = beat.metadata.namespace.as_deref().unwrap_or_default();
    let name = beat.metadata.name.as_deref().unwrap_or_default();
    let user_template = beat
        .spec
        .daemon_set
        .as_ref()
        .and_then(|d| d.pod_template.as_ref())
        .or_else(|| beat.spec.deployment.as_ref().and_then(|d| d.pod_template.as_ref()));

    let (config_volume, config_mount) = config_volume(
        &params.config_secret_name,
        BEAT_CONFIG_FILENAME,
        &beat_config_mount_path(),
    );
    let mut volumes = vec![config_volume];
    let mut mounts = vec![config_mount];

    for resolved in params.associations.iter().filter(|r| r.ca_available) {
        let (volume, mount) = ca_volume(resolved);
        volumes.push(volume);
        mounts.push(mount);
    }

    let data_mount = data_mount(beat_type);
    mounts.push(data_mount.clone());
    let builder = PodTemplateBuilder::new(user_template, CONTAINER_NAME_BEAT);
    let host_data = !builder.has_volume(&data_mount.name);
    volumes.push(Volume {
        name: data_mount.name.clone(),
        host_path: Some(HostPathVolumeSource {
            path: beat_host_data_path(namespace, name, beat_type),
            type_: Some(HOST_PATH_DIRECTORY_OR_CREATE.to_string()),
        }),
        ..Default::default()
    });

    if beat.spec.monitoring.as_ref().is_some_and(|m| m.is_defined()) {
        volumes.push(Volume {
            name: SHARED_VOLUME_NAME.to_string(),
            empty_dir: Some(EmptyDirVolumeSource::default()),
            ..Default::default()
        });
        mounts.push(VolumeMount {
            name: SHARED_VOLUME_NAME.to_string(),
            mount_path: MONITORING_SOCKET_DIR.to_string(),
            ..Default::default()
        });
    }

    let mut init_containers = Vec::new();
    if host_data {
        let (uid, gid) = builder.effective_user();
        init_containers.extend(permissions_init_container(
            &data_mount.name,
            &data_mount.mount_path,
            uid,
            gid,
        ));
    }
    if let Some(keystore) = params.keystore {
        volumes.push(keystore.volume.clone());
        init_containers.push(keystore.init_container.clone());
    }

    let annotations = BTreeMap::from([(CONFIG_HASH_ANNOTATION.to_string(), params.config_hash.clone())]);
    let config_path = beat_config_mount_path();
    builder
        .with_labels(&pod_labels(params.selector, &beat.spec.version, &params.config_hash))
        .with_annotations(&annotations)
        .with_image(&params.image)
        .with_args(&["-e", "-c", config_path.as_str()])
        .with_env(vec![env_from_field(NODE_NAME_ENV, "spec.nodeName")])
        .with_resources(resources("300Mi", "100m"))
        .with_volumes(volumes)
        .with_volume_mounts(mounts)
        .with_init_containers(init_containers)
        .with_init_container_defaults()
        .with_service_account(
            beat.spec
                .service_account_name
                .as_deref()
                .or(params.service_account),
        )
        .with_host_network_dns_policy()
        .build()
}

#[cfg(test)]
#[path = "pod_tests.rs"]
mod pod_tests;
