// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Pod template of a Dashboard.

use k8s_openapi::api::core::v1::{
    ContainerPort, EmptyDirVolumeSource, HTTPGetAction, PodTemplateSpec, Probe,
    SecretVolumeSource, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use std::collections::BTreeMap;

use crate::association::ResolvedAssociation;
use crate::constants::{
    CONTAINER_NAME_DASHBOARD, DASHBOARD_CONFIG_FILENAME, DASHBOARD_HTTP_PORT,
    HTTP_CERTS_MOUNT_PATH, HTTP_CERTS_VOLUME_NAME,
};
use crate::crd::Dashboard;
use crate::labels::CONFIG_HASH_ANNOTATION;
use crate::names::{dashboard_config_mount_path, data_mount_path, data_volume_name};
use crate::reconcilers::keystore::KeystoreResources;
use crate::reconcilers::pod_template::{
    ca_volume, config_volume, pod_labels, resources, PodTemplateBuilder,
};

/// Directory name of the Dashboard under `/usr/share`.
pub const DASHBOARD_HOME: &str = "dashboard";

/// Path the readiness probe requests.
const READINESS_PATH: &str = "/login";

/// Everything the pod template depends on besides the Dashboard itself.
#[derive(Clone, Debug)]
pub struct PodParams<'a> {
    pub image: String,
    pub config_secret_name: String,
    pub config_hash: String,
    pub selector: &'a BTreeMap<String, String>,
    pub associations: &'a [ResolvedAssociation],
    pub keystore: Option<&'a KeystoreResources>,
    /// Secret with the certificate served over HTTPS, `None` when TLS is disabled
    pub http_certs_secret: Option<&'a str>,
}

/// Mount of the Dashboard data volume, also holding the keystore.
#[must_use]
pub fn data_mount() -> VolumeMount {
    VolumeMount {
        name: data_volume_name(DASHBOARD_HOME),
        mount_path: data_mount_path(DASHBOARD_HOME),
        ..Default::default()
    }
}

/// Name of the HTTP port, following the scheme served.
#[must_use]
pub fn http_port_name(tls: bool) -> &'static str {
    if tls {
        "https"
    } else {
        "http"
    }
}

fn readiness_probe(tls: bool) -> Probe {
    Probe {
        failure_threshold: Some(3),
        initial_delay_seconds: Some(10),
        period_seconds: Some(10),
        success_threshold: Some(1),
        timeout_seconds: Some(5),
        http_get: Some(HTTPGetAction {
            path: Some(READINESS_PATH.to_string()),
            port: IntOrString::Int(DASHBOARD_HTTP_PORT),
            scheme: Some(if tls { "HTTPS" } else { "HTTP" }.to_string()),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Builds the pod template of `dashboard`.
#[must_use]
pub fn build_pod_template(dashboard: &Dashboard, params: &PodParams<'_>) -> PodTemplateSpec {
    let tls = params.http_certs_secret.is_some();
    let (config_volume, config_mount) = config_volume(
        &params.config_secret_name,
        DASHBOARD_CONFIG_FILENAME,
        &dashboard_config_mount_path(),
    );
    let data_mount = data_mount();
    let mut volumes = vec![
        config_volume,
        Volume {
            name: data_mount.name.clone(),
            empty_dir: Some(EmptyDirVolumeSource::default()),
            ..Default::default()
        },
    ];
    let mut mounts = vec![config_mount, data_mount];

    if let Some(secret_name) = params.http_certs_secret {
        volumes.push(Volume {
            name: HTTP_CERTS_VOLUME_NAME.to_string(),
            secret: Some(SecretVolumeSource {
                secret_name: Some(secret_name.to_string()),
                ..Default::default()
            }),
            ..Default::default()
        });
        mounts.push(VolumeMount {
            name: HTTP_CERTS_VOLUME_NAME.to_string(),
            mount_path: HTTP_CERTS_MOUNT_PATH.to_string(),
            read_only: Some(true),
            ..Default::default()
        });
    }

    for resolved in params.associations.iter().filter(|r| r.ca_available) {
        let (volume, mount) = ca_volume(resolved);
        volumes.push(volume);
        mounts.push(mount);
    }

    let mut init_containers = Vec::new();
    if let Some(keystore) = params.keystore {
        volumes.push(keystore.volume.clone());
        init_containers.push(keystore.init_container.clone());
    }

    let annotations = BTreeMap::from([(CONFIG_HASH_ANNOTATION.to_string(), params.config_hash.clone())]);
    PodTemplateBuilder::new(dashboard.spec.pod_template.as_ref(), CONTAINER_NAME_DASHBOARD)
        .with_labels(&pod_labels(params.selector, &dashboard.spec.version, &params.config_hash))
        .with_annotations(&annotations)
        .with_image(&params.image)
        .with_ports(vec![ContainerPort {
            name: Some(http_port_name(tls).to_string()),
            container_port: DASHBOARD_HTTP_PORT,
            protocol: Some("TCP".to_string()),
            ..Default::default()
        }])
        .with_readiness_probe(readiness_probe(tls))
        .with_resources(resources("1Gi", "1"))
        .with_volumes(volumes)
        .with_volume_mounts(mounts)
        .with_init_containers(init_containers)
        .with_init_container_defaults()
        .with_service_account(dashboard.spec.service_account_name.as_deref())
        .build()
}

#[cfg(test)]
#[path = "pod_tests.rs"]
mod pod_tests;
