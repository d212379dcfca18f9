// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Pod template assembly.
//!
//! The user pod template of a resource is the starting point. Operator defaults are
//! layered underneath it: user values always win, operator volumes and mounts never
//! duplicate a name the user already declared, and operator init containers are
//! prepended ahead of the user's.
//!
//! Labels and annotations the operator depends on (identity, version, config hash) are
//! the exception: they are always set to the operator's values.

use k8s_openapi::api::core::v1::{
    Container, ContainerPort, EnvVar, KeyToPath, PodSpec, PodTemplateSpec, Probe,
    ResourceRequirements, SecretVolumeSource, SecurityContext, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::BTreeMap;

use crate::association::ResolvedAssociation;
use crate::constants::{
    CA_FILE_NAME, CONFIG_FILE_MODE, CONFIG_VOLUME_NAME, CONTAINER_NAME_PERMISSIONS,
    DEFAULT_IMAGE_USER_ID, ROOT_USER_ID,
};
use crate::labels::{CONFIG_HASH_LABEL, VERSION_LABEL};

/// DNS policy of pods on the host network that must still resolve cluster services.
const DNS_POLICY_HOST_NETWORK: &str = "ClusterFirstWithHostNet";

/// Resource requirements with identical requests and limits.
#[must_use]
pub fn resources(memory: &str, cpu: &str) -> ResourceRequirements {
    let quantities = BTreeMap::from([
        ("memory".to_string(), Quantity(memory.to_string())),
        ("cpu".to_string(), Quantity(cpu.to_string())),
    ]);
    ResourceRequirements {
        limits: Some(quantities.clone()),
        requests: Some(quantities),
        ..Default::default()
    }
}

/// Environment variable read from a pod field.
#[must_use]
pub fn env_from_field(name: &str, field_path: &str) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value_from: Some(k8s_openapi::api::core::v1::EnvVarSource {
            field_ref: Some(k8s_openapi::api::core::v1::ObjectFieldSelector {
                field_path: field_path.to_string(),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Secret volume holding the CA of an association, with its mount.
#[must_use]
pub fn ca_volume(resolved: &ResolvedAssociation) -> (Volume, VolumeMount) {
    let name = resolved.association.ca_volume_name();
    let volume = Volume {
        name: name.clone(),
        secret: Some(SecretVolumeSource {
            secret_name: Some(resolved.conf.ca_secret_name.clone()),
            items: Some(vec![KeyToPath {
                key: CA_FILE_NAME.to_string(),
                path: CA_FILE_NAME.to_string(),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    };
    let mount = VolumeMount {
        name,
        mount_path: resolved.association.ca_mount_dir(),
        read_only: Some(true),
        ..Default::default()
    };
    (volume, mount)
}

/// Read-only secret volume of a rendered configuration, with its mount.
#[must_use]
pub fn config_volume(secret_name: &str, file_name: &str, mount_path: &str) -> (Volume, VolumeMount) {
    let volume = Volume {
        name: CONFIG_VOLUME_NAME.to_string(),
        secret: Some(SecretVolumeSource {
            secret_name: Some(secret_name.to_string()),
            default_mode: Some(CONFIG_FILE_MODE),
            ..Default::default()
        }),
        ..Default::default()
    };
    let mount = VolumeMount {
        name: CONFIG_VOLUME_NAME.to_string(),
        mount_path: mount_path.to_string(),
        sub_path: Some(file_name.to_string()),
        read_only: Some(true),
        ..Default::default()
    };
    (volume, mount)
}

/// Pod template labels: identity, running version and configuration hash.
#[must_use]
pub fn pod_labels(
    selector: &BTreeMap<String, String>,
    version: &str,
    config_hash: &str,
) -> BTreeMap<String, String> {
    let mut labels = selector.clone();
    labels.insert(VERSION_LABEL.to_string(), version.to_string());
    labels.insert(CONFIG_HASH_LABEL.to_string(), config_hash.to_string());
    labels
}

/// Builds a pod template on top of a user-provided one.
#[derive(Clone, Debug)]
pub struct PodTemplateBuilder {
    template: PodTemplateSpec,
    container_name: String,
}

impl PodTemplateBuilder {
    /// Starts from `user` and makes sure a main container named `container_name` exists.
    #[must_use]
    pub fn new(user: Option<&PodTemplateSpec>, container_name: &str) -> Self {
        let mut template = user.cloned().unwrap_or_default();
        let spec = template.spec.get_or_insert_with(PodSpec::default);
        if !spec.containers.iter().any(|c| c.name == container_name) {
            spec.containers.insert(
                0,
                Container {
                    name: container_name.to_string(),
                    ..Default::default()
                },
            );
        }
        Self {
            template,
            container_name: container_name.to_string(),
        }
    }

    fn spec(&mut self) -> &mut PodSpec {
        self.template.spec.get_or_insert_with(PodSpec::default)
    }

    fn main(&mut self) -> &mut Container {
        let name = self.container_name.clone();
        let spec = self.spec();
        let index = spec
            .containers
            .iter()
            .position(|c| c.name == name)
            .unwrap_or_default();
        &mut spec.containers[index]
    }

    /// The main container.
    #[must_use]
    pub fn main_container(&self) -> Option<&Container> {
        self.template
            .spec
            .as_ref()?
            .containers
            .iter()
            .find(|c| c.name == self.container_name)
    }

    /// Sets operator labels, overriding user labels with the same key.
    #[must_use]
    pub fn with_labels(mut self, labels: &BTreeMap<String, String>) -> Self {
        let meta = self.template.metadata.get_or_insert_with(ObjectMeta::default);
        meta.labels
            .get_or_insert_with(BTreeMap::new)
            .extend(labels.clone());
        self
    }

    /// Sets operator annotations, overriding user annotations with the same key.
    #[must_use]
    pub fn with_annotations(mut self, annotations: &BTreeMap<String, String>) -> Self {
        let meta = self.template.metadata.get_or_insert_with(ObjectMeta::default);
        meta.annotations
            .get_or_insert_with(BTreeMap::new)
            .extend(annotations.clone());
        self
    }

    /// Image of the main container, unless the user set one.
    #[must_use]
    pub fn with_image(mut self, image: &str) -> Self {
        let main = self.main();
        if main.image.as_deref().is_none_or(str::is_empty) {
            main.image = Some(image.to_string());
        }
        self
    }

    /// Arguments of the main container, unless the user set some.
    #[must_use]
    pub fn with_args(mut self, args: &[&str]) -> Self {
        let main = self.main();
        if main.args.as_ref().is_none_or(Vec::is_empty) {
            main.args = Some(args.iter().map(ToString::to_string).collect());
        }
        self
    }

    /// Default resources of the main container, unless the user set some.
    #[must_use]
    pub fn with_resources(mut self, defaults: ResourceRequirements) -> Self {
        let main = self.main();
        if main.resources.is_none() {
            main.resources = Some(defaults);
        }
        self
    }

    /// Environment variables of the main container. User variables win by name.
    #[must_use]
    pub fn with_env(mut self, vars: Vec<EnvVar>) -> Self {
        let env = self.main().env.get_or_insert_with(Vec::new);
        for var in vars {
            if !env.iter().any(|e| e.name == var.name) {
                env.push(var);
            }
        }
        self
    }

    /// Ports of the main container. User ports win by name.
    #[must_use]
    pub fn with_ports(mut self, ports: Vec<ContainerPort>) -> Self {
        let existing = self.main().ports.get_or_insert_with(Vec::new);
        for port in ports {
            if !existing.iter().any(|p| p.name == port.name) {
                existing.push(port);
            }
        }
        self
    }

    /// Readiness probe of the main container, unless the user set one.
    #[must_use]
    pub fn with_readiness_probe(mut self, probe: Probe) -> Self {
        let main = self.main();
        if main.readiness_probe.is_none() {
            main.readiness_probe = Some(probe);
        }
        self
    }

    /// Pod volumes. A user volume with the same name wins.
    #[must_use]
    pub fn with_volumes(mut self, volumes: Vec<Volume>) -> Self {
        let existing = self.spec().volumes.get_or_insert_with(Vec::new);
        for volume in volumes {
            if !existing.iter().any(|v| v.name == volume.name) {
                existing.push(volume);
            }
        }
        self
    }

    /// Volume mounts of the main container. A user mount with the same name or path wins.
    #[must_use]
    pub fn with_volume_mounts(mut self, mounts: Vec<VolumeMount>) -> Self {
        let existing = self.main().volume_mounts.get_or_insert_with(Vec::new);
        merge_mounts(existing, mounts);
        self
    }

    /// Prepends operator init containers. A user init container with the same name wins.
    #[must_use]
    pub fn with_init_containers(mut self, containers: Vec<Container>) -> Self {
        let existing = self.spec().init_containers.get_or_insert_with(Vec::new);
        let mut merged: Vec<Container> = containers
            .into_iter()
            .filter(|c| !existing.iter().any(|e| e.name == c.name))
            .collect();
        merged.append(existing);
        *existing = merged;
        self
    }

    /// Init containers without an image run the main image and see the main mounts.
    #[must_use]
    pub fn with_init_container_defaults(mut self) -> Self {
        let Some(main) = self.main_container().cloned() else {
            return self;
        };
        if let Some(init_containers) = self.spec().init_containers.as_mut() {
            for init in init_containers {
                if init.image.as_deref().is_none_or(str::is_empty) {
                    init.image.clone_from(&main.image);
                }
                let mounts = init.volume_mounts.get_or_insert_with(Vec::new);
                merge_mounts(mounts, main.volume_mounts.clone().unwrap_or_default());
            }
        }
        self
    }

    /// Service account of the pods, unless the user set one.
    #[must_use]
    pub fn with_service_account(mut self, service_account: Option<&str>) -> Self {
        let spec = self.spec();
        if spec.service_account_name.as_deref().is_none_or(str::is_empty) {
            spec.service_account_name = service_account.map(ToString::to_string);
        }
        self
    }

    /// Pods on the host network resolve cluster services through the cluster DNS.
    #[must_use]
    pub fn with_host_network_dns_policy(mut self) -> Self {
        let spec = self.spec();
        if spec.host_network == Some(true) && spec.dns_policy.is_none() {
            spec.dns_policy = Some(DNS_POLICY_HOST_NETWORK.to_string());
        }
        self
    }

    /// User and group the main container runs as.
    ///
    /// Container security context first, then the pod's. Without either the image
    /// default user is assumed.
    #[must_use]
    pub fn effective_user(&self) -> (i64, i64) {
        let container = self
            .main_container()
            .and_then(|c| c.security_context.as_ref());
        let pod = self
            .template
            .spec
            .as_ref()
            .and_then(|s| s.security_context.as_ref());
        let uid = container
            .and_then(|c| c.run_as_user)
            .or_else(|| pod.and_then(|p| p.run_as_user))
            .unwrap_or(DEFAULT_IMAGE_USER_ID);
        let gid = container
            .and_then(|c| c.run_as_group)
            .or_else(|| pod.and_then(|p| p.run_as_group.or(p.fs_group)))
            .unwrap_or(uid);
        (uid, gid)
    }

    /// True when a user volume named `name` exists.
    #[must_use]
    pub fn has_volume(&self, name: &str) -> bool {
        self.template
            .spec
            .as_ref()
            .and_then(|s| s.volumes.as_ref())
            .is_some_and(|volumes| volumes.iter().any(|v| v.name == name))
    }

    #[must_use]
    pub fn build(self) -> PodTemplateSpec {
        self.template
    }
}

fn merge_mounts(existing: &mut Vec<VolumeMount>, mounts: Vec<VolumeMount>) {
    for mount in mounts {
        if !existing
            .iter()
            .any(|m| m.name == mount.name || m.mount_path == mount.mount_path)
        {
            existing.push(mount);
        }
    }
}

/// Privileged init container making a host path data directory writable by `uid:gid`.
///
/// Returns `None` when the main container runs as root.
#[must_use]
pub fn permissions_init_container(
    data_volume: &str,
    data_path: &str,
    uid: i64,
    gid: i64,
) -> Option<Container> {
    if uid == ROOT_USER_ID {
        return None;
    }
    Some(Container {
        name: CONTAINER_NAME_PERMISSIONS.to_string(),
        command: Some(vec![
            "sh".to_string(),
            "-c".to_string(),
            format!("chown -R {uid}:{gid} {data_path}"),
        ]),
        security_context: Some(SecurityContext {
            privileged: Some(true),
            run_as_user: Some(ROOT_USER_ID),
            ..Default::default()
        }),
        volume_mounts: Some(vec![VolumeMount {
            name: data_volume.to_string(),
            mount_path: data_path.to_string(),
            ..Default::default()
        }]),
        resources: Some(resources("32Mi", "10m")),
        ..Default::default()
    })
}

#[cfg(test)]
#[path = "pod_template_tests.rs"]
mod pod_template_tests;
