// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `beat/pod.rs`

#[cfg(test)]
mod tests {
    use k8s_openapi::api::core::v1::{
        Container, EmptyDirVolumeSource, PodSecurityContext, PodSpec, PodTemplateSpec, Volume,
    };
    use std::collections::BTreeMap;

    use crate::association::{Associated, Credentials, ResolvedAssociation};
    use crate::constants::{CONTAINER_NAME_BEAT, CONTAINER_NAME_PERMISSIONS};
    use crate::crd::{
        AssociationConf, Beat, BeatSpec, DaemonSetSpec, Monitoring, MonitoringTargets,
        ObjectSelector,
    };
    use crate::labels::{CONFIG_HASH_ANNOTATION, CONFIG_HASH_LABEL, VERSION_LABEL};
    use crate::reconcilers::beat::pod::*;

    fn beat(spec: BeatSpec) -> Beat {
        let mut beat = Beat::new("k", spec);
        beat.metadata.namespace = Some("ns".to_string());
        beat
    }

    fn spec() -> BeatSpec {
        BeatSpec {
            r#type: "filebeat".to_string(),
            version: "8.15.0".to_string(),
            daemon_set: Some(DaemonSetSpec::default()),
            ..Default::default()
        }
    }

    fn with_template(template: PodTemplateSpec) -> BeatSpec {
        BeatSpec {
            daemon_set: Some(DaemonSetSpec {
                pod_template: Some(template),
                update_strategy: None,
            }),
            ..spec()
        }
    }

    fn selector() -> BTreeMap<String, String> {
        BTreeMap::from([("beacon.firestoned.io/name".to_string(), "k".to_string())])
    }

    fn resolved(beat: &Beat, ca_available: bool) -> Vec<ResolvedAssociation> {
        beat.associations()
            .into_iter()
            .map(|association| ResolvedAssociation {
                association,
                conf: AssociationConf {
                    auth_secret_name: "auth".to_string(),
                    auth_secret_key: "elastic".to_string(),
                    ca_cert_provided: true,
                    ca_secret_name: "es-ca".to_string(),
                    url: "https://es:9200".to_string(),
                    version: "8.15.0".to_string(),
                    service_account: None,
                },
                credentials: Credentials::None,
                ca_available,
                secret_versions: Vec::new(),
            })
            .collect()
    }

    fn build(beat: &Beat, associations: &[ResolvedAssociation]) -> PodTemplateSpec {
        let selector = selector();
        build_pod_template(
            beat,
            &PodParams {
                image: "registry/beats/filebeat:8.15.0".to_string(),
                config_secret_name: "k-beat-filebeat-config".to_string(),
                config_hash: "abc".to_string(),
                selector: &selector,
                associations,
                keystore: None,
                service_account: None,
            },
        )
    }

    fn volume<'a>(template: &'a PodTemplateSpec, name: &str) -> Option<&'a Volume> {
        template
            .spec
            .as_ref()?
            .volumes
            .as_ref()?
            .iter()
            .find(|v| v.name == name)
    }

    fn init_names(template: &PodTemplateSpec) -> Vec<String> {
        template
            .spec
            .as_ref()
            .and_then(|s| s.init_containers.as_ref())
            .map(|c| c.iter().map(|c| c.name.clone()).collect())
            .unwrap_or_default()
    }

    #[test]
    fn test_config_volume_is_read_only_0600() {
        // Arrange
        let beat = beat(spec());

        // Act
        let template = build(&beat, &[]);

        // Assert
        let config = volume(&template, "config").unwrap();
        let secret = config.secret.as_ref().unwrap();
        assert_eq!(secret.secret_name.as_deref(), Some("k-beat-filebeat-config"));
        assert_eq!(secret.default_mode, Some(384));

        let spec = template.spec.as_ref().unwrap();
        assert_eq!(spec.containers.len(), 1);
        let main = &spec.containers[0];
        assert_eq!(main.name, CONTAINER_NAME_BEAT);
        let mount = main
            .volume_mounts
            .as_ref()
            .unwrap()
            .iter()
            .find(|m| m.name == "config")
            .unwrap();
        assert_eq!(mount.mount_path, "/etc/beat.yml");
        assert_eq!(mount.sub_path.as_deref(), Some("beat.yml"));
        assert_eq!(mount.read_only, Some(true));
        assert_eq!(
            main.args,
            Some(vec!["-e".to_string(), "-c".to_string(), "/etc/beat.yml".to_string()])
        );
    }

    #[test]
    fn test_labels_and_hash_annotation() {
        let beat = beat(spec());

        let template = build(&beat, &[]);

        let metadata = template.metadata.unwrap();
        let labels = metadata.labels.unwrap();
        assert_eq!(labels[VERSION_LABEL], "8.15.0");
        assert_eq!(labels[CONFIG_HASH_LABEL], "abc");
        assert_eq!(labels["beacon.firestoned.io/name"], "k");
        assert_eq!(metadata.annotations.unwrap()[CONFIG_HASH_ANNOTATION], "abc");
    }

    #[test]
    fn test_ca_volume_only_when_available() {
        // Arrange
        let beat = beat(BeatSpec {
            index_store_ref: Some(ObjectSelector::named("es")),
            ..spec()
        });

        // Act
        let with_ca = build(&beat, &resolved(&beat, true));
        let without_ca = build(&beat, &resolved(&beat, false));

        // Assert
        let ca_volume_name = beat.associations()[0].ca_volume_name();
        let ca = volume(&with_ca, &ca_volume_name).unwrap();
        assert_eq!(
            ca.secret.as_ref().unwrap().secret_name.as_deref(),
            Some("es-ca")
        );
        let mount = with_ca.spec.as_ref().unwrap().containers[0]
            .volume_mounts
            .as_ref()
            .unwrap()
            .iter()
            .find(|m| m.name == ca_volume_name)
            .unwrap();
        assert_eq!(mount.mount_path, "/mnt/elastic-internal/indexstore-certs");
        assert!(volume(&without_ca, &ca_volume_name).is_none());
    }

    #[test]
    fn test_host_path_data_with_permissions_container() {
        let beat = beat(spec());

        let template = build(&beat, &[]);

        let data = volume(&template, "filebeat-data").unwrap();
        assert_eq!(
            data.host_path.as_ref().unwrap().path,
            "/var/lib/filebeat/ns/k/filebeat-data"
        );
        assert_eq!(init_names(&template), vec![CONTAINER_NAME_PERMISSIONS.to_string()]);
        let permissions = &template.spec.as_ref().unwrap().init_containers.as_ref().unwrap()[0];
        assert_eq!(
            permissions.image.as_deref(),
            Some("registry/beats/filebeat:8.15.0")
        );
    }

    #[test]
    fn test_root_user_needs_no_permissions_container() {
        // Arrange
        let beat = beat(with_template(PodTemplateSpec {
            spec: Some(PodSpec {
                security_context: Some(PodSecurityContext {
                    run_as_user: Some(0),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        }));

        // Act
        let template = build(&beat, &[]);

        // Assert
        assert!(volume(&template, "filebeat-data").unwrap().host_path.is_some());
        assert!(init_names(&template).is_empty());
    }

    #[test]
    fn test_user_data_volume_replaces_host_path() {
        // Arrange
        let beat = beat(with_template(PodTemplateSpec {
            spec: Some(PodSpec {
                volumes: Some(vec![Volume {
                    name: "filebeat-data".to_string(),
                    empty_dir: Some(EmptyDirVolumeSource::default()),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            ..Default::default()
        }));

        // Act
        let template = build(&beat, &[]);

        // Assert
        let data = volume(&template, "filebeat-data").unwrap();
        assert!(data.empty_dir.is_some());
        assert!(data.host_path.is_none());
        assert!(init_names(&template).is_empty());
    }

    #[test]
    fn test_monitoring_shares_socket_directory() {
        let beat = beat(BeatSpec {
            monitoring: Some(Monitoring {
                metrics: MonitoringTargets {
                    index_store_refs: vec![ObjectSelector::named("monitoring")],
                },
                logs: MonitoringTargets::default(),
            }),
            ..spec()
        });

        let template = build(&beat, &[]);

        assert!(volume(&template, SHARED_VOLUME_NAME).unwrap().empty_dir.is_some());
        let mounts = template.spec.as_ref().unwrap().containers[0]
            .volume_mounts
            .clone()
            .unwrap();
        assert!(mounts
            .iter()
            .any(|m| m.name == SHARED_VOLUME_NAME && m.mount_path == "/var/shared"));
    }

    #[test]
    fn test_spec_service_account_wins_over_generated() {
        let selector = selector();
        let own = beat(BeatSpec {
            service_account_name: Some("custom".to_string()),
            ..spec()
        });
        let params = PodParams {
            image: "image".to_string(),
            config_secret_name: "secret".to_string(),
            config_hash: "abc".to_string(),
            selector: &selector,
            associations: &[],
            keystore: None,
            service_account: Some("k-beat-filebeat-autodiscover"),
        };

        let with_own = build_pod_template(&own, &params);
        let generated = build_pod_template(&beat(spec()), &params);

        assert_eq!(
            with_own.spec.unwrap().service_account_name.as_deref(),
            Some("custom")
        );
        assert_eq!(
            generated.spec.unwrap().service_account_name.as_deref(),
            Some("k-beat-filebeat-autodiscover")
        );
    }

    #[test]
    fn test_user_container_settings_are_kept() {
        let beat = beat(with_template(PodTemplateSpec {
            spec: Some(PodSpec {
                containers: vec![Container {
                    name: CONTAINER_NAME_BEAT.to_string(),
                    image: Some("custom:1".to_string()),
                    ..Default::default()
                }],
                ..Default::default()
            }),
            ..Default::default()
        }));

        let template = build(&beat, &[]);

        let main = &template.spec.as_ref().unwrap().containers[0];
        assert_eq!(main.image.as_deref(), Some("custom:1"));
        assert!(main.env.as_ref().unwrap().iter().any(|e| e.name == "NODE_NAME"));
    }
}
