// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for the association manager

#[cfg(test)]
mod tests {
    use crate::association::*;
    use crate::crd::{
        AssociationConf, AssociationStatus, Beat, BeatSpec, Dashboard, DashboardSpec, Monitoring,
        MonitoringTargets, ObjectSelector,
    };
    use crate::errors::Error;
    use crate::hash::ContentHash;
    use crate::labels::{DASHBOARD_CONF_ANNOTATION, INDEX_STORE_CONF_ANNOTATION};
    use crate::names::NamespacedName;
    use crate::platform::memory::MemoryPlatform;
    use crate::secrets::data_from;
    use crate::version::Version;
    use k8s_openapi::api::core::v1::Secret;
    use kube::api::ObjectMeta;
    use std::collections::BTreeMap;

    fn beat(spec: BeatSpec) -> Beat {
        let mut beat = Beat::new("k", spec);
        beat.metadata.namespace = Some("ns".to_string());
        beat
    }

    fn index_store_conf() -> AssociationConf {
        AssociationConf {
            auth_secret_name: "auth".to_string(),
            auth_secret_key: "elastic".to_string(),
            ca_cert_provided: true,
            ca_secret_name: "ca".to_string(),
            url: "https://es:9200".to_string(),
            version: "8.15.0".to_string(),
            service_account: None,
        }
    }

    fn secret(name: &str, pairs: &[(&str, &str)]) -> Secret {
        Secret {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("ns".to_string()),
                ..Default::default()
            },
            data: Some(data_from(pairs.iter().copied())),
            ..Default::default()
        }
    }

    fn index_store_association(conf: Option<AssociationConf>) -> Association {
        let mut association = beat(BeatSpec {
            index_store_ref: Some(ObjectSelector::named("es")),
            ..Default::default()
        })
        .associations()
        .remove(0);
        association.conf = conf;
        association
    }

    fn monitoring(metrics: &[&str], logs: &[&str]) -> Monitoring {
        let refs = |names: &[&str]| MonitoringTargets {
            index_store_refs: names.iter().map(|n| ObjectSelector::named(n)).collect(),
        };
        Monitoring {
            metrics: refs(metrics),
            logs: refs(logs),
        }
    }

    #[test]
    fn test_beat_associations() {
        // Arrange
        let beat = beat(BeatSpec {
            index_store_ref: Some(ObjectSelector::named("es")),
            dashboard_ref: Some(ObjectSelector {
                name: Some("kb".to_string()),
                namespace: Some("other".to_string()),
                ..Default::default()
            }),
            monitoring: Some(monitoring(&["mon"], &["mon", "logs"])),
            ..Default::default()
        });

        // Act
        let associations = beat.associations();

        // Assert
        let summary: Vec<(AssociationType, String)> = associations
            .iter()
            .map(|a| (a.association_type, a.target_nsn().to_string()))
            .collect();
        assert_eq!(
            summary,
            vec![
                (AssociationType::IndexStore, "ns/es".to_string()),
                (AssociationType::Dashboard, "other/kb".to_string()),
                (AssociationType::Monitoring, "ns/mon".to_string()),
                (AssociationType::Monitoring, "ns/logs".to_string()),
            ]
        );
        assert_eq!(associations[0].annotation, INDEX_STORE_CONF_ANNOTATION);
        assert_eq!(associations[1].annotation, DASHBOARD_CONF_ANNOTATION);
        assert_ne!(associations[2].annotation, associations[3].annotation);
        assert_eq!(associations[3].index, 1);
    }

    #[test]
    fn test_undefined_refs_have_no_association() {
        let beat = beat(BeatSpec {
            index_store_ref: Some(ObjectSelector::default()),
            ..Default::default()
        });

        assert!(beat.associations().is_empty());
    }

    #[test]
    fn test_dashboard_associations() {
        let mut dashboard = Dashboard::new(
            "kb",
            DashboardSpec {
                index_store_ref: Some(ObjectSelector::external("remote")),
                monitoring: Some(monitoring(&["mon"], &[])),
                ..Default::default()
            },
        );
        dashboard.metadata.namespace = Some("ns".to_string());

        let associations = dashboard.associations();

        assert_eq!(associations.len(), 2);
        assert!(associations[0].is_external());
        assert_eq!(associations[0].target_nsn(), NamespacedName::new("ns", "remote"));
        assert_eq!(associations[1].association_type, AssociationType::Monitoring);
    }

    #[test]
    fn test_monitoring_annotation_is_stable_per_target() {
        let a = monitoring_conf_annotation(&NamespacedName::new("ns", "mon"));
        let b = monitoring_conf_annotation(&NamespacedName::new("ns", "mon"));
        let c = monitoring_conf_annotation(&NamespacedName::new("ns", "other"));

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.starts_with("association.beacon.firestoned.io/monitoring-conf-"));
    }

    #[test]
    fn test_conf_from_annotations() {
        let association = index_store_association(None);
        let conf = index_store_conf();
        let present = BTreeMap::from([(
            INDEX_STORE_CONF_ANNOTATION.to_string(),
            serde_json::to_string(&conf).unwrap(),
        )]);
        let unusable = BTreeMap::from([(
            INDEX_STORE_CONF_ANNOTATION.to_string(),
            r#"{"authSecretName":"auth"}"#.to_string(),
        )]);
        let garbage = BTreeMap::from([(INDEX_STORE_CONF_ANNOTATION.to_string(), "{".to_string())]);

        assert_eq!(conf_from_annotations(&BTreeMap::new(), &association).unwrap(), None);
        assert_eq!(conf_from_annotations(&present, &association).unwrap(), Some(conf));
        assert_eq!(conf_from_annotations(&unusable, &association).unwrap(), None);
        assert!(matches!(
            conf_from_annotations(&garbage, &association),
            Err(Error::InvalidAssociation { .. })
        ));
    }

    #[tokio::test]
    async fn test_get_and_set_caches_conf() {
        let platform = MemoryPlatform::new();
        let mut association = index_store_association(None);
        let annotations = BTreeMap::from([(
            INDEX_STORE_CONF_ANNOTATION.to_string(),
            serde_json::to_string(&index_store_conf()).unwrap(),
        )]);

        let conf = get_and_set(&platform, &annotations, &mut association).await.unwrap();

        assert_eq!(conf, Some(index_store_conf()));
        assert_eq!(association.conf, Some(index_store_conf()));
        assert!(are_configured_if_set(&[association]));
    }

    #[tokio::test]
    async fn test_get_and_set_reads_external_secret() {
        let platform = MemoryPlatform::new();
        platform
            .seed(&secret("remote", &[("url", "https://remote:9200"), ("api-key", "abc")]))
            .unwrap();
        let mut association = beat(BeatSpec {
            index_store_ref: Some(ObjectSelector::external("remote")),
            ..Default::default()
        })
        .associations()
        .remove(0);

        let conf = get_and_set(&platform, &BTreeMap::new(), &mut association)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(conf.url, "https://remote:9200");
        assert_eq!(conf.auth_secret_key, "api-key");
    }

    #[tokio::test]
    async fn test_get_and_set_missing_external_secret() {
        let platform = MemoryPlatform::new();
        let mut association = beat(BeatSpec {
            index_store_ref: Some(ObjectSelector::external("remote")),
            ..Default::default()
        })
        .associations()
        .remove(0);

        let err = get_and_set(&platform, &BTreeMap::new(), &mut association)
            .await
            .unwrap_err();

        assert!(err.is_not_found());
    }

    #[test]
    fn test_are_configured_if_set() {
        assert!(are_configured_if_set(&[]));
        assert!(!are_configured_if_set(&[index_store_association(None)]));
        assert!(are_configured_if_set(&[index_store_association(Some(index_store_conf()))]));
    }

    #[test]
    fn test_version_gate() {
        let beat_version = Version::parse("8.15.2").unwrap();
        let with_version = |v: &str| {
            index_store_association(Some(AssociationConf {
                version: v.to_string(),
                ..index_store_conf()
            }))
        };

        assert_eq!(allow_version(&beat_version, &[with_version("8.16.0")]), VersionGate::Allowed);
        assert_eq!(allow_version(&beat_version, &[with_version("8.15.0")]), VersionGate::Allowed);
        assert!(matches!(
            allow_version(&beat_version, &[with_version("8.14.3")]),
            VersionGate::Delayed { message, .. } if message.contains("not upgraded to 8.15.2")
        ));
        assert!(matches!(
            allow_version(&beat_version, &[with_version("")]),
            VersionGate::Delayed { .. }
        ));
    }

    #[test]
    fn test_version_gate_external_without_version() {
        let mut association = beat(BeatSpec {
            index_store_ref: Some(ObjectSelector::external("remote")),
            ..Default::default()
        })
        .associations()
        .remove(0);
        association.conf = Some(AssociationConf {
            version: String::new(),
            ..index_store_conf()
        });

        assert_eq!(
            allow_version(&Version::parse("8.15.0").unwrap(), &[association]),
            VersionGate::Allowed
        );
    }

    #[tokio::test]
    async fn test_resolve_basic_credentials_and_ca() {
        // Arrange
        let platform = MemoryPlatform::new();
        platform.seed(&secret("auth", &[("elastic", "password")])).unwrap();
        platform.seed(&secret("ca", &[("ca.crt", "PEM")])).unwrap();
        let association = index_store_association(Some(index_store_conf()));

        // Act
        let resolved = resolve(&platform, &association).await.unwrap();

        // Assert
        assert_eq!(
            resolved.credentials,
            Credentials::Basic {
                username: "elastic".to_string(),
                password: "password".to_string()
            }
        );
        assert!(resolved.ca_available);
        assert_eq!(resolved.secret_versions.len(), 2);
        assert_eq!(resolved.association.ca_path(), "/mnt/elastic-internal/indexstore-certs/ca.crt");
    }

    #[tokio::test]
    async fn test_resolve_tolerates_missing_ca() {
        let platform = MemoryPlatform::new();
        platform.seed(&secret("auth", &[("elastic", "password")])).unwrap();
        let association = index_store_association(Some(index_store_conf()));

        let resolved = resolve(&platform, &association).await.unwrap();

        assert!(!resolved.ca_available);
        assert_eq!(resolved.secret_versions.len(), 1);
    }

    #[tokio::test]
    async fn test_resolve_missing_auth_secret_is_not_found() {
        let platform = MemoryPlatform::new();
        let association = index_store_association(Some(index_store_conf()));

        let err = resolve(&platform, &association).await.unwrap_err();

        assert!(err.is_not_found());
        assert!(err.is_retriable());
    }

    #[tokio::test]
    async fn test_resolve_missing_key() {
        let platform = MemoryPlatform::new();
        platform.seed(&secret("auth", &[("other", "x")])).unwrap();
        let association = index_store_association(Some(index_store_conf()));

        let err = resolve(&platform, &association).await.unwrap_err();

        assert!(matches!(err, Error::MissingSecretKey { ref key, .. } if key == "elastic"));
    }

    #[tokio::test]
    async fn test_resolve_service_account_token_and_no_auth() {
        let platform = MemoryPlatform::new();
        platform.seed(&secret("auth", &[("token-key", "tok")])).unwrap();
        let token = index_store_association(Some(AssociationConf {
            auth_secret_key: "token-key".to_string(),
            ca_cert_provided: false,
            service_account: Some(true),
            ..index_store_conf()
        }));
        let no_auth = index_store_association(Some(AssociationConf {
            auth_secret_name: "-".to_string(),
            ca_cert_provided: false,
            ..index_store_conf()
        }));

        let token = resolve(&platform, &token).await.unwrap();
        let no_auth = resolve(&platform, &no_auth).await.unwrap();

        assert_eq!(token.credentials, Credentials::Token("tok".to_string()));
        assert_eq!(no_auth.credentials, Credentials::None);
        assert!(no_auth.secret_versions.is_empty());
    }

    #[tokio::test]
    async fn test_hash_contribution_tracks_secret_versions() {
        let platform = MemoryPlatform::new();
        let auth = platform.seed(&secret("auth", &[("elastic", "password")])).unwrap();
        let association = index_store_association(Some(index_store_conf()));
        let digest = |resolved: &ResolvedAssociation| {
            let mut hash = ContentHash::new();
            resolved.hash_into(&mut hash);
            hash.finish()
        };

        let first = resolve(&platform, &association).await.unwrap();
        let again = resolve(&platform, &association).await.unwrap();
        crate::platform::Platform::replace(&platform, &auth).await.unwrap();
        let rotated = resolve(&platform, &association).await.unwrap();

        assert_eq!(digest(&first), digest(&again));
        assert_ne!(digest(&first), digest(&rotated));
    }

    #[test]
    fn test_association_statuses() {
        let configured = index_store_association(Some(index_store_conf()));
        let pending = index_store_association(None);

        let established = association_statuses(&[configured.clone()], &[], true);
        let delayed = association_statuses(&[configured], &[], false);
        let waiting = association_statuses(&[pending.clone()], &[], true);
        let failed = association_statuses(&[pending], &[NamespacedName::new("ns", "es")], true);

        assert_eq!(established["indexstore"]["ns/es"], AssociationStatus::Established);
        assert_eq!(delayed["indexstore"]["ns/es"], AssociationStatus::Pending);
        assert_eq!(waiting["indexstore"]["ns/es"], AssociationStatus::Pending);
        assert_eq!(failed["indexstore"]["ns/es"], AssociationStatus::Failed);
    }

    #[test]
    fn test_obsolete_conf_patch() {
        // Arrange
        let association = index_store_association(None);
        let annotations = BTreeMap::from([
            (INDEX_STORE_CONF_ANNOTATION.to_string(), "{}".to_string()),
            (DASHBOARD_CONF_ANNOTATION.to_string(), "{}".to_string()),
            ("unrelated".to_string(), "x".to_string()),
        ]);

        // Act
        let patch = obsolete_conf_patch(&annotations, &[association], &BTreeMap::new());

        // Assert
        assert_eq!(patch, BTreeMap::from([(DASHBOARD_CONF_ANNOTATION.to_string(), None)]));
    }

    #[test]
    fn test_obsolete_conf_patch_clears_changed_target() {
        let association = index_store_association(None);
        let annotations = BTreeMap::from([(INDEX_STORE_CONF_ANNOTATION.to_string(), "{}".to_string())]);
        let previous = BTreeMap::from([(
            "indexstore".to_string(),
            BTreeMap::from([("ns/old-es".to_string(), AssociationStatus::Established)]),
        )]);
        let same = BTreeMap::from([(
            "indexstore".to_string(),
            BTreeMap::from([("ns/es".to_string(), AssociationStatus::Established)]),
        )]);

        let changed = obsolete_conf_patch(&annotations, &[association.clone()], &previous);
        let unchanged = obsolete_conf_patch(&annotations, &[association], &same);

        assert_eq!(changed, BTreeMap::from([(INDEX_STORE_CONF_ANNOTATION.to_string(), None)]));
        assert!(unchanged.is_empty());
    }
}
