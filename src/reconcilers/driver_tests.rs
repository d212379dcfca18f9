// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `driver.rs`

#[cfg(test)]
mod tests {
    use k8s_openapi::api::core::v1::Secret;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use kube::ResourceExt;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    use crate::association::{Associated, Credentials, ResolvedAssociation};
    use crate::config::OperatorConfig;
    use crate::constants::KIND_BEAT;
    use crate::context::Context;
    use crate::crd::{AssociationConf, AssociationStatus, Beat, BeatSpec, DaemonSetSpec, Health, ObjectSelector};
    use crate::errors::{Error, FieldError};
    use crate::labels::{DASHBOARD_CONF_ANNOTATION, INDEX_STORE_CONF_ANNOTATION, MANAGED_ANNOTATION};
    use crate::names::NamespacedName;
    use crate::platform::memory::{MemoryEventSink, MemoryPlatform};
    use crate::platform::{EventType, Platform};
    use crate::reconcilers::driver::*;
    use crate::secrets;
    use crate::status_reasons::{
        CONDITION_TYPE_READY, EVENT_REASON_ASSOCIATION_ERROR, EVENT_REASON_DELAYED,
        EVENT_REASON_VALIDATION, REASON_ASSOCIATION_ERROR, REASON_INVALID_SPEC,
    };
    use crate::watches::{association_watch_key, DynamicWatches};

    fn beat(spec: BeatSpec, annotations: &[(&str, &str)]) -> Beat {
        let mut beat = Beat::new("k", spec);
        beat.metadata.namespace = Some("ns".to_string());
        if !annotations.is_empty() {
            beat.metadata.annotations = Some(
                annotations
                    .iter()
                    .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                    .collect(),
            );
        }
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

    fn with_index_store() -> BeatSpec {
        BeatSpec {
            index_store_ref: Some(ObjectSelector::named("es")),
            ..spec()
        }
    }

    fn conf_json(version: &str) -> String {
        serde_json::to_string(&AssociationConf {
            auth_secret_name: "auth".to_string(),
            auth_secret_key: "elastic".to_string(),
            ca_cert_provided: true,
            ca_secret_name: "ca".to_string(),
            url: "https://es:9200".to_string(),
            version: version.to_string(),
            service_account: None,
        })
        .unwrap()
    }

    fn secret(name: &str, data: &[(&str, &str)]) -> Secret {
        Secret {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("ns".to_string()),
                ..Default::default()
            },
            data: Some(secrets::data_from(data.iter().copied())),
            ..Default::default()
        }
    }

    fn context(platform: MemoryPlatform, sink: Arc<MemoryEventSink>) -> Context<MemoryPlatform> {
        Context::new(
            platform,
            Arc::new(DynamicWatches::new()),
            sink,
            OperatorConfig::default(),
        )
    }

    async fn stored(platform: &MemoryPlatform) -> Beat {
        platform.get::<Beat>("ns", "k").await.unwrap().unwrap()
    }

    #[test]
    fn test_is_managed() {
        assert!(is_managed(&beat(spec(), &[])));
        assert!(is_managed(&beat(spec(), &[(MANAGED_ANNOTATION, "true")])));
        assert!(!is_managed(&beat(spec(), &[(MANAGED_ANNOTATION, "false")])));
    }

    #[test]
    fn test_nsn_of() {
        assert_eq!(nsn_of(&beat(spec(), &[])), NamespacedName::new("ns", "k"));
    }

    #[tokio::test]
    async fn test_unconfigured_association_reports_pending() {
        // Arrange
        let platform = MemoryPlatform::new();
        let object = platform.seed(&beat(with_index_store(), &[])).unwrap();
        let ctx = context(platform.clone(), Arc::new(MemoryEventSink::new()));

        // Act
        let (_, phase) = reconcile_associations(&ctx, object).await.unwrap();

        // Assert
        let AssociationPhase::Done(results) = phase else {
            panic!("expected the reconcile to stop");
        };
        assert_eq!(results.requeue_after(), None);
        let status = stored(&platform).await.status.unwrap();
        assert_eq!(status.health, Some(Health::Red));
        assert_eq!(
            status.associations["indexstore"]["ns/es"],
            AssociationStatus::Pending
        );
        assert!(ctx.watches.secrets.is_empty());
    }

    #[tokio::test]
    async fn test_configured_association_is_resolved_and_watched() {
        // Arrange
        let platform = MemoryPlatform::new();
        platform.seed(&secret("auth", &[("elastic", "password")])).unwrap();
        platform.seed(&secret("ca", &[("ca.crt", "PEM")])).unwrap();
        let conf = conf_json("8.15.0");
        let object = platform
            .seed(&beat(with_index_store(), &[(INDEX_STORE_CONF_ANNOTATION, &conf)]))
            .unwrap();
        let ctx = context(platform, Arc::new(MemoryEventSink::new()));

        // Act
        let (_, phase) = reconcile_associations(&ctx, object).await.unwrap();

        // Assert
        let AssociationPhase::Ready { resolved, statuses } = phase else {
            panic!("expected the associations to be ready");
        };
        assert_eq!(resolved.len(), 1);
        assert!(resolved[0].ca_available);
        assert_eq!(
            resolved[0].credentials,
            Credentials::Basic {
                username: "elastic".to_string(),
                password: "password".to_string()
            }
        );
        assert_eq!(statuses["indexstore"]["ns/es"], AssociationStatus::Established);
        let owner = NamespacedName::new("ns", "k");
        assert_eq!(ctx.watches.secrets.owners_of(KIND_BEAT, &NamespacedName::new("ns", "auth")), vec![owner.clone()]);
        assert_eq!(ctx.watches.secrets.owners_of(KIND_BEAT, &NamespacedName::new("ns", "ca")), vec![owner.clone()]);
        assert!(ctx
            .watches
            .secrets
            .get(&association_watch_key(KIND_BEAT, "indexstore", &owner))
            .is_some());
    }

    #[tokio::test]
    async fn test_obsolete_conf_is_removed() {
        // Arrange
        let platform = MemoryPlatform::new();
        let conf = conf_json("8.15.0");
        let object = platform
            .seed(&beat(spec(), &[(DASHBOARD_CONF_ANNOTATION, &conf)]))
            .unwrap();
        let ctx = context(platform.clone(), Arc::new(MemoryEventSink::new()));

        // Act
        let (object, phase) = reconcile_associations(&ctx, object).await.unwrap();

        // Assert
        assert!(matches!(phase, AssociationPhase::Ready { ref resolved, .. } if resolved.is_empty()));
        assert!(!object.annotations().contains_key(DASHBOARD_CONF_ANNOTATION));
        assert!(!stored(&platform)
            .await
            .metadata
            .annotations
            .unwrap_or_default()
            .contains_key(DASHBOARD_CONF_ANNOTATION));
    }

    #[tokio::test]
    async fn test_older_target_delays_rollout() {
        // Arrange
        let platform = MemoryPlatform::new();
        let conf = conf_json("7.17.0");
        let object = platform
            .seed(&beat(with_index_store(), &[(INDEX_STORE_CONF_ANNOTATION, &conf)]))
            .unwrap();
        let sink = Arc::new(MemoryEventSink::new());
        let ctx = context(platform.clone(), sink.clone());

        // Act
        let (_, phase) = reconcile_associations(&ctx, object).await.unwrap();

        // Assert
        assert!(matches!(phase, AssociationPhase::Done(_)));
        let delayed: Vec<_> = sink
            .events_for("k")
            .into_iter()
            .filter(|e| e.reason == EVENT_REASON_DELAYED)
            .collect();
        assert_eq!(delayed.len(), 1);
        assert_eq!(delayed[0].event_type, EventType::Normal);
        assert_eq!(
            stored(&platform).await.status.unwrap().associations["indexstore"]["ns/es"],
            AssociationStatus::Pending
        );
    }

    #[tokio::test]
    async fn test_malformed_external_secret_fails_association() {
        // Arrange
        let platform = MemoryPlatform::new();
        platform.seed(&secret("external-es", &[("username", "u")])).unwrap();
        let object = platform
            .seed(&beat(
                BeatSpec {
                    index_store_ref: Some(ObjectSelector::external("external-es")),
                    ..spec()
                },
                &[],
            ))
            .unwrap();
        let sink = Arc::new(MemoryEventSink::new());
        let ctx = context(platform.clone(), sink.clone());

        // Act
        let (_, phase) = reconcile_associations(&ctx, object).await.unwrap();

        // Assert
        assert!(matches!(phase, AssociationPhase::Done(_)));
        assert!(sink.reasons().contains(&EVENT_REASON_ASSOCIATION_ERROR.to_string()));
        let status = stored(&platform).await.status.unwrap();
        assert_eq!(
            status.associations["indexstore"]["ns/external-es"],
            AssociationStatus::Failed
        );
        let ready = status
            .conditions
            .iter()
            .find(|c| c.r#type == CONDITION_TYPE_READY)
            .unwrap();
        assert_eq!(ready.reason.as_deref(), Some(REASON_ASSOCIATION_ERROR));
        assert_eq!(
            ctx.watches
                .secrets
                .owners_of(KIND_BEAT, &NamespacedName::new("ns", "external-es")),
            vec![NamespacedName::new("ns", "k")]
        );
    }

    #[tokio::test]
    async fn test_missing_external_secret_is_not_found() {
        let platform = MemoryPlatform::new();
        let object = platform
            .seed(&beat(
                BeatSpec {
                    index_store_ref: Some(ObjectSelector::external("external-es")),
                    ..spec()
                },
                &[],
            ))
            .unwrap();
        let ctx = context(platform, Arc::new(MemoryEventSink::new()));

        let err = reconcile_associations(&ctx, object).await.unwrap_err();

        assert!(err.is_not_found());
    }

    #[test]
    fn test_content_hash_tracks_secret_versions() {
        let object = beat(with_index_store(), &[]);
        let mut association = object.associations().remove(0);
        association.conf = serde_json::from_str(&conf_json("8.15.0")).unwrap();
        let resolved = |version: &str| ResolvedAssociation {
            conf: association.conf.clone().unwrap(),
            association: association.clone(),
            credentials: Credentials::None,
            ca_available: false,
            secret_versions: vec![("auth".to_string(), version.to_string())],
        };

        let first = content_hash(b"a: b\n", &[resolved("1")], &[]);
        let same = content_hash(b"a: b\n", &[resolved("1")], &[]);
        let rotated = content_hash(b"a: b\n", &[resolved("2")], &[]);
        let keystore = content_hash(
            b"a: b\n",
            &[resolved("1")],
            &[("settings".to_string(), "7".to_string())],
        );

        assert_eq!(first, same);
        assert_ne!(first, rotated);
        assert_ne!(first, keystore);
    }

    #[tokio::test]
    async fn test_report_error_for_invalid_spec() {
        // Arrange
        let platform = MemoryPlatform::new();
        let object = platform.seed(&beat(spec(), &[])).unwrap();
        let sink = Arc::new(MemoryEventSink::new());
        let ctx = context(platform.clone(), sink.clone());
        let error = Error::InvalidSpec {
            kind: "Beat".to_string(),
            namespace: "ns".to_string(),
            name: "k".to_string(),
            errors: vec![FieldError::invalid("spec.version", "8.1.0", "Version downgrades are not supported")],
        };

        // Act
        report_error(&ctx, &object, &error).await;

        // Assert
        assert_eq!(sink.reasons(), vec![EVENT_REASON_VALIDATION.to_string()]);
        let status = stored(&platform).await.status.unwrap();
        assert_eq!(status.conditions[0].reason.as_deref(), Some(REASON_INVALID_SPEC));
    }

    #[tokio::test]
    async fn test_report_error_ignores_not_found() {
        let platform = MemoryPlatform::new();
        let object = platform.seed(&beat(spec(), &[])).unwrap();
        let sink = Arc::new(MemoryEventSink::new());
        let ctx = context(platform.clone(), sink.clone());

        report_error(&ctx, &object, &Error::not_found("Secret", "ns", "auth")).await;

        assert!(sink.events().is_empty());
        assert!(stored(&platform).await.status.is_none());
    }

    #[tokio::test]
    async fn test_update_status_reports_counts_and_requeues() {
        // Arrange
        let platform = MemoryPlatform::new();
        let object = platform.seed(&beat(spec(), &[])).unwrap();
        let ctx = context(platform.clone(), Arc::new(MemoryEventSink::new()));
        let selector = BTreeMap::from([("beacon.firestoned.io/name".to_string(), "k".to_string())]);
        let counts = crate::reconcilers::workload::WorkloadCounts {
            expected: 2,
            available: 1,
        };

        // Act
        let results = update_status(&ctx, &object, counts, &selector, BTreeMap::new())
            .await
            .unwrap();

        // Assert
        assert_eq!(results.requeue_after(), Some(ctx.config.requeue_after));
        let status = stored(&platform).await.status.unwrap();
        assert_eq!(status.expected_nodes, 2);
        assert_eq!(status.available_nodes, 1);
        assert_eq!(status.health, Some(Health::Yellow));
        assert_eq!(status.observed_generation, Some(1));
    }
}
