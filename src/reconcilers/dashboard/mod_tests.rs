// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for the Dashboard reconciler

#[cfg(test)]
mod tests {
    use k8s_openapi::api::apps::v1::Deployment;
    use k8s_openapi::api::core::v1::{Secret, Service};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use serde_json::json;
    use std::sync::Arc;

    use crate::config::OperatorConfig;
    use crate::constants::{CONTAINER_NAME_KEYSTORE, HTTP_CERTS_VOLUME_NAME, KIND_DASHBOARD};
    use crate::context::Context;
    use crate::crd::{
        ConfigRef, Dashboard, DashboardSpec, HttpConfig, SecretSource, TlsOptions, WorkloadStatus,
    };
    use crate::errors::Error;
    use crate::labels::{CONFIG_HASH_ANNOTATION, TYPE_LABEL};
    use crate::names::NamespacedName;
    use crate::platform::memory::{MemoryEventSink, MemoryPlatform};
    use crate::platform::Platform;
    use crate::reconcilers::dashboard::config::{SECURITY_ENCRYPTION_KEY, SERVER_NAME};
    use crate::reconcilers::dashboard::*;
    use crate::secrets;
    use crate::settings::CanonicalConfig;
    use crate::status_reasons::EVENT_REASON_VALIDATION;
    use crate::watches::{cert_watch_key, DynamicWatches};

    fn nsn() -> NamespacedName {
        NamespacedName::new("ns", "kb")
    }

    fn spec() -> DashboardSpec {
        DashboardSpec {
            version: "8.15.0".to_string(),
            ..Default::default()
        }
    }

    fn plain_http() -> DashboardSpec {
        DashboardSpec {
            http: Some(HttpConfig {
                tls: Some(TlsOptions {
                    disabled: true,
                    certificate_secret_name: None,
                }),
            }),
            ..spec()
        }
    }

    fn dashboard(spec: DashboardSpec) -> Dashboard {
        let mut dashboard = Dashboard::new("kb", spec);
        dashboard.metadata.namespace = Some("ns".to_string());
        dashboard
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

    fn default_context(platform: MemoryPlatform) -> Context<MemoryPlatform> {
        context(platform, Arc::new(MemoryEventSink::new()))
    }

    async fn deployment(platform: &MemoryPlatform) -> Deployment {
        platform
            .get::<Deployment>("ns", "kb-dash")
            .await
            .unwrap()
            .unwrap()
    }

    async fn rendered(platform: &MemoryPlatform) -> CanonicalConfig {
        let secret: Secret = platform.get("ns", "kb-dash-config").await.unwrap().unwrap();
        CanonicalConfig::parse(&secrets::value(&secret, "dashboard.yml").unwrap()).unwrap()
    }

    async fn config_hash(platform: &MemoryPlatform) -> String {
        deployment(platform)
            .await
            .spec
            .unwrap()
            .template
            .metadata
            .unwrap()
            .annotations
            .unwrap()[CONFIG_HASH_ANNOTATION]
            .clone()
    }

    #[test]
    fn test_keystore_commands() {
        let commands = keystore_commands();

        assert_eq!(commands.create, "/usr/share/dashboard/bin/dashboard-keystore create");
        assert_eq!(
            commands.add,
            "/usr/share/dashboard/bin/dashboard-keystore add \"$key\" --stdin < \"$filename\""
        );
        assert_eq!(commands.keystore_dir, "/usr/share/dashboard/data");
        assert!(commands.use_initialized_flag);
    }

    #[test]
    fn test_http_certs_secret_name() {
        let internal = dashboard(spec());
        let custom = dashboard(DashboardSpec {
            http: Some(HttpConfig {
                tls: Some(TlsOptions {
                    disabled: false,
                    certificate_secret_name: Some("my-certs".to_string()),
                }),
            }),
            ..spec()
        });

        assert_eq!(
            http_certs_secret_name(&internal).as_deref(),
            Some("kb-dash-http-certs-internal")
        );
        assert_eq!(http_certs_secret_name(&custom).as_deref(), Some("my-certs"));
        assert_eq!(http_certs_secret_name(&dashboard(plain_http())), None);
    }

    #[test]
    fn test_image_defaults_to_registry() {
        let config = OperatorConfig::default();

        assert_eq!(
            image(&dashboard(spec()), &config),
            "docker.elastic.co/kibana/kibana:8.15.0"
        );
        let custom = dashboard(DashboardSpec {
            image: Some("my/dashboard:1".to_string()),
            ..spec()
        });
        assert_eq!(image(&custom, &config), "my/dashboard:1");
    }

    #[tokio::test]
    async fn test_reconcile_renders_config_deployment_and_service() {
        // Arrange
        let platform = MemoryPlatform::new();
        platform
            .seed(&dashboard(DashboardSpec {
                count: Some(2),
                ..plain_http()
            }))
            .unwrap();
        let ctx = default_context(platform.clone());

        // Act
        reconcile_dashboard(&ctx, &nsn()).await.unwrap();

        // Assert
        let config = rendered(&platform).await;
        assert_eq!(config.get_str(SERVER_NAME), Some("kb"));
        assert!(config.get("server.ssl").is_none());

        let deployment = deployment(&platform).await;
        let spec = deployment.spec.unwrap();
        assert_eq!(spec.replicas, Some(2));
        assert_eq!(
            spec.selector.match_labels.unwrap()[TYPE_LABEL],
            "dashboard"
        );

        let service: Service = platform.get("ns", "kb-dash-http").await.unwrap().unwrap();
        let port = &service.spec.unwrap().ports.unwrap()[0];
        assert_eq!(port.port, 5601);
        assert_eq!(port.name.as_deref(), Some("http"));
    }

    #[tokio::test]
    async fn test_encryption_keys_survive_reconciles() {
        // Arrange
        let platform = MemoryPlatform::new();
        platform.seed(&dashboard(plain_http())).unwrap();
        let ctx = default_context(platform.clone());
        reconcile_dashboard(&ctx, &nsn()).await.unwrap();
        let first = rendered(&platform).await;

        // Act
        let mut updated = platform.get::<Dashboard>("ns", "kb").await.unwrap().unwrap();
        updated.spec.count = Some(3);
        platform.replace(&updated).await.unwrap();
        reconcile_dashboard(&ctx, &nsn()).await.unwrap();

        // Assert
        let second = rendered(&platform).await;
        assert!(first.get_str(SECURITY_ENCRYPTION_KEY).is_some());
        assert_eq!(
            first.get_str(SECURITY_ENCRYPTION_KEY),
            second.get_str(SECURITY_ENCRYPTION_KEY)
        );
        assert_eq!(deployment(&platform).await.spec.unwrap().replicas, Some(3));
    }

    #[tokio::test]
    async fn test_missing_certificates_are_not_found_and_watched() {
        // Arrange
        let platform = MemoryPlatform::new();
        platform.seed(&dashboard(spec())).unwrap();
        let ctx = default_context(platform.clone());

        // Act
        let err = reconcile_dashboard(&ctx, &nsn()).await.unwrap_err();

        // Assert
        assert!(err.is_not_found());
        assert_eq!(
            ctx.watches
                .secrets
                .owners_of(KIND_DASHBOARD, &NamespacedName::new("ns", "kb-dash-http-certs-internal")),
            vec![nsn()]
        );
        assert!(platform.names::<Deployment>("ns").is_empty());
    }

    #[tokio::test]
    async fn test_certificate_rotation_rolls_pods() {
        // Arrange
        let platform = MemoryPlatform::new();
        platform.seed(&dashboard(spec())).unwrap();
        platform
            .seed(&secret("kb-dash-http-certs-internal", &[("tls.crt", "a"), ("tls.key", "b")]))
            .unwrap();
        let ctx = default_context(platform.clone());
        reconcile_dashboard(&ctx, &nsn()).await.unwrap();
        let before = config_hash(&platform).await;

        // Act
        let mut certs: Secret = platform
            .get("ns", "kb-dash-http-certs-internal")
            .await
            .unwrap()
            .unwrap();
        certs.data = Some(secrets::data_from([("tls.crt", "c"), ("tls.key", "d")]));
        platform.replace(&certs).await.unwrap();
        reconcile_dashboard(&ctx, &nsn()).await.unwrap();

        // Assert
        assert_ne!(before, config_hash(&platform).await);
        let pod_spec = deployment(&platform).await.spec.unwrap().template.spec.unwrap();
        assert!(pod_spec
            .volumes
            .unwrap()
            .iter()
            .any(|v| v.name == HTTP_CERTS_VOLUME_NAME));
        assert!(ctx
            .watches
            .secrets
            .get(&cert_watch_key(KIND_DASHBOARD, &nsn()))
            .is_some());
    }

    #[tokio::test]
    async fn test_secure_settings_add_keystore_init_container() {
        let platform = MemoryPlatform::new();
        platform
            .seed(&dashboard(DashboardSpec {
                secure_settings: vec![SecretSource {
                    secret_name: "kb-secure".to_string(),
                }],
                ..plain_http()
            }))
            .unwrap();
        platform.seed(&secret("kb-secure", &[("key", "value")])).unwrap();
        let ctx = default_context(platform.clone());

        reconcile_dashboard(&ctx, &nsn()).await.unwrap();

        let pod_spec = deployment(&platform).await.spec.unwrap().template.spec.unwrap();
        assert!(pod_spec
            .init_containers
            .unwrap()
            .iter()
            .any(|c| c.name == CONTAINER_NAME_KEYSTORE));
    }

    #[tokio::test]
    async fn test_invalid_spec_is_reported() {
        // Arrange
        let platform = MemoryPlatform::new();
        platform
            .seed(&dashboard(DashboardSpec {
                config: Some(json!({"server.name": "x"})),
                config_ref: Some(ConfigRef {
                    secret_name: "user-config".to_string(),
                    key: None,
                }),
                ..plain_http()
            }))
            .unwrap();
        let sink = Arc::new(MemoryEventSink::new());
        let ctx = context(platform.clone(), sink.clone());

        // Act
        let err = reconcile_dashboard(&ctx, &nsn()).await.unwrap_err();

        // Assert
        assert!(matches!(err, Error::InvalidSpec { .. }));
        assert_eq!(sink.reasons(), vec![EVENT_REASON_VALIDATION.to_string()]);
        assert!(platform.names::<Deployment>("ns").is_empty());
    }

    #[tokio::test]
    async fn test_reconcile_runs_default_checks_only() {
        // Arrange
        let platform = MemoryPlatform::new();
        let mut downgraded = dashboard(plain_http());
        downgraded.status = Some(WorkloadStatus {
            version: Some("8.16.0".to_string()),
            ..Default::default()
        });
        platform.seed(&downgraded).unwrap();
        let sink = Arc::new(MemoryEventSink::new());
        let ctx = context(platform.clone(), sink.clone());

        // Act
        let results = reconcile_dashboard(&ctx, &nsn()).await.unwrap();

        // Assert
        assert!(!results.has_error());
        assert!(sink.reasons().is_empty());
        assert_eq!(platform.names::<Deployment>("ns"), vec!["kb-dash".to_string()]);
    }

    #[tokio::test]
    async fn test_deleted_dashboard_is_cleaned_up() {
        // Arrange
        let platform = MemoryPlatform::new();
        platform.seed(&dashboard(plain_http())).unwrap();
        let ctx = default_context(platform.clone());
        reconcile_dashboard(&ctx, &nsn()).await.unwrap();
        assert_eq!(platform.names::<Secret>("ns"), vec!["kb-dash-config".to_string()]);

        // Act
        platform.delete::<Dashboard>("ns", "kb").await.unwrap();
        reconcile_dashboard(&ctx, &nsn()).await.unwrap();

        // Assert
        assert!(platform.names::<Secret>("ns").is_empty());
        assert!(ctx.watches.keys_of(KIND_DASHBOARD, &nsn()).is_empty());
    }
}
