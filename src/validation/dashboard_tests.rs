// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `dashboard.rs`

#[cfg(test)]
mod tests {
    use crate::crd::{ConfigRef, Dashboard, DashboardSpec, HttpConfig, ObjectSelector, TlsOptions};
    use crate::validation::{validate, Validate};
    use serde_json::json;

    fn dashboard(spec: DashboardSpec) -> Dashboard {
        let mut dashboard = Dashboard::new("kb", spec);
        dashboard.metadata.namespace = Some("ns".to_string());
        dashboard
    }

    fn valid_spec() -> DashboardSpec {
        DashboardSpec {
            version: "8.15.0".to_string(),
            index_store_ref: Some(ObjectSelector::named("es")),
            ..Default::default()
        }
    }

    #[test]
    fn test_valid_dashboard() {
        assert!(dashboard(valid_spec()).default_checks().is_empty());
    }

    #[test]
    fn test_config_sources_exclusive() {
        let invalid = dashboard(DashboardSpec {
            config: Some(json!({"server.name": "kb"})),
            config_ref: Some(ConfigRef {
                secret_name: "cfg".to_string(),
                key: None,
            }),
            ..valid_spec()
        });

        assert_eq!(invalid.default_checks().len(), 2);
    }

    #[test]
    fn test_certificate_with_tls_disabled() {
        let invalid = dashboard(DashboardSpec {
            http: Some(HttpConfig {
                tls: Some(TlsOptions {
                    disabled: true,
                    certificate_secret_name: Some("my-cert".to_string()),
                }),
            }),
            ..valid_spec()
        });

        let errors = invalid.default_checks();

        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].path, "spec.http.tls.certificateSecretName");
    }

    #[test]
    fn test_external_ref_with_namespace_rejected() {
        let invalid = dashboard(DashboardSpec {
            index_store_ref: Some(ObjectSelector {
                secret_name: Some("remote".to_string()),
                namespace: Some("other".to_string()),
                ..Default::default()
            }),
            ..valid_spec()
        });

        assert_eq!(invalid.default_checks()[0].path, "spec.indexStoreRef");
    }

    #[test]
    fn test_downgrade_rejected() {
        let previous = dashboard(DashboardSpec {
            version: "8.2.0".to_string(),
            ..valid_spec()
        });
        let current = dashboard(DashboardSpec {
            version: "8.1.0".to_string(),
            ..valid_spec()
        });

        let errors = validate(Some(&previous), &current);

        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].to_string(), "spec.version: Forbidden: Version downgrades are not supported");
    }
}
