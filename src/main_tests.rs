// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `main.rs` - command line flags and requeue policy

#[cfg(test)]
mod tests {
    use beacon::config::IpFamily;
    use beacon::errors::{Error, FieldError};
    use beacon::reconcilers::Results;
    use clap::Parser;
    use kube::runtime::controller::Action;
    use std::time::Duration;

    use crate::{action_for, requeue_for, Args, ReconcileError};

    fn reconcile_error(error: Error) -> ReconcileError {
        anyhow::Error::from(error).into()
    }

    #[test]
    fn test_default_flags() {
        // Arrange & Act
        let config = Args::parse_from(["beacon"]).operator_config();

        // Assert
        assert_eq!(config.ip_family, IpFamily::Ipv4);
        assert!(!config.manage_autodiscover_rbac);
        assert_eq!(config.requeue_after, Duration::from_secs(36_000));
        assert_eq!(config.container_registry, "docker.elastic.co");
        assert_eq!(config.metrics_bind_address, "0.0.0.0:8080");
    }

    #[test]
    fn test_explicit_flags() {
        let config = Args::parse_from([
            "beacon",
            "--ip-family",
            "ipv6",
            "--manage-autodiscover-rbac",
            "--requeue-after",
            "60",
            "--container-registry",
            "registry.local/",
            "--metrics-bind-address",
            "127.0.0.1:9090",
        ])
        .operator_config();

        assert_eq!(config.ip_family, IpFamily::Ipv6);
        assert!(config.manage_autodiscover_rbac);
        assert_eq!(config.requeue_after, Duration::from_secs(60));
        assert_eq!(config.container_registry, "registry.local");
        assert_eq!(config.metrics_bind_address, "127.0.0.1:9090");
    }

    #[test]
    fn test_unknown_ip_family_is_rejected() {
        assert!(Args::try_parse_from(["beacon", "--ip-family", "ipv5"]).is_err());
    }

    #[test]
    fn test_action_for_results() {
        assert_eq!(action_for(&Results::new()), Action::await_change());
        assert_eq!(
            action_for(&Results::requeue(Duration::from_secs(5))),
            Action::requeue(Duration::from_secs(5))
        );
    }

    #[test]
    fn test_conflicts_requeue_immediately() {
        let err = reconcile_error(Error::conflict("Beat", "ns", "fb"));

        assert_eq!(requeue_for(&err), Action::requeue(Duration::ZERO));
    }

    #[test]
    fn test_missing_objects_are_retried() {
        let err = reconcile_error(Error::not_found("Secret", "ns", "creds"));

        assert_eq!(requeue_for(&err), Action::requeue(Duration::from_secs(30)));
    }

    #[test]
    fn test_invalid_spec_waits_for_a_change() {
        let err = reconcile_error(Error::InvalidSpec {
            kind: "Beat".to_string(),
            namespace: "ns".to_string(),
            name: "fb".to_string(),
            errors: vec![FieldError::forbidden("spec.type", "must not be empty")],
        });

        assert_eq!(requeue_for(&err), Action::await_change());
    }

    #[test]
    fn test_foreign_errors_are_retried() {
        let err: ReconcileError = anyhow::anyhow!("boom").into();

        assert_eq!(requeue_for(&err), Action::requeue(Duration::from_secs(30)));
    }
}
