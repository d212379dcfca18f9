// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `external.rs`

#[cfg(test)]
mod tests {
    use crate::association::external::{conf_from_secret, credentials_from_secret};
    use crate::association::{AssociationType, Credentials};
    use crate::errors::Error;
    use crate::secrets::data_from;
    use k8s_openapi::api::core::v1::Secret;
    use kube::api::ObjectMeta;

    fn secret(pairs: &[(&str, &str)]) -> Secret {
        Secret {
            metadata: ObjectMeta {
                name: Some("remote-es".to_string()),
                namespace: Some("ns".to_string()),
                ..Default::default()
            },
            data: Some(data_from(pairs.iter().copied())),
            ..Default::default()
        }
    }

    #[test]
    fn test_conf_from_basic_auth_secret() {
        // Arrange
        let secret = secret(&[
            ("url", "https://remote:9200"),
            ("username", "shipper"),
            ("password", "s3cret"),
            ("ca.crt", "PEM"),
        ]);

        // Act
        let conf = conf_from_secret(AssociationType::IndexStore, &secret).unwrap();

        // Assert
        assert_eq!(conf.url, "https://remote:9200");
        assert_eq!(conf.auth_secret_name, "remote-es");
        assert_eq!(conf.auth_secret_key, "password");
        assert!(conf.ca_cert_provided);
        assert_eq!(conf.ca_secret_name, "remote-es");
        assert!(conf.version.is_empty());
        assert!(conf.is_configured());
    }

    #[test]
    fn test_conf_prefers_api_key() {
        let secret = secret(&[("url", "https://remote:9200"), ("api-key", "abc"), ("version", "8.15.0")]);

        let conf = conf_from_secret(AssociationType::IndexStore, &secret).unwrap();

        assert_eq!(conf.auth_secret_key, "api-key");
        assert!(!conf.ca_cert_provided);
        assert_eq!(conf.version, "8.15.0");
    }

    #[test]
    fn test_conf_rejects_missing_or_bad_url() {
        let missing = secret(&[("username", "u"), ("password", "p")]);
        let malformed = secret(&[("url", "not a url"), ("username", "u"), ("password", "p")]);

        assert!(matches!(
            conf_from_secret(AssociationType::IndexStore, &missing),
            Err(Error::InvalidAssociation { .. })
        ));
        assert!(matches!(
            conf_from_secret(AssociationType::IndexStore, &malformed),
            Err(Error::InvalidAssociation { .. })
        ));
    }

    #[test]
    fn test_conf_rejects_missing_credentials() {
        let secret = secret(&[("url", "https://remote:9200"), ("username", "only-user")]);

        let err = conf_from_secret(AssociationType::Monitoring, &secret).unwrap_err();

        assert!(err.to_string().contains("remote-es"));
    }

    #[test]
    fn test_credentials_from_secret() {
        let basic = secret(&[("username", "shipper"), ("password", "s3cret")]);
        let token = secret(&[("api-key", "abc"), ("username", "ignored"), ("password", "ignored")]);

        assert_eq!(
            credentials_from_secret(AssociationType::IndexStore, &basic).unwrap(),
            Credentials::Basic {
                username: "shipper".to_string(),
                password: "s3cret".to_string()
            }
        );
        assert_eq!(
            credentials_from_secret(AssociationType::IndexStore, &token).unwrap(),
            Credentials::Token("abc".to_string())
        );
        assert!(credentials_from_secret(AssociationType::IndexStore, &secret(&[])).is_err());
    }
}
