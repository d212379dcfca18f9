// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `resources.rs`

#[cfg(test)]
mod tests {
    use k8s_openapi::api::core::v1::Secret;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use std::collections::BTreeMap;

    use crate::names::NamespacedName;
    use crate::platform::memory::MemoryPlatform;
    use crate::platform::Platform;
    use crate::reconcilers::resources::*;
    use crate::secrets;

    const TEST_NAMESPACE: &str = "test-namespace";
    const TEST_NAME: &str = "test-secret";

    fn secret(value: &str, labels: &[(&str, &str)]) -> Secret {
        Secret {
            metadata: ObjectMeta {
                name: Some(TEST_NAME.to_string()),
                namespace: Some(TEST_NAMESPACE.to_string()),
                labels: Some(
                    labels
                        .iter()
                        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                        .collect(),
                ),
                ..Default::default()
            },
            data: Some(secrets::data_from([("key", value.as_bytes())])),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_reconcile_secret_creates_when_missing() {
        let platform = MemoryPlatform::new();

        let stored = reconcile_secret(&platform, &secret("v1", &[])).await.unwrap();

        assert_eq!(secrets::string_value(&stored, "key").as_deref(), Some("v1"));
        assert_eq!(platform.write_count(), 1);
    }

    #[tokio::test]
    async fn test_reconcile_secret_is_idempotent() {
        // Arrange
        let platform = MemoryPlatform::new();
        reconcile_secret(&platform, &secret("v1", &[("a", "1")])).await.unwrap();

        // Act
        reconcile_secret(&platform, &secret("v1", &[("a", "1")])).await.unwrap();

        // Assert
        assert_eq!(platform.write_count(), 1);
    }

    #[tokio::test]
    async fn test_reconcile_secret_updates_data_and_keeps_foreign_labels() {
        // Arrange
        let platform = MemoryPlatform::new();
        platform.seed(&secret("v1", &[("foreign", "x")])).unwrap();

        // Act
        reconcile_secret(&platform, &secret("v2", &[("a", "1")])).await.unwrap();

        // Assert
        let stored: Secret = platform.get(TEST_NAMESPACE, TEST_NAME).await.unwrap().unwrap();
        assert_eq!(secrets::string_value(&stored, "key").as_deref(), Some("v2"));
        let labels = stored.metadata.labels.unwrap();
        assert_eq!(labels.get("foreign").map(String::as_str), Some("x"));
        assert_eq!(labels.get("a").map(String::as_str), Some("1"));
    }

    #[tokio::test]
    async fn test_reconcile_secret_adds_missing_label() {
        let platform = MemoryPlatform::new();
        platform.seed(&secret("v1", &[])).unwrap();
        let writes = platform.write_count();

        reconcile_secret(&platform, &secret("v1", &[("a", "1")])).await.unwrap();

        assert_eq!(platform.write_count(), writes + 1);
    }

    #[test]
    fn test_is_subset() {
        let existing = BTreeMap::from([("a".to_string(), "1".to_string()), ("b".to_string(), "2".to_string())]);
        let expected = BTreeMap::from([("a".to_string(), "1".to_string())]);
        let different = BTreeMap::from([("a".to_string(), "2".to_string())]);

        assert!(is_subset(None, None));
        assert!(is_subset(Some(&expected), Some(&existing)));
        assert!(!is_subset(Some(&different), Some(&existing)));
        assert!(!is_subset(Some(&expected), None));
    }

    #[tokio::test]
    async fn test_garbage_collect_soft_owned_secrets() {
        // Arrange
        let platform = MemoryPlatform::new();
        let owner = NamespacedName::new(TEST_NAMESPACE, "k");
        let mut owned = secret("v", &[]);
        owned.metadata.labels = Some(soft_owner_labels("Beat", &owner));
        platform.seed(&owned).unwrap();
        let mut other = secret("v", &[]);
        other.metadata.name = Some("other".to_string());
        other.metadata.labels = Some(soft_owner_labels("Beat", &NamespacedName::new(TEST_NAMESPACE, "j")));
        platform.seed(&other).unwrap();

        // Act
        let deleted = garbage_collect_soft_owned_secrets(&platform, "Beat", &owner).await.unwrap();

        // Assert
        assert_eq!(deleted, 1);
        assert_eq!(platform.names::<Secret>(TEST_NAMESPACE), vec!["other".to_string()]);
    }

    #[tokio::test]
    async fn test_delete_if_exists_tolerates_absence() {
        let platform = MemoryPlatform::new();
        platform.seed(&secret("v", &[])).unwrap();

        assert!(delete_if_exists::<_, Secret>(&platform, TEST_NAMESPACE, TEST_NAME).await.unwrap());
        assert!(!delete_if_exists::<_, Secret>(&platform, TEST_NAMESPACE, TEST_NAME).await.unwrap());
    }
}
