// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `client.rs`

#[cfg(test)]
mod tests {
    use super::super::label_selector;
    use std::collections::BTreeMap;

    #[test]
    fn test_label_selector_is_sorted_and_comma_joined() {
        let labels = BTreeMap::from([
            ("beacon.firestoned.io/type".to_string(), "filebeat".to_string()),
            ("beacon.firestoned.io/name".to_string(), "k".to_string()),
        ]);

        assert_eq!(
            label_selector(&labels),
            "beacon.firestoned.io/name=k,beacon.firestoned.io/type=filebeat"
        );
    }

    #[test]
    fn test_label_selector_empty() {
        assert_eq!(label_selector(&BTreeMap::new()), "");
    }
}
