// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for content hashing.

#[cfg(test)]
mod tests {
    use crate::hash::{hash_bytes, ContentHash};

    #[test]
    fn test_hash_is_stable() {
        assert_eq!(hash_bytes(b"foo: bar\n"), hash_bytes(b"foo: bar\n"));
    }

    #[test]
    fn test_hash_fits_in_label_value() {
        let hash = hash_bytes(b"foo: bar\n");
        assert_eq!(hash.len(), 56);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_hash_changes_with_resource_version() {
        // Arrange: same rendered bytes, different secret resourceVersion
        let mut first = ContentHash::new();
        first.write(b"foo: bar\n").write_str("1");
        let mut second = ContentHash::new();
        second.write(b"foo: bar\n").write_str("2");

        // Assert
        assert_ne!(first.finish(), second.finish());
    }

    #[test]
    fn test_hash_inputs_are_length_prefixed() {
        let mut a = ContentHash::new();
        a.write_str("ab").write_str("c");
        let mut b = ContentHash::new();
        b.write_str("a").write_str("bc");

        assert_ne!(a.finish(), b.finish());
    }
}
