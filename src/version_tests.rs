// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for version parsing.

#[cfg(test)]
mod tests {
    use crate::version::{SupportedRange, Version};

    #[test]
    fn test_parse_release() {
        let v = Version::parse("8.15.2").unwrap();
        assert_eq!(v, Version::new(8, 15, 2));
        assert_eq!(v.to_string(), "8.15.2");
    }

    #[test]
    fn test_parse_pre_release_and_build_metadata() {
        let v = Version::parse("8.16.0-SNAPSHOT+abc123").unwrap();
        assert_eq!(v.pre.as_deref(), Some("SNAPSHOT"));
        assert_eq!(v.to_string(), "8.16.0-SNAPSHOT");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(Version::parse("").is_err());
        assert!(Version::parse("8.1").is_err());
        assert!(Version::parse("8.x.0").is_err());
        assert!(Version::parse("8.1.0-").is_err());
        assert!(Version::parse("latest").is_err());
    }

    #[test]
    fn test_ordering() {
        let older = Version::parse("8.1.0").unwrap();
        let newer = Version::parse("8.2.0").unwrap();
        let pre = Version::parse("8.2.0-rc1").unwrap();

        assert!(older < newer);
        assert!(pre < newer);
        assert!(older < pre);
        assert!(newer.gte(&older));
        assert!(!older.gte(&newer));
    }

    #[test]
    fn test_same_minor() {
        let a = Version::parse("8.2.0").unwrap();
        let b = Version::parse("8.2.5").unwrap();
        let c = Version::parse("8.3.0").unwrap();
        assert!(a.same_minor(&b));
        assert!(!a.same_minor(&c));
    }

    #[test]
    fn test_min_of() {
        let versions = vec![
            Version::parse("8.3.0").unwrap(),
            Version::parse("8.1.0").unwrap(),
            Version::parse("8.2.0").unwrap(),
        ];
        assert_eq!(Version::min_of(&versions), Some(Version::new(8, 1, 0)));
        assert_eq!(Version::min_of(&Vec::<Version>::new()), None);
    }

    #[test]
    fn test_supported_range_bounds() {
        let range = SupportedRange::stack();

        assert!(range.check(&Version::parse("7.0.0").unwrap()).is_ok());
        assert!(range.check(&Version::parse("7.0.0-alpha1").unwrap()).is_ok());
        assert!(range.check(&Version::parse("9.9.9").unwrap()).is_ok());
        assert!(range.check(&Version::parse("6.8.0").unwrap()).is_err());
        assert!(range.check(&Version::parse("10.0.0").unwrap()).is_err());
    }
}
