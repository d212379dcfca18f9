// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Semantic version parsing and comparison for stack versions.
//!
//! Stack versions look like `8.15.0` or `8.16.0-SNAPSHOT`. A pre-release sorts before
//! the release it precedes; build metadata (`+abc`) is accepted and ignored.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::constants::{MAX_SUPPORTED_VERSION, MIN_SUPPORTED_VERSION};
use crate::errors::{Error, Result};

/// A parsed `major.minor.patch[-pre]` version.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    /// Pre-release identifier without the leading dash
    pub pre: Option<String>,
}

impl Version {
    #[must_use]
    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
            pre: None,
        }
    }

    /// Parses a version string.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidVersion`] when the string is not `major.minor.patch`
    /// with numeric components.
    pub fn parse(raw: &str) -> Result<Self> {
        let invalid = |reason: &str| Error::InvalidVersion {
            version: raw.to_string(),
            reason: reason.to_string(),
        };

        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(invalid("version is empty"));
        }
        let without_build = trimmed.split('+').next().unwrap_or(trimmed);
        let (core, pre) = match without_build.split_once('-') {
            Some((core, pre)) if !pre.is_empty() => (core, Some(pre.to_string())),
            Some(_) => return Err(invalid("empty pre-release identifier")),
            None => (without_build, None),
        };

        let parts: Vec<&str> = core.split('.').collect();
        if parts.len() != 3 {
            return Err(invalid("expected major.minor.patch"));
        }
        let number = |part: &str| {
            part.parse::<u64>()
                .map_err(|_| invalid("version components must be numeric"))
        };

        Ok(Self {
            major: number(parts[0])?,
            minor: number(parts[1])?,
            patch: number(parts[2])?,
            pre,
        })
    }

    /// True when `self >= other`.
    #[must_use]
    pub fn gte(&self, other: &Self) -> bool {
        self >= other
    }

    /// True when both versions share major and minor.
    #[must_use]
    pub fn same_minor(&self, other: &Self) -> bool {
        self.major == other.major && self.minor == other.minor
    }

    /// Returns the smallest version of an iterator, if any.
    pub fn min_of<'a, I>(versions: I) -> Option<Self>
    where
        I: IntoIterator<Item = &'a Self>,
    {
        versions.into_iter().min().cloned()
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.major
            .cmp(&other.major)
            .then(self.minor.cmp(&other.minor))
            .then(self.patch.cmp(&other.patch))
            .then_with(|| match (&self.pre, &other.pre) {
                (None, None) => Ordering::Equal,
                (None, Some(_)) => Ordering::Greater,
                (Some(_), None) => Ordering::Less,
                (Some(a), Some(b)) => a.cmp(b),
            })
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if let Some(pre) = &self.pre {
            write!(f, "-{pre}")?;
        }
        Ok(())
    }
}

impl FromStr for Version {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Inclusive lower bound, exclusive upper bound.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SupportedRange {
    pub min: Version,
    pub max_exclusive: Version,
}

impl SupportedRange {
    /// The range supported by every kind the operator manages.
    #[must_use]
    pub fn stack() -> Self {
        // Both bounds are compile-time constants known to parse.
        let parse = |raw: &str| Version::parse(raw).unwrap_or(Version::new(0, 0, 0));
        Self {
            min: parse(MIN_SUPPORTED_VERSION),
            max_exclusive: parse(MAX_SUPPORTED_VERSION),
        }
    }

    /// Checks that `version` lies inside the range.
    ///
    /// Pre-releases of the lower bound (`7.0.0-alpha1`) are accepted.
    ///
    /// # Errors
    ///
    /// Returns a human-readable reason when the version is out of range.
    pub fn check(&self, version: &Version) -> std::result::Result<(), String> {
        let release = Version::new(version.major, version.minor, version.patch);
        if release < self.min {
            return Err(format!(
                "unsupported version: {version} is lower than the lowest supported version {}",
                self.min
            ));
        }
        if release >= self.max_exclusive {
            return Err(format!(
                "unsupported version: {version} is higher than the highest supported version (below {})",
                self.max_exclusive
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "version_tests.rs"]
mod version_tests;
