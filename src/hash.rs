// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Content hashing for rendered configuration.
//!
//! The hash covers the rendered configuration bytes plus the resourceVersion of every
//! secret contributing credentials, CA material or secure settings. It is stamped on the
//! pod template, so any change to one of those inputs rolls the pods.
//!
//! SHA-224 is used: its 56 hex characters fit in a label value (63 characters max).

use sha2::{Digest, Sha224};

/// Incremental content hasher.
///
/// Inputs are length-prefixed so that `("ab", "c")` and `("a", "bc")` hash differently.
#[derive(Clone, Default)]
pub struct ContentHash {
    hasher: Sha224,
}

impl ContentHash {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds raw bytes.
    pub fn write(&mut self, bytes: &[u8]) -> &mut Self {
        self.hasher.update((bytes.len() as u64).to_be_bytes());
        self.hasher.update(bytes);
        self
    }

    /// Feeds a string.
    pub fn write_str(&mut self, value: &str) -> &mut Self {
        self.write(value.as_bytes())
    }

    /// Returns the lowercase hex digest.
    #[must_use]
    pub fn finish(self) -> String {
        format!("{:x}", self.hasher.finalize())
    }
}

/// One-shot hash of a byte slice.
#[must_use]
pub fn hash_bytes(bytes: &[u8]) -> String {
    let mut hash = ContentHash::new();
    hash.write(bytes);
    hash.finish()
}

#[cfg(test)]
#[path = "hash_tests.rs"]
mod hash_tests;
