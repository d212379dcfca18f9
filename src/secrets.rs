// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Helpers to read Kubernetes `Secret` data.

use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::ByteString;
use std::collections::BTreeMap;

/// Raw value of `key`, looking at `data` first and `stringData` second.
#[must_use]
pub fn value(secret: &Secret, key: &str) -> Option<Vec<u8>> {
    secret
        .data
        .as_ref()
        .and_then(|data| data.get(key))
        .map(|bytes| bytes.0.clone())
        .or_else(|| {
            secret
                .string_data
                .as_ref()
                .and_then(|data| data.get(key))
                .map(|s| s.clone().into_bytes())
        })
}

/// UTF-8 value of `key`, `None` when absent or not valid UTF-8.
#[must_use]
pub fn string_value(secret: &Secret, key: &str) -> Option<String> {
    value(secret, key).and_then(|bytes| String::from_utf8(bytes).ok())
}

/// True when `key` holds a non-empty value.
#[must_use]
pub fn has_value(secret: &Secret, key: &str) -> bool {
    value(secret, key).is_some_and(|bytes| !bytes.is_empty())
}

/// Every key of the secret, `data` and `stringData` combined.
#[must_use]
pub fn keys(secret: &Secret) -> Vec<String> {
    let mut keys: Vec<String> = secret
        .data
        .iter()
        .flat_map(BTreeMap::keys)
        .chain(secret.string_data.iter().flat_map(BTreeMap::keys))
        .cloned()
        .collect();
    keys.sort();
    keys.dedup();
    keys
}

/// Builds a `data` map from string pairs.
#[must_use]
pub fn data_from<I, K, V>(pairs: I) -> BTreeMap<String, ByteString>
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<Vec<u8>>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), ByteString(v.into())))
        .collect()
}
